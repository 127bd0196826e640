//! # Constants and type definitions for driftcal
//!
//! This module centralizes the **histogram layouts**, **blob index conventions**, **default
//! thresholds**, and **common type aliases** used throughout the `driftcal` library.
//!
//! ## Overview
//!
//! - Fixed binning of the time-residual, spatial-residual and time×radius histograms
//! - Flat index space used by pre-aggregated per-straw histogram blobs
//! - Default statistics thresholds and correction constants
//! - Core type aliases used across the crate
//!
//! The 1-D histograms always have [`RESIDUAL_NBINS`] bins: the blob index convention depends on it.

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Time in nanoseconds
pub type Nanosecond = f64;
/// Distance in millimeters
pub type Millimeter = f64;
/// Opaque identifier of one sub-module instance at a given hierarchy level
pub type Key = String;

// -------------------------------------------------------------------------------------------------
// Histogram layouts
// -------------------------------------------------------------------------------------------------

/// Number of bins of both 1-D residual histograms
pub const RESIDUAL_NBINS: usize = 100;

/// Time-residual histogram domain (ns)
pub const TRES_MIN: Nanosecond = -25.0;
pub const TRES_MAX: Nanosecond = 25.0;

/// Spatial-residual histogram domain (mm)
pub const RES_MIN: Millimeter = -0.6;
pub const RES_MAX: Millimeter = 0.6;

/// Drift-time axis of the R-t histogram (ns)
pub const RT_TIME_NBINS: usize = 100;
pub const RT_TIME_MIN: Nanosecond = -5.0;
pub const RT_TIME_MAX: Nanosecond = 45.0;

/// Drift-radius axis of the R-t histogram (mm)
pub const RT_RADIUS_NBINS: usize = 50;
pub const RT_RADIUS_MIN: Millimeter = 0.0;
pub const RT_RADIUS_MAX: Millimeter = 2.0;

// -------------------------------------------------------------------------------------------------
// Histogram blob flat index space
// -------------------------------------------------------------------------------------------------

/// First flat index of the time-residual histogram
pub const BLOB_TRES_OFFSET: usize = 0;
/// First flat index of the spatial-residual histogram
pub const BLOB_RES_OFFSET: usize = RESIDUAL_NBINS;
/// First flat index of the time×radius histogram
pub const BLOB_RT_OFFSET: usize = 2 * RESIDUAL_NBINS;

// -------------------------------------------------------------------------------------------------
// Thresholds and corrections
// -------------------------------------------------------------------------------------------------

/// Default minimum number of time-residual samples for an independent t0 fit
pub const DEFAULT_MIN_T0_STAT: u64 = 200;
/// Default minimum number of R-t samples for an independent R-t fit
pub const DEFAULT_MIN_RT_STAT: u64 = 10_000;
/// Minimum number of spatial-residual samples for the residual side fit
pub const DEFAULT_RES_FIT_MIN_ENTRIES: u64 = 50;
/// Straw layers below this index are short straws
pub const SHORT_STRAW_LAYER_CUTOFF: i32 = 9;
/// t0 shift applied to inherited short-straw constants (ns)
pub const SHORT_STRAW_T0_SHIFT: Nanosecond = 0.75;

/// Number of R-t polynomial coefficients
pub const RT_NCOEFF: usize = 4;

/// Key of the single level-0 record
pub const TOP_LEVEL_KEY: &str = "ALL";
