//! # driftcal
//!
//! Hierarchical t0 and R-t calibration of a straw drift-tube tracker.
//!
//! Hits are accumulated per sub-module at seven granularity levels (detector, side, layer,
//! phi-module, board, chip, straw). Each sub-module then either fits its own constants, when it
//! has enough statistics and the options allow it, or derives them from its already calibrated
//! parent, from the constants used at reconstruction time, or from a chip reference.
//!
//! Entry points
//! -----------------
//! * [`calibrator::Calibrator`] – the per-level store and decision engine,
//! * [`pipeline::CalibrationPipeline`] – one calibrator per level, run top-down,
//! * [`fitter::CurveFitter`] – the numeric fit seam, with [`fitter::ProfileFitter`] as default,
//! * [`dump`] – text, CSV and table output.
pub mod accumulator;
pub mod calibrator;
pub mod constants;
pub mod driftcal_errors;
pub mod dump;
pub mod fitter;
pub mod hierarchy;
pub mod histogram;
pub mod hit;
pub mod old_constants;
pub mod options;
pub mod params;
pub mod pipeline;
pub mod policy;
pub mod record;
pub mod running_stats;
pub mod selection;
