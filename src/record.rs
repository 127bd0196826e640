//! # Per sub-module calibration record
//!
//! A [`SubModuleRecord`] aggregates everything known about one sub-module (one key at the
//! calibrator's level):
//!
//! * hit counters and optional histograms, filled by [`Calibrator::add_hit`](crate::calibrator::Calibrator::add_hit),
//! * running means of the constants used at reconstruction time ("old" constants),
//! * the new R-t relation and t0 produced by [`Calibrator::calibrate`](crate::calibrator::Calibrator::calibrate),
//!   together with their provenance ([`FitOrigin`]) and quality ([`FitType`]).
//!
//! Values that do not exist yet are `None` rather than a numeric sentinel.
//!
//! Invariants
//! -----------------
//! * `counts.nhits >= max(counts.ntres, counts.nres, counts.nrt)`
//! * `calflag` is true iff the record went through a calibration.
//! * `rtflag` / `t0flag` are true iff this record holds usable constants it did not take
//!   from its parent.
use std::{fmt, sync::Arc};

use roots::{find_root_newton_raphson, SimpleConvergency};

use crate::{
    constants::{Key, Millimeter, Nanosecond, RT_NCOEFF},
    hierarchy::{Level, Position},
    histogram::HistogramBins,
    hit::HitSample,
};

/// Quality code attached to a t0 determination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FitType {
    /// Fit rejected, raw histogram mean used
    RawMean = 1,
    /// Accepted Gaussian fit
    Gaussian = 2,
    /// Parent t0 plus chip reference offset
    ChipReference = 3,
    /// Shifted parent t0
    Inherited = 4,
    /// Old constants reused as-is
    ReusedOld = 5,
    /// Fit outside the histogram domain, raw mean used
    OutOfRange = 6,
}

impl FitType {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for FitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Where a set of constants came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FitOrigin {
    Fitted,
    Inherited,
    ReusedOld,
    ChipReference,
}

/// One point of the R-t profile: mean radius in a drift-time slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RtPoint {
    pub time: Nanosecond,
    pub radius: Millimeter,
    pub error: Millimeter,
}

/// A fitted R-t relation `r(t) = a0 + a1·t + a2·t² + a3·t³` and the profile it was fitted on.
#[derive(Debug, Clone, PartialEq)]
pub struct RtCurve {
    pub coeffs: [f64; RT_NCOEFF],
    pub points: Vec<RtPoint>,
}

impl RtCurve {
    pub fn radius_at(&self, t: Nanosecond) -> Millimeter {
        self.coeffs.iter().rev().fold(0.0, |acc, c| acc * t + c)
    }

    fn slope_at(&self, t: Nanosecond) -> f64 {
        let [_, a1, a2, a3] = self.coeffs;
        a1 + 2.0 * a2 * t + 3.0 * a3 * t * t
    }

    /// Drift time at which the relation crosses zero radius, searched from `start`.
    pub fn zero_crossing(&self, start: Nanosecond) -> Option<Nanosecond> {
        let f = |t: f64| self.radius_at(t);
        let df = |t: f64| self.slope_at(t);
        let mut conv = SimpleConvergency {
            eps: 1e-9,
            max_iter: 50,
        };
        find_root_newton_raphson(start, &f, &df, &mut conv)
            .ok()
            .filter(|t| t.is_finite())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HitCounts {
    pub ntres: u64,
    pub nres: u64,
    pub nrt: u64,
    pub nhits: u64,
}

/// R-t side of the calibration output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RtCalibration {
    pub coeffs: [f64; RT_NCOEFF],
    /// t0 implied by the R-t relation
    pub rtt0: Nanosecond,
    pub curve: Option<Arc<RtCurve>>,
    pub origin: Option<FitOrigin>,
}

/// t0 side of the calibration output.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct T0Calibration {
    pub t0: Nanosecond,
    pub t0err: Nanosecond,
    /// Offset from the parent t0, `None` without parent
    pub t0off: Option<Nanosecond>,
    pub fit_type: Option<FitType>,
    pub origin: Option<FitOrigin>,
}

/// Width and position of a residual peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakSummary {
    pub mean: f64,
    pub mean_error: f64,
    pub width: f64,
    pub width_error: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubModuleRecord {
    pub key: Key,
    pub level: Level,
    pub position: Position,
    pub counts: HitCounts,
    pub histograms: Option<HistogramBins>,

    /// Sum of reconstruction t0 over the accumulated samples
    pub sum_t0: Nanosecond,
    /// Number of samples summed in `sum_t0`; a blob adds the count of every pair
    pub t0_samples: u64,
    /// Running mean of the reconstruction t0
    pub old_t0: Nanosecond,
    /// Running means of the reconstruction R-t coefficients
    pub old_rt: [f64; RT_NCOEFF],
    /// Running means of the straw coordinates
    pub coords: [f64; 3],
    /// Chip reference t0, chip level only
    pub ref_t0: Option<Nanosecond>,

    pub rt: RtCalibration,
    pub t0: T0Calibration,
    /// Spatial-residual peak
    pub residual: Option<PeakSummary>,
    /// Time-residual peak
    pub time_residual: Option<PeakSummary>,

    pub calflag: bool,
    pub rtflag: bool,
    pub t0flag: bool,
}

impl SubModuleRecord {
    /// Fresh record seeded from the first hit seen for `key`.
    ///
    /// Counters start at zero; the running means start at the hit values.
    pub fn seeded(key: &str, level: Level, hit: &HitSample) -> Self {
        SubModuleRecord {
            key: key.to_string(),
            level,
            position: Position::masked(&hit.indices, level),
            counts: HitCounts::default(),
            histograms: None,
            sum_t0: 0.0,
            t0_samples: 0,
            old_t0: hit.t0,
            old_rt: hit.rt_coeffs,
            coords: hit.coords,
            ref_t0: (level == Level::Chip).then_some(hit.ref_t0),
            rt: RtCalibration::default(),
            t0: T0Calibration::default(),
            residual: None,
            time_residual: None,
            calflag: false,
            rtflag: false,
            t0flag: false,
        }
    }

    /// Mean reconstruction t0 over the samples summed in `sum_t0`.
    pub fn mean_t0(&self) -> Option<Nanosecond> {
        (self.t0_samples > 0).then(|| self.sum_t0 / self.t0_samples as f64)
    }

    pub fn is_calibrated(&self) -> bool {
        self.calflag
    }

    pub fn fit_type(&self) -> Option<FitType> {
        self.t0.fit_type
    }
}

#[cfg(test)]
mod record_test {
    use super::*;
    use crate::hierarchy::StrawIndices;
    use approx::assert_relative_eq;

    #[test]
    fn test_seeded_record() {
        let hit = HitSample {
            indices: StrawIndices {
                det: 1,
                lay: 0,
                module: 3,
                brd: 2,
                chp: 7,
                stl: 4,
                stw: 11,
                sid: 120,
            },
            t0: 12.5,
            ref_t0: 0.3,
            rt_coeffs: [0.0, 0.05, 0.0, 0.0],
            coords: [1.0, 2.0, 3.0],
            ..Default::default()
        };
        let rec = SubModuleRecord::seeded("_1_0_3_2_7", Level::Chip, &hit);
        assert_eq!(rec.counts, HitCounts::default());
        assert_eq!(rec.position.chp, Some(7));
        assert_eq!(rec.position.sid, None);
        assert_eq!(rec.ref_t0, Some(0.3));
        assert_relative_eq!(rec.old_t0, 12.5);
        assert_eq!(rec.mean_t0(), None);
        assert!(!rec.calflag && !rec.rtflag && !rec.t0flag);

        let board = SubModuleRecord::seeded("_1_0_3_2", Level::Board, &hit);
        assert_eq!(board.ref_t0, None);
    }

    #[test]
    fn test_rt_curve_zero_crossing() {
        // r(t) = 0.05·(t - 2)
        let curve = RtCurve {
            coeffs: [-0.1, 0.05, 0.0, 0.0],
            points: vec![],
        };
        assert_relative_eq!(curve.radius_at(12.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(curve.zero_crossing(0.0).unwrap(), 2.0, epsilon = 1e-9);

        let flat = RtCurve {
            coeffs: [1.0, 0.0, 0.0, 0.0],
            points: vec![],
        };
        assert_eq!(flat.zero_crossing(0.0), None);
    }
}
