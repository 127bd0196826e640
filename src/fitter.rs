//! # Curve fitting collaborator
//!
//! The calibration decision tree never fits anything itself: it hands histograms to a
//! [`CurveFitter`] and interprets the returned [`FitResult`]. An unaccepted result is never an
//! error, the calibrator falls back on raw histogram moments instead.
//!
//! Conventions
//! -----------------
//! * [`CurveFitter::fit_peak`] returns `params = [amplitude, mean, sigma]` and matching errors.
//! * [`CurveFitter::fit_rt`] returns the four coefficients `[a0, a1, a2, a3]` of
//!   `r(t) = a0 + a1·t + a2·t² + a3·t³` and the profile points the fit used.
//!
//! Fitters take `&mut self`: they are not assumed reentrant and are driven from the thread
//! owning the records.
//!
//! [`ProfileFitter`] is the reference implementation shipped with the crate:
//!
//! * peak: iterated truncated moments in a `±1.5σ` window, with the width corrected for the
//!   truncation,
//! * R-t: per drift-time slice mean radius, then a weighted least-squares polynomial solved by
//!   SVD, with coefficients optionally held at zero ([`RtConstraints`]).
use nalgebra::{DMatrix, DVector};
use smallvec::{smallvec, SmallVec};

use crate::{
    constants::RT_NCOEFF,
    histogram::{Histogram1D, Histogram2D},
    options::CalibrationOptions,
    record::RtPoint,
};

/// Output of one delegated fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub accepted: bool,
    pub params: SmallVec<[f64; 4]>,
    pub errors: SmallVec<[f64; 4]>,
    /// Fitter-specific quality code, `0` when accepted
    pub quality: i32,
}

impl FitResult {
    pub fn rejected(quality: i32) -> Self {
        FitResult {
            accepted: false,
            params: SmallVec::new(),
            errors: SmallVec::new(),
            quality,
        }
    }

    pub fn param(&self, i: usize) -> Option<f64> {
        self.params.get(i).copied()
    }

    pub fn error(&self, i: usize) -> Option<f64> {
        self.errors.get(i).copied()
    }
}

/// Output of an R-t fit: the fit itself and the profile it was performed on.
#[derive(Debug, Clone, PartialEq)]
pub struct RtFit {
    pub result: FitResult,
    pub points: Vec<RtPoint>,
}

/// R-t coefficients held at zero during the fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RtConstraints {
    pub fix_constant_term: bool,
    pub fix_cubic_term: bool,
}

impl From<&CalibrationOptions> for RtConstraints {
    fn from(opts: &CalibrationOptions) -> Self {
        RtConstraints {
            fix_constant_term: opts.fix_constant_term,
            fix_cubic_term: opts.fix_cubic_term,
        }
    }
}

impl RtConstraints {
    fn free_coefficients(&self) -> SmallVec<[usize; 4]> {
        (0..RT_NCOEFF)
            .filter(|&i| !((i == 0 && self.fix_constant_term) || (i == 3 && self.fix_cubic_term)))
            .collect()
    }
}

pub trait CurveFitter {
    /// Fit a Gaussian peak on a 1-D residual histogram.
    fn fit_peak(&mut self, hist: &Histogram1D) -> FitResult;

    /// Fit the R-t relation on a time×radius histogram.
    fn fit_rt(&mut self, hist: &Histogram2D, constraints: RtConstraints) -> RtFit;
}

/// Rejection codes.
pub const QUALITY_TOO_FEW_ENTRIES: i32 = -1;
pub const QUALITY_ZERO_WIDTH: i32 = -2;
pub const QUALITY_TOO_FEW_POINTS: i32 = -3;
pub const QUALITY_SINGULAR: i32 = -4;
/// Used by the calibrator when a record stores no histogram to fit
pub const QUALITY_NO_HISTOGRAM: i32 = -5;

/// rms / σ of a normal distribution truncated at ±1.5σ
const TRUNCATED_RMS_FACTOR: f64 = 0.742_645;
const PEAK_WINDOW_SIGMAS: f64 = 1.5;
const PEAK_ITERATIONS: usize = 4;

#[derive(Debug, Clone)]
pub struct ProfileFitter {
    /// Minimum histogram content for a peak fit
    pub min_peak_entries: f64,
    /// Minimum content of a drift-time slice to enter the R-t profile
    pub min_slice_entries: f64,
}

impl Default for ProfileFitter {
    fn default() -> Self {
        ProfileFitter {
            min_peak_entries: 10.0,
            min_slice_entries: 5.0,
        }
    }
}

/// Moments of the histogram restricted to `[lo, hi]`.
///
/// Bins straddling a window edge contribute their overlapping fraction, located at the middle
/// of the overlap.
fn window_moments(hist: &Histogram1D, lo: f64, hi: f64) -> Option<(f64, f64, f64)> {
    let axis = hist.axis();
    let width = axis.width();
    let (mut n, mut s, mut s2) = (0.0, 0.0, 0.0);
    for (i, c) in hist.counts().iter().enumerate() {
        let edge = axis.min + i as f64 * width;
        let (a, b) = (edge.max(lo), (edge + width).min(hi));
        if b <= a {
            continue;
        }
        let w = c * (b - a) / width;
        let x = 0.5 * (a + b);
        n += w;
        s += w * x;
        s2 += w * x * x;
    }
    if n <= 0.0 {
        return None;
    }
    let mean = s / n;
    let var = (s2 / n - mean * mean).max(0.0);
    Some((n, mean, var.sqrt()))
}

impl CurveFitter for ProfileFitter {
    fn fit_peak(&mut self, hist: &Histogram1D) -> FitResult {
        let total = hist.entries();
        if total < self.min_peak_entries {
            return FitResult::rejected(QUALITY_TOO_FEW_ENTRIES);
        }
        let (Some(mut mean), Some(mut sigma)) = (hist.mean(), hist.rms()) else {
            return FitResult::rejected(QUALITY_TOO_FEW_ENTRIES);
        };
        let mut n = total;

        for _ in 0..PEAK_ITERATIONS {
            if sigma <= 0.0 {
                break;
            }
            let half = PEAK_WINDOW_SIGMAS * sigma;
            match window_moments(hist, mean - half, mean + half) {
                Some((wn, wmean, wrms)) => {
                    n = wn;
                    mean = wmean;
                    sigma = wrms / TRUNCATED_RMS_FACTOR;
                }
                None => break,
            }
        }

        if sigma <= 0.0 {
            return FitResult::rejected(QUALITY_ZERO_WIDTH);
        }

        let width = hist.axis().width();
        let amplitude = n * width / (sigma * std::f64::consts::TAU.sqrt());
        FitResult {
            accepted: true,
            params: smallvec![amplitude, mean, sigma],
            errors: smallvec![
                amplitude / n.sqrt(),
                sigma / n.sqrt(),
                sigma / (2.0 * n).sqrt()
            ],
            quality: 0,
        }
    }

    fn fit_rt(&mut self, hist: &Histogram2D, constraints: RtConstraints) -> RtFit {
        let (t_axis, r_axis) = (hist.x_axis(), hist.y_axis());
        let floor_err = r_axis.width() / 12f64.sqrt();

        let points: Vec<RtPoint> = (0..t_axis.nbins)
            .filter_map(|it| {
                let col = hist.column(it);
                let n: f64 = col.iter().sum();
                if n < self.min_slice_entries || n <= 0.0 {
                    return None;
                }
                let (s, s2) = col.iter().enumerate().fold((0.0, 0.0), |(s, s2), (ir, c)| {
                    let r = r_axis.bin_center(ir);
                    (s + c * r, s2 + c * r * r)
                });
                let mean = s / n;
                let rms = (s2 / n - mean * mean).max(0.0).sqrt();
                Some(RtPoint {
                    time: t_axis.bin_center(it),
                    radius: mean,
                    error: (rms / n.sqrt()).max(floor_err),
                })
            })
            .collect();

        let free = constraints.free_coefficients();
        if points.len() < free.len() {
            return RtFit {
                result: FitResult::rejected(QUALITY_TOO_FEW_POINTS),
                points,
            };
        }

        let design = DMatrix::from_fn(points.len(), free.len(), |row, col| {
            points[row].time.powi(free[col] as i32) / points[row].error
        });
        let target = DVector::from_iterator(
            points.len(),
            points.iter().map(|p| p.radius / p.error),
        );

        let normal = design.transpose() * &design;
        let (Ok(solution), Some(covariance)) = (
            design.clone().svd(true, true).solve(&target, 1e-12),
            normal.try_inverse(),
        ) else {
            return RtFit {
                result: FitResult::rejected(QUALITY_SINGULAR),
                points,
            };
        };

        let mut params: SmallVec<[f64; 4]> = smallvec![0.0; RT_NCOEFF];
        let mut errors: SmallVec<[f64; 4]> = smallvec![0.0; RT_NCOEFF];
        for (k, &coeff) in free.iter().enumerate() {
            params[coeff] = solution[k];
            errors[coeff] = covariance[(k, k)].max(0.0).sqrt();
        }

        RtFit {
            result: FitResult {
                accepted: params.iter().all(|p| p.is_finite()),
                params,
                errors,
                quality: 0,
            },
            points,
        }
    }
}

#[cfg(test)]
mod fitter_test {
    use super::*;
    use crate::histogram::BinAxis;
    use approx::assert_abs_diff_eq;

    fn gaussian_hist(mean: f64, sigma: f64, n: f64) -> Histogram1D {
        let mut h = Histogram1D::new(BinAxis::new(100, -25.0, 25.0));
        for i in 0..100 {
            let x = h.axis().bin_center(i);
            let w = n * 0.5 / (sigma * std::f64::consts::TAU.sqrt())
                * (-0.5 * ((x - mean) / sigma).powi(2)).exp();
            h.fill_bin(i, w);
        }
        h
    }

    #[test]
    fn test_fit_peak_recovers_gaussian() {
        let hist = gaussian_hist(2.3, 3.0, 10_000.0);
        let fit = ProfileFitter::default().fit_peak(&hist);
        assert!(fit.accepted);
        assert_eq!(fit.quality, 0);
        assert_abs_diff_eq!(fit.param(1).unwrap(), 2.3, epsilon = 0.05);
        assert_abs_diff_eq!(fit.param(2).unwrap(), 3.0, epsilon = 0.15);
    }

    #[test]
    fn test_fit_peak_degenerate_inputs() {
        let mut fitter = ProfileFitter::default();
        let empty = Histogram1D::new(BinAxis::new(100, -25.0, 25.0));
        assert_eq!(fitter.fit_peak(&empty).quality, QUALITY_TOO_FEW_ENTRIES);

        let mut spike = Histogram1D::new(BinAxis::new(100, -25.0, 25.0));
        spike.fill_bin(40, 500.0);
        let fit = fitter.fit_peak(&spike);
        assert!(!fit.accepted);
        assert_eq!(fit.quality, QUALITY_ZERO_WIDTH);
    }

    #[test]
    fn test_fit_rt_linear_relation() {
        // r = 0.04·(t + 2), sampled inside [0, 2) mm
        let mut hist = Histogram2D::new(BinAxis::new(100, -5.0, 45.0), BinAxis::new(50, 0.0, 2.0));
        for it in 0..100 {
            let t = hist.x_axis().bin_center(it);
            let r = 0.04 * (t + 2.0);
            if (0.0..2.0).contains(&r) {
                hist.fill(t, r, 20.0);
            }
        }
        let constraints = RtConstraints {
            fix_constant_term: false,
            fix_cubic_term: true,
        };
        let fit = ProfileFitter::default().fit_rt(&hist, constraints);
        assert!(fit.result.accepted);
        assert!(fit.points.len() > 10);
        assert_eq!(fit.result.param(3), Some(0.0));
        assert_abs_diff_eq!(fit.result.param(1).unwrap(), 0.04, epsilon = 2e-3);
        assert_abs_diff_eq!(fit.result.param(0).unwrap(), 0.08, epsilon = 0.03);
    }

    #[test]
    fn test_fit_rt_empty_histogram_is_rejected() {
        let hist = Histogram2D::new(BinAxis::new(10, 0.0, 10.0), BinAxis::new(10, 0.0, 2.0));
        let fit = ProfileFitter::default().fit_rt(&hist, RtConstraints::default());
        assert!(!fit.result.accepted);
        assert_eq!(fit.result.quality, QUALITY_TOO_FEW_POINTS);
        assert!(fit.points.is_empty());
    }
}
