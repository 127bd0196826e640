//! # Calibrator configuration
//!
//! [`CalibratorParams`] gathers the engine-wide settings of one [`Calibrator`](crate::calibrator::Calibrator):
//! statistics thresholds, global shifts, the "reuse old constants" modes and the histogram layout.
//! They are the same for every key of the level.
//!
//! Use [`CalibratorParams::default`] for the standard configuration, or the validating
//! [`CalibratorParamsBuilder`]:
//!
//! ```rust
//! use driftcal::params::CalibratorParams;
//!
//! let params = CalibratorParams::builder()
//!     .min_t0_stat(500)
//!     .min_rt_stat(20_000)
//!     .t0_shift(-0.25)
//!     .build()
//!     .unwrap();
//! println!("{params:#}");
//! ```
use std::fmt;

use crate::{
    constants::{
        Nanosecond, DEFAULT_MIN_RT_STAT, DEFAULT_MIN_T0_STAT, DEFAULT_RES_FIT_MIN_ENTRIES,
        RESIDUAL_NBINS, SHORT_STRAW_LAYER_CUTOFF, SHORT_STRAW_T0_SHIFT,
    },
    driftcal_errors::DriftCalError,
    histogram::{BinAxis, HistogramLayout},
};

/// Engine-wide calibration settings.
///
/// Fields
/// -----------------
/// * `min_t0_stat` – minimum time-residual samples for an independent t0 fit.
/// * `min_rt_stat` – minimum R-t samples for an independent R-t fit.
/// * `t0_shift` – global shift added to every fitted t0 (ns).
/// * `reuse_old_rt` – always keep the old R-t constants ("nort" mode).
/// * `reuse_old_t0` – always keep the old t0 ("not0" mode).
/// * `make_histograms` – whether records store histograms by default.
/// * `layout` – binning of the three histograms.
/// * `res_fit_min_entries` – minimum spatial-residual samples for the residual side fit.
/// * `short_straw_cutoff` – straw layers below this index get the short-straw correction.
/// * `short_straw_shift` – t0 shift of the short-straw correction (ns).
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratorParams {
    pub min_t0_stat: u64,
    pub min_rt_stat: u64,
    pub t0_shift: Nanosecond,
    pub reuse_old_rt: bool,
    pub reuse_old_t0: bool,
    pub make_histograms: bool,
    pub layout: HistogramLayout,
    pub res_fit_min_entries: u64,
    pub short_straw_cutoff: i32,
    pub short_straw_shift: Nanosecond,
}

impl Default for CalibratorParams {
    fn default() -> Self {
        CalibratorParams {
            min_t0_stat: DEFAULT_MIN_T0_STAT,
            min_rt_stat: DEFAULT_MIN_RT_STAT,
            t0_shift: 0.0,
            reuse_old_rt: false,
            reuse_old_t0: false,
            make_histograms: true,
            layout: HistogramLayout::default(),
            res_fit_min_entries: DEFAULT_RES_FIT_MIN_ENTRIES,
            short_straw_cutoff: SHORT_STRAW_LAYER_CUTOFF,
            short_straw_shift: SHORT_STRAW_T0_SHIFT,
        }
    }
}

impl CalibratorParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> CalibratorParamsBuilder {
        CalibratorParamsBuilder::new()
    }

    /// Option letters describing the engine-wide modes, as printed in logs and dumps.
    pub fn mode_string(&self) -> String {
        let mut s = String::new();
        if self.reuse_old_rt {
            s.push_str("nort");
        }
        if self.reuse_old_t0 {
            if !s.is_empty() {
                s.push(',');
            }
            s.push_str("not0");
        }
        s
    }
}

/// Builder for [`CalibratorParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct CalibratorParamsBuilder {
    params: CalibratorParams,
}

impl CalibratorParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_t0_stat(mut self, v: u64) -> Self {
        self.params.min_t0_stat = v;
        self
    }
    pub fn min_rt_stat(mut self, v: u64) -> Self {
        self.params.min_rt_stat = v;
        self
    }
    pub fn t0_shift(mut self, v: Nanosecond) -> Self {
        self.params.t0_shift = v;
        self
    }
    pub fn reuse_old_rt(mut self, v: bool) -> Self {
        self.params.reuse_old_rt = v;
        self
    }
    pub fn reuse_old_t0(mut self, v: bool) -> Self {
        self.params.reuse_old_t0 = v;
        self
    }
    pub fn make_histograms(mut self, v: bool) -> Self {
        self.params.make_histograms = v;
        self
    }
    pub fn layout(mut self, v: HistogramLayout) -> Self {
        self.params.layout = v;
        self
    }
    pub fn res_fit_min_entries(mut self, v: u64) -> Self {
        self.params.res_fit_min_entries = v;
        self
    }
    pub fn short_straw_cutoff(mut self, v: i32) -> Self {
        self.params.short_straw_cutoff = v;
        self
    }
    pub fn short_straw_shift(mut self, v: Nanosecond) -> Self {
        self.params.short_straw_shift = v;
        self
    }

    fn check_axis(name: &str, axis: &BinAxis) -> Result<(), DriftCalError> {
        if axis.nbins == 0 {
            return Err(DriftCalError::InvalidCalibratorParameter(format!(
                "{name} axis must have at least one bin"
            )));
        }
        if !(axis.min.is_finite() && axis.max.is_finite() && axis.min < axis.max) {
            return Err(DriftCalError::InvalidCalibratorParameter(format!(
                "{name} axis requires finite min < max"
            )));
        }
        Ok(())
    }

    /// Validate and return the parameters.
    ///
    /// Return
    /// ----------
    /// * The parameters, or [`DriftCalError::InvalidCalibratorParameter`] when a shift is not
    ///   finite, an axis is empty or inverted, or a residual axis does not have the bin count the
    ///   histogram blob index space relies on.
    pub fn build(self) -> Result<CalibratorParams, DriftCalError> {
        let p = &self.params;

        if !p.t0_shift.is_finite() || !p.short_straw_shift.is_finite() {
            return Err(DriftCalError::InvalidCalibratorParameter(
                "t0 shifts must be finite".into(),
            ));
        }

        Self::check_axis("time-residual", &p.layout.tres)?;
        Self::check_axis("residual", &p.layout.res)?;
        Self::check_axis("R-t time", &p.layout.rt_time)?;
        Self::check_axis("R-t radius", &p.layout.rt_radius)?;

        if p.layout.tres.nbins != RESIDUAL_NBINS || p.layout.res.nbins != RESIDUAL_NBINS {
            return Err(DriftCalError::InvalidCalibratorParameter(format!(
                "residual histograms must have {RESIDUAL_NBINS} bins"
            )));
        }

        Ok(self.params)
    }
}

impl fmt::Display for CalibratorParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 40;
            writeln!(f, "Calibrator Parameters")?;
            writeln!(f, "---------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = " ".repeat(PARAM_COL.saturating_sub(s.len()).max(1));
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            line!("min_t0_stat = {}", self.min_t0_stat, "samples for own t0 fit")?;
            line!("min_rt_stat = {}", self.min_rt_stat, "samples for own R-t fit")?;
            line!("t0_shift = {}", self.t0_shift, "ns added to fitted t0")?;
            line!("reuse_old_rt = {}", self.reuse_old_rt, "nort mode")?;
            line!("reuse_old_t0 = {}", self.reuse_old_t0, "not0 mode")?;
            line!("make_histograms = {}", self.make_histograms, "store histograms")?;
            line!(
                "res_fit_min_entries = {}",
                self.res_fit_min_entries,
                "samples for residual fit"
            )?;
            line!(
                "short_straw_cutoff = {}",
                self.short_straw_cutoff,
                "first long straw layer"
            )?;
            line!(
                "short_straw_shift = {}",
                self.short_straw_shift,
                "ns subtracted for short straws"
            )?;
            let l = &self.layout;
            for (name, axis) in [
                ("tres", l.tres),
                ("res", l.res),
                ("rt_time", l.rt_time),
                ("rt_radius", l.rt_radius),
            ] {
                line!(
                    "{}",
                    format!("{name} = {} bins [{}, {})", axis.nbins, axis.min, axis.max),
                    "histogram axis"
                )?;
            }
            Ok(())
        } else {
            write!(
                f,
                "CalibratorParams(min_t0_stat={}, min_rt_stat={}, t0_shift={}, mode=[{}])",
                self.min_t0_stat,
                self.min_rt_stat,
                self.t0_shift,
                self.mode_string()
            )
        }
    }
}

#[cfg(test)]
mod params_test {
    use super::*;

    #[test]
    fn test_builder_validation() {
        let p = CalibratorParams::builder()
            .min_t0_stat(0)
            .min_rt_stat(0)
            .reuse_old_t0(true)
            .build()
            .unwrap();
        assert_eq!(p.min_t0_stat, 0);
        assert_eq!(p.mode_string(), "not0");

        let err = CalibratorParams::builder()
            .t0_shift(f64::NAN)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            DriftCalError::InvalidCalibratorParameter("t0 shifts must be finite".into())
        );

        let mut layout = HistogramLayout::default();
        layout.rt_radius = BinAxis::new(10, 2.0, 0.0);
        assert!(CalibratorParams::builder().layout(layout).build().is_err());

        let mut layout = HistogramLayout::default();
        layout.tres = BinAxis::new(50, -25.0, 25.0);
        assert!(CalibratorParams::builder().layout(layout).build().is_err());
    }

    #[test]
    fn test_display() {
        let p = CalibratorParams::builder()
            .reuse_old_rt(true)
            .reuse_old_t0(true)
            .build()
            .unwrap();
        assert!(p.to_string().contains("mode=[nort,not0]"));
        let sheet = format!("{p:#}");
        assert!(sheet.contains("min_t0_stat = 200"));
        assert!(sheet.contains("tres = 100 bins [-25, 25)"));
    }
}
