//! # Calibration decision policies
//!
//! For each key, [`Calibrator::calibrate`](crate::calibrator::Calibrator::calibrate) picks one
//! policy for the R-t relation and one for t0. Policies are evaluated in a fixed order, first
//! match wins:
//!
//! ```text
//! R-t:  ReuseOld  → Fit  → Inherit
//! t0:   ReuseOld  → ChipReference  → Fit  → Inherit
//! ```
//!
//! | policy | precondition |
//! |---|---|
//! | `RtPolicy::ReuseOld` | engine in "nort" mode |
//! | `RtPolicy::Fit` | (`R` and enough R-t statistics) or top level |
//! | `T0Policy::ReuseOld` | engine in "not0" mode |
//! | `T0Policy::ChipReference` | `B` and chip level |
//! | `T0Policy::Fit` | (`T` and enough t0 statistics) or top level |
//! | `Inherit` | always |
//!
//! The choice only depends on a [`DecisionContext`], so it is deterministic and can be tested
//! without any record or fitter.
use std::fmt;

use crate::{
    hierarchy::Level, options::CalibrationOptions, params::CalibratorParams, record::HitCounts,
};

/// Everything the policy choice depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionContext {
    pub level: Level,
    pub options: CalibrationOptions,
    pub enough_t0: bool,
    pub enough_rt: bool,
    pub reuse_old_rt: bool,
    pub reuse_old_t0: bool,
}

impl DecisionContext {
    /// Evaluate the eligibility predicates of one record.
    pub fn new(
        level: Level,
        options: CalibrationOptions,
        counts: &HitCounts,
        params: &CalibratorParams,
    ) -> Self {
        DecisionContext {
            level,
            options,
            enough_t0: counts.ntres >= params.min_t0_stat,
            enough_rt: counts.nrt >= params.min_rt_stat,
            reuse_old_rt: params.reuse_old_rt,
            reuse_old_t0: params.reuse_old_t0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RtPolicy {
    ReuseOld,
    Fit,
    Inherit,
}

impl RtPolicy {
    pub const ORDER: [RtPolicy; 3] = [RtPolicy::ReuseOld, RtPolicy::Fit, RtPolicy::Inherit];

    pub fn applies(self, ctx: &DecisionContext) -> bool {
        match self {
            RtPolicy::ReuseOld => ctx.reuse_old_rt,
            RtPolicy::Fit => (ctx.options.fit_rt && ctx.enough_rt) || ctx.level.is_top(),
            RtPolicy::Inherit => true,
        }
    }

    pub fn select(ctx: &DecisionContext) -> RtPolicy {
        Self::ORDER
            .into_iter()
            .find(|p| p.applies(ctx))
            .unwrap_or(RtPolicy::Inherit)
    }

    /// Below the top level, reusing old constants still takes `rtt0` and the curve from the parent.
    pub fn needs_parent(self, level: Level) -> bool {
        match self {
            RtPolicy::ReuseOld => !level.is_top(),
            RtPolicy::Fit => false,
            RtPolicy::Inherit => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum T0Policy {
    ReuseOld,
    ChipReference,
    Fit,
    Inherit,
}

impl T0Policy {
    pub const ORDER: [T0Policy; 4] = [
        T0Policy::ReuseOld,
        T0Policy::ChipReference,
        T0Policy::Fit,
        T0Policy::Inherit,
    ];

    pub fn applies(self, ctx: &DecisionContext) -> bool {
        match self {
            T0Policy::ReuseOld => ctx.reuse_old_t0,
            T0Policy::ChipReference => ctx.options.chip_reference && ctx.level == Level::Chip,
            T0Policy::Fit => (ctx.options.fit_t0 && ctx.enough_t0) || ctx.level.is_top(),
            T0Policy::Inherit => true,
        }
    }

    pub fn select(ctx: &DecisionContext) -> T0Policy {
        Self::ORDER
            .into_iter()
            .find(|p| p.applies(ctx))
            .unwrap_or(T0Policy::Inherit)
    }

    pub fn needs_parent(self) -> bool {
        matches!(self, T0Policy::ChipReference | T0Policy::Inherit)
    }
}

impl fmt::Display for RtPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RtPolicy::ReuseOld => "reuse-old",
            RtPolicy::Fit => "fit",
            RtPolicy::Inherit => "inherit",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for T0Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            T0Policy::ReuseOld => "reuse-old",
            T0Policy::ChipReference => "chip-reference",
            T0Policy::Fit => "fit",
            T0Policy::Inherit => "inherit",
        };
        write!(f, "{s}")
    }
}

/// Whether the spatial-residual side fit runs: enough samples and at least one own fit.
pub fn residual_fit_applies(
    nres: u64,
    min_entries: u64,
    rt: RtPolicy,
    t0: T0Policy,
) -> bool {
    nres >= min_entries && (rt == RtPolicy::Fit || t0 == T0Policy::Fit)
}

/// Whether an inherited straw-level t0 gets the short-straw correction.
pub fn short_straw_applies(
    level: Level,
    options: &CalibrationOptions,
    straw_layer: Option<i32>,
    cutoff: i32,
) -> bool {
    level == Level::Straw && options.short_straw && straw_layer.is_some_and(|stl| stl < cutoff)
}

#[cfg(test)]
mod policy_test {
    use super::*;

    fn ctx(level: Level, opts: &str, enough_t0: bool, enough_rt: bool) -> DecisionContext {
        DecisionContext {
            level,
            options: CalibrationOptions::from(opts),
            enough_t0,
            enough_rt,
            reuse_old_rt: false,
            reuse_old_t0: false,
        }
    }

    #[test]
    fn test_rt_policy_order() {
        assert_eq!(RtPolicy::select(&ctx(Level::Chip, "RT", true, true)), RtPolicy::Fit);
        assert_eq!(
            RtPolicy::select(&ctx(Level::Chip, "RT", true, false)),
            RtPolicy::Inherit
        );
        // without R the R-t relation is never fitted below the top level
        for enough in [true, false] {
            assert_eq!(
                RtPolicy::select(&ctx(Level::Board, "T", true, enough)),
                RtPolicy::Inherit
            );
        }
        assert_eq!(
            RtPolicy::select(&ctx(Level::Detector, "", false, false)),
            RtPolicy::Fit
        );

        let mut nort = ctx(Level::Detector, "R", true, true);
        nort.reuse_old_rt = true;
        assert_eq!(RtPolicy::select(&nort), RtPolicy::ReuseOld);
    }

    #[test]
    fn test_t0_policy_order() {
        assert_eq!(T0Policy::select(&ctx(Level::Chip, "TB", true, true)), T0Policy::ChipReference);
        assert_eq!(T0Policy::select(&ctx(Level::Board, "TB", true, true)), T0Policy::Fit);
        assert_eq!(T0Policy::select(&ctx(Level::Board, "T", false, true)), T0Policy::Inherit);
        assert_eq!(T0Policy::select(&ctx(Level::Detector, "", false, false)), T0Policy::Fit);

        let mut not0 = ctx(Level::Chip, "TB", true, true);
        not0.reuse_old_t0 = true;
        assert_eq!(T0Policy::select(&not0), T0Policy::ReuseOld);

        assert!(T0Policy::Inherit.needs_parent());
        assert!(T0Policy::ChipReference.needs_parent());
        assert!(!T0Policy::Fit.needs_parent());
        assert!(!RtPolicy::ReuseOld.needs_parent(Level::Detector));
        assert!(RtPolicy::ReuseOld.needs_parent(Level::Board));
        assert!(!RtPolicy::Fit.needs_parent(Level::Straw));
        assert!(RtPolicy::Inherit.needs_parent(Level::Side));
    }

    #[test]
    fn test_eligibility_from_counts() {
        let params = CalibratorParams::builder()
            .min_t0_stat(10)
            .min_rt_stat(100)
            .build()
            .unwrap();
        let counts = HitCounts {
            ntres: 10,
            nres: 0,
            nrt: 99,
            nhits: 120,
        };
        let c = DecisionContext::new(Level::Layer, "RT".into(), &counts, &params);
        assert!(c.enough_t0);
        assert!(!c.enough_rt);
    }

    #[test]
    fn test_side_predicates() {
        assert!(residual_fit_applies(50, 50, RtPolicy::Inherit, T0Policy::Fit));
        assert!(!residual_fit_applies(49, 50, RtPolicy::Fit, T0Policy::Fit));
        assert!(!residual_fit_applies(500, 50, RtPolicy::Inherit, T0Policy::Inherit));

        let s = CalibrationOptions::from("S");
        assert!(short_straw_applies(Level::Straw, &s, Some(8), 9));
        assert!(!short_straw_applies(Level::Straw, &s, Some(9), 9));
        assert!(!short_straw_applies(Level::Chip, &s, Some(2), 9));
        assert!(!short_straw_applies(Level::Straw, &"T".into(), Some(2), 9));
    }
}
