//! # Calibrator: per-level accumulation and calibration engine
//!
//! A [`Calibrator`] is bound to one hierarchy [`Level`] for its whole life. It owns one
//! [`SubModuleRecord`] per key seen at that level and drives two phases:
//!
//! 1. **Accumulation** – [`Calibrator::add_hit`] creates or updates the record of a key from
//!    a [`HitSample`] or a pre-aggregated [`HistogramBlob`].
//! 2. **Calibration** – [`Calibrator::calibrate`] runs the decision tree of
//!    [`policy`](crate::policy) on one key, delegating fits to a [`CurveFitter`] and falling back
//!    on the parent record, the old constants or raw histogram moments.
//!
//! Storage
//! -----------------
//! Records live in a dense arena indexed by [`RecordId`], with a key → id map next to it.
//! Records are never removed, so ids stay valid for the calibrator lifetime.
//!
//! Ordering
//! -----------------
//! All hits of a level must be added before its keys are calibrated, and a parent key must be
//! calibrated before its children. The calibrator does not enforce the first rule; the second
//! is checked when a child needs parent data ([`DriftCalError::MissingParent`]).
//!
//! ```rust
//! use driftcal::calibrator::Calibrator;
//! use driftcal::fitter::ProfileFitter;
//! use driftcal::hierarchy::Level;
//! use driftcal::hit::HitSample;
//! use driftcal::params::CalibratorParams;
//!
//! let params = CalibratorParams::builder().min_t0_stat(0).min_rt_stat(0).build().unwrap();
//! let mut top = Calibrator::new(Level::Detector, params);
//! for t0 in [10.0, 20.0] {
//!     let hit = HitSample { t0, ..Default::default() };
//!     top.add_hit("ALL", &hit, None, true).unwrap();
//! }
//! let rec = top
//!     .calibrate("ALL", &"T".into(), None, &mut ProfileFitter::default())
//!     .unwrap();
//! assert!(rec.t0flag);
//! assert_eq!(rec.old_t0, 15.0);
//! ```
use std::{collections::HashMap, sync::Arc};

use ahash::RandomState;
use itertools::Itertools;
use log::{debug, warn};

use crate::{
    accumulator::{AddOutcome, EngineStats},
    constants::{Key, RT_NCOEFF},
    driftcal_errors::DriftCalError,
    fitter::{CurveFitter, FitResult, RtConstraints, RtFit, QUALITY_NO_HISTOGRAM},
    hierarchy::Level,
    histogram::{BinAxis, Histogram1D, HistogramBins},
    hit::{HistogramBlob, HitSample},
    options::CalibrationOptions,
    params::CalibratorParams,
    policy::{residual_fit_applies, short_straw_applies, DecisionContext, RtPolicy, T0Policy},
    record::{FitOrigin, FitType, PeakSummary, RtCurve, SubModuleRecord},
    selection::Selection,
};

/// Stable handle of a record inside one calibrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(usize);

impl RecordId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Calibrator {
    level: Level,
    params: CalibratorParams,
    selection: Selection,
    records: Vec<SubModuleRecord>,
    index: HashMap<Key, RecordId, RandomState>,
    stats: EngineStats,
}

impl Calibrator {
    pub fn new(level: Level, params: CalibratorParams) -> Self {
        Calibrator {
            level,
            params,
            selection: Selection::All,
            records: Vec::new(),
            index: HashMap::with_hasher(RandomState::new()),
            stats: EngineStats::default(),
        }
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn params(&self) -> &CalibratorParams {
        &self.params
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Whether the sub-module with this index may compute its own constants.
    pub fn check_selection(&self, index: Option<i32>) -> bool {
        self.selection.check_selection(index)
    }

    /// Whether this level is skipped altogether.
    pub fn skip(&self) -> bool {
        self.selection.skip()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn id_of(&self, key: &str) -> Option<RecordId> {
        self.index.get(key).copied()
    }

    pub fn get(&self, key: &str) -> Option<&SubModuleRecord> {
        self.id_of(key).map(|id| &self.records[id.0])
    }

    pub fn record(&self, id: RecordId) -> Option<&SubModuleRecord> {
        self.records.get(id.0)
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        self.index.keys().map(String::as_str).sorted().collect()
    }

    /// Records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = &SubModuleRecord> {
        self.records.iter()
    }

    pub(crate) fn record_mut(&mut self, key: &str) -> Option<&mut SubModuleRecord> {
        let id = self.id_of(key)?;
        self.records.get_mut(id.0)
    }

    /// Effective option letters for a call, engine modes included, e.g. `RT[nort]`.
    pub fn option_string(&self, options: &CalibrationOptions) -> String {
        let modes = self.params.mode_string();
        if modes.is_empty() {
            options.to_string()
        } else {
            format!("{options}[{modes}]")
        }
    }

    /// Ingest one hit, or one blob standing for several hits, under `key`.
    ///
    /// Arguments
    /// -----------------
    /// * `key`: sub-module key at this calibrator's level.
    /// * `hit`: the hit; with a blob it provides the reconstruction constants, position and
    ///   coordinates of the blob's straw, and its residuals are ignored.
    /// * `blob`: optional pre-aggregated histogram of the straw.
    /// * `make_histograms`: store histogram contents on the record. Only the first hit of a key
    ///   decides; later hits fill the histograms if the record has them.
    ///
    /// Return
    /// ----------
    /// * [`AddOutcome::FirstSeen`] if a record was created, [`AddOutcome::Merged`] otherwise.
    /// * [`DriftCalError::RecordAllocation`] if a new record cannot be allocated.
    pub fn add_hit(
        &mut self,
        key: &str,
        hit: &HitSample,
        blob: Option<&HistogramBlob>,
        make_histograms: bool,
    ) -> Result<AddOutcome, DriftCalError> {
        let layout = self.params.layout;

        if let Some(id) = self.id_of(key) {
            let rec = &mut self.records[id.0];
            let contribution = match blob {
                Some(b) => rec.apply_blob(b, hit.t0),
                None => rec.apply_hit(hit, &layout),
            };
            rec.counts.nhits += contribution.nhits;
            rec.update_running_means(hit, contribution.nhits);
            self.stats.absorb(&contribution);
            return Ok(AddOutcome::Merged);
        }

        let alloc_err = |_| DriftCalError::RecordAllocation {
            key: key.to_string(),
        };
        self.records.try_reserve(1).map_err(alloc_err)?;
        self.index.try_reserve(1).map_err(alloc_err)?;

        let mut rec = SubModuleRecord::seeded(key, self.level, hit);
        if make_histograms {
            rec.histograms = Some(HistogramBins::new(&layout));
        }
        let contribution = match blob {
            Some(b) => rec.apply_blob(b, hit.t0),
            None => rec.apply_hit(hit, &layout),
        };
        rec.counts.nhits = contribution.nhits;

        debug!(
            "{}: new record {key} ({} hits)",
            self.level.abbreviation(),
            contribution.nhits
        );

        let id = RecordId(self.records.len());
        self.records.push(rec);
        self.index.insert(key.to_string(), id);
        self.stats.absorb(&contribution);
        Ok(AddOutcome::FirstSeen)
    }

    /// Produce the final constants of one key.
    ///
    /// The R-t relation is settled first (its t0 enters the t0 formulas), then t0, then the
    /// optional spatial-residual side fit. See [`policy`](crate::policy) for the branch choice.
    ///
    /// Arguments
    /// -----------------
    /// * `key`: key to calibrate.
    /// * `options`: per-call option flags.
    /// * `parent`: the already calibrated record of the parent sub-module, `None` at the top.
    /// * `fitter`: numeric fit delegate.
    ///
    /// Return
    /// ----------
    /// * The calibrated record. With the `N` option the record is returned untouched.
    /// * [`DriftCalError::UnknownKey`] if the key never received a hit.
    /// * [`DriftCalError::AlreadyCalibrated`] on a second calibration of the same key.
    /// * [`DriftCalError::MissingParent`] if a chosen branch needs a calibrated parent and none
    ///   was given. The record is left untouched in that case.
    pub fn calibrate<F: CurveFitter + ?Sized>(
        &mut self,
        key: &str,
        options: &CalibrationOptions,
        parent: Option<&SubModuleRecord>,
        fitter: &mut F,
    ) -> Result<&SubModuleRecord, DriftCalError> {
        let id = self
            .id_of(key)
            .ok_or_else(|| DriftCalError::UnknownKey(key.to_string()))?;

        let Calibrator {
            level,
            params,
            records,
            stats,
            ..
        } = self;
        let rec = &mut records[id.0];

        if options.no_op {
            return Ok(&*rec);
        }
        if rec.calflag {
            return Err(DriftCalError::AlreadyCalibrated(key.to_string()));
        }

        let ctx = DecisionContext::new(*level, *options, &rec.counts, params);
        let rt_policy = RtPolicy::select(&ctx);
        let t0_policy = T0Policy::select(&ctx);

        let parent = parent.filter(|p| p.calflag);
        if parent.is_none() && (rt_policy.needs_parent(*level) || t0_policy.needs_parent()) {
            return Err(DriftCalError::MissingParent {
                key: key.to_string(),
                level: level.index(),
            });
        }

        debug!(
            "{}: {key} rt={rt_policy} t0={t0_policy} (ntres={}, nrt={})",
            level.abbreviation(),
            rec.counts.ntres,
            rec.counts.nrt
        );

        calibrate_rt(rec, rt_policy, parent, RtConstraints::from(options), fitter)?;
        calibrate_t0(rec, t0_policy, parent, options, params, fitter)?;

        if residual_fit_applies(
            rec.counts.nres,
            params.res_fit_min_entries,
            rt_policy,
            t0_policy,
        ) {
            let hist = rec.histograms.as_ref().map(|h| &h.res);
            let fit = peak_fit(hist, fitter);
            let (peak, _) = peak_estimate(&fit, hist, &params.layout.res);
            rec.residual = Some(peak);
        }

        rec.calflag = true;
        stats.record_calibration(rec.t0.t0);
        Ok(&*rec)
    }
}

fn peak_fit<F: CurveFitter + ?Sized>(hist: Option<&Histogram1D>, fitter: &mut F) -> FitResult {
    match hist {
        Some(h) => fitter.fit_peak(h),
        None => FitResult::rejected(QUALITY_NO_HISTOGRAM),
    }
}

/// Turn a peak fit into a summary, falling back on raw moments.
///
/// * rejected fit → raw mean, [`FitType::RawMean`]
/// * mean outside the histogram domain or non-positive width → raw mean, [`FitType::OutOfRange`]
/// * otherwise the fitted values, [`FitType::Gaussian`]
fn peak_estimate(
    fit: &FitResult,
    hist: Option<&Histogram1D>,
    axis: &BinAxis,
) -> (PeakSummary, FitType) {
    let entries = hist.map_or(0.0, Histogram1D::entries);
    let raw_mean = hist.and_then(Histogram1D::mean).unwrap_or(0.0);
    let raw_rms = hist.and_then(Histogram1D::rms).unwrap_or(0.0);
    let raw = PeakSummary {
        mean: raw_mean,
        mean_error: if entries > 0.0 {
            raw_rms / entries.sqrt()
        } else {
            0.0
        },
        width: raw_rms,
        width_error: 0.0,
    };

    if !fit.accepted {
        return (raw, FitType::RawMean);
    }
    match (fit.param(1), fit.param(2)) {
        (Some(mean), Some(sigma)) if axis.contains(mean) && sigma.is_finite() && sigma > 0.0 => (
            PeakSummary {
                mean,
                mean_error: fit.error(1).unwrap_or(0.0),
                width: sigma,
                width_error: fit.error(2).unwrap_or(0.0),
            },
            FitType::Gaussian,
        ),
        _ => (raw, FitType::OutOfRange),
    }
}

fn parent_record<'a>(
    rec: &SubModuleRecord,
    parent: Option<&'a SubModuleRecord>,
) -> Result<&'a SubModuleRecord, DriftCalError> {
    parent.ok_or_else(|| DriftCalError::MissingParent {
        key: rec.key.clone(),
        level: rec.level.index(),
    })
}

fn calibrate_rt<F: CurveFitter + ?Sized>(
    rec: &mut SubModuleRecord,
    policy: RtPolicy,
    parent: Option<&SubModuleRecord>,
    constraints: RtConstraints,
    fitter: &mut F,
) -> Result<(), DriftCalError> {
    match policy {
        RtPolicy::ReuseOld => {
            rec.rt.coeffs = rec.old_rt;
            rec.rt.rtt0 = parent.map_or(0.0, |p| p.rt.rtt0);
            rec.rt.curve = parent.and_then(|p| p.rt.curve.clone());
            rec.rt.origin = Some(FitOrigin::ReusedOld);
            rec.rtflag = true;
        }
        RtPolicy::Fit => {
            let fit = match rec.histograms.as_ref() {
                Some(h) => fitter.fit_rt(&h.rt, constraints),
                None => RtFit {
                    result: FitResult::rejected(QUALITY_NO_HISTOGRAM),
                    points: Vec::new(),
                },
            };
            if fit.result.accepted && fit.result.params.len() >= RT_NCOEFF {
                let mut coeffs = [0.0; RT_NCOEFF];
                coeffs.copy_from_slice(&fit.result.params[..RT_NCOEFF]);
                let curve = RtCurve {
                    coeffs,
                    points: fit.points,
                };
                rec.rt.rtt0 = curve.zero_crossing(0.0).unwrap_or(0.0);
                rec.rt.coeffs = coeffs;
                rec.rt.curve = Some(Arc::new(curve));
                rec.rt.origin = Some(FitOrigin::Fitted);
                rec.rtflag = true;
            } else {
                warn!(
                    "{}: R-t fit rejected (quality {}), keeping old constants",
                    rec.key, fit.result.quality
                );
                rec.rt.coeffs = rec.old_rt;
                rec.rt.rtt0 = 0.0;
                rec.rt.curve = None;
                rec.rt.origin = Some(FitOrigin::ReusedOld);
                rec.rtflag = false;
            }
        }
        RtPolicy::Inherit => {
            let p = parent_record(rec, parent)?;
            rec.rt.coeffs = p.rt.coeffs;
            rec.rt.rtt0 = p.rt.rtt0;
            rec.rt.curve = p.rt.curve.clone();
            rec.rt.origin = Some(FitOrigin::Inherited);
        }
    }
    Ok(())
}

fn calibrate_t0<F: CurveFitter + ?Sized>(
    rec: &mut SubModuleRecord,
    policy: T0Policy,
    parent: Option<&SubModuleRecord>,
    options: &CalibrationOptions,
    params: &CalibratorParams,
    fitter: &mut F,
) -> Result<(), DriftCalError> {
    let rtt0 = rec.rt.rtt0;
    match policy {
        T0Policy::ReuseOld => {
            rec.t0.t0 = rec.old_t0 + rtt0;
            rec.t0.t0err = 0.0;
            rec.t0.fit_type = Some(FitType::ReusedOld);
            rec.t0.origin = Some(FitOrigin::ReusedOld);
            rec.t0flag = true;
        }
        T0Policy::ChipReference => {
            let p = parent_record(rec, parent)?;
            rec.t0.t0 = p.t0.t0 + rec.ref_t0.unwrap_or(0.0) + rtt0;
            rec.t0.t0err = p.t0.t0err;
            rec.t0.fit_type = Some(FitType::ChipReference);
            rec.t0.origin = Some(FitOrigin::ChipReference);
        }
        T0Policy::Fit => {
            let hist = rec.histograms.as_ref().map(|h| &h.tres);
            let fit = peak_fit(hist, fitter);
            let (peak, fit_type) = peak_estimate(&fit, hist, &params.layout.tres);
            match fit_type {
                FitType::RawMean => warn!(
                    "{}: t0 fit rejected (quality {}), using raw mean {:.3}",
                    rec.key, fit.quality, peak.mean
                ),
                FitType::OutOfRange => warn!(
                    "{}: t0 fit out of range, using raw mean {:.3}",
                    rec.key, peak.mean
                ),
                _ => {}
            }
            rec.t0.t0 = (rec.old_t0 + peak.mean + rtt0 + params.t0_shift).max(0.0);
            rec.t0.t0err = peak.mean_error;
            rec.t0.fit_type = Some(fit_type);
            rec.t0.origin = Some(FitOrigin::Fitted);
            rec.time_residual = Some(peak);
            rec.t0flag = true;
        }
        T0Policy::Inherit => {
            let p = parent_record(rec, parent)?;
            rec.t0.t0 = (rec.old_t0 + (p.t0.t0 - p.old_t0)).max(0.0);
            if short_straw_applies(
                rec.level,
                options,
                rec.position.stl,
                params.short_straw_cutoff,
            ) {
                rec.t0.t0 = p.t0.t0 - params.short_straw_shift;
            }
            rec.t0.t0err = p.t0.t0err;
            rec.t0.fit_type = Some(FitType::Inherited);
            rec.t0.origin = Some(FitOrigin::Inherited);
        }
    }
    rec.t0.t0off = parent.map(|p| rec.t0.t0 - p.t0.t0);
    Ok(())
}
