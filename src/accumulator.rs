//! # Hit accumulation
//!
//! Applying hits and histogram blobs to a [`SubModuleRecord`], and the per-engine hit counters.
//!
//! A single hit
//! -----------------
//! * the time residual, spatial residual and (drift time, radius) pair are binned independently,
//! * every in-range sample increments its counter (`ntres`, `nres`, `nrt`) and, when histograms
//!   are stored, its histogram: the time-residual bin by the hit weight, the others by one,
//! * `sum_t0` grows by the hit t0.
//!
//! Histograms are stored only if the first hit of a key asked for them; later hits fill the
//! histograms that exist and ignore their own flag, so counters and histograms never disagree.
//!
//! A blob
//! -----------------
//! Each `(bin, count)` pair adds `count` to its bin and counter, and `t0 · count` to `sum_t0`
//! (`count` samples towards [`SubModuleRecord::mean_t0`]).
//! The blob stands for [`HistogramBlob::hit_count`] hits.
//!
//! Out-of-range samples are dropped from their histogram but the hit still counts in `nhits`.
use std::fmt;

use crate::{
    hit::{BlobTarget, HistogramBlob, HitSample},
    histogram::HistogramLayout,
    record::SubModuleRecord,
    running_stats::{update_mean_weighted, AccumulativeMean},
};

/// Whether a hit created a record or was merged into an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    FirstSeen,
    Merged,
}

/// Counters of one engine, for reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineStats {
    pub nhits: u64,
    pub ntreshits: u64,
    pub nreshits: u64,
    pub nrthits: u64,
    pub ncalibrated: u64,
    /// Mean final t0 over calibrated keys
    pub mean_t0: AccumulativeMean,
}

impl EngineStats {
    pub(crate) fn absorb(&mut self, c: &Contribution) {
        self.nhits += c.nhits;
        self.ntreshits += c.ntres;
        self.nreshits += c.nres;
        self.nrthits += c.nrt;
    }

    pub(crate) fn record_calibration(&mut self, t0: f64) {
        self.ncalibrated += 1;
        self.mean_t0.push(t0);
    }
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} tres={} res={} rt={} calibrated={}",
            self.nhits, self.ntreshits, self.nreshits, self.nrthits, self.ncalibrated
        )?;
        if let Some(t0) = self.mean_t0.value() {
            write!(f, " mean_t0={t0:.3}")?;
        }
        Ok(())
    }
}

/// Samples contributed by one hit or blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Contribution {
    pub ntres: u64,
    pub nres: u64,
    pub nrt: u64,
    pub nhits: u64,
}

impl SubModuleRecord {
    /// Bin one hit into the counters and, if enabled, the histograms.
    pub(crate) fn apply_hit(&mut self, hit: &HitSample, layout: &HistogramLayout) -> Contribution {
        let tres_bin = layout.tres.bin_index(hit.tres);
        let res_bin = layout.res.bin_index(hit.res);
        let rt_bin = layout.rt_bin_index(hit.time, hit.radius);

        if let Some(h) = self.histograms.as_mut() {
            if let Some(bin) = tres_bin {
                h.tres.fill_bin(bin, hit.weight);
            }
            if let Some(bin) = res_bin {
                h.res.fill_bin(bin, 1.0);
            }
            if let Some(flat) = rt_bin {
                h.rt.fill_flat(flat, 1.0);
            }
        }

        let contribution = Contribution {
            ntres: tres_bin.is_some() as u64,
            nres: res_bin.is_some() as u64,
            nrt: rt_bin.is_some() as u64,
            nhits: 1,
        };
        self.counts.ntres += contribution.ntres;
        self.counts.nres += contribution.nres;
        self.counts.nrt += contribution.nrt;
        self.sum_t0 += hit.t0;
        self.t0_samples += 1;
        contribution
    }

    /// Add a pre-aggregated blob, `t0` being the reconstruction t0 of its straw.
    pub(crate) fn apply_blob(&mut self, blob: &HistogramBlob, t0: f64) -> Contribution {
        let mut contribution = Contribution {
            nhits: blob.hit_count(),
            ..Default::default()
        };
        let mut hists = self.histograms.as_mut();
        let mut sum_t0 = 0.0;
        let mut samples = 0;

        for entry in blob.entries() {
            let count = entry.count;
            let weight = count as f64;
            match entry.target {
                BlobTarget::TimeResidual(bin) => {
                    if let Some(h) = hists.as_deref_mut() {
                        h.tres.fill_bin(bin, weight);
                    }
                    contribution.ntres += count;
                }
                BlobTarget::Residual(bin) => {
                    if let Some(h) = hists.as_deref_mut() {
                        h.res.fill_bin(bin, weight);
                    }
                    contribution.nres += count;
                }
                BlobTarget::Rt(flat) => {
                    if let Some(h) = hists.as_deref_mut() {
                        h.rt.fill_flat(flat, weight);
                    }
                    contribution.nrt += count;
                }
            }
            sum_t0 += t0 * weight;
            samples += count;
        }

        self.counts.ntres += contribution.ntres;
        self.counts.nres += contribution.nres;
        self.counts.nrt += contribution.nrt;
        self.sum_t0 += sum_t0;
        self.t0_samples += samples;
        contribution
    }

    /// Fold the hit's reconstruction constants and coordinates into the running means.
    ///
    /// `nhits` must already include the `added` new hits.
    pub(crate) fn update_running_means(&mut self, hit: &HitSample, added: u64) {
        let n = self.counts.nhits;
        self.old_t0 = update_mean_weighted(n, added, self.old_t0, hit.t0);
        for (mean, value) in self.old_rt.iter_mut().zip(hit.rt_coeffs) {
            *mean = update_mean_weighted(n, added, *mean, value);
        }
        for (mean, value) in self.coords.iter_mut().zip(hit.coords) {
            *mean = update_mean_weighted(n, added, *mean, value);
        }
    }
}
