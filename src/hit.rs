//! # Hit samples and pre-aggregated histogram blobs
//!
//! A [`HitSample`] is one measured straw hit as seen by the calibration: where it is, its
//! timing and spatial residuals, its drift time and radius, and the constants that were used
//! when it was reconstructed.
//!
//! A [`HistogramBlob`] is a sparse, pre-aggregated set of `(bin, count)` pairs for one straw,
//! spanning the three histograms in a single flat index space:
//!
//! ```text
//! [0, 100)            time-residual bins
//! [100, 200)          spatial-residual bins
//! [200, 200 + nt·nr)  time×radius bins (flat index, time outermost)
//! ```
//!
//! Its serialized form is a flat integer list `[npairs, bin₀, count₀, bin₁, count₁, …]`,
//! decoded with [`HistogramBlob::decode`] and produced with [`HistogramBlob::encode`].
use std::collections::BTreeMap;

use crate::{
    constants::{
        Millimeter, Nanosecond, BLOB_RES_OFFSET, BLOB_RT_OFFSET, BLOB_TRES_OFFSET, RT_NCOEFF,
    },
    driftcal_errors::DriftCalError,
    hierarchy::StrawIndices,
    histogram::HistogramLayout,
};

/// One measured hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitSample {
    pub indices: StrawIndices,
    /// Time residual (ns)
    pub tres: Nanosecond,
    /// Spatial residual (mm)
    pub res: Millimeter,
    /// Drift time (ns)
    pub time: Nanosecond,
    /// Drift radius (mm)
    pub radius: Millimeter,
    /// t0 used at reconstruction time (ns)
    pub t0: Nanosecond,
    /// Chip reference t0 offset, only meaningful at chip level (ns)
    pub ref_t0: Nanosecond,
    /// R-t polynomial coefficients used at reconstruction time
    pub rt_coeffs: [f64; RT_NCOEFF],
    pub weight: f64,
    /// Straw coordinates (x, y, z)
    pub coords: [f64; 3],
}

impl Default for HitSample {
    fn default() -> Self {
        HitSample {
            indices: StrawIndices::default(),
            tres: 0.0,
            res: 0.0,
            time: 0.0,
            radius: 0.0,
            t0: 0.0,
            ref_t0: 0.0,
            rt_coeffs: [0.0; RT_NCOEFF],
            weight: 1.0,
            coords: [0.0; 3],
        }
    }
}

/// Histogram addressed by a blob entry, with the bin inside that histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlobTarget {
    TimeResidual(usize),
    Residual(usize),
    /// Flat time×radius bin
    Rt(usize),
}

impl BlobTarget {
    fn from_flat(flat: usize, layout: &HistogramLayout) -> Option<Self> {
        if flat < BLOB_RES_OFFSET {
            Some(BlobTarget::TimeResidual(flat - BLOB_TRES_OFFSET))
        } else if flat < BLOB_RT_OFFSET {
            Some(BlobTarget::Residual(flat - BLOB_RES_OFFSET))
        } else if flat - BLOB_RT_OFFSET < layout.rt_nbins() {
            Some(BlobTarget::Rt(flat - BLOB_RT_OFFSET))
        } else {
            None
        }
    }

    fn flat(self) -> usize {
        match self {
            BlobTarget::TimeResidual(bin) => BLOB_TRES_OFFSET + bin,
            BlobTarget::Residual(bin) => BLOB_RES_OFFSET + bin,
            BlobTarget::Rt(bin) => BLOB_RT_OFFSET + bin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobEntry {
    pub target: BlobTarget,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HistogramBlob {
    entries: Vec<BlobEntry>,
}

impl HistogramBlob {
    pub fn new(entries: Vec<BlobEntry>) -> Self {
        HistogramBlob { entries }
    }

    /// Decode the flat `[npairs, bin, count, …]` form.
    ///
    /// Arguments
    /// -----------------
    /// * `raw`: the serialized blob; trailing values beyond the announced pairs are ignored.
    /// * `layout`: histogram layout bounding the time×radius part of the index space.
    ///
    /// Return
    /// ----------
    /// * The decoded blob, or [`DriftCalError::MalformedHistogramBlob`] if the header is negative,
    ///   the list is shorter than announced, or a bin/count is negative or out of the index space.
    pub fn decode(raw: &[i32], layout: &HistogramLayout) -> Result<Self, DriftCalError> {
        let (&npairs, body) = raw
            .split_first()
            .ok_or_else(|| DriftCalError::MalformedHistogramBlob("empty blob".into()))?;
        let npairs = usize::try_from(npairs).map_err(|_| {
            DriftCalError::MalformedHistogramBlob(format!("negative pair count {npairs}"))
        })?;
        if body.len() < 2 * npairs {
            return Err(DriftCalError::MalformedHistogramBlob(format!(
                "{npairs} pairs announced but only {} values present",
                body.len()
            )));
        }

        let entries = body[..2 * npairs]
            .chunks_exact(2)
            .map(|pair| {
                let (bin, count) = (pair[0], pair[1]);
                let target = usize::try_from(bin)
                    .ok()
                    .and_then(|flat| BlobTarget::from_flat(flat, layout))
                    .ok_or_else(|| {
                        DriftCalError::MalformedHistogramBlob(format!("bin {bin} out of range"))
                    })?;
                let count = u64::try_from(count).map_err(|_| {
                    DriftCalError::MalformedHistogramBlob(format!("negative count {count}"))
                })?;
                Ok(BlobEntry { target, count })
            })
            .collect::<Result<Vec<_>, DriftCalError>>()?;

        Ok(HistogramBlob { entries })
    }

    /// Serialize to the flat `[npairs, bin, count, …]` form.
    ///
    /// Fails with [`DriftCalError::MalformedHistogramBlob`] if a value does not fit the `i32`
    /// wire format.
    pub fn encode(&self) -> Result<Vec<i32>, DriftCalError> {
        let to_i32 = |v: u64, what: &str| {
            i32::try_from(v).map_err(|_| {
                DriftCalError::MalformedHistogramBlob(format!("{what} {v} does not fit in i32"))
            })
        };
        let mut out = Vec::with_capacity(1 + 2 * self.entries.len());
        out.push(to_i32(self.entries.len() as u64, "pair count")?);
        for e in &self.entries {
            out.push(to_i32(e.target.flat() as u64, "bin")?);
            out.push(to_i32(e.count, "count")?);
        }
        Ok(out)
    }

    /// Aggregate hits of one straw into a blob.
    ///
    /// Every in-range sample contributes one count to its bin; hit weights are not kept.
    pub fn from_hits<'a, I>(hits: I, layout: &HistogramLayout) -> Self
    where
        I: IntoIterator<Item = &'a HitSample>,
    {
        let mut bins: BTreeMap<BlobTarget, u64> = BTreeMap::new();
        for hit in hits {
            let targets = [
                layout.tres.bin_index(hit.tres).map(BlobTarget::TimeResidual),
                layout.res.bin_index(hit.res).map(BlobTarget::Residual),
                layout.rt_bin_index(hit.time, hit.radius).map(BlobTarget::Rt),
            ];
            for target in targets.into_iter().flatten() {
                *bins.entry(target).or_default() += 1;
            }
        }
        HistogramBlob {
            entries: bins
                .into_iter()
                .map(|(target, count)| BlobEntry { target, count })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[BlobEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn total(&self, pick: impl Fn(BlobTarget) -> bool) -> u64 {
        self.entries
            .iter()
            .filter(|e| pick(e.target))
            .map(|e| e.count)
            .sum()
    }

    pub fn tres_count(&self) -> u64 {
        self.total(|t| matches!(t, BlobTarget::TimeResidual(_)))
    }

    pub fn res_count(&self) -> u64 {
        self.total(|t| matches!(t, BlobTarget::Residual(_)))
    }

    pub fn rt_count(&self) -> u64 {
        self.total(|t| matches!(t, BlobTarget::Rt(_)))
    }

    /// Number of hits the blob stands for: the largest of the three per-histogram totals,
    /// at least one.
    pub fn hit_count(&self) -> u64 {
        self.tres_count()
            .max(self.res_count())
            .max(self.rt_count())
            .max(1)
    }
}

#[cfg(test)]
mod hit_test {
    use super::*;

    #[test]
    fn test_decode_blob() {
        let layout = HistogramLayout::default();
        let blob = HistogramBlob::decode(&[3, 50, 2, 149, 1, 725, 4, 99], &layout).unwrap();
        assert_eq!(
            blob.entries(),
            &[
                BlobEntry {
                    target: BlobTarget::TimeResidual(50),
                    count: 2
                },
                BlobEntry {
                    target: BlobTarget::Residual(49),
                    count: 1
                },
                BlobEntry {
                    target: BlobTarget::Rt(525),
                    count: 4
                },
            ]
        );
        assert_eq!(blob.tres_count(), 2);
        assert_eq!(blob.res_count(), 1);
        assert_eq!(blob.rt_count(), 4);
        assert_eq!(blob.hit_count(), 4);
        assert_eq!(blob.encode().unwrap(), vec![3, 50, 2, 149, 1, 725, 4]);
    }

    #[test]
    fn test_decode_malformed_blob() {
        let layout = HistogramLayout::default();
        assert!(HistogramBlob::decode(&[], &layout).is_err());
        assert!(HistogramBlob::decode(&[-1], &layout).is_err());
        assert!(HistogramBlob::decode(&[2, 10, 1], &layout).is_err());
        assert!(HistogramBlob::decode(&[1, 10, -1], &layout).is_err());
        assert!(HistogramBlob::decode(&[1, 200 + 5000, 1], &layout).is_err());
        assert_eq!(
            HistogramBlob::decode(&[0], &layout).unwrap(),
            HistogramBlob::default()
        );
    }

    #[test]
    fn test_blob_from_hits() {
        let layout = HistogramLayout::default();
        let hit = HitSample {
            tres: 0.1,
            res: 5.0, // out of range
            time: 0.0,
            radius: 1.01,
            ..Default::default()
        };
        let blob = HistogramBlob::from_hits([&hit, &hit], &layout);
        assert_eq!(blob.encode().unwrap(), vec![2, 50, 2, 725, 2]);
        assert_eq!(blob.hit_count(), 2);
    }

    #[test]
    fn test_encode_rejects_counts_beyond_i32() {
        let blob = HistogramBlob::new(vec![BlobEntry {
            target: BlobTarget::TimeResidual(3),
            count: i32::MAX as u64 + 1,
        }]);
        assert!(matches!(
            blob.encode(),
            Err(DriftCalError::MalformedHistogramBlob(_))
        ));

        let max = HistogramBlob::new(vec![BlobEntry {
            target: BlobTarget::TimeResidual(3),
            count: i32::MAX as u64,
        }]);
        assert_eq!(max.encode().unwrap(), vec![1, 3, i32::MAX]);
    }
}
