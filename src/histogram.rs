//! # Fixed-binning histograms
//!
//! Each calibration record may carry three histograms:
//!
//! * a 1-D **time-residual** histogram, feeding the t0 fit,
//! * a 1-D **spatial-residual** histogram, feeding the residual side fit,
//! * a 2-D **time×radius** histogram, feeding the R-t fit.
//!
//! Binning
//! -----------------
//! A sample `x` falls in bin `floor((x - min) / width)` of a [`BinAxis`], and is in range iff
//! `0 <= bin < nbins`. In particular `x == max` is out of range, `x == min` lands in bin 0.
//! Non-finite samples are always out of range.
//!
//! The 2-D histogram is stored row-major with the time axis outermost, so its flat index is
//! `time_bin * radius_nbins + radius_bin`. This flat index is also the one used by
//! [`HistogramBlob`](crate::hit::HistogramBlob) (offset by [`BLOB_RT_OFFSET`](crate::constants::BLOB_RT_OFFSET)).
use crate::constants::{
    RESIDUAL_NBINS, RES_MAX, RES_MIN, RT_RADIUS_MAX, RT_RADIUS_MIN, RT_RADIUS_NBINS, RT_TIME_MAX,
    RT_TIME_MIN, RT_TIME_NBINS, TRES_MAX, TRES_MIN,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinAxis {
    pub nbins: usize,
    pub min: f64,
    pub max: f64,
}

impl BinAxis {
    pub const fn new(nbins: usize, min: f64, max: f64) -> Self {
        BinAxis { nbins, min, max }
    }

    pub fn width(&self) -> f64 {
        (self.max - self.min) / self.nbins as f64
    }

    /// Bin holding `x`, or `None` when `x` is outside `[min, max)`.
    #[inline]
    pub fn bin_index(&self, x: f64) -> Option<usize> {
        if !x.is_finite() {
            return None;
        }
        let bin = ((x - self.min) / self.width()).floor();
        if bin < 0.0 || bin >= self.nbins as f64 {
            None
        } else {
            Some(bin as usize)
        }
    }

    pub fn bin_center(&self, bin: usize) -> f64 {
        self.min + (bin as f64 + 0.5) * self.width()
    }

    /// Whether `x` lies within the axis domain, bounds included.
    pub fn contains(&self, x: f64) -> bool {
        x >= self.min && x <= self.max
    }
}

/// Axes of the three per-record histograms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramLayout {
    pub tres: BinAxis,
    pub res: BinAxis,
    pub rt_time: BinAxis,
    pub rt_radius: BinAxis,
}

impl Default for HistogramLayout {
    fn default() -> Self {
        HistogramLayout {
            tres: BinAxis::new(RESIDUAL_NBINS, TRES_MIN, TRES_MAX),
            res: BinAxis::new(RESIDUAL_NBINS, RES_MIN, RES_MAX),
            rt_time: BinAxis::new(RT_TIME_NBINS, RT_TIME_MIN, RT_TIME_MAX),
            rt_radius: BinAxis::new(RT_RADIUS_NBINS, RT_RADIUS_MIN, RT_RADIUS_MAX),
        }
    }
}

impl HistogramLayout {
    /// Flat (time, radius) bin of the R-t histogram.
    #[inline]
    pub fn rt_bin_index(&self, time: f64, radius: f64) -> Option<usize> {
        let it = self.rt_time.bin_index(time)?;
        let ir = self.rt_radius.bin_index(radius)?;
        Some(it * self.rt_radius.nbins + ir)
    }

    pub fn rt_nbins(&self) -> usize {
        self.rt_time.nbins * self.rt_radius.nbins
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram1D {
    axis: BinAxis,
    counts: Vec<f64>,
}

impl Histogram1D {
    pub fn new(axis: BinAxis) -> Self {
        Histogram1D {
            axis,
            counts: vec![0.0; axis.nbins],
        }
    }

    pub fn axis(&self) -> &BinAxis {
        &self.axis
    }

    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Add `weight` to `bin`; out-of-range bins are ignored.
    #[inline]
    pub fn fill_bin(&mut self, bin: usize, weight: f64) {
        if let Some(c) = self.counts.get_mut(bin) {
            *c += weight;
        }
    }

    pub fn fill(&mut self, x: f64, weight: f64) -> Option<usize> {
        let bin = self.axis.bin_index(x)?;
        self.fill_bin(bin, weight);
        Some(bin)
    }

    /// Sum of bin contents.
    pub fn entries(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Content-weighted mean of the bin centers, `None` for an empty histogram.
    pub fn mean(&self) -> Option<f64> {
        let n = self.entries();
        if n <= 0.0 {
            return None;
        }
        let sum: f64 = self
            .counts
            .iter()
            .enumerate()
            .map(|(i, c)| c * self.axis.bin_center(i))
            .sum();
        Some(sum / n)
    }

    /// Content-weighted standard deviation of the bin centers.
    pub fn rms(&self) -> Option<f64> {
        let n = self.entries();
        let mean = self.mean()?;
        let var: f64 = self
            .counts
            .iter()
            .enumerate()
            .map(|(i, c)| c * (self.axis.bin_center(i) - mean).powi(2))
            .sum::<f64>()
            / n;
        Some(var.max(0.0).sqrt())
    }

    /// Add the contents of a histogram with the same binning.
    pub fn merge(&mut self, other: &Histogram1D) {
        debug_assert_eq!(self.axis, other.axis);
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram2D {
    x_axis: BinAxis,
    y_axis: BinAxis,
    counts: Vec<f64>,
}

impl Histogram2D {
    pub fn new(x_axis: BinAxis, y_axis: BinAxis) -> Self {
        Histogram2D {
            x_axis,
            y_axis,
            counts: vec![0.0; x_axis.nbins * y_axis.nbins],
        }
    }

    pub fn x_axis(&self) -> &BinAxis {
        &self.x_axis
    }

    pub fn y_axis(&self) -> &BinAxis {
        &self.y_axis
    }

    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    pub fn flat_index(&self, ix: usize, iy: usize) -> usize {
        ix * self.y_axis.nbins + iy
    }

    pub fn get(&self, ix: usize, iy: usize) -> f64 {
        self.counts
            .get(self.flat_index(ix, iy))
            .copied()
            .unwrap_or(0.0)
    }

    /// Contents of all y bins for one x bin.
    pub fn column(&self, ix: usize) -> &[f64] {
        let start = ix * self.y_axis.nbins;
        &self.counts[start..start + self.y_axis.nbins]
    }

    #[inline]
    pub fn fill_flat(&mut self, flat: usize, weight: f64) {
        if let Some(c) = self.counts.get_mut(flat) {
            *c += weight;
        }
    }

    pub fn fill(&mut self, x: f64, y: f64, weight: f64) -> Option<usize> {
        let ix = self.x_axis.bin_index(x)?;
        let iy = self.y_axis.bin_index(y)?;
        let flat = self.flat_index(ix, iy);
        self.fill_flat(flat, weight);
        Some(flat)
    }

    pub fn entries(&self) -> f64 {
        self.counts.iter().sum()
    }

    pub fn merge(&mut self, other: &Histogram2D) {
        debug_assert_eq!(self.x_axis, other.x_axis);
        debug_assert_eq!(self.y_axis, other.y_axis);
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
    }
}

/// The three histograms of one calibration record.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBins {
    pub tres: Histogram1D,
    pub res: Histogram1D,
    pub rt: Histogram2D,
}

impl HistogramBins {
    pub fn new(layout: &HistogramLayout) -> Self {
        HistogramBins {
            tres: Histogram1D::new(layout.tres),
            res: Histogram1D::new(layout.res),
            rt: Histogram2D::new(layout.rt_time, layout.rt_radius),
        }
    }

    pub fn merge(&mut self, other: &HistogramBins) {
        self.tres.merge(&other.tres);
        self.res.merge(&other.res);
        self.rt.merge(&other.rt);
    }
}
