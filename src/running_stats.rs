//! Streaming mean estimators.
//!
//! Records keep running means of the "old" constants and of the straw coordinates seen so far,
//! updated once per hit without storing the samples.
//!
//! The update rule is
//!
//! ```text
//! mean_n = mean_{n-1} · (n-1)/n + x/n
//! ```
//!
//! where `n` is the sample count **after** the new sample is included.

/// One step of the running mean, `n` being the post-increment sample count.
#[inline]
pub fn update_mean(n: u64, old_mean: f64, new_value: f64) -> f64 {
    if n == 0 {
        return old_mean;
    }
    let n = n as f64;
    old_mean * (n - 1.0) / n + new_value / n
}

/// Running mean where the new value stands for `added` samples at once.
///
/// With `added == 1` this is exactly [`update_mean`].
#[inline]
pub fn update_mean_weighted(n: u64, added: u64, old_mean: f64, new_value: f64) -> f64 {
    if n == 0 || added == 0 {
        return old_mean;
    }
    let (nf, af) = (n as f64, added as f64);
    old_mean * (nf - af) / nf + new_value * af / nf
}

/// A running mean together with its sample count.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AccumulativeMean {
    count: u64,
    mean: f64,
}

impl AccumulativeMean {
    /// Start from a single sample.
    pub fn seeded(value: f64) -> Self {
        AccumulativeMean {
            count: 1,
            mean: value,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.push_many(value, 1);
    }

    pub fn push_many(&mut self, value: f64, added: u64) {
        self.count += added;
        self.mean = update_mean_weighted(self.count, added, self.mean, value);
    }

    /// Replace the current mean, keeping the sample count.
    pub fn overwrite(&mut self, value: f64) {
        self.mean = value;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// The mean, `None` before any sample.
    pub fn value(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// The mean, `0.0` before any sample.
    pub fn get(&self) -> f64 {
        self.mean
    }
}
