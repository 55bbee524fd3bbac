//! Mean, variance and skewness from mergeable central moments.
//!
//! Each partition runs Welford's online update, extended with Terriberry's
//! third-moment term. Partials combine with the pairwise formulas of Chan et
//! al. (second moment) and Terriberry (third moment).

use crate::traits::{Aggregator, Mergeable};
use pmstat_common::{PmStatError, Result};
use serde::{Deserialize, Serialize};

/// Sufficient statistics of one partition: count, mean, and the sums of
/// squared (`m2`) and cubed (`m3`) deviations from the mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentPartial {
    pub n: u64,
    pub mean: f64,
    pub m2: f64,
    pub m3: f64,
}

impl MomentPartial {
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Combine two partials into a fresh one, or `None` when the combined
    /// count does not fit in a `u64`.
    pub fn checked_combine(a: &MomentPartial, b: &MomentPartial) -> Option<MomentPartial> {
        if a.n == 0 {
            return Some(*b);
        }
        if b.n == 0 {
            return Some(*a);
        }
        let n_a = a.n as f64;
        let n_b = b.n as f64;
        let n = a.n.checked_add(b.n)?;
        let n_total = n as f64;
        let delta = b.mean - a.mean;
        let delta_n = delta / n_total;
        let mean = (n_a * a.mean + n_b * b.mean) / n_total;
        let m2 = a.m2 + b.m2 + delta * delta_n * n_a * n_b;
        let m3 = a.m3
            + b.m3
            + delta_n * delta * delta * n_a * n_b * (n_a - n_b) / n_total
            + 3.0 * delta_n * (n_a * b.m2 - n_b * a.m2);
        Some(MomentPartial { n, mean, m2, m3 })
    }

    /// `None` when no value was seen.
    pub fn finalize(&self) -> Option<StatisticsReport> {
        StatisticsReport::from_partial(self)
    }
}

impl Mergeable for MomentPartial {
    fn merge(&mut self, other: &Self) -> Result<()> {
        let merged = MomentPartial::checked_combine(self, other).ok_or_else(|| {
            PmStatError::Other(format!("moment count overflows: {} + {}", self.n, other.n))
        })?;
        *self = merged;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MomentAccumulator {
    n: u64,
    mean: f64,
    m2: f64,
    m3: f64,
}

impl MomentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.n
    }
}

impl Aggregator for MomentAccumulator {
    /// `None` when the partition contributed no data.
    type Partial = Option<MomentPartial>;

    fn observe(&mut self, x: f64) {
        let n1 = self.n as f64;
        self.n += 1;
        let n = self.n as f64;
        let delta = x - self.mean;
        let delta_n = delta / n;
        let term1 = delta * delta_n * n1;
        self.mean += delta_n;
        // m3 uses the previous m2
        self.m3 += term1 * delta_n * (n - 2.0) - 3.0 * delta_n * self.m2;
        self.m2 += term1;
    }

    fn finish(self) -> Option<MomentPartial> {
        if self.n == 0 {
            return None;
        }
        Some(MomentPartial {
            n: self.n,
            mean: self.mean,
            m2: self.m2,
            m3: self.m3,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatisticsReport {
    pub n: u64,
    pub mean: f64,
    pub m2: f64,
    pub m3: f64,
    pub population_variance: f64,
    pub population_std_dev: f64,
    /// zero when n <= 1
    pub sample_variance: f64,
    pub sample_std_dev: f64,
    /// NaN when the sample standard deviation is zero
    pub skewness_g1: f64,
    /// population std-dev as a percentage of the mean, zero for a zero mean
    pub coefficient_of_variation: f64,
}

impl StatisticsReport {
    pub fn from_partial(p: &MomentPartial) -> Option<Self> {
        if p.n == 0 {
            return None;
        }
        let n = p.n as f64;
        // rounding can push a tiny m2 below zero
        let m2 = p.m2.max(0.0);
        let population_variance = m2 / n;
        let population_std_dev = population_variance.sqrt();
        let (sample_variance, sample_std_dev) = if p.n > 1 {
            let v = m2 / (n - 1.0);
            (v, v.sqrt())
        } else {
            (0.0, 0.0)
        };
        let skewness_g1 = if sample_std_dev > 0.0 {
            (p.m3 / n) / sample_std_dev.powi(3)
        } else {
            f64::NAN
        };
        let coefficient_of_variation = if p.mean != 0.0 {
            population_std_dev / p.mean * 100.0
        } else {
            0.0
        };
        Some(Self {
            n: p.n,
            mean: p.mean,
            m2: p.m2,
            m3: p.m3,
            population_variance,
            population_std_dev,
            sample_variance,
            sample_std_dev,
            skewness_g1,
            coefficient_of_variation,
        })
    }
}
