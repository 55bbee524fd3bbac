//! Fixed-resolution histogram over a clamped domain, and the quantile
//! estimator that interpolates inside the bucket where the target rank falls.

use crate::traits::{Aggregator, Mergeable};
use pmstat_common::{HistogramConfig, PmStatError, Result};
use serde::{Deserialize, Serialize};

/// Clamp, then map linearly onto `0..num_buckets`.
pub fn bucket_index(cfg: &HistogramConfig, value: f64) -> usize {
    let last = cfg.num_buckets.saturating_sub(1);
    if value <= cfg.min_value {
        0
    } else if value >= cfg.max_value {
        last
    } else {
        let normalized = (value - cfg.min_value) / (cfg.max_value - cfg.min_value);
        ((normalized * last as f64).floor() as usize).min(last)
    }
}

/// Value range `[low, high)` reported for a bucket: the domain split into
/// `num_buckets` equal slices.
pub fn bucket_range(cfg: &HistogramConfig, index: usize) -> (f64, f64) {
    let width = (cfg.max_value - cfg.min_value) / cfg.num_buckets as f64;
    let low = cfg.min_value + index as f64 * width;
    (low, low + width)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramPartial {
    pub config: HistogramConfig,
    counts: Vec<u64>,
    total: u64,
}

impl HistogramPartial {
    /// The zero histogram, identity of the merge.
    pub fn new(config: HistogramConfig) -> Self {
        Self {
            config,
            counts: vec![0; config.num_buckets],
            total: 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn count(&self, index: usize) -> u64 {
        self.counts.get(index).copied().unwrap_or(0)
    }

    /// Add `count` observations to bucket `index`. Returns false, leaving the
    /// histogram untouched, when the index lies outside this histogram's
    /// resolution or the total would overflow.
    pub fn add_bucket(&mut self, index: usize, count: u64) -> bool {
        let Some(total) = self.total.checked_add(count) else {
            return false;
        };
        match self.counts.get_mut(index) {
            Some(c) => {
                // a bucket never exceeds the total
                *c += count;
                self.total = total;
                true
            }
            None => false,
        }
    }

    pub fn non_empty(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c > 0)
            .map(|(i, &c)| (i, c))
    }

    /// Estimate the value below which a fraction `p` of observations fall.
    ///
    /// `Ok(None)` for an empty histogram.
    pub fn quantile(&self, p: f64) -> Result<Option<QuantileEstimate>> {
        if !(p > 0.0 && p < 1.0) {
            return Err(PmStatError::InvalidPercentile(p));
        }
        if self.total == 0 {
            return Ok(None);
        }
        let position = self.total as f64 * p;
        let mut cumulative = 0u64;
        for (index, &count) in self.counts.iter().enumerate() {
            let before = cumulative;
            cumulative += count;
            if cumulative as f64 >= position {
                let (low, high) = bucket_range(&self.config, index);
                let position_in_bucket = position - before as f64;
                let estimated_value = if count == 0 {
                    (low + high) / 2.0
                } else {
                    low + position_in_bucket / count as f64 * (high - low)
                };
                return Ok(Some(QuantileEstimate {
                    target_percentile: p,
                    bucket_index: index,
                    bucket_range_low: low,
                    bucket_range_high: high,
                    bucket_count: count,
                    cumulative_count: cumulative,
                    position,
                    position_in_bucket,
                    estimated_value,
                }));
            }
        }
        Ok(None)
    }

    /// Several percentiles from the same merged counts, in input order.
    pub fn quantiles(&self, ps: &[f64]) -> Result<Vec<QuantileEstimate>> {
        let mut out = Vec::with_capacity(ps.len());
        for &p in ps {
            if let Some(q) = self.quantile(p)? {
                out.push(q);
            }
        }
        Ok(out)
    }

    pub fn summary(&self) -> Option<HistogramSummary> {
        let mut used = self.non_empty();
        let (first, first_count) = used.next()?;
        let mut s = HistogramSummary {
            buckets_used: 1,
            lowest_bucket: first,
            highest_bucket: first,
            densest_bucket: first,
            densest_count: first_count,
        };
        for (i, c) in used {
            s.buckets_used += 1;
            s.highest_bucket = i;
            if c > s.densest_count {
                s.densest_bucket = i;
                s.densest_count = c;
            }
        }
        Some(s)
    }
}

impl Mergeable for HistogramPartial {
    fn merge(&mut self, other: &Self) -> Result<()> {
        if self.config != other.config {
            return Err(PmStatError::IncompatibleHistograms {
                expected: format!("{:?}", self.config),
                found: format!("{:?}", other.config),
            });
        }
        let total = self.total.checked_add(other.total).ok_or_else(|| {
            PmStatError::Other(format!(
                "histogram total overflows: {} + {}",
                self.total, other.total
            ))
        })?;
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        self.total = total;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileEstimate {
    pub target_percentile: f64,
    pub bucket_index: usize,
    pub bucket_range_low: f64,
    pub bucket_range_high: f64,
    pub bucket_count: u64,
    /// observations up to and including the target bucket
    pub cumulative_count: u64,
    /// target rank, `total * p`
    pub position: f64,
    pub position_in_bucket: f64,
    pub estimated_value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub buckets_used: usize,
    pub lowest_bucket: usize,
    pub highest_bucket: usize,
    pub densest_bucket: usize,
    pub densest_count: u64,
}

#[derive(Debug, Clone)]
pub struct HistogramAccumulator {
    partial: HistogramPartial,
}

impl HistogramAccumulator {
    pub fn new(config: HistogramConfig) -> Self {
        Self {
            partial: HistogramPartial::new(config),
        }
    }

    /// Bucket the next admitted value would land in.
    pub fn index_of(&self, x: f64) -> usize {
        bucket_index(&self.partial.config, x)
    }
}

impl Aggregator for HistogramAccumulator {
    /// Always emitted, the zero histogram included.
    type Partial = HistogramPartial;

    fn observe(&mut self, x: f64) {
        let index = self.index_of(x);
        self.partial.add_bucket(index, 1);
    }

    fn finish(self) -> HistogramPartial {
        self.partial
    }
}
