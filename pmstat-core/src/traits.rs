//! Seams shared by every job: per-partition aggregation and the associative merge.

use crate::value::{admit, admit_value, SkipReason};
use pmstat_common::{PmStatError, Result};
use rayon::prelude::*;

/// Single-pass consumer of one partition's values.
pub trait Aggregator {
    /// Record emitted at end of partition.
    type Partial;

    /// Fold an already admitted value into the accumulator.
    fn observe(&mut self, x: f64);

    /// Consume the accumulator and emit its partial.
    fn finish(self) -> Self::Partial;

    /// Apply the domain rule, then observe.
    fn add(&mut self, x: f64) -> std::result::Result<(), SkipReason> {
        let x = admit_value(x)?;
        self.observe(x);
        Ok(())
    }

    /// Parse a raw field, apply the domain rule, then observe.
    fn add_raw(&mut self, raw: Option<&str>) -> std::result::Result<(), SkipReason> {
        let x = admit(raw)?;
        self.observe(x);
        Ok(())
    }

    /// Feed every value, silently dropping the ones that fail admission.
    fn extend_values<I: IntoIterator<Item = f64>>(&mut self, values: I)
    where
        Self: Sized,
    {
        for x in values {
            let _ = self.add(x);
        }
    }
}

/// Partial summary combinable with another of the same kind.
///
/// Implementations must be associative and commutative (up to floating-point
/// rounding), so the shape of the merge tree never changes the answer.
pub trait Mergeable: Sized {
    fn merge(&mut self, other: &Self) -> Result<()>;
}

/// Strict left-to-right fold. `Ok(None)` means no partial was supplied.
pub fn merge_all<T, I>(partials: I) -> Result<Option<T>>
where
    T: Mergeable,
    I: IntoIterator<Item = T>,
{
    let mut iter = partials.into_iter();
    let Some(mut acc) = iter.next() else {
        return Ok(None);
    };
    for p in iter {
        acc.merge(&p)?;
    }
    Ok(Some(acc))
}

/// Pairwise merge tree executed on the rayon pool.
pub fn merge_tree<T>(partials: Vec<T>) -> Result<Option<T>>
where
    T: Mergeable + Send,
{
    partials
        .into_par_iter()
        .map(Ok::<T, PmStatError>)
        .try_reduce_with(|mut a, b| {
            a.merge(&b)?;
            Ok(a)
        })
        .transpose()
}
