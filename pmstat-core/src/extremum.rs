use crate::traits::{Aggregator, Mergeable};
use pmstat_common::Result;
use serde::{Deserialize, Serialize};

/// Min/max monoid. Both sides are `None` until a value is seen, which makes
/// the default value the merge identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtremumPartial {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ExtremumPartial {
    pub fn of(x: f64) -> Self {
        Self {
            min: Some(x),
            max: Some(x),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn offer_min(&mut self, x: f64) {
        self.min = Some(self.min.map_or(x, |m| m.min(x)));
    }

    pub fn offer_max(&mut self, x: f64) {
        self.max = Some(self.max.map_or(x, |m| m.max(x)));
    }

    /// Both bounds, once at least one value has been seen on each side.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        Some((self.min?, self.max?))
    }
}

impl Mergeable for ExtremumPartial {
    fn merge(&mut self, other: &Self) -> Result<()> {
        if let Some(m) = other.min {
            self.offer_min(m);
        }
        if let Some(m) = other.max {
            self.offer_max(m);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtremumAccumulator {
    state: ExtremumPartial,
}

impl ExtremumAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aggregator for ExtremumAccumulator {
    type Partial = ExtremumPartial;

    fn observe(&mut self, x: f64) {
        self.state.offer_min(x);
        self.state.offer_max(x);
    }

    fn finish(self) -> ExtremumPartial {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::merge_all;

    #[test]
    fn negative_input_excluded() {
        let mut acc = ExtremumAccumulator::new();
        for raw in ["3.5", "-1.0", "7.2", "0.1"] {
            let _ = acc.add_raw(Some(raw));
        }
        assert_eq!(acc.finish().bounds(), Some((0.1, 7.2)));
    }

    #[test]
    fn empty_is_absent() {
        let p = ExtremumAccumulator::new().finish();
        assert!(p.is_empty());
        assert_eq!(p.bounds(), None);
    }

    #[test]
    fn absent_is_identity() {
        let mut a = ExtremumPartial::default();
        a.merge(&ExtremumPartial::of(4.0)).unwrap();
        a.merge(&ExtremumPartial::default()).unwrap();
        assert_eq!(a, ExtremumPartial::of(4.0));
    }

    #[test]
    fn fold_over_partitions() {
        let parts = vec![
            ExtremumPartial::of(5.0),
            ExtremumPartial::default(),
            ExtremumPartial { min: Some(2.0), max: Some(9.0) },
            ExtremumPartial::of(0.0),
        ];
        let m = merge_all(parts).unwrap().unwrap();
        assert_eq!(m.bounds(), Some((0.0, 9.0)));
    }

    #[test]
    fn one_sided_records() {
        let mut p = ExtremumPartial::default();
        p.offer_min(3.0);
        assert_eq!(p.bounds(), None);
        p.offer_max(8.0);
        assert_eq!(p.bounds(), Some((3.0, 8.0)));
    }
}
