use pmstat_common::HistogramConfig;
use pmstat_core::{
    merge_all, merge_tree, Aggregator, ExtremumAccumulator, ExtremumPartial, HistogramAccumulator,
    HistogramPartial, Mergeable, MomentAccumulator, MomentPartial, Normalizer,
};
use proptest::prelude::*;

fn values(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(0.0_f64..500.0, 0..=max_len)
}

/// Values split into partitions at arbitrary cut points.
fn partitions() -> impl Strategy<Value = Vec<Vec<f64>>> {
    proptest::collection::vec(values(30), 1..8)
}

fn moments_of(xs: &[f64]) -> Option<MomentPartial> {
    let mut acc = MomentAccumulator::new();
    acc.extend_values(xs.iter().copied());
    acc.finish()
}

fn extremum_of(xs: &[f64]) -> ExtremumPartial {
    let mut acc = ExtremumAccumulator::new();
    acc.extend_values(xs.iter().copied());
    acc.finish()
}

fn histogram_of(cfg: HistogramConfig, xs: &[f64]) -> HistogramPartial {
    let mut acc = HistogramAccumulator::new(cfg);
    acc.extend_values(xs.iter().copied());
    acc.finish()
}

fn close(a: f64, b: f64, scale: f64) -> bool {
    (a - b).abs() <= 1e-9 * scale.max(1.0)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn moments_independent_of_partitioning(parts in partitions()) {
        let flat: Vec<f64> = parts.iter().flatten().copied().collect();
        let whole = moments_of(&flat);
        let partials: Vec<MomentPartial> = parts.iter().filter_map(|p| moments_of(p)).collect();
        let folded = merge_all(partials.clone()).unwrap();
        let mut reversed = partials.clone();
        reversed.reverse();
        let tree = merge_tree(reversed).unwrap();
        match (whole, folded, tree) {
            (None, None, None) => {}
            (Some(w), Some(f), Some(t)) => {
                prop_assert_eq!(w.n, f.n);
                prop_assert_eq!(w.n, t.n);
                prop_assert!(close(w.mean, f.mean, w.mean.abs()));
                prop_assert!(close(w.mean, t.mean, w.mean.abs()));
                prop_assert!(close(w.m2, f.m2, w.m2.abs() * 10.0));
                prop_assert!(close(w.m2, t.m2, w.m2.abs() * 10.0));
                let m3_scale: f64 = flat.iter().map(|x| (x - w.mean).abs().powi(3)).sum();
                prop_assert!(close(w.m3, f.m3, m3_scale * 10.0));
                prop_assert!(close(w.m3, t.m3, m3_scale * 10.0));
            }
            other => {
                prop_assert!(false, "partials disagree on emptiness: {:?}", other);
            }
        }
    }

    #[test]
    fn extremum_independent_of_partitioning(parts in partitions()) {
        let flat: Vec<f64> = parts.iter().flatten().copied().collect();
        let whole = extremum_of(&flat);
        let partials: Vec<ExtremumPartial> = parts.iter().map(|p| extremum_of(p)).collect();
        let merged = merge_tree(partials).unwrap().unwrap_or_default();
        prop_assert_eq!(whole, merged);
    }

    #[test]
    fn histogram_merge_is_exact(parts in partitions(), buckets in 1_usize..200) {
        let cfg = HistogramConfig::new(0.0, 500.0, buckets).unwrap();
        let flat: Vec<f64> = parts.iter().flatten().copied().collect();
        let whole = histogram_of(cfg, &flat);
        let partials: Vec<HistogramPartial> = parts.iter().map(|p| histogram_of(cfg, p)).collect();
        let folded = merge_all(partials.clone()).unwrap().unwrap_or_else(|| HistogramPartial::new(cfg));
        let tree = merge_tree(partials).unwrap().unwrap_or_else(|| HistogramPartial::new(cfg));
        prop_assert_eq!(&whole, &folded);
        prop_assert_eq!(&whole, &tree);
        prop_assert_eq!(whole.total(), whole.counts().iter().sum::<u64>());
    }

    #[test]
    fn empty_histogram_is_identity(xs in values(50)) {
        let cfg = HistogramConfig::default();
        let h = histogram_of(cfg, &xs);
        let mut left = HistogramPartial::new(cfg);
        left.merge(&h).unwrap();
        let mut right = h.clone();
        right.merge(&HistogramPartial::new(cfg)).unwrap();
        prop_assert_eq!(&left, &h);
        prop_assert_eq!(&right, &h);
    }

    #[test]
    fn quantiles_are_monotone(xs in proptest::collection::vec(0.0_f64..500.0, 1..200), p in 0.01_f64..0.98, dp in 0.0_f64..0.01) {
        let h = histogram_of(HistogramConfig::default(), &xs);
        let lo = h.quantile(p).unwrap().unwrap();
        let hi = h.quantile(p + dp).unwrap().unwrap();
        prop_assert!(lo.estimated_value <= hi.estimated_value + 1e-9);
        prop_assert!(lo.bucket_index <= hi.bucket_index);
    }

    #[test]
    fn normalized_values_stay_in_unit_range(a in 0.0_f64..1000.0, b in 0.0_f64..1000.0, t in 0.0_f64..=1.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assume!(hi > lo);
        let n = Normalizer::new(lo, hi, &Default::default()).unwrap();
        let x = (lo + t * (hi - lo)).clamp(lo, hi);
        let y = n.normalize(x);
        prop_assert!((-1e-12..=1.0 + 1e-12).contains(&y));
        prop_assert_eq!(n.normalize(lo), 0.0);
        prop_assert!((n.normalize(hi) - 1.0).abs() < 1e-12);
    }
}
