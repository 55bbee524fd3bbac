use pmstat_core::{
    map_stream, reduce_stream, resolve_paths, run_job, run_path, Config, JobKind, JobReport,
    MergeShape, Normalizer,
};
use std::path::Path;

const HEADER: &str = "date_local,state_name,county_name,arithmetic_mean,aqi,first_max_value,observation_count,latitude,longitude";

fn write_partition(dir: &Path, name: &str, values: &[&str]) {
    let mut body = String::from(HEADER);
    body.push('\n');
    for (i, v) in values.iter().enumerate() {
        body.push_str(&format!("2019-01-{:02},CA,Los Angeles,{v},40,9.1,24,34.06,-118.22\n", i + 1));
    }
    std::fs::write(dir.join(name), body).unwrap();
}

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_partition(dir.path(), "part-a.csv", &["3.5", "-1.0", "7.2"]);
    write_partition(dir.path(), "part-b.csv", &["0.1", "", "n/a", "12.25"]);
    write_partition(dir.path(), "part-c.csv", &["5.0", "5.0", "inf"]);
    dir
}

fn moments(report: &JobReport) -> pmstat_core::StatisticsReport {
    match report {
        JobReport::Moments { statistics, .. } => *statistics,
        other => panic!("expected moments, got {other:?}"),
    }
}

#[test]
fn fold_and_tree_agree() {
    let dir = fixture();
    let paths = resolve_paths(dir.path().to_str().unwrap()).unwrap();
    assert_eq!(paths.len(), 3);
    let cfg = Config::default();
    let fold = run_job(&paths, JobKind::Skewness, &cfg, MergeShape::Fold).unwrap();
    let tree = run_job(&paths, JobKind::Skewness, &cfg, MergeShape::Tree).unwrap();
    let (a, b) = (moments(&fold.report), moments(&tree.report));
    assert_eq!(a.n, 6);
    assert_eq!(b.n, 6);
    assert!((a.mean - b.mean).abs() < 1e-12);
    assert!((a.m2 - b.m2).abs() < 1e-9);
    assert!((a.m3 - b.m3).abs() < 1e-7);
    assert_eq!(fold.skipped.negative, 1);
    assert_eq!(fold.skipped.missing, 1);
    assert_eq!(fold.skipped.unparsable, 1);
    assert_eq!(fold.skipped.non_finite, 1);
}

#[test]
fn run_matches_direct_computation() {
    let dir = fixture();
    let cfg = Config::default();
    let run = run_path(dir.path().to_str().unwrap(), JobKind::StdDev, &cfg, MergeShape::Tree).unwrap();
    let values = [3.5, 7.2, 0.1, 12.25, 5.0, 5.0];
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let s = moments(&run.report);
    assert!((s.mean - mean).abs() < 1e-12);
    assert!((s.population_variance - var).abs() < 1e-9);
}

#[test]
fn minmax_over_partitions() {
    let dir = fixture();
    let run = run_path(dir.path().to_str().unwrap(), JobKind::MinMax, &Config::default(), MergeShape::Fold).unwrap();
    assert_eq!(
        run.report,
        JobReport::Extremum { job: JobKind::MinMax, min: Some(0.1), max: Some(12.25) }
    );
}

#[test]
fn unreadable_partition_is_reported_not_fatal() {
    let dir = fixture();
    let mut paths = resolve_paths(dir.path().to_str().unwrap()).unwrap();
    paths.push(pmstat_core::PartitionPath { path: dir.path().join("missing.csv") });
    let run = run_job(&paths, JobKind::MinMax, &Config::default(), MergeShape::Fold).unwrap();
    assert_eq!(run.partitions.len(), 3);
    assert_eq!(run.failed.len(), 1);

    let only_missing = vec![pmstat_core::PartitionPath { path: dir.path().join("missing.csv") }];
    assert!(run_job(&only_missing, JobKind::MinMax, &Config::default(), MergeShape::Fold).is_err());
}

#[test]
fn no_partitions_is_no_data() {
    let run = run_job(&[], JobKind::Median, &Config::default(), MergeShape::Tree).unwrap();
    assert!(run.report.is_no_data());
}

#[test]
fn streamed_map_reduce_equals_local_run() {
    let dir = fixture();
    let cfg = Config::default();
    for job in [JobKind::StdDev, JobKind::MinMax, JobKind::Median, JobKind::Percentile90] {
        let mut merge_input = Vec::new();
        for part in resolve_paths(dir.path().to_str().unwrap()).unwrap() {
            let file = std::fs::File::open(&part.path).unwrap();
            map_stream(file, &mut merge_input, job, &cfg, false).unwrap();
        }
        let (streamed, stats) = reduce_stream(merge_input.as_slice(), job, &cfg).unwrap();
        assert_eq!(stats.format_errors, 0);
        let local = run_path(dir.path().to_str().unwrap(), job, &cfg, MergeShape::Fold).unwrap();
        match (&streamed, &local.report) {
            (JobReport::Moments { statistics: a, .. }, JobReport::Moments { statistics: b, .. }) => {
                assert_eq!(a.n, b.n);
                assert!((a.mean - b.mean).abs() < 1e-12);
            }
            (a, b) => assert_eq!(a, b),
        }
    }
}

#[test]
fn combined_map_output_reduces_identically() {
    let dir = fixture();
    let cfg = Config::default();
    let mut per_value = Vec::new();
    let mut combined = Vec::new();
    for part in resolve_paths(dir.path().to_str().unwrap()).unwrap() {
        map_stream(std::fs::File::open(&part.path).unwrap(), &mut per_value, JobKind::Median, &cfg, false).unwrap();
        map_stream(std::fs::File::open(&part.path).unwrap(), &mut combined, JobKind::Median, &cfg, true).unwrap();
    }
    assert!(combined.len() < per_value.len());
    let (a, _) = reduce_stream(per_value.as_slice(), JobKind::Median, &cfg).unwrap();
    let (b, _) = reduce_stream(combined.as_slice(), JobKind::Median, &cfg).unwrap();
    assert_eq!(a, b);
}

#[test]
fn normalize_with_bounds_from_minmax() {
    let dir = fixture();
    let cfg = Config::default();
    let run = run_path(dir.path().to_str().unwrap(), JobKind::MinMax, &cfg, MergeShape::Fold).unwrap();
    let JobReport::Extremum { min: Some(lo), max: Some(hi), .. } = run.report else {
        panic!("expected bounds");
    };
    let normalizer = Normalizer::new(lo, hi, &cfg.input).unwrap();
    let rows = "2019-01-01,CA,LA,0.1,40,9.1,24,34.06,-118.22\n2019-01-02,CA,LA,12.25,40,9.1,24,34.06,-118.22\n";
    let mut out = Vec::new();
    let stats = normalizer.run(rows.as_bytes(), &mut out).unwrap();
    assert_eq!(stats.normalized, 2);
    let out = String::from_utf8(out).unwrap();
    assert!(out.contains(",0.00000000,"));
    assert!(out.contains(",1.00000000,"));
}
