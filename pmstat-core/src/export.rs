use crate::histogram::{bucket_range, HistogramPartial, QuantileEstimate};
use crate::job::{JobKind, JobReport};
use crate::pipeline::JobRun;
use pmstat_common::Result;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

const BAR_WIDTH: usize = 40;

/// WHO annual PM2.5 guideline and interim targets 4 and 3, in µg/m³.
const WHO_ANNUAL_GUIDELINE: f64 = 5.0;
const WHO_INTERIM_TARGET_4: f64 = 10.0;
const WHO_INTERIM_TARGET_3: f64 = 15.0;
/// EPA 24-hour PM2.5 standard, in µg/m³.
const EPA_24H_STANDARD: f64 = 35.0;

/// Where a mean concentration falls against the WHO guideline levels.
pub fn who_band(mean: f64) -> &'static str {
    if mean <= WHO_ANNUAL_GUIDELINE {
        "below_annual_guideline"
    } else if mean <= WHO_INTERIM_TARGET_4 {
        "below_interim_target_4"
    } else if mean <= WHO_INTERIM_TARGET_3 {
        "below_interim_target_3"
    } else {
        "above_who_targets"
    }
}

/// Variability class of a coefficient of variation given in percent.
pub fn variability_band(cv: f64) -> &'static str {
    if cv < 20.0 {
        "low"
    } else if cv < 50.0 {
        "moderate"
    } else {
        "high"
    }
}

/// Amount by which a 90th percentile exceeds the EPA 24-hour standard.
pub fn epa_exceedance(p90: f64) -> Option<f64> {
    (p90 > EPA_24H_STANDARD).then(|| p90 - EPA_24H_STANDARD)
}

fn kv<W: Write>(out: &mut W, key: &str, value: impl std::fmt::Display) -> Result<()> {
    writeln!(out, "{key}\t{value}")?;
    Ok(())
}

fn percent_label(p: f64) -> String {
    format!("p{}", (p * 1e6).round() / 1e4)
}

fn write_estimate<W: Write>(out: &mut W, prefix: &str, q: &QuantileEstimate) -> Result<()> {
    kv(out, &format!("{prefix}estimated_value"), q.estimated_value)?;
    kv(out, &format!("{prefix}bucket_index"), q.bucket_index)?;
    kv(out, &format!("{prefix}bucket_range_low"), q.bucket_range_low)?;
    kv(out, &format!("{prefix}bucket_range_high"), q.bucket_range_high)?;
    kv(out, &format!("{prefix}bucket_count"), q.bucket_count)?;
    kv(out, &format!("{prefix}cumulative_count"), q.cumulative_count)?;
    kv(out, &format!("{prefix}position"), q.position)?;
    kv(out, &format!("{prefix}position_in_bucket"), q.position_in_bucket)
}

/// Render the final report as `key\tvalue` lines.
pub fn write_report<W: Write>(out: &mut W, report: &JobReport) -> Result<()> {
    match report {
        JobReport::NoData { .. } => kv(out, "status", "no_data"),
        JobReport::Moments { job, statistics: s } => {
            kv(out, "total_records", s.n)?;
            kv(out, "global_mean", s.mean)?;
            kv(out, "population_variance", s.population_variance)?;
            kv(out, "population_std_dev", s.population_std_dev)?;
            kv(out, "sample_variance", s.sample_variance)?;
            kv(out, "sample_std_dev", s.sample_std_dev)?;
            kv(out, "coefficient_of_variation", s.coefficient_of_variation)?;
            if *job == JobKind::Skewness {
                kv(out, "skewness_g1", s.skewness_g1)?;
                kv(out, "global_M2", s.m2)?;
                kv(out, "global_M3", s.m3)?;
            }
            kv(out, "who_band", who_band(s.mean))?;
            kv(out, "variability", variability_band(s.coefficient_of_variation))
        }
        JobReport::Extremum { min, max, .. } => {
            if let Some(v) = min {
                kv(out, "global_min", v)?;
            }
            if let Some(v) = max {
                kv(out, "global_max", v)?;
            }
            Ok(())
        }
        JobReport::Quantile {
            job,
            total,
            target,
            others,
            summary,
            ..
        } => {
            kv(out, "total_records", total)?;
            kv(out, "target_percentile", target.target_percentile)?;
            write_estimate(out, "", target)?;
            for q in others {
                kv(out, &percent_label(q.target_percentile), q.estimated_value)?;
            }
            kv(out, "buckets_used", summary.buckets_used)?;
            kv(out, "lowest_bucket", summary.lowest_bucket)?;
            kv(out, "highest_bucket", summary.highest_bucket)?;
            kv(out, "densest_bucket", summary.densest_bucket)?;
            kv(out, "densest_count", summary.densest_count)?;
            if *job == JobKind::Percentile90 {
                match epa_exceedance(target.estimated_value) {
                    None => kv(out, "epa_24h_standard", "met")?,
                    Some(over) => {
                        kv(out, "epa_24h_standard", "exceeded")?;
                        kv(out, "epa_exceedance", over)?;
                    }
                }
            }
            Ok(())
        }
    }
}

/// Bar chart of the first `max_rows` non-empty buckets, marking `target`.
pub fn write_chart<W: Write>(
    out: &mut W,
    histogram: &HistogramPartial,
    target: Option<usize>,
    max_rows: usize,
) -> Result<()> {
    let rows: Vec<(usize, u64)> = histogram.non_empty().take(max_rows).collect();
    let peak = rows.iter().map(|&(_, c)| c).max().unwrap_or(0);
    if peak == 0 {
        return Ok(());
    }
    for (index, count) in rows {
        let (low, high) = bucket_range(&histogram.config, index);
        let len = ((count as f64 / peak as f64) * BAR_WIDTH as f64).ceil() as usize;
        let marker = if Some(index) == target { " <" } else { "" };
        writeln!(
            out,
            "{index:>5} [{low:>10.3}, {high:>10.3}) {count:>8} {}{marker}",
            "#".repeat(len.max(1))
        )?;
    }
    Ok(())
}

pub fn write_json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

pub fn export_json(output_path: &Path, run: &JobRun) -> Result<()> {
    let mut file = std::fs::File::create(output_path)?;
    write_json(&mut file, run)
}

/// Per-run admission summary, one aligned line per partition.
pub fn write_run_summary<W: Write>(out: &mut W, run: &JobRun) -> Result<()> {
    writeln!(out, "{:<24} {}", "Partitions:", run.partitions.len())?;
    writeln!(out, "{:<24} {}", "Failed partitions:", run.failed.len())?;
    writeln!(out, "{:<24} {}", "Admitted values:", run.skipped.admitted)?;
    writeln!(out, "{:<24} {}", "Skipped values:", run.skipped.skipped())?;
    for p in &run.partitions {
        writeln!(
            out,
            "  {:<22} rows={} admitted={} missing={} unparsable={} non_finite={} negative={}",
            p.path.display(),
            p.rows,
            p.skipped.admitted,
            p.skipped.missing,
            p.skipped.unparsable,
            p.skipped.non_finite,
            p.skipped.negative
        )?;
    }
    for (path, reason) in &run.failed {
        writeln!(out, "  {:<22} failed: {reason}", path.display())?;
    }
    Ok(())
}
