use crate::job::{value_records, JobAggregator, JobKind, JobReducer, JobReport, Partial, ReduceStats};
use crate::scanner::PartitionPath;
use crate::traits::{merge_all, merge_tree, Aggregator};
use crate::value::{SkipStats, ValueSource};
use pmstat_common::{Config, PmStatError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Read, Write};
use std::path::PathBuf;
use tracing::{info, warn};

/// How partials reach the final accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeShape {
    /// left-to-right fold in partition order
    #[default]
    Fold,
    /// pairwise tree on the rayon pool
    Tree,
}

/// Map step of a streaming job: aggregates one partition and writes records.
///
/// Without combining, extremum and histogram jobs write records per value as
/// they arrive; moment jobs always write a single record at the end.
pub struct Mapper<W: Write> {
    job: JobKind,
    config: Config,
    combine: bool,
    aggregator: JobAggregator,
    out: W,
}

impl<W: Write> Mapper<W> {
    pub fn new(job: JobKind, config: &Config, combine: bool, out: W) -> Self {
        Self {
            job,
            config: config.clone(),
            combine,
            aggregator: JobAggregator::new(job, &config.histogram),
            out,
        }
    }

    /// Feed one admitted value.
    pub fn push(&mut self, x: f64) -> Result<()> {
        self.aggregator.observe(x);
        if !self.combine {
            for r in value_records(self.job, &self.config.histogram, x) {
                writeln!(self.out, "{r}")?;
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        let partial = self.aggregator.finish();
        let trailing = match (&partial, self.combine) {
            (Partial::Moments { .. }, _) | (_, true) => partial.to_records(self.job),
            _ => Vec::new(),
        };
        for r in trailing {
            writeln!(self.out, "{r}")?;
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Run the map step over a headed CSV stream.
pub fn map_stream<R: Read, W: Write>(
    input: R,
    output: W,
    job: JobKind,
    config: &Config,
    combine: bool,
) -> Result<SkipStats> {
    let mut source = ValueSource::new(input, &config.input.value_column)?;
    let mut mapper = Mapper::new(job, config, combine, output);
    for x in source.by_ref() {
        mapper.push(x?)?;
    }
    mapper.finish()?;
    let stats = *source.stats();
    info!(job = %job, rows = source.rows(), admitted = stats.admitted, skipped = stats.skipped(), "map finished");
    Ok(stats)
}

/// Run the reduce step over merge-input lines.
pub fn reduce_stream<R: BufRead>(input: R, job: JobKind, config: &Config) -> Result<(JobReport, ReduceStats)> {
    config.validate()?;
    let mut reducer = JobReducer::new(job, &config.histogram);
    reducer.consume(input)?;
    let stats = *reducer.stats();
    info!(job = %job, lines = stats.lines, records = stats.records, format_errors = stats.format_errors, "reduce finished");
    Ok((reducer.finish(&config.report)?, stats))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionReport {
    pub path: PathBuf,
    pub rows: u64,
    pub skipped: SkipStats,
}

/// Aggregate one headed CSV stream into the job's partial.
pub fn aggregate_reader<R: Read>(input: R, job: JobKind, config: &Config) -> Result<(Partial, u64, SkipStats)> {
    let mut source = ValueSource::new(input, &config.input.value_column)?;
    let mut aggregator = JobAggregator::new(job, &config.histogram);
    for x in source.by_ref() {
        aggregator.observe(x?);
    }
    Ok((aggregator.finish(), source.rows(), *source.stats()))
}

pub fn aggregate_partition(part: &PartitionPath, job: JobKind, config: &Config) -> Result<(Partial, PartitionReport)> {
    let file = std::fs::File::open(&part.path)?;
    let (partial, rows, skipped) = aggregate_reader(std::io::BufReader::new(file), job, config)?;
    info!(path = %part.path.display(), rows, admitted = skipped.admitted, skipped = skipped.skipped(), "partition aggregated");
    Ok((
        partial,
        PartitionReport {
            path: part.path.clone(),
            rows,
            skipped,
        },
    ))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub report: JobReport,
    pub partitions: Vec<PartitionReport>,
    /// partitions that could not be read, with the reason
    pub failed: Vec<(PathBuf, String)>,
    pub skipped: SkipStats,
}

/// Aggregate every partition in parallel, then merge with the requested shape.
pub fn run_job(paths: &[PartitionPath], job: JobKind, config: &Config, shape: MergeShape) -> Result<JobRun> {
    config.validate()?;
    let results: Vec<Result<(Partial, PartitionReport)>> = paths
        .par_iter()
        .map(|p| aggregate_partition(p, job, config))
        .collect();

    let mut partials = Vec::with_capacity(results.len());
    let mut partitions = Vec::with_capacity(results.len());
    let mut failed = Vec::new();
    let mut errors = Vec::new();
    for (part, r) in paths.iter().zip(results) {
        match r {
            Ok((partial, report)) => {
                partials.push(partial);
                partitions.push(report);
            }
            Err(e) => {
                warn!(path = %part.path.display(), error = %e, "partition unreadable");
                failed.push((part.path.clone(), e.to_string()));
                errors.push(e);
            }
        }
    }
    if partials.is_empty() && !errors.is_empty() {
        return Err(errors.remove(0));
    }

    let merged = match shape {
        MergeShape::Fold => merge_all(partials)?,
        MergeShape::Tree => merge_tree(partials)?,
    };
    let merged = merged.unwrap_or_else(|| Partial::empty(job, &config.histogram));
    let report = JobReport::from_partial(job, &merged, &config.report)?;

    let mut skipped = SkipStats::default();
    for p in &partitions {
        skipped.absorb(&p.skipped);
    }
    Ok(JobRun {
        report,
        partitions,
        failed,
        skipped,
    })
}

/// Resolve a path string and run the job over what it names.
pub fn run_path(input: &str, job: JobKind, config: &Config, shape: MergeShape) -> Result<JobRun> {
    let paths = crate::scanner::resolve_paths(input)?;
    if paths.is_empty() {
        return Err(PmStatError::Other(format!("no input partitions found: {input}")));
    }
    run_job(&paths, job, config, shape)
}
