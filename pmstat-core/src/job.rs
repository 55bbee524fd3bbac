use crate::extremum::{ExtremumAccumulator, ExtremumPartial};
use crate::histogram::{HistogramAccumulator, HistogramPartial, HistogramSummary, QuantileEstimate};
use crate::moments::{MomentAccumulator, MomentPartial, StatisticsReport};
use crate::protocol::{Record, RecordFormatError, STATS, STATS_SKEW, TOTAL_COUNT};
use crate::traits::{Aggregator, Mergeable};
use pmstat_common::{HistogramConfig, PmStatError, ReportConfig, Result};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    StdDev,
    Skewness,
    MinMax,
    Median,
    Percentile90,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::StdDev,
        JobKind::Skewness,
        JobKind::MinMax,
        JobKind::Median,
        JobKind::Percentile90,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            JobKind::StdDev => "stddev",
            JobKind::Skewness => "skewness",
            JobKind::MinMax => "minmax",
            JobKind::Median => "median",
            JobKind::Percentile90 => "percentile90",
        }
    }

    /// Percentile finalized by histogram jobs.
    pub fn target_percentile(&self) -> Option<f64> {
        match self {
            JobKind::Median => Some(0.5),
            JobKind::Percentile90 => Some(0.9),
            _ => None,
        }
    }

    /// Whether a record kind belongs to this job's merge input.
    pub fn accepts(&self, record: &Record) -> bool {
        matches!(
            (self, record),
            (JobKind::StdDev, Record::Stats { .. })
                | (JobKind::Skewness, Record::StatsSkew(_))
                | (JobKind::MinMax, Record::MinValue(_) | Record::MaxValue(_))
                | (
                    JobKind::Median | JobKind::Percentile90,
                    Record::Bucket { .. } | Record::TotalCount(_)
                )
        )
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One partition's contribution to any job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Partial {
    Moments { partial: Option<MomentPartial> },
    Extremum { partial: ExtremumPartial },
    Histogram { partial: HistogramPartial },
}

impl Partial {
    /// The merge identity for a job.
    pub fn empty(job: JobKind, cfg: &HistogramConfig) -> Self {
        match job {
            JobKind::StdDev | JobKind::Skewness => Partial::Moments { partial: None },
            JobKind::MinMax => Partial::Extremum {
                partial: ExtremumPartial::default(),
            },
            JobKind::Median | JobKind::Percentile90 => Partial::Histogram {
                partial: HistogramPartial::new(*cfg),
            },
        }
    }

    /// Records carrying this partial in pre-aggregated form.
    pub fn to_records(&self, job: JobKind) -> Vec<Record> {
        match self {
            Partial::Moments { partial: None } => Vec::new(),
            Partial::Moments { partial: Some(p) } => match job {
                JobKind::Skewness => vec![Record::StatsSkew(*p)],
                _ => vec![Record::Stats {
                    n: p.n,
                    mean: p.mean,
                    m2: p.m2,
                }],
            },
            Partial::Extremum { partial } => partial
                .min
                .map(Record::MinValue)
                .into_iter()
                .chain(partial.max.map(Record::MaxValue))
                .collect(),
            Partial::Histogram { partial } => partial
                .non_empty()
                .map(|(index, count)| Record::Bucket { index, count })
                .chain(std::iter::once(Record::TotalCount(partial.total())))
                .collect(),
        }
    }
}

impl Mergeable for Partial {
    fn merge(&mut self, other: &Self) -> Result<()> {
        match (self, other) {
            (Partial::Moments { partial: a }, Partial::Moments { partial: b }) => match (a, b) {
                (Some(x), Some(y)) => x.merge(y),
                (a, b) => {
                    if a.is_none() {
                        *a = *b;
                    }
                    Ok(())
                }
            },
            (Partial::Extremum { partial: a }, Partial::Extremum { partial: b }) => a.merge(b),
            (Partial::Histogram { partial: a }, Partial::Histogram { partial: b }) => a.merge(b),
            _ => Err(PmStatError::Other(
                "cannot merge partials of different jobs".into(),
            )),
        }
    }
}

/// Aggregator for whichever job is being run.
#[derive(Debug, Clone)]
pub enum JobAggregator {
    Moments(MomentAccumulator),
    Extremum(ExtremumAccumulator),
    Histogram(HistogramAccumulator),
}

impl JobAggregator {
    pub fn new(job: JobKind, cfg: &HistogramConfig) -> Self {
        match job {
            JobKind::StdDev | JobKind::Skewness => JobAggregator::Moments(MomentAccumulator::new()),
            JobKind::MinMax => JobAggregator::Extremum(ExtremumAccumulator::new()),
            JobKind::Median | JobKind::Percentile90 => {
                JobAggregator::Histogram(HistogramAccumulator::new(*cfg))
            }
        }
    }
}

impl Aggregator for JobAggregator {
    type Partial = Partial;

    fn observe(&mut self, x: f64) {
        match self {
            JobAggregator::Moments(a) => a.observe(x),
            JobAggregator::Extremum(a) => a.observe(x),
            JobAggregator::Histogram(a) => a.observe(x),
        }
    }

    fn finish(self) -> Partial {
        match self {
            JobAggregator::Moments(a) => Partial::Moments { partial: a.finish() },
            JobAggregator::Extremum(a) => Partial::Extremum { partial: a.finish() },
            JobAggregator::Histogram(a) => Partial::Histogram { partial: a.finish() },
        }
    }
}

/// Records a mapper emits for a single admitted value, for jobs that stream
/// per value. Moment jobs return nothing here and emit once at the end.
pub fn value_records(job: JobKind, cfg: &HistogramConfig, x: f64) -> Vec<Record> {
    match job {
        JobKind::StdDev | JobKind::Skewness => Vec::new(),
        JobKind::MinMax => vec![Record::MinValue(x), Record::MaxValue(x)],
        JobKind::Median | JobKind::Percentile90 => vec![
            Record::Bucket {
                index: crate::histogram::bucket_index(cfg, x),
                count: 1,
            },
            Record::TotalCount(1),
        ],
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReduceStats {
    pub lines: u64,
    pub records: u64,
    pub blank_lines: u64,
    pub format_errors: u64,
}

/// Folds merge-input lines for one job into a single accumulator.
#[derive(Debug, Clone)]
pub struct JobReducer {
    job: JobKind,
    state: Partial,
    declared_total: u64,
    stats: ReduceStats,
}

impl JobReducer {
    pub fn new(job: JobKind, cfg: &HistogramConfig) -> Self {
        Self {
            job,
            state: Partial::empty(job, cfg),
            declared_total: 0,
            stats: ReduceStats::default(),
        }
    }

    pub fn stats(&self) -> &ReduceStats {
        &self.stats
    }

    /// Parse and fold one line; malformed lines are counted and skipped.
    pub fn push_line(&mut self, line: &str) {
        self.stats.lines += 1;
        let outcome = line.parse::<Record>().and_then(|r| self.push_record(r));
        match outcome {
            Ok(()) => {}
            Err(RecordFormatError::Empty) => self.stats.blank_lines += 1,
            Err(e) => {
                self.stats.format_errors += 1;
                debug!(line = self.stats.lines, error = %e, "skipping merge input");
            }
        }
    }

    pub fn push_record(&mut self, record: Record) -> std::result::Result<(), RecordFormatError> {
        if !self.job.accepts(&record) {
            return Err(RecordFormatError::UnknownKey(record.key()));
        }
        match (&mut self.state, record) {
            (Partial::Moments { partial }, Record::Stats { n, mean, m2 }) => {
                let p = MomentPartial { n, mean, m2, m3: 0.0 };
                *partial = Some(fold_moments(*partial, &p, STATS)?);
            }
            (Partial::Moments { partial }, Record::StatsSkew(p)) => {
                *partial = Some(fold_moments(*partial, &p, STATS_SKEW)?);
            }
            (Partial::Extremum { partial }, Record::MinValue(v)) => partial.offer_min(v),
            (Partial::Extremum { partial }, Record::MaxValue(v)) => partial.offer_max(v),
            (Partial::Histogram { partial }, Record::Bucket { index, count }) => {
                if !partial.add_bucket(index, count) {
                    return Err(RecordFormatError::BadField {
                        key: "BUCKET",
                        field: format!(
                            "{index}\t{count} (resolution {}, total {})",
                            partial.config.num_buckets,
                            partial.total()
                        ),
                    });
                }
            }
            (Partial::Histogram { .. }, Record::TotalCount(c)) => {
                self.declared_total = self.declared_total.checked_add(c).ok_or_else(|| {
                    RecordFormatError::BadField {
                        key: TOTAL_COUNT,
                        field: c.to_string(),
                    }
                })?;
            }
            (_, other) => return Err(RecordFormatError::UnknownKey(other.key())),
        }
        self.stats.records += 1;
        Ok(())
    }

    /// Fold every line of a reader. Only I/O failures are returned.
    pub fn consume<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for line in reader.lines() {
            self.push_line(&line?);
        }
        Ok(())
    }

    pub fn into_partial(self) -> Partial {
        if let Partial::Histogram { partial } = &self.state {
            if partial.total() != self.declared_total {
                warn!(
                    declared = self.declared_total,
                    bucketed = partial.total(),
                    "TOTAL_COUNT disagrees with bucket counts; using bucket sum"
                );
            }
        }
        self.state
    }

    pub fn finish(self, report_cfg: &ReportConfig) -> Result<JobReport> {
        let job = self.job;
        JobReport::from_partial(job, &self.into_partial(), report_cfg)
    }
}

/// Fold one moment record into the running partial; a count that would
/// overflow rejects the record.
fn fold_moments(
    acc: Option<MomentPartial>,
    p: &MomentPartial,
    key: &'static str,
) -> std::result::Result<MomentPartial, RecordFormatError> {
    match acc {
        None => Ok(*p),
        Some(acc) => MomentPartial::checked_combine(&acc, p).ok_or_else(|| {
            RecordFormatError::BadField {
                key,
                field: p.n.to_string(),
            }
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobReport {
    /// zero valid values, or zero partials reached the merge
    NoData { job: JobKind },
    Moments {
        job: JobKind,
        statistics: StatisticsReport,
    },
    Extremum {
        job: JobKind,
        min: Option<f64>,
        max: Option<f64>,
    },
    Quantile {
        job: JobKind,
        total: u64,
        target: QuantileEstimate,
        others: Vec<QuantileEstimate>,
        summary: HistogramSummary,
        #[serde(skip)]
        histogram: Option<HistogramPartial>,
    },
}

impl JobReport {
    pub fn from_partial(job: JobKind, partial: &Partial, report_cfg: &ReportConfig) -> Result<Self> {
        let no_data = JobReport::NoData { job };
        Ok(match partial {
            Partial::Moments { partial } => match partial.as_ref().and_then(MomentPartial::finalize) {
                Some(statistics) => JobReport::Moments { job, statistics },
                None => no_data,
            },
            Partial::Extremum { partial } if partial.is_empty() => no_data,
            Partial::Extremum { partial } => JobReport::Extremum {
                job,
                min: partial.min,
                max: partial.max,
            },
            Partial::Histogram { partial } => {
                let p = job.target_percentile().ok_or_else(|| {
                    PmStatError::Other(format!("{job} does not finalize a histogram"))
                })?;
                let (Some(target), Some(summary)) = (partial.quantile(p)?, partial.summary())
                else {
                    return Ok(no_data);
                };
                let extra: Vec<f64> = report_cfg
                    .extra_percentiles
                    .iter()
                    .copied()
                    .filter(|&q| q != p)
                    .collect();
                JobReport::Quantile {
                    job,
                    total: partial.total(),
                    target,
                    others: partial.quantiles(&extra)?,
                    summary,
                    histogram: Some(partial.clone()),
                }
            }
        })
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, JobReport::NoData { .. })
    }
}
