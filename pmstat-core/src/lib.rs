pub mod export;
pub mod extremum;
pub mod histogram;
pub mod job;
pub mod moments;
pub mod normalize;
pub mod pipeline;
pub mod protocol;
pub mod scanner;
pub mod traits;
pub mod value;

pub use pmstat_common::{Config, PmStatError, Result};

pub use export::{export_json, write_chart, write_json, write_report, write_run_summary};
pub use extremum::{ExtremumAccumulator, ExtremumPartial};
pub use histogram::{
    bucket_index, bucket_range, HistogramAccumulator, HistogramPartial, HistogramSummary,
    QuantileEstimate,
};
pub use job::{value_records, JobAggregator, JobKind, JobReducer, JobReport, Partial, ReduceStats};
pub use moments::{MomentAccumulator, MomentPartial, StatisticsReport};
pub use normalize::{NormalizeStats, Normalizer};
pub use pipeline::{
    aggregate_partition, aggregate_reader, map_stream, reduce_stream, run_job, run_path, JobRun,
    Mapper, MergeShape, PartitionReport,
};
pub use protocol::{Record, RecordFormatError};
pub use scanner::{resolve_paths, scan_directory, PartitionPath};
pub use traits::{merge_all, merge_tree, Aggregator, Mergeable};
pub use value::{admit, admit_value, SkipReason, SkipStats, ValueSource};
