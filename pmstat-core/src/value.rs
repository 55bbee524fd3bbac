use pmstat_common::Result;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Why a raw field did not contribute to an aggregate.
///
/// Every reason is absorbed at the record: dirty rows never fail a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// field absent, empty or whitespace only
    Missing,
    Unparsable,
    NonFinite,
    /// concentrations cannot be negative
    Negative,
}

/// Parse a raw field and apply the domain rule.
pub fn admit(raw: Option<&str>) -> std::result::Result<f64, SkipReason> {
    let s = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SkipReason::Missing)?;
    let x: f64 = s.parse().map_err(|_| SkipReason::Unparsable)?;
    admit_value(x)
}

pub fn admit_value(x: f64) -> std::result::Result<f64, SkipReason> {
    if !x.is_finite() {
        Err(SkipReason::NonFinite)
    } else if x < 0.0 {
        Err(SkipReason::Negative)
    } else {
        Ok(x)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipStats {
    pub admitted: u64,
    pub missing: u64,
    pub unparsable: u64,
    pub non_finite: u64,
    pub negative: u64,
}

impl SkipStats {
    pub fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Missing => self.missing += 1,
            SkipReason::Unparsable => self.unparsable += 1,
            SkipReason::NonFinite => self.non_finite += 1,
            SkipReason::Negative => self.negative += 1,
        }
    }

    pub fn skipped(&self) -> u64 {
        self.missing + self.unparsable + self.non_finite + self.negative
    }

    pub fn absorb(&mut self, other: &SkipStats) {
        self.admitted += other.admitted;
        self.missing += other.missing;
        self.unparsable += other.unparsable;
        self.non_finite += other.non_finite;
        self.negative += other.negative;
    }
}

/// Admitted values of one named column from a headed CSV stream.
///
/// Yields `Err` only for I/O failures of the underlying reader; malformed rows
/// and bad values are tallied in [`SkipStats`] and skipped.
pub struct ValueSource<R: Read> {
    reader: csv::Reader<R>,
    column: Option<usize>,
    record: csv::StringRecord,
    rows: u64,
    stats: SkipStats,
}

impl<R: Read> ValueSource<R> {
    pub fn new(input: R, value_column: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(input);
        let column = match reader.headers() {
            Ok(h) => h.iter().position(|name| name.trim() == value_column),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "unreadable header row");
                None
            }
        };
        if column.is_none() {
            warn!(column = value_column, "value column not in header; every row will be skipped");
        }
        Ok(Self {
            reader,
            column,
            record: csv::StringRecord::new(),
            rows: 0,
            stats: SkipStats::default(),
        })
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn stats(&self) -> &SkipStats {
        &self.stats
    }
}

impl ValueSource<std::fs::File> {
    pub fn open(path: &Path, value_column: &str) -> Result<Self> {
        Self::new(std::fs::File::open(path)?, value_column)
    }
}

impl<R: Read> Iterator for ValueSource<R> {
    type Item = Result<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.reader.read_record(&mut self.record) {
                Ok(false) => return None,
                Ok(true) => {
                    self.rows += 1;
                    let raw = self.column.and_then(|i| self.record.get(i));
                    match admit(raw) {
                        Ok(x) => {
                            self.stats.admitted += 1;
                            return Some(Ok(x));
                        }
                        Err(reason) => {
                            debug!(row = self.rows, ?reason, "skipping value");
                            self.stats.record(reason);
                        }
                    }
                }
                Err(e) if e.is_io_error() => return Some(Err(e.into())),
                Err(e) => {
                    self.rows += 1;
                    debug!(row = self.rows, error = %e, "skipping malformed row");
                    self.stats.record(SkipReason::Unparsable);
                }
            }
        }
    }
}
