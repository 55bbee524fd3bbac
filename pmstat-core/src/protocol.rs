//! Tab-separated records exchanged between map and reduce steps.
//!
//! ```text
//! STATS\t<n>\t<mean>\t<M2>
//! STATS_SKEW\t<n>\t<mean>\t<M2>\t<M3>
//! MIN_VALUE\t<value>
//! MAX_VALUE\t<value>
//! BUCKET_0042\t<count>
//! TOTAL_COUNT\t<count>
//! ```
//!
//! Floats are written with Rust's shortest round-trip formatting, so a record
//! parsed back yields the exact value that was emitted.

use crate::moments::MomentPartial;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const STATS: &str = "STATS";
pub const STATS_SKEW: &str = "STATS_SKEW";
pub const MIN_VALUE: &str = "MIN_VALUE";
pub const MAX_VALUE: &str = "MAX_VALUE";
pub const BUCKET_PREFIX: &str = "BUCKET_";
pub const TOTAL_COUNT: &str = "TOTAL_COUNT";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Record {
    /// moment partial without the third moment
    Stats { n: u64, mean: f64, m2: f64 },
    StatsSkew(MomentPartial),
    MinValue(f64),
    MaxValue(f64),
    Bucket { index: usize, count: u64 },
    TotalCount(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordFormatError {
    #[error("empty line")]
    Empty,
    #[error("unrecognized key {0:?}")]
    UnknownKey(String),
    #[error("{key}: expected {expected} fields, found {found}")]
    Arity {
        key: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("{key}: bad field {field:?}")]
    BadField { key: &'static str, field: String },
}

impl Record {
    pub fn key(&self) -> String {
        match self {
            Record::Stats { .. } => STATS.into(),
            Record::StatsSkew(_) => STATS_SKEW.into(),
            Record::MinValue(_) => MIN_VALUE.into(),
            Record::MaxValue(_) => MAX_VALUE.into(),
            Record::Bucket { index, .. } => format!("{BUCKET_PREFIX}{index:04}"),
            Record::TotalCount(_) => TOTAL_COUNT.into(),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Stats { n, mean, m2 } => write!(f, "{STATS}\t{n}\t{mean}\t{m2}"),
            Record::StatsSkew(p) => {
                write!(f, "{STATS_SKEW}\t{}\t{}\t{}\t{}", p.n, p.mean, p.m2, p.m3)
            }
            Record::MinValue(v) => write!(f, "{MIN_VALUE}\t{v}"),
            Record::MaxValue(v) => write!(f, "{MAX_VALUE}\t{v}"),
            Record::Bucket { index, count } => write!(f, "{BUCKET_PREFIX}{index:04}\t{count}"),
            Record::TotalCount(c) => write!(f, "{TOTAL_COUNT}\t{c}"),
        }
    }
}

fn field<T: FromStr>(key: &'static str, raw: &str) -> Result<T, RecordFormatError> {
    raw.trim().parse().map_err(|_| RecordFormatError::BadField {
        key,
        field: raw.to_string(),
    })
}

fn finite(key: &'static str, raw: &str) -> Result<f64, RecordFormatError> {
    let v: f64 = field(key, raw)?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(RecordFormatError::BadField {
            key,
            field: raw.to_string(),
        })
    }
}

fn arity(key: &'static str, parts: &[&str], expected: usize) -> Result<(), RecordFormatError> {
    if parts.len() == expected {
        Ok(())
    } else {
        Err(RecordFormatError::Arity {
            key,
            expected,
            found: parts.len(),
        })
    }
}

impl FromStr for Record {
    type Err = RecordFormatError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(RecordFormatError::Empty);
        }
        let parts: Vec<&str> = line.split('\t').collect();
        let key = parts[0].trim();
        match key {
            STATS => {
                arity(STATS, &parts, 4)?;
                Ok(Record::Stats {
                    n: field(STATS, parts[1])?,
                    mean: finite(STATS, parts[2])?,
                    m2: finite(STATS, parts[3])?,
                })
            }
            STATS_SKEW => {
                arity(STATS_SKEW, &parts, 5)?;
                Ok(Record::StatsSkew(MomentPartial {
                    n: field(STATS_SKEW, parts[1])?,
                    mean: finite(STATS_SKEW, parts[2])?,
                    m2: finite(STATS_SKEW, parts[3])?,
                    m3: finite(STATS_SKEW, parts[4])?,
                }))
            }
            MIN_VALUE => {
                arity(MIN_VALUE, &parts, 2)?;
                Ok(Record::MinValue(finite(MIN_VALUE, parts[1])?))
            }
            MAX_VALUE => {
                arity(MAX_VALUE, &parts, 2)?;
                Ok(Record::MaxValue(finite(MAX_VALUE, parts[1])?))
            }
            TOTAL_COUNT => {
                arity(TOTAL_COUNT, &parts, 2)?;
                Ok(Record::TotalCount(field(TOTAL_COUNT, parts[1])?))
            }
            _ => match key.strip_prefix(BUCKET_PREFIX) {
                Some(idx) => {
                    arity("BUCKET", &parts, 2)?;
                    // index is plain decimal digits, no sign or padding
                    if idx.is_empty() || !idx.bytes().all(|b| b.is_ascii_digit()) {
                        return Err(RecordFormatError::BadField {
                            key: "BUCKET",
                            field: idx.to_string(),
                        });
                    }
                    Ok(Record::Bucket {
                        index: field("BUCKET", idx)?,
                        count: field("BUCKET", parts[1])?,
                    })
                }
                None => Err(RecordFormatError::UnknownKey(key.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Record, RecordFormatError> {
        s.parse()
    }

    #[test]
    fn bucket_key_is_zero_padded() {
        let r = Record::Bucket { index: 7, count: 1 };
        assert_eq!(r.to_string(), "BUCKET_0007\t1");
        assert_eq!(r.key(), "BUCKET_0007");
        assert_eq!(Record::Bucket { index: 12345, count: 2 }.to_string(), "BUCKET_12345\t2");
    }

    #[test]
    fn skew_record_is_exact() {
        let p = MomentPartial { n: 3, mean: 1.0 / 3.0, m2: 0.1 + 0.2, m3: -2.5e-17 };
        let line = Record::StatsSkew(p).to_string();
        assert_eq!(parse(&line).unwrap(), Record::StatsSkew(p));
    }

    #[test]
    fn parses_each_kind() {
        assert_eq!(parse("STATS\t2\t1.5\t0.5\n").unwrap(), Record::Stats { n: 2, mean: 1.5, m2: 0.5 });
        assert_eq!(parse("MIN_VALUE\t0.1").unwrap(), Record::MinValue(0.1));
        assert_eq!(parse("MAX_VALUE\t7.2\r\n").unwrap(), Record::MaxValue(7.2));
        assert_eq!(parse("BUCKET_0999\t3").unwrap(), Record::Bucket { index: 999, count: 3 });
        assert_eq!(parse("TOTAL_COUNT\t1").unwrap(), Record::TotalCount(1));
    }

    #[test]
    fn wrong_arity() {
        assert_eq!(
            parse("STATS_SKEW\t2\t1.5\t0.5"),
            Err(RecordFormatError::Arity { key: STATS_SKEW, expected: 5, found: 4 })
        );
        assert!(matches!(parse("TOTAL_COUNT"), Err(RecordFormatError::Arity { .. })));
    }

    #[test]
    fn bad_fields() {
        assert!(matches!(parse("STATS\t-2\t1\t1"), Err(RecordFormatError::BadField { .. })));
        assert!(matches!(parse("STATS\t2\tNaN\t1"), Err(RecordFormatError::BadField { .. })));
        assert!(matches!(parse("BUCKET_x\t1"), Err(RecordFormatError::BadField { .. })));
        assert!(matches!(parse("BUCKET_+5\t1"), Err(RecordFormatError::BadField { .. })));
        assert!(matches!(parse("BUCKET_ 5\t1"), Err(RecordFormatError::BadField { .. })));
        assert!(matches!(parse("BUCKET_\t1"), Err(RecordFormatError::BadField { .. })));
        assert_eq!(parse("BUCKET_0005\t1"), Ok(Record::Bucket { index: 5, count: 1 }));
        assert!(matches!(parse("MIN_VALUE\tabc"), Err(RecordFormatError::BadField { .. })));
    }

    #[test]
    fn unknown_and_empty() {
        assert_eq!(parse("SAMPLE_0001\t3.2"), Err(RecordFormatError::UnknownKey("SAMPLE_0001".into())));
        assert_eq!(parse(""), Err(RecordFormatError::Empty));
        assert_eq!(parse("  \n"), Err(RecordFormatError::Empty));
    }
}
