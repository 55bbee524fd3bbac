use pmstat_common::{InputConfig, PmStatError, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::{debug, info};

/// Min-max rescaling against bounds fixed by an earlier extremum pass.
#[derive(Debug, Clone)]
pub struct Normalizer {
    global_min: f64,
    global_max: f64,
    value_index: usize,
    width: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeStats {
    pub rows: u64,
    pub normalized: u64,
    pub passed_through: u64,
}

impl Normalizer {
    pub fn new(global_min: f64, global_max: f64, input: &InputConfig) -> Result<Self> {
        if !global_min.is_finite() || !global_max.is_finite() {
            return Err(PmStatError::Config(format!(
                "normalizer bounds must be finite, got {global_min} and {global_max}"
            )));
        }
        Ok(Self {
            global_min,
            global_max,
            value_index: input.value_index()?,
            width: input.expected_fields.len(),
        })
    }

    pub fn normalize(&self, x: f64) -> f64 {
        if self.global_max == self.global_min {
            return 0.5;
        }
        (x - self.global_min) / (self.global_max - self.global_min)
    }

    /// Rewritten row, or `None` when the row must be written unchanged.
    pub fn normalize_record(&self, record: &csv::ByteRecord) -> Option<csv::ByteRecord> {
        if record.len() != self.width {
            return None;
        }
        // any finite number is rescaled, negatives included
        let x = record
            .get(self.value_index)
            .and_then(|b| std::str::from_utf8(b).ok())
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|x| x.is_finite())?;
        let rewritten = format!("{:.8}", self.normalize(x));
        Some(
            record
                .iter()
                .enumerate()
                .map(|(i, field)| {
                    if i == self.value_index {
                        rewritten.as_bytes()
                    } else {
                        field
                    }
                })
                .collect(),
        )
    }

    /// Stream header-less rows from `input` to `output`, one row out per row in.
    pub fn run<R: Read, W: Write>(&self, input: R, output: W) -> Result<NormalizeStats> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(input);
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(output);
        let mut stats = NormalizeStats::default();
        let mut record = csv::ByteRecord::new();
        while reader.read_byte_record(&mut record)? {
            stats.rows += 1;
            match self.normalize_record(&record) {
                Some(out) => {
                    stats.normalized += 1;
                    writer.write_byte_record(&out)?;
                }
                None => {
                    stats.passed_through += 1;
                    debug!(row = stats.rows, "passing row through unchanged");
                    writer.write_byte_record(&record)?;
                }
            }
        }
        writer.flush()?;
        info!(
            rows = stats.rows,
            normalized = stats.normalized,
            passed_through = stats.passed_through,
            "normalization finished"
        );
        Ok(stats)
    }
}
