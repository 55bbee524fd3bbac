pub mod config;
pub use config::{Config, HistogramConfig, InputConfig, ReportConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PmStatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("percentile must lie strictly between 0 and 1, got {0}")]
    InvalidPercentile(f64),
    #[error("incompatible histograms: expected {expected}, found {found}")]
    IncompatibleHistograms { expected: String, found: String },
    #[error("{0}")]
    Other(String),
}

impl PmStatError {
    /// True for errors that must stop the process before any input is consumed.
    pub fn is_fatal_config(&self) -> bool {
        matches!(self, PmStatError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, PmStatError>;
