use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Clamped value domain and bucket resolution shared by every histogram job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramConfig {
    #[serde(default = "default_min_value")]
    pub min_value: f64,
    #[serde(default = "default_max_value")]
    pub max_value: f64,
    #[serde(default = "default_num_buckets")]
    pub num_buckets: usize,
}

fn default_min_value() -> f64 {
    0.0
}
fn default_max_value() -> f64 {
    500.0 // upper bound for PM2.5 concentrations
}
fn default_num_buckets() -> usize {
    1000
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            min_value: default_min_value(),
            max_value: default_max_value(),
            num_buckets: default_num_buckets(),
        }
    }
}

impl HistogramConfig {
    pub fn new(min_value: f64, max_value: f64, num_buckets: usize) -> crate::Result<Self> {
        let cfg = Self {
            min_value,
            max_value,
            num_buckets,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if !self.min_value.is_finite() || !self.max_value.is_finite() {
            return Err(crate::PmStatError::Config(format!(
                "histogram bounds must be finite, got [{}, {}]",
                self.min_value, self.max_value
            )));
        }
        if self.max_value <= self.min_value {
            return Err(crate::PmStatError::Config(format!(
                "histogram max_value ({}) must exceed min_value ({})",
                self.max_value, self.min_value
            )));
        }
        if self.num_buckets == 0 {
            return Err(crate::PmStatError::Config(
                "histogram needs at least one bucket".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_value_column")]
    pub value_column: String,
    /// Column layout of header-less rows seen by the normalizer.
    #[serde(default = "default_expected_fields")]
    pub expected_fields: Vec<String>,
}

fn default_value_column() -> String {
    "arithmetic_mean".into()
}
fn default_expected_fields() -> Vec<String> {
    [
        "date_local",
        "state_name",
        "county_name",
        "arithmetic_mean",
        "aqi",
        "first_max_value",
        "observation_count",
        "latitude",
        "longitude",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            value_column: default_value_column(),
            expected_fields: default_expected_fields(),
        }
    }
}

impl InputConfig {
    /// Position of the value column within `expected_fields`.
    pub fn value_index(&self) -> crate::Result<usize> {
        self.expected_fields
            .iter()
            .position(|f| f == &self.value_column)
            .ok_or_else(|| {
                crate::PmStatError::Config(format!(
                    "value column {:?} is not one of the expected fields",
                    self.value_column
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Percentiles derived from the merged histogram next to the job's own target.
    #[serde(default = "default_extra_percentiles")]
    pub extra_percentiles: Vec<f64>,
    #[serde(default = "default_chart_buckets")]
    pub chart_buckets: usize,
}

fn default_extra_percentiles() -> Vec<f64> {
    vec![0.5, 0.95, 0.99]
}
fn default_chart_buckets() -> usize {
    20
}

impl ReportConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if let Some(p) = self
            .extra_percentiles
            .iter()
            .find(|p| !(**p > 0.0 && **p < 1.0))
        {
            return Err(crate::PmStatError::Config(format!(
                "extra percentile {p} must lie strictly between 0 and 1"
            )));
        }
        Ok(())
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            extra_percentiles: default_extra_percentiles(),
            chart_buckets: default_chart_buckets(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub histogram: HistogramConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl Config {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pmstat")
            .join("config.toml")
    }

    fn resolved_path() -> PathBuf {
        if let Ok(env_path) = std::env::var("PMSTAT_CONFIG") {
            PathBuf::from(env_path) // $PMSTAT_CONFIG overrides default config path
        } else {
            Self::config_path()
        }
    }

    pub fn load() -> crate::Result<Self> {
        let path = Self::resolved_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let cfg: Self =
            toml::from_str(content).map_err(|e| crate::PmStatError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings that would only fail after input has been consumed.
    pub fn validate(&self) -> crate::Result<()> {
        self.histogram.validate()?;
        self.report.validate()
    }

    pub fn to_toml(&self) -> crate::Result<String> {
        toml::to_string_pretty(self).map_err(|e| crate::PmStatError::Other(e.to_string()))
    }

    pub fn save(&self) -> crate::Result<PathBuf> {
        let path = Self::resolved_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, self.to_toml()?)?;
        Ok(path)
    }
}
