//! Analysis Configuration
//!
//! All knobs that used to be baked into individual analysis scripts live in
//! [`AnalysisConfig`]: where the data is, how much of each trace to read, how
//! timestamps are encoded and how DT samples are grouped.
//!
//! The timestamp unit is a required constructor argument. Traces in the wild
//! use both seconds and microseconds and the two cannot be told apart from the
//! numbers alone, so no default is provided.
//!
//! # Examples
//!
//! ```
//! use flash_dt::config::{AnalysisConfig, TimeUnit, TraceFormat};
//!
//! let config = AnalysisConfig::new("/data/region1", TimeUnit::Seconds)
//!     .with_max_entries(10_000)
//!     .with_format(TraceFormat::Baleen);
//! assert_eq!(config.max_entries, 10_000);
//! assert!(config.validate().is_ok());
//! ```

use core::fmt;
use core::str::FromStr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TraceError};

/// Default number of `Ok` records read from a single trace
pub const DEFAULT_MAX_ENTRIES: usize = 50_000;

/// Default width of a median-DT time bucket (five minutes)
pub const DEFAULT_BUCKET_WIDTH_SECONDS: f64 = 300.0;

/// Default glob used to discover the trace file inside a directory
pub const DEFAULT_TRACE_GLOB: &str = "*.trace";

/// Unit of the raw timestamp column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Seconds
    Seconds,
    /// Milliseconds
    Milliseconds,
    /// Microseconds
    Microseconds,
}

impl TimeUnit {
    /// Multiplier converting a raw timestamp in this unit into seconds
    pub fn to_seconds_factor(self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Milliseconds => 1e-3,
            TimeUnit::Microseconds => 1e-6,
        }
    }

    /// Short name accepted on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Seconds => "seconds",
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Microseconds => "microseconds",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeUnit {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "seconds" => Ok(TimeUnit::Seconds),
            "ms" | "millis" | "milliseconds" => Ok(TimeUnit::Milliseconds),
            "us" | "micros" | "microseconds" => Ok(TimeUnit::Microseconds),
            other => Err(TraceError::InvalidConfig(format!(
                "unknown time unit '{other}'"
            ))),
        }
    }
}

/// Layout of a trace line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceFormat {
    /// `timestamp,key[,size][,pipeline_id][,scheme_tag]`
    #[default]
    Csv,
    /// Whitespace separated `block_id offset size time op pipeline namespace user`
    Baleen,
}

impl FromStr for TraceFormat {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(TraceFormat::Csv),
            "baleen" | "storage" => Ok(TraceFormat::Baleen),
            other => Err(TraceError::InvalidConfig(format!(
                "unknown trace format '{other}'"
            ))),
        }
    }
}

/// What two records must share for their gap to count as a DT sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtGrouping {
    /// Same request key (block id)
    #[default]
    Key,
    /// Same pipeline id
    Pipeline,
    /// Same eviction scheme label
    Scheme,
}

impl FromStr for DtGrouping {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "key" => Ok(DtGrouping::Key),
            "pipeline" => Ok(DtGrouping::Pipeline),
            "scheme" => Ok(DtGrouping::Scheme),
            other => Err(TraceError::InvalidConfig(format!(
                "unknown DT grouping '{other}'"
            ))),
        }
    }
}

/// Configuration shared by the reader, the aggregators and the sweep collator.
///
/// Fields are public so callers can build the struct directly; the `with_*`
/// methods exist for the common case of overriding a couple of defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Root directory holding the trace (or the sweep subdirectories)
    pub data_dir: PathBuf,
    /// Maximum number of `Ok` records read from one trace
    pub max_entries: usize,
    /// Width of a median-DT bucket in seconds
    pub bucket_width_seconds: f64,
    /// Unit of the raw timestamp column
    pub time_unit: TimeUnit,
    /// Line layout
    pub format: TraceFormat,
    /// Glob used to pick the trace file inside a directory
    pub trace_glob: String,
    /// DT sample grouping
    pub grouping: DtGrouping,
    /// Gaps longer than this (seconds) are not DT samples
    pub max_gap_seconds: Option<f64>,
    /// Gaussian sigma applied to the median series (in buckets)
    pub smoothing_sigma: Option<f64>,
}

impl AnalysisConfig {
    /// Creates a configuration with defaults for everything but the data
    /// location and the timestamp unit.
    pub fn new(data_dir: impl Into<PathBuf>, time_unit: TimeUnit) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_entries: DEFAULT_MAX_ENTRIES,
            bucket_width_seconds: DEFAULT_BUCKET_WIDTH_SECONDS,
            time_unit,
            format: TraceFormat::default(),
            trace_glob: DEFAULT_TRACE_GLOB.to_string(),
            grouping: DtGrouping::default(),
            max_gap_seconds: None,
            smoothing_sigma: None,
        }
    }

    /// Caps the `Ok` records read from each trace
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Width of median-series buckets, seconds
    pub fn with_bucket_width(mut self, seconds: f64) -> Self {
        self.bucket_width_seconds = seconds;
        self
    }

    /// Line layout of the traces
    pub fn with_format(mut self, format: TraceFormat) -> Self {
        self.format = format;
        self
    }

    /// Glob picking the trace file inside a directory
    pub fn with_trace_glob(mut self, glob: impl Into<String>) -> Self {
        self.trace_glob = glob.into();
        self
    }

    /// What consecutive requests share to form a DT sample
    pub fn with_grouping(mut self, grouping: DtGrouping) -> Self {
        self.grouping = grouping;
        self
    }

    /// Gap ceiling in seconds; `None` keeps every gap
    pub fn with_max_gap(mut self, seconds: Option<f64>) -> Self {
        self.max_gap_seconds = seconds;
        self
    }

    /// Gaussian sigma for the median series, in buckets
    pub fn with_smoothing(mut self, sigma: Option<f64>) -> Self {
        self.smoothing_sigma = sigma;
        self
    }

    /// Checks the numeric fields for values no analysis can work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(TraceError::InvalidConfig(
                "max entries must be at least 1".to_string(),
            ));
        }
        if !(self.bucket_width_seconds.is_finite() && self.bucket_width_seconds > 0.0) {
            return Err(TraceError::InvalidConfig(format!(
                "bucket width must be a positive number of seconds, got {}",
                self.bucket_width_seconds
            )));
        }
        if let Some(gap) = self.max_gap_seconds {
            if !(gap.is_finite() && gap > 0.0) {
                return Err(TraceError::InvalidConfig(format!(
                    "max gap must be positive, got {gap}"
                )));
            }
        }
        if let Some(sigma) = self.smoothing_sigma {
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(TraceError::InvalidConfig(format!(
                    "smoothing sigma must be positive, got {sigma}"
                )));
            }
        }
        if self.trace_glob.is_empty() {
            return Err(TraceError::InvalidConfig(
                "trace glob must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::new("data", TimeUnit::Microseconds);
        assert_eq!(config.max_entries, DEFAULT_MAX_ENTRIES);
        assert_eq!(config.trace_glob, "*.trace");
        assert_eq!(config.format, TraceFormat::Csv);
        assert_eq!(config.grouping, DtGrouping::Key);
        assert_eq!(config.time_unit, TimeUnit::Microseconds);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_time_unit_factor() {
        assert_eq!(TimeUnit::Seconds.to_seconds_factor(), 1.0);
        assert_eq!(TimeUnit::Milliseconds.to_seconds_factor(), 1e-3);
        assert_eq!(TimeUnit::Microseconds.to_seconds_factor(), 1e-6);
        assert_eq!("us".parse::<TimeUnit>().unwrap(), TimeUnit::Microseconds);
        assert!("fortnights".parse::<TimeUnit>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = AnalysisConfig::new("data", TimeUnit::Seconds).with_bucket_width(0.0);
        assert!(config.validate().is_err());

        let config = AnalysisConfig::new("data", TimeUnit::Seconds).with_max_gap(Some(-1.0));
        assert!(config.validate().is_err());

        let config = AnalysisConfig::new("data", TimeUnit::Seconds).with_smoothing(Some(f64::NAN));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_entry_cap() {
        let config = AnalysisConfig::new("data", TimeUnit::Seconds).with_max_entries(0);
        assert!(matches!(config.validate(), Err(TraceError::InvalidConfig(_))));
        assert!(config.with_max_entries(1).validate().is_ok());
    }
}
