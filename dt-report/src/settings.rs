//! Settings file handling
//!
//! A TOML file can hold any of the analysis options so long sweeps do not
//! need a wall of flags. Command line flags win over the file.
//!
//! ```toml
//! time_unit = "us"
//! format = "baleen"
//! max_entries = 100000
//! grouping = "pipeline"
//! max_gap_seconds = 20.0
//! ```

use std::error::Error;
use std::path::{Path, PathBuf};

use flash_dt::config::{AnalysisConfig, DtGrouping, TimeUnit, TraceFormat};
use serde::{Deserialize, Serialize};

/// Analysis options as written in a settings file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub time_unit: Option<String>,
    pub format: Option<String>,
    pub max_entries: Option<usize>,
    pub trace_glob: Option<String>,
    pub grouping: Option<String>,
    pub bucket_width_seconds: Option<f64>,
    pub max_gap_seconds: Option<f64>,
    pub smoothing_sigma: Option<f64>,
}

impl Settings {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read settings {}: {e}", path.display()))?;
        let settings: Self = toml::from_str(&contents)?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Overlays `other` on top of `self`; fields set in `other` win.
    pub fn merged_with(self, other: Settings) -> Settings {
        Settings {
            time_unit: other.time_unit.or(self.time_unit),
            format: other.format.or(self.format),
            max_entries: other.max_entries.or(self.max_entries),
            trace_glob: other.trace_glob.or(self.trace_glob),
            grouping: other.grouping.or(self.grouping),
            bucket_width_seconds: other.bucket_width_seconds.or(self.bucket_width_seconds),
            max_gap_seconds: other.max_gap_seconds.or(self.max_gap_seconds),
            smoothing_sigma: other.smoothing_sigma.or(self.smoothing_sigma),
        }
    }

    /// Builds the analysis configuration for `data_dir`.
    ///
    /// The timestamp unit has no default and must come from somewhere.
    pub fn to_config(&self, data_dir: impl Into<PathBuf>) -> Result<AnalysisConfig, Box<dyn Error>> {
        let time_unit: TimeUnit = self
            .time_unit
            .as_deref()
            .ok_or("a timestamp unit is required (--time-unit or time_unit in the settings file)")?
            .parse()?;

        let mut config = AnalysisConfig::new(data_dir, time_unit)
            .with_max_gap(self.max_gap_seconds)
            .with_smoothing(self.smoothing_sigma);
        if let Some(format) = self.format.as_deref() {
            config = config.with_format(format.parse::<TraceFormat>()?);
        }
        if let Some(grouping) = self.grouping.as_deref() {
            config = config.with_grouping(grouping.parse::<DtGrouping>()?);
        }
        if let Some(max_entries) = self.max_entries {
            config = config.with_max_entries(max_entries);
        }
        if let Some(glob) = &self.trace_glob {
            config = config.with_trace_glob(glob.clone());
        }
        if let Some(width) = self.bucket_width_seconds {
            config = config.with_bucket_width(width);
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_parse() {
        let settings: Settings = toml::from_str(
            r#"
            time_unit = "us"
            format = "baleen"
            max_entries = 1000
            max_gap_seconds = 20.0
            "#,
        )
        .unwrap();
        let config = settings.to_config("traces").unwrap();
        assert_eq!(config.time_unit, TimeUnit::Microseconds);
        assert_eq!(config.format, TraceFormat::Baleen);
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.max_gap_seconds, Some(20.0));
        assert_eq!(config.grouping, DtGrouping::Key);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(toml::from_str::<Settings>("cache_size = 4").is_err());
    }

    #[test]
    fn test_time_unit_required() {
        let err = Settings::default().to_config("traces").unwrap_err();
        assert!(err.to_string().contains("timestamp unit"));
    }

    #[test]
    fn test_flags_override_file() {
        let file = Settings {
            time_unit: Some("s".to_string()),
            max_entries: Some(10),
            ..Settings::default()
        };
        let flags = Settings {
            max_entries: Some(20),
            ..Settings::default()
        };
        let merged = file.merged_with(flags);
        assert_eq!(merged.max_entries, Some(20));
        assert_eq!(merged.time_unit.as_deref(), Some("s"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let settings = Settings {
            time_unit: Some("s".to_string()),
            bucket_width_seconds: Some(0.0),
            ..Settings::default()
        };
        assert!(settings.to_config("traces").is_err());

        let settings = Settings {
            time_unit: Some("fortnights".to_string()),
            ..Settings::default()
        };
        assert!(settings.to_config("traces").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dt.toml");
        std::fs::write(&path, "time_unit = \"ms\"\ngrouping = \"pipeline\"\n").unwrap();
        let config = Settings::load(&path).unwrap().to_config("x").unwrap();
        assert_eq!(config.time_unit, TimeUnit::Milliseconds);
        assert_eq!(config.grouping, DtGrouping::Pipeline);
    }
}
