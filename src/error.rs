//! Error types for trace analysis
//!
//! Only failures that stop work on a whole trace (or a whole sweep call) are
//! errors. Per-line problems are reported as [`ParsedLine::Skipped`] and
//! metrics without enough data come back as `None`.
//!
//! [`ParsedLine::Skipped`]: crate::record::ParsedLine::Skipped

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while locating, reading or sweeping traces
#[derive(Debug, Error)]
pub enum TraceError {
    /// No trace file matched the discovery pattern in the given directory
    #[error("no trace file matching '{pattern}' in {}", dir.display())]
    SourceNotFound { dir: PathBuf, pattern: String },

    /// The trace file (or directory) could not be opened or read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A sweep parameter rule could not be compiled or does not fit the metric
    #[error("invalid parameter rule '{label}': {reason}")]
    InvalidRule { label: String, reason: String },

    /// A configuration value is out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TraceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TraceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, TraceError>;
