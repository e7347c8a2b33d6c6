//! Eviction scheme classification
//!
//! Traces do not say which eviction variant served a request, so records are
//! attributed to a scheme by a [`SchemeClassifier`]. The default,
//! [`PipelineModulo`], spreads pipelines over the three schemes with
//! `pipeline_id mod 3`. That is an approximation, not a policy lookup; it sits
//! behind the trait so a faithful mapping can replace it without the
//! aggregators noticing.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TraceError;
use crate::record::TraceRecord;

/// Number of eviction schemes under comparison
pub const SCHEME_COUNT: usize = 3;

/// Eviction scheme a record is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SchemeLabel {
    /// Scheme of pipelines `0, 3, 6, ...`
    E0,
    /// Scheme of pipelines `1, 4, 7, ...`
    E1,
    /// Scheme of pipelines `2, 5, 8, ...`
    E2,
}

impl SchemeLabel {
    /// Maps a pipeline id to a scheme, normalizing negative ids into `[0, 3)`.
    pub fn from_pipeline(pipeline_id: i64) -> Self {
        match pipeline_id.rem_euclid(SCHEME_COUNT as i64) {
            0 => SchemeLabel::E0,
            1 => SchemeLabel::E1,
            _ => SchemeLabel::E2,
        }
    }

    /// Position in [`SchemeLabel::all`]
    pub fn index(self) -> usize {
        match self {
            SchemeLabel::E0 => 0,
            SchemeLabel::E1 => 1,
            SchemeLabel::E2 => 2,
        }
    }

    /// `"E0"`, `"E1"` or `"E2"`
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemeLabel::E0 => "E0",
            SchemeLabel::E1 => "E1",
            SchemeLabel::E2 => "E2",
        }
    }

    /// All labels in index order
    pub fn all() -> [SchemeLabel; SCHEME_COUNT] {
        [SchemeLabel::E0, SchemeLabel::E1, SchemeLabel::E2]
    }
}

impl fmt::Display for SchemeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemeLabel {
    type Err = TraceError;

    /// Accepts `E0`..`E2` with an optional descriptive suffix, e.g. `E1-DT-SLRU`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let head = s
            .trim()
            .split(|c: char| c == '-' || c == '_' || c.is_whitespace())
            .next()
            .unwrap_or_default();
        match head.to_ascii_uppercase().as_str() {
            "E0" => Ok(SchemeLabel::E0),
            "E1" => Ok(SchemeLabel::E1),
            "E2" => Ok(SchemeLabel::E2),
            _ => Err(TraceError::InvalidConfig(format!(
                "unknown eviction scheme '{s}'"
            ))),
        }
    }
}

/// Attributes a record to an eviction scheme
pub trait SchemeClassifier {
    fn classify(&self, record: &TraceRecord) -> SchemeLabel;
}

/// `pipeline_id mod 3`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineModulo;

impl SchemeClassifier for PipelineModulo {
    fn classify(&self, record: &TraceRecord) -> SchemeLabel {
        SchemeLabel::from_pipeline(record.pipeline_id)
    }
}

/// Trusts a recorded scheme tag and falls back to [`PipelineModulo`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagThenPipeline;

impl SchemeClassifier for TagThenPipeline {
    fn classify(&self, record: &TraceRecord) -> SchemeLabel {
        record
            .raw_scheme_tag
            .as_deref()
            .and_then(|tag| tag.parse().ok())
            .unwrap_or_else(|| PipelineModulo.classify(record))
    }
}

impl<C: SchemeClassifier + ?Sized> SchemeClassifier for &C {
    fn classify(&self, record: &TraceRecord) -> SchemeLabel {
        (**self).classify(record)
    }
}
