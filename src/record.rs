//! Trace records and line parsing
//!
//! Every raw line turns into exactly one [`ParsedLine`]: either a
//! [`TraceRecord`] or a skip carrying the reason and the 1-based line number.
//! Parsing never fails; a broken line only costs that line.

use core::fmt;

use serde::Serialize;

use crate::config::{TimeUnit, TraceFormat};

/// Minimum field count of a Baleen storage-trace line
const BALEEN_MIN_FIELDS: usize = 8;

/// Column of the recorded hit flag in a Baleen line
const BALEEN_HIT_FIELD: usize = 7;

/// A single request observed in a trace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceRecord {
    /// Request time in seconds
    pub timestamp: f64,
    /// Request key (block id for storage traces)
    pub key: String,
    /// Object size in bytes, when the trace carries it
    pub size: Option<u64>,
    /// Pipeline the request was issued by
    pub pipeline_id: i64,
    /// Scheme tag recorded alongside the request, if any
    pub raw_scheme_tag: Option<String>,
    /// Hit flag the tracing cache recorded for this request, if any
    pub hit: Option<bool>,
}

impl TraceRecord {
    /// Record with no size, scheme tag or hit flag
    pub fn new(timestamp: f64, key: impl Into<String>, pipeline_id: i64) -> Self {
        Self {
            timestamp,
            key: key.into(),
            size: None,
            pipeline_id,
            raw_scheme_tag: None,
            hit: None,
        }
    }

    /// Sets the object size in bytes
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets the recorded hit flag
    pub fn with_hit(mut self, hit: bool) -> Self {
        self.hit = Some(hit);
        self
    }
}

/// Why a line did not produce a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SkipReason {
    /// Empty or whitespace-only line
    Blank,
    /// Line starting with `#`
    Comment,
    /// Column header on line 1
    Header,
    /// Too few or too many fields, or a field that does not parse
    MalformedFields,
    /// Timestamp missing, unparsable or not finite
    BadTimestamp,
    /// Line bytes are not valid UTF-8
    InvalidUtf8,
}

impl SkipReason {
    /// Stable snake_case name used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Blank => "blank",
            SkipReason::Comment => "comment",
            SkipReason::Header => "header",
            SkipReason::MalformedFields => "malformed_fields",
            SkipReason::BadTimestamp => "bad_timestamp",
            SkipReason::InvalidUtf8 => "invalid_utf8",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of parsing one line
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// The line produced a record
    Ok(TraceRecord),
    /// The line was skipped
    Skipped {
        /// Why it was skipped
        reason: SkipReason,
        /// 1-based line number in the trace
        line_number: usize,
    },
}

impl ParsedLine {
    /// True when the line produced a record
    pub fn is_ok(&self) -> bool {
        matches!(self, ParsedLine::Ok(_))
    }

    /// The record, if the line produced one
    pub fn record(&self) -> Option<&TraceRecord> {
        match self {
            ParsedLine::Ok(record) => Some(record),
            ParsedLine::Skipped { .. } => None,
        }
    }

    /// Consumes the line, keeping only the record
    pub fn into_record(self) -> Option<TraceRecord> {
        match self {
            ParsedLine::Ok(record) => Some(record),
            ParsedLine::Skipped { .. } => None,
        }
    }
}

/// Parses a comma-separated line whose timestamps are in seconds.
///
/// Shorthand for `TraceParser::default().parse_line(raw, line_number)`.
///
/// ```
/// use flash_dt::record::{parse_line, ParsedLine, SkipReason};
///
/// let parsed = parse_line("1000.5,keyA,4096,1", 2);
/// assert_eq!(parsed.record().map(|r| r.pipeline_id), Some(1));
///
/// assert_eq!(
///     parse_line("# header comment", 1),
///     ParsedLine::Skipped { reason: SkipReason::Comment, line_number: 1 }
/// );
/// ```
pub fn parse_line(raw: &str, line_number: usize) -> ParsedLine {
    TraceParser::default().parse_line(raw, line_number)
}

/// Line parser for one trace layout and timestamp unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceParser {
    format: TraceFormat,
    time_unit: TimeUnit,
}

impl Default for TraceParser {
    fn default() -> Self {
        Self::new(TraceFormat::Csv, TimeUnit::Seconds)
    }
}

impl TraceParser {
    /// Parser for `format` whose timestamps are in `time_unit`
    pub fn new(format: TraceFormat, time_unit: TimeUnit) -> Self {
        Self { format, time_unit }
    }

    /// Layout this parser expects
    pub fn format(&self) -> TraceFormat {
        self.format
    }

    /// Unit of the raw timestamps
    pub fn time_unit(&self) -> TimeUnit {
        self.time_unit
    }

    /// Parses one raw line. `line_number` is 1-based and only used to label skips.
    pub fn parse_line(&self, raw: &str, line_number: usize) -> ParsedLine {
        let line = raw.trim();
        let skip = |reason| ParsedLine::Skipped {
            reason,
            line_number,
        };

        if line.is_empty() {
            return skip(SkipReason::Blank);
        }
        if line.starts_with('#') {
            return skip(SkipReason::Comment);
        }
        if line_number == 1 && line.to_ascii_lowercase().contains("timestamp") {
            return skip(SkipReason::Header);
        }

        let parsed = match self.format {
            TraceFormat::Csv => self.parse_csv(line),
            TraceFormat::Baleen => self.parse_baleen(line),
        };
        match parsed {
            Ok(record) => ParsedLine::Ok(record),
            Err(reason) => skip(reason),
        }
    }

    fn timestamp(&self, field: &str) -> Result<f64, SkipReason> {
        let raw: f64 = field.parse().map_err(|_| SkipReason::BadTimestamp)?;
        if !raw.is_finite() {
            return Err(SkipReason::BadTimestamp);
        }
        Ok(raw * self.time_unit.to_seconds_factor())
    }

    fn parse_csv(&self, line: &str) -> Result<TraceRecord, SkipReason> {
        let mut fields = line.split(',').map(str::trim);

        let (Some(ts), Some(key)) = (fields.next(), fields.next()) else {
            return Err(SkipReason::MalformedFields);
        };
        let timestamp = self.timestamp(ts)?;
        if key.is_empty() {
            return Err(SkipReason::MalformedFields);
        }

        let size = match fields.next() {
            None | Some("") => None,
            Some(s) => Some(s.parse::<u64>().map_err(|_| SkipReason::MalformedFields)?),
        };
        let pipeline_id = match fields.next() {
            None | Some("") => 0,
            Some(p) => p.parse::<i64>().map_err(|_| SkipReason::MalformedFields)?,
        };
        let raw_scheme_tag = fields
            .next()
            .filter(|tag| !tag.is_empty())
            .map(str::to_string);
        let hit = match fields.next() {
            None | Some("") => None,
            Some(flag) => Some(parse_hit_flag(flag).ok_or(SkipReason::MalformedFields)?),
        };
        if fields.next().is_some() {
            return Err(SkipReason::MalformedFields);
        }

        Ok(TraceRecord {
            timestamp,
            key: key.to_string(),
            size,
            pipeline_id,
            raw_scheme_tag,
            hit,
        })
    }

    fn parse_baleen(&self, line: &str) -> Result<TraceRecord, SkipReason> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < BALEEN_MIN_FIELDS {
            return Err(SkipReason::MalformedFields);
        }

        let block_id: u64 = fields[0]
            .parse()
            .map_err(|_| SkipReason::MalformedFields)?;
        let size: u64 = fields[2]
            .parse()
            .map_err(|_| SkipReason::MalformedFields)?;
        let timestamp = self.timestamp(fields[3])?;
        let pipeline_id: i64 = fields[5]
            .parse()
            .map_err(|_| SkipReason::MalformedFields)?;

        // traces without a hit column carry free-form text here
        let hit = fields[BALEEN_HIT_FIELD]
            .parse::<i64>()
            .ok()
            .map(|flag| flag == 1);

        Ok(TraceRecord {
            timestamp,
            key: block_id.to_string(),
            size: Some(size),
            pipeline_id,
            raw_scheme_tag: None,
            hit,
        })
    }
}

fn parse_hit_flag(field: &str) -> Option<bool> {
    match field {
        "1" => Some(true),
        "0" => Some(false),
        _ if field.eq_ignore_ascii_case("true") => Some(true),
        _ if field.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}
