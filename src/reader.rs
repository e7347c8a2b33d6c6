//! Bounded, streaming trace reader
//!
//! A [`BoundedTraceReader`] pulls one line at a time from a single trace file
//! and hands out [`ParsedLine`] values until either the file ends or the
//! configured number of `Ok` records has been produced. Nothing past that
//! point is read, so memory use downstream is proportional to the entry cap
//! and not to the size of the file.
//!
//! Given a directory, the reader picks exactly one trace file with the
//! [`DiscoveryPolicy::FirstMatchBySortOrder`] policy. Traces are never merged.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::error::{Result, TraceError};
use crate::record::{ParsedLine, SkipReason, TraceParser, TraceRecord};

/// Read buffer size; trace lines are short, large buffers keep syscalls down
const READ_BUFFER_BYTES: usize = 1024 * 1024;

/// How a trace file is picked out of a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryPolicy {
    /// Sort the glob matches by path and take the first one
    #[default]
    FirstMatchBySortOrder,
}

/// Resolves `path` to a single trace file.
///
/// Files are returned unchanged. For a directory the matches of `pattern`
/// (relative to the directory) are sorted and the first regular file wins.
pub fn discover_trace_file(path: &Path, pattern: &str, policy: DiscoveryPolicy) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    if !path.is_dir() {
        return Err(TraceError::SourceNotFound {
            dir: path.to_path_buf(),
            pattern: pattern.to_string(),
        });
    }

    let full_pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&path.to_string_lossy()),
        pattern
    );
    let entries = glob::glob(&full_pattern).map_err(|e| {
        TraceError::InvalidConfig(format!("bad trace glob '{pattern}': {e}"))
    })?;

    let mut matches: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(error = %e, "skipping unreadable glob match");
                None
            }
        })
        .filter(|p| p.is_file())
        .collect();

    match policy {
        DiscoveryPolicy::FirstMatchBySortOrder => {
            matches.sort();
            if matches.len() > 1 {
                debug!(
                    dir = %path.display(),
                    candidates = matches.len(),
                    "several trace files found, using the first"
                );
            }
            matches
                .into_iter()
                .next()
                .ok_or_else(|| TraceError::SourceNotFound {
                    dir: path.to_path_buf(),
                    pattern: pattern.to_string(),
                })
        }
    }
}

/// Counters describing one pass over a trace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Lines pulled from the file
    pub lines_read: usize,
    /// `Ok` records produced
    pub records: usize,
    /// Lines skipped, for any reason
    pub skipped: usize,
    /// Records whose timestamp went backwards
    pub out_of_order: usize,
    /// Reading stopped at the entry cap; the file may or may not have had more
    pub truncated: bool,
}

/// Streaming reader over a single trace file
///
/// Yields `Result<ParsedLine, TraceError>`. Lines that are not valid UTF-8
/// are skipped like any other malformed line. An I/O error mid-file is
/// yielded once and the reader is finished afterwards. The reader cannot be
/// rewound; open a new one for another pass.
#[derive(Debug)]
pub struct BoundedTraceReader<R = BufReader<File>> {
    path: PathBuf,
    reader: Option<R>,
    parser: TraceParser,
    max_entries: usize,
    line_buffer: Vec<u8>,
    last_timestamp: Option<f64>,
    stats: ReadStats,
}

impl BoundedTraceReader {
    /// Opens the trace at `path` (a file, or a directory to discover one in).
    ///
    /// Fails with [`TraceError::InvalidConfig`] when `config` does not validate.
    pub fn open(path: impl AsRef<Path>, config: &AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let path = discover_trace_file(
            path.as_ref(),
            &config.trace_glob,
            DiscoveryPolicy::default(),
        )?;
        let file = File::open(&path).map_err(|e| TraceError::io(&path, e))?;
        debug!(path = %path.display(), max_entries = config.max_entries, "opened trace");

        Ok(Self::from_reader(
            path,
            BufReader::with_capacity(READ_BUFFER_BYTES, file),
            config,
        ))
    }
}

impl<R: BufRead> BoundedTraceReader<R> {
    /// Wraps an already open source. `path` only labels logs and errors.
    pub fn from_reader(path: impl Into<PathBuf>, reader: R, config: &AnalysisConfig) -> Self {
        Self {
            path: path.into(),
            reader: Some(reader),
            parser: TraceParser::new(config.format, config.time_unit),
            max_entries: config.max_entries,
            line_buffer: Vec::with_capacity(256),
            last_timestamp: None,
            stats: ReadStats::default(),
        }
    }

    /// The trace file actually being read
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Counters for the lines read so far
    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    fn parse_buffered_line(&self) -> ParsedLine {
        let line_number = self.stats.lines_read;
        match std::str::from_utf8(&self.line_buffer) {
            Ok(line) => self.parser.parse_line(line, line_number),
            Err(_) => ParsedLine::Skipped {
                reason: SkipReason::InvalidUtf8,
                line_number,
            },
        }
    }

    fn note_order(&mut self, record: &TraceRecord) {
        if let Some(last) = self.last_timestamp {
            if record.timestamp < last {
                self.stats.out_of_order += 1;
                debug!(
                    line = self.stats.lines_read,
                    timestamp = record.timestamp,
                    previous = last,
                    "timestamp went backwards"
                );
            }
        }
        self.last_timestamp = Some(record.timestamp);
    }
}

impl<R: BufRead> Iterator for BoundedTraceReader<R> {
    type Item = Result<ParsedLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stats.records >= self.max_entries {
            if self.reader.take().is_some() {
                self.stats.truncated = true;
            }
            return None;
        }

        let reader = self.reader.as_mut()?;
        self.line_buffer.clear();
        match reader.read_until(b'\n', &mut self.line_buffer) {
            Ok(0) => {
                self.reader = None;
                None
            }
            Ok(_) => {
                self.stats.lines_read += 1;
                let parsed = self.parse_buffered_line();
                match &parsed {
                    ParsedLine::Ok(record) => {
                        self.stats.records += 1;
                        self.note_order(record);
                    }
                    ParsedLine::Skipped { .. } => self.stats.skipped += 1,
                }
                Some(Ok(parsed))
            }
            Err(e) => {
                self.reader = None;
                Some(Err(TraceError::io(&self.path, e)))
            }
        }
    }
}

/// Reads a whole (capped) trace, feeding each record to `sink`.
///
/// Skipped lines are logged at debug level. Returns the read counters once
/// the reader is exhausted, or the first I/O error.
pub fn read_records<F>(path: impl AsRef<Path>, config: &AnalysisConfig, mut sink: F) -> Result<ReadStats>
where
    F: FnMut(TraceRecord),
{
    let mut reader = BoundedTraceReader::open(path, config)?;
    for parsed in &mut reader {
        match parsed? {
            ParsedLine::Ok(record) => sink(record),
            ParsedLine::Skipped {
                reason,
                line_number,
            } => debug!(line = line_number, %reason, "skipped trace line"),
        }
    }

    let stats = reader.stats();
    if stats.out_of_order > 0 {
        warn!(
            path = %reader.path().display(),
            out_of_order = stats.out_of_order,
            "trace timestamps are not monotonic"
        );
    }
    info!(
        path = %reader.path().display(),
        records = stats.records,
        skipped = stats.skipped,
        truncated = stats.truncated,
        "finished reading trace"
    );
    Ok(stats)
}
