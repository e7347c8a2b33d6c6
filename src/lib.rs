#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Code Reference
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────────┐   ┌────────────────────┐   ┌─────────────┐   ┌──────────────────┐
//! │ sweep root   │──▶│ BoundedTraceReader │──▶│ TraceParser │──▶│ SchemeClassifier │
//! │ <label>_<n>/ │   │ (entry cap)        │   │ ParsedLine  │   │ E0 / E1 / E2     │
//! └──────────────┘   └────────────────────┘   └─────────────┘   └────────┬─────────┘
//!        ▲                                                               │
//!        │                                                               ▼
//! ┌──────┴───────┐                                        ┌──────────────────────────┐
//! │SweepCollator │◀───────────── one value per trace ─────│ DtAggregator             │
//! │ SweepSeries  │                                        │ HitRateAggregator        │
//! └──────────────┘                                        └──────────────────────────┘
//! ```
//!
//! ## Quick Reference
//!
//! | Type | Module | Produces |
//! |------|--------|----------|
//! | [`TraceParser`] | [`record`] | one [`ParsedLine`] per input line |
//! | [`BoundedTraceReader`] | [`reader`] | capped stream of parsed lines |
//! | [`DtAggregator`] | [`metrics`] | peak / median DT, median series, binned group peaks |
//! | [`HitRateAggregator`] | [`metrics`] | LRU hit rate for one cache size, recorded hit rate |
//! | [`SweepCollator`] | [`sweep`] | [`SweepSeries`] across parameter directories |
//!
//! ## Peak DT of One Trace
//!
//! ```no_run
//! use flash_dt::{read_records, AnalysisConfig, DtAggregator, DtGrouping, TimeUnit, TraceMetrics};
//!
//! # fn main() -> flash_dt::Result<()> {
//! let config = AnalysisConfig::new("data/e1_dt_slru", TimeUnit::Microseconds);
//! let mut dt = DtAggregator::from_config(&config);
//! read_records(&config.data_dir, &config, |record| dt.observe(&record))?;
//!
//! for (scheme, peak) in dt.peak_by_scheme() {
//!     match peak {
//!         Some(ms) => println!("{scheme}: {ms:.1} ms"),
//!         None => println!("{scheme}: not enough samples"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: analysis configuration and its enums
//! - [`error`]: the crate error type
//! - [`record`]: trace records and line parsing
//! - [`reader`]: trace discovery and the bounded reader
//! - [`scheme`]: eviction scheme labels and classifiers
//! - [`metrics`]: DT and hit-rate aggregators
//! - [`stats`]: percentiles, binning and smoothing
//! - [`sweep`]: parameter sweeps (parallel collation requires the `concurrent` feature)

/// Analysis configuration.
///
/// One explicit [`AnalysisConfig`] carries every knob the reader, the
/// aggregators and the sweep need: data location, entry cap, timestamp unit,
/// line format and DT options.
pub mod config;

/// Error type shared by the crate.
pub mod error;

/// Trace records and line parsing.
///
/// Every input line becomes exactly one [`ParsedLine`]: a record, or a skip
/// with its reason and line number.
pub mod record;

/// Trace discovery and bounded streaming reads.
pub mod reader;

/// Eviction scheme labels and the classifiers that assign them.
pub mod scheme;

/// Aggregators that turn a record stream into figure data.
pub mod metrics;

/// Percentile, binning and smoothing helpers.
pub mod stats;

/// Parameter sweeps across configuration directories.
pub mod sweep;

pub use config::{AnalysisConfig, DtGrouping, TimeUnit, TraceFormat};
pub use error::{Result, TraceError};
pub use metrics::{
    CacheCapacity, DtAggregator, HitRateAggregator, MedianBucket, MedianSeries, PeakBin,
    PeakBinning, TraceMetrics,
};
pub use reader::{discover_trace_file, read_records, BoundedTraceReader, DiscoveryPolicy, ReadStats};
pub use record::{parse_line, ParsedLine, SkipReason, TraceParser, TraceRecord};
pub use scheme::{PipelineModulo, SchemeClassifier, SchemeLabel, TagThenPipeline};
pub use sweep::{
    OmittedPoint, ParameterRule, SizeUnit, SweepCollator, SweepMetric, SweepPoint, SweepReport,
    SweepSeries,
};
