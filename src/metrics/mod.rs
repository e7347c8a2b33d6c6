//! Trace Metrics
//!
//! Aggregators consume [`TraceRecord`]s one at a time and keep only the state
//! their statistics need. Each one implements [`TraceMetrics`] so callers can
//! feed and report on them uniformly.
//!
//! Reported counters come back as a `BTreeMap` so the key order is the same
//! on every run, which keeps CSV exports and test expectations stable.
//!
//! | Aggregator | Figure data |
//! |------------|-------------|
//! | [`DtAggregator`] | peak DT per scheme, median DT over time, peak DT binned by τ or α_TTI |
//! | [`HitRateAggregator`] | hit rate for one cache size, recorded hit rate |
//!
//! Statistics that need more data than was observed are returned as `None`
//! rather than a made-up number.

use std::collections::BTreeMap;

use crate::record::TraceRecord;

pub mod dt;
pub mod hit_rate;

pub use dt::{
    BinReducer, DtAggregator, DtSample, GroupPeak, GroupStatistic, MedianBucket, MedianSeries,
    PeakBin, PeakBinning,
};
pub use hit_rate::{CacheCapacity, HitRateAggregator};

/// Common interface of the trace aggregators
pub trait TraceMetrics {
    /// Folds one record into the aggregator state
    fn observe(&mut self, record: &TraceRecord);

    /// All counters and summary values, keyed by name in sorted order.
    ///
    /// Values that are not available (too few samples) are left out.
    fn metrics(&self) -> BTreeMap<String, f64>;

    /// Short name for logs and reports
    fn name(&self) -> &'static str;
}
