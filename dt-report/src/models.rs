// Data models for DT reports

use serde::Serialize;

/// One row of the peak DT report, one per scheme plus an `all` row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakRow {
    pub scheme: String,
    pub samples: usize,
    pub peak_dt_ms: Option<f64>,
    pub median_dt_ms: Option<f64>,
    /// Mean of per-group peaks; only filled for scheme rows
    pub mean_group_peak_dt_ms: Option<f64>,
}

/// One median-DT time bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MedianRow {
    pub bucket_start: f64,
    pub median_dt_ms: f64,
    pub request_volume: f64,
    /// Marks the bucket holding the global minimum median
    pub is_min: bool,
}

/// Hit rate of one scheme (or `all`) for one cache size
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HitRateRow {
    pub scheme: String,
    pub capacity: String,
    pub hit_rate: Option<f64>,
    /// Hit rate from the trace's own hit flags, when it has them
    pub recorded_hit_rate: Option<f64>,
}

/// One bin of per-group peak DT against a per-group statistic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinRow {
    pub statistic: String,
    pub bin_start: f64,
    pub bin_end: f64,
    pub bin_center: f64,
    pub groups: usize,
    pub mean_statistic: Option<f64>,
    pub peak_dt_ms: Option<f64>,
}

/// One sweep point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepRow {
    pub parameter: String,
    pub parameter_value: f64,
    pub metric: String,
    pub metric_value: Option<f64>,
    /// Metric divided by the metric at the baseline parameter, if requested
    pub normalized: Option<f64>,
    pub sample_count: usize,
    pub truncated: bool,
}
