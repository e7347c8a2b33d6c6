//! Disk-head time (DT) aggregation
//!
//! DT is derived from the gap between consecutive requests that share a
//! grouping (the same key by default). Every such gap is one [`DtSample`],
//! attributed to the eviction scheme of the later request. Gaps that go
//! backwards because of out-of-order timestamps are clamped to zero and
//! counted, never rejected.
//!
//! Summaries:
//!
//! - **Peak DT**: 95th percentile of a scheme's samples, in milliseconds.
//! - **Median DT**: 50th percentile, same rules.
//! - **Median series**: samples bucketed by time, one median per bucket,
//!   plus the request volume of the bucket and the global minimum marker.
//! - **Binned peaks**: per-group peaks binned by a per-group statistic (mean
//!   gap or access rate), see [`PeakBinning`].
//!
//! Anything computed from fewer than two samples is `None`.
//!
//! # Examples
//!
//! ```
//! use flash_dt::config::DtGrouping;
//! use flash_dt::metrics::{DtAggregator, TraceMetrics};
//! use flash_dt::record::TraceRecord;
//!
//! let mut dt = DtAggregator::new(DtGrouping::Key);
//! for (ts, pipeline) in [(10.0, 0), (10.5, 1), (11.0, 2)] {
//!     dt.observe(&TraceRecord::new(ts, "block-7", pipeline));
//! }
//! assert_eq!(dt.overall_peak_dt(), Some(500.0));
//! assert_eq!(dt.overall_median_dt(), Some(500.0));
//! ```

use std::collections::BTreeMap;

use hashbrown::HashMap;
use serde::Serialize;

use crate::config::{AnalysisConfig, DtGrouping};
use crate::record::TraceRecord;
use crate::scheme::{PipelineModulo, SchemeClassifier, SchemeLabel};
use crate::stats::{self, gaussian_smooth, median_of_sorted, SMOOTHING_MIN_LEN};

use super::TraceMetrics;

/// Percentile reported as "peak" DT
pub const PEAK_PERCENTILE: f64 = 95.0;

const MILLIS_PER_SECOND: f64 = 1000.0;

/// One inter-arrival gap
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DtSample {
    /// Timestamp of the later request, seconds
    pub timestamp: f64,
    /// Gap to the previous request of the same group, seconds (never negative)
    pub inter_arrival_seconds: f64,
    /// Scheme of the later request
    pub scheme: SchemeLabel,
    #[serde(skip)]
    group: u32,
}

/// Peak DT of a single group (one key, pipeline or scheme)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupPeak {
    /// Key, pipeline id or scheme label, depending on the grouping
    pub label: String,
    /// Scheme of the first request seen in the group
    pub scheme: SchemeLabel,
    /// 95th percentile of the group's gaps, milliseconds
    pub peak_dt_ms: f64,
    /// Mean of the group's gaps, milliseconds
    pub mean_gap_ms: f64,
    /// Gaps sampled for the group
    pub samples: usize,
}

/// Per-group value that [`DtAggregator::binned_peaks`] bins on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroupStatistic {
    /// Mean gap in milliseconds (the group's τ)
    MeanGapMs,
    /// Access rate `1000 / mean gap in ms` (the group's α_TTI); undefined
    /// for a zero mean gap
    AlphaTti,
}

impl GroupStatistic {
    /// The statistic for `group`, if defined
    pub fn of(&self, group: &GroupPeak) -> Option<f64> {
        match self {
            GroupStatistic::MeanGapMs => Some(group.mean_gap_ms),
            GroupStatistic::AlphaTti => {
                (group.mean_gap_ms > 0.0).then(|| MILLIS_PER_SECOND / group.mean_gap_ms)
            }
        }
    }
}

/// How the peaks that share a bin are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinReducer {
    /// Arithmetic mean
    Mean,
    /// Median; a lone value is its own median
    Median,
}

impl BinReducer {
    fn reduce(&self, values: &mut [f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            BinReducer::Mean => stats::mean(values),
            BinReducer::Median => {
                values.sort_by(f64::total_cmp);
                Some(median_of_sorted(values))
            }
        }
    }
}

/// Settings of a binned per-group peak analysis
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakBinning {
    /// Value each group is binned on
    pub statistic: GroupStatistic,
    /// Number of equal-width bins
    pub bins: usize,
    /// How peaks sharing a bin are combined
    pub reducer: BinReducer,
    /// Groups whose statistic is outside this open interval are dropped
    pub statistic_range: Option<(f64, f64)>,
    /// Groups whose peak is outside `(0, max)` are dropped
    pub max_peak_ms: Option<f64>,
}

impl PeakBinning {
    /// Bin count used by the presets
    pub const DEFAULT_BINS: usize = 15;

    /// Mean peak per bin of mean gap, no filtering
    pub fn tau() -> Self {
        Self {
            statistic: GroupStatistic::MeanGapMs,
            bins: Self::DEFAULT_BINS,
            reducer: BinReducer::Mean,
            statistic_range: None,
            max_peak_ms: None,
        }
    }

    /// Median peak per bin of access rate, keeping `0 < α < 20` and
    /// `0 < peak < 10 s`
    pub fn alpha_tti() -> Self {
        Self {
            statistic: GroupStatistic::AlphaTti,
            bins: Self::DEFAULT_BINS,
            reducer: BinReducer::Median,
            statistic_range: Some((0.0, 20.0)),
            max_peak_ms: Some(10_000.0),
        }
    }

    /// Same analysis with `bins` bins
    pub fn with_bins(mut self, bins: usize) -> Self {
        self.bins = bins;
        self
    }

    fn keeps(&self, statistic: f64, peak_dt_ms: f64) -> bool {
        let in_range = self
            .statistic_range
            .map_or(true, |(lo, hi)| statistic > lo && statistic < hi);
        let peak_ok = self
            .max_peak_ms
            .map_or(true, |max| peak_dt_ms > 0.0 && peak_dt_ms < max);
        statistic.is_finite() && in_range && peak_ok
    }
}

/// One bin of a binned per-group peak analysis
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakBin {
    /// Lower edge, inclusive
    pub bin_start: f64,
    /// Upper edge; exclusive except for the last bin
    pub bin_end: f64,
    /// Groups that fell in the bin
    pub groups: usize,
    /// Mean statistic of those groups
    pub mean_statistic: Option<f64>,
    /// Their peaks, combined by the reducer; `None` for an empty bin
    pub peak_dt_ms: Option<f64>,
}

impl PeakBin {
    /// Midpoint of the bin edges
    pub fn center(&self) -> f64 {
        (self.bin_start + self.bin_end) / 2.0
    }
}

#[derive(Debug)]
struct GroupState {
    id: u32,
    last_timestamp: Option<f64>,
}

#[derive(Debug)]
struct GroupInfo {
    label: String,
    scheme: SchemeLabel,
}

#[derive(Debug)]
enum GroupIndex {
    Key(HashMap<String, GroupState>),
    Pipeline(HashMap<i64, GroupState>),
    Scheme(HashMap<SchemeLabel, GroupState>),
}

impl GroupIndex {
    fn new(grouping: DtGrouping) -> Self {
        match grouping {
            DtGrouping::Key => GroupIndex::Key(HashMap::new()),
            DtGrouping::Pipeline => GroupIndex::Pipeline(HashMap::new()),
            DtGrouping::Scheme => GroupIndex::Scheme(HashMap::new()),
        }
    }

    /// Records `record` as the latest request of its group.
    ///
    /// Returns the group id and the timestamp of the group's previous request.
    fn touch(
        &mut self,
        record: &TraceRecord,
        scheme: SchemeLabel,
        groups: &mut Vec<GroupInfo>,
    ) -> (u32, Option<f64>) {
        let next_id = groups.len() as u32;
        let mut new_group = |label: String| {
            groups.push(GroupInfo { label, scheme });
            GroupState {
                id: next_id,
                last_timestamp: None,
            }
        };

        let state = match self {
            GroupIndex::Key(map) => map
                .entry_ref(record.key.as_str())
                .or_insert_with(|| new_group(record.key.clone())),
            GroupIndex::Pipeline(map) => map
                .entry(record.pipeline_id)
                .or_insert_with(|| new_group(record.pipeline_id.to_string())),
            GroupIndex::Scheme(map) => map
                .entry(scheme)
                .or_insert_with(|| new_group(scheme.to_string())),
        };
        (state.id, state.last_timestamp.replace(record.timestamp))
    }
}

/// Streams records into DT samples and summarizes them
#[derive(Debug)]
pub struct DtAggregator<C = PipelineModulo> {
    classifier: C,
    grouping: DtGrouping,
    max_gap_seconds: Option<f64>,
    index: GroupIndex,
    groups: Vec<GroupInfo>,
    samples: Vec<DtSample>,
    arrivals: Vec<f64>,
    clamped: u64,
    dropped_gaps: u64,
}

impl DtAggregator<PipelineModulo> {
    /// Aggregator using the `pipeline_id mod 3` scheme mapping
    pub fn new(grouping: DtGrouping) -> Self {
        Self::with_classifier(PipelineModulo, grouping)
    }

    /// Aggregator set up from the grouping and gap ceiling of `config`
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.grouping).with_max_gap(config.max_gap_seconds)
    }
}

impl<C: SchemeClassifier> DtAggregator<C> {
    /// Aggregator attributing records with `classifier`
    pub fn with_classifier(classifier: C, grouping: DtGrouping) -> Self {
        Self {
            classifier,
            grouping,
            max_gap_seconds: None,
            index: GroupIndex::new(grouping),
            groups: Vec::new(),
            samples: Vec::new(),
            arrivals: Vec::new(),
            clamped: 0,
            dropped_gaps: 0,
        }
    }

    /// Drops gaps of `seconds` or more instead of sampling them
    pub fn with_max_gap(mut self, seconds: Option<f64>) -> Self {
        self.max_gap_seconds = seconds;
        self
    }

    /// What requests share to form a sample
    pub fn grouping(&self) -> DtGrouping {
        self.grouping
    }

    /// Records folded in so far
    pub fn records(&self) -> usize {
        self.arrivals.len()
    }

    /// Every sample so far, in arrival order
    pub fn samples(&self) -> &[DtSample] {
        &self.samples
    }

    /// Gaps that were negative and got clamped to zero
    pub fn clamped(&self) -> u64 {
        self.clamped
    }

    /// Gaps dropped for exceeding the gap ceiling
    pub fn dropped_gaps(&self) -> u64 {
        self.dropped_gaps
    }

    fn values_ms(&self, scheme: Option<SchemeLabel>) -> Vec<f64> {
        self.samples
            .iter()
            .filter(|s| scheme.map_or(true, |wanted| s.scheme == wanted))
            .map(|s| s.inter_arrival_seconds * MILLIS_PER_SECOND)
            .collect()
    }

    /// 95th percentile DT of `scheme` in milliseconds
    pub fn peak_dt(&self, scheme: SchemeLabel) -> Option<f64> {
        stats::percentile(&self.values_ms(Some(scheme)), PEAK_PERCENTILE)
    }

    /// Median DT of `scheme` in milliseconds
    pub fn median_dt(&self, scheme: SchemeLabel) -> Option<f64> {
        stats::median(&self.values_ms(Some(scheme)))
    }

    /// 95th percentile DT over every sample, in milliseconds
    pub fn overall_peak_dt(&self) -> Option<f64> {
        stats::percentile(&self.values_ms(None), PEAK_PERCENTILE)
    }

    /// Median DT over every sample, in milliseconds
    pub fn overall_median_dt(&self) -> Option<f64> {
        stats::median(&self.values_ms(None))
    }

    /// Peak DT for each of the three schemes
    pub fn peak_by_scheme(&self) -> BTreeMap<SchemeLabel, Option<f64>> {
        SchemeLabel::all()
            .into_iter()
            .map(|scheme| (scheme, self.peak_dt(scheme)))
            .collect()
    }

    /// Peak DT of every group with enough samples, in first-seen order
    pub fn group_peaks(&self) -> Vec<GroupPeak> {
        let mut per_group: Vec<Vec<f64>> = vec![Vec::new(); self.groups.len()];
        for sample in &self.samples {
            per_group[sample.group as usize].push(sample.inter_arrival_seconds * MILLIS_PER_SECOND);
        }

        per_group
            .into_iter()
            .zip(&self.groups)
            .filter_map(|(values, info)| {
                let peak = stats::percentile(&values, PEAK_PERCENTILE)?;
                Some(GroupPeak {
                    label: info.label.clone(),
                    scheme: info.scheme,
                    peak_dt_ms: peak,
                    mean_gap_ms: stats::mean(&values)?,
                    samples: values.len(),
                })
            })
            .collect()
    }

    /// Mean of the per-group peaks whose group belongs to `scheme`.
    ///
    /// Most meaningful with [`DtGrouping::Pipeline`], where every group maps
    /// to exactly one scheme.
    pub fn mean_group_peak_dt(&self, scheme: SchemeLabel) -> Option<f64> {
        let peaks: Vec<f64> = self
            .group_peaks()
            .into_iter()
            .filter(|g| g.scheme == scheme)
            .map(|g| g.peak_dt_ms)
            .collect();
        stats::mean(&peaks)
    }

    /// Per-group peaks binned by a per-group statistic.
    ///
    /// Every group with a peak (see [`group_peaks`](Self::group_peaks)) that
    /// passes the filters of `binning` contributes one `(statistic, peak)`
    /// pair. The pairs are split into equal-width bins over the observed
    /// statistic range. Empty bins are kept with a `None` peak. A range of a
    /// single value gives a single bin. No surviving groups gives no bins.
    pub fn binned_peaks(&self, binning: &PeakBinning) -> Vec<PeakBin> {
        let pairs: Vec<(f64, f64)> = self
            .group_peaks()
            .iter()
            .filter_map(|group| {
                let statistic = binning.statistic.of(group)?;
                binning
                    .keeps(statistic, group.peak_dt_ms)
                    .then_some((statistic, group.peak_dt_ms))
            })
            .collect();

        let statistics: Vec<f64> = pairs.iter().map(|(statistic, _)| *statistic).collect();
        let Some((edges, index)) = stats::equal_width_bins(&statistics, binning.bins) else {
            return Vec::new();
        };

        let mut members: Vec<(Vec<f64>, Vec<f64>)> = vec![Default::default(); edges.len() - 1];
        for ((statistic, peak), bin) in pairs.into_iter().zip(index) {
            members[bin].0.push(statistic);
            members[bin].1.push(peak);
        }

        members
            .into_iter()
            .zip(edges.windows(2))
            .map(|((statistics, mut peaks), edge)| PeakBin {
                bin_start: edge[0],
                bin_end: edge[1],
                groups: peaks.len(),
                mean_statistic: stats::mean(&statistics),
                peak_dt_ms: binning.reducer.reduce(&mut peaks),
            })
            .collect()
    }

    /// Median DT per fixed-width time bucket.
    ///
    /// Buckets start at the earliest observed request and are `bucket_width`
    /// seconds wide. A sample falls in the bucket of its later request; the
    /// volume of a bucket is the number of requests that arrived in it.
    /// Buckets without samples are left out. Recomputed on every call.
    pub fn median_series(&self, bucket_width: f64) -> MedianSeries {
        let origin = self.arrivals.iter().copied().reduce(f64::min);
        let Some(origin) = origin.filter(|_| bucket_width.is_finite() && bucket_width > 0.0)
        else {
            return MedianSeries::default();
        };
        let bucket_of = |t: f64| ((t - origin) / bucket_width).floor() as u64;

        let mut buckets: BTreeMap<u64, (Vec<f64>, u64)> = BTreeMap::new();
        for &t in &self.arrivals {
            buckets.entry(bucket_of(t)).or_default().1 += 1;
        }
        for sample in &self.samples {
            buckets
                .entry(bucket_of(sample.timestamp))
                .or_default()
                .0
                .push(sample.inter_arrival_seconds * MILLIS_PER_SECOND);
        }

        let buckets = buckets
            .into_iter()
            .filter_map(|(bucket, (mut values, volume))| {
                if values.is_empty() {
                    return None;
                }
                values.sort_by(f64::total_cmp);
                Some(MedianBucket {
                    bucket_start: origin + bucket as f64 * bucket_width,
                    median_dt_ms: median_of_sorted(&values),
                    request_volume: volume as f64,
                })
            })
            .collect();
        MedianSeries { buckets }
    }
}

impl<C: SchemeClassifier> TraceMetrics for DtAggregator<C> {
    fn observe(&mut self, record: &TraceRecord) {
        self.arrivals.push(record.timestamp);
        let scheme = self.classifier.classify(record);
        let (group, previous) = self.index.touch(record, scheme, &mut self.groups);
        let Some(previous) = previous else {
            return;
        };

        let mut gap = record.timestamp - previous;
        if gap < 0.0 {
            self.clamped += 1;
            gap = 0.0;
        }
        if self.max_gap_seconds.is_some_and(|max| gap >= max) {
            self.dropped_gaps += 1;
            return;
        }

        self.samples.push(DtSample {
            timestamp: record.timestamp,
            inter_arrival_seconds: gap,
            scheme,
            group,
        });
    }

    fn metrics(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        metrics.insert("records".to_string(), self.records() as f64);
        metrics.insert("samples".to_string(), self.samples.len() as f64);
        metrics.insert("groups".to_string(), self.groups.len() as f64);
        metrics.insert("clamped".to_string(), self.clamped as f64);
        metrics.insert("dropped_gaps".to_string(), self.dropped_gaps as f64);

        if let Some(peak) = self.overall_peak_dt() {
            metrics.insert("peak_dt_ms".to_string(), peak);
        }
        if let Some(median) = self.overall_median_dt() {
            metrics.insert("median_dt_ms".to_string(), median);
        }
        for (scheme, peak) in self.peak_by_scheme() {
            if let Some(peak) = peak {
                metrics.insert(format!("peak_dt_ms_{scheme}"), peak);
            }
        }
        metrics
    }

    fn name(&self) -> &'static str {
        "DT"
    }
}

/// One row of the median-DT time series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MedianBucket {
    /// Bucket start, seconds (same clock as the trace)
    pub bucket_start: f64,
    /// Median gap of the bucket, milliseconds
    pub median_dt_ms: f64,
    /// Requests that arrived in the bucket (fractional once smoothed)
    pub request_volume: f64,
}

/// Time-ordered median-DT buckets
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MedianSeries {
    buckets: Vec<MedianBucket>,
}

impl MedianSeries {
    /// Buckets in time order
    pub fn buckets(&self) -> &[MedianBucket] {
        &self.buckets
    }

    /// Iterates the buckets in time order
    pub fn iter(&self) -> std::slice::Iter<'_, MedianBucket> {
        self.buckets.iter()
    }

    /// Number of buckets
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// True when no bucket had samples
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// `(bucket_start, median_dt_ms)` of the lowest median; the earliest wins ties.
    pub fn min_marker(&self) -> Option<(f64, f64)> {
        self.buckets
            .iter()
            .fold(None, |best: Option<&MedianBucket>, bucket| match best {
                Some(b) if b.median_dt_ms <= bucket.median_dt_ms => Some(b),
                _ => Some(bucket),
            })
            .map(|b| (b.bucket_start, b.median_dt_ms))
    }

    /// Gaussian-smoothed copy of the medians and volumes.
    ///
    /// Series of [`SMOOTHING_MIN_LEN`] buckets or fewer come back unchanged.
    pub fn smoothed(&self, sigma: f64) -> MedianSeries {
        if self.buckets.len() <= SMOOTHING_MIN_LEN {
            return self.clone();
        }
        let medians: Vec<f64> = self.buckets.iter().map(|b| b.median_dt_ms).collect();
        let volumes: Vec<f64> = self.buckets.iter().map(|b| b.request_volume).collect();
        let medians = gaussian_smooth(&medians, sigma);
        let volumes = gaussian_smooth(&volumes, sigma);

        let buckets = self
            .buckets
            .iter()
            .zip(medians.into_iter().zip(volumes))
            .map(|(b, (median_dt_ms, request_volume))| MedianBucket {
                bucket_start: b.bucket_start,
                median_dt_ms,
                request_volume,
            })
            .collect();
        MedianSeries { buckets }
    }

    /// Consumes the series
    pub fn into_vec(self) -> Vec<MedianBucket> {
        self.buckets
    }
}

impl<'a> IntoIterator for &'a MedianSeries {
    type Item = &'a MedianBucket;
    type IntoIter = std::slice::Iter<'a, MedianBucket>;

    fn into_iter(self) -> Self::IntoIter {
        self.buckets.iter()
    }
}
