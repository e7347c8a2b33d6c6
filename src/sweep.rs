//! Parameter sweeps
//!
//! A sweep root holds one subdirectory per configuration, each named after
//! the swept parameter (`cache_64GB`, `tau_dt_0.5`, ...) and each holding one
//! trace. [`SweepCollator`] walks the root, reads every trace through a fresh
//! [`BoundedTraceReader`](crate::reader::BoundedTraceReader), computes one
//! [`SweepMetric`] per directory and returns the points ordered by parameter
//! value.
//!
//! A bad directory never sinks the sweep: names that do not match the rule,
//! duplicate parameter values and traces that cannot be read are left out of
//! the series and listed in [`SweepReport::omitted`] instead.
//!
//! ```no_run
//! use flash_dt::config::{AnalysisConfig, TimeUnit};
//! use flash_dt::sweep::{ParameterRule, SweepCollator, SweepMetric};
//!
//! # fn main() -> flash_dt::error::Result<()> {
//! let config = AnalysisConfig::new("data/cache_sweep", TimeUnit::Seconds);
//! let collator = SweepCollator::new(config);
//! let report = collator.collect(&ParameterRule::cache_size_gb()?, &SweepMetric::PeakDt(None))?;
//! for point in report.series.iter() {
//!     println!("{} GB -> {:?}", point.parameter_value, point.metric_value);
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use hashbrown::HashSet;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::error::{Result, TraceError};
use crate::metrics::{CacheCapacity, DtAggregator, HitRateAggregator, TraceMetrics};
use crate::reader::read_records;
use crate::scheme::{PipelineModulo, SchemeClassifier, SchemeLabel};

/// Binary size units accepted in directory names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SizeUnit {
    /// Bytes
    B,
    /// Kibibytes
    KB,
    /// Mebibytes
    MB,
    /// Gibibytes
    GB,
    /// Tebibytes
    TB,
}

impl SizeUnit {
    /// Bytes in one of this unit (powers of 1024)
    pub fn bytes(self) -> f64 {
        match self {
            SizeUnit::B => 1.0,
            SizeUnit::KB => 1024.0,
            SizeUnit::MB => 1024.0 * 1024.0,
            SizeUnit::GB => 1024.0 * 1024.0 * 1024.0,
            SizeUnit::TB => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        }
    }

    /// Suffix as written in directory names
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeUnit::B => "B",
            SizeUnit::KB => "KB",
            SizeUnit::MB => "MB",
            SizeUnit::GB => "GB",
            SizeUnit::TB => "TB",
        }
    }
}

impl fmt::Display for SizeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "B" => Ok(SizeUnit::B),
            "K" | "KB" | "KIB" => Ok(SizeUnit::KB),
            "M" | "MB" | "MIB" => Ok(SizeUnit::MB),
            "G" | "GB" | "GIB" => Ok(SizeUnit::GB),
            "T" | "TB" | "TIB" => Ok(SizeUnit::TB),
            _ => Err(format!("unknown size unit '{s}'")),
        }
    }
}

/// How a parameter value is read out of a directory name.
///
/// Names look like `<label>_<number><unit>`. With a size unit the suffix may
/// be any size unit and the value is converted into the rule's unit; a bare
/// number is taken as already being in the rule's unit. Without a unit only
/// bare numbers match.
#[derive(Debug, Clone)]
pub struct ParameterRule {
    label: String,
    unit: Option<SizeUnit>,
    pattern: Regex,
}

impl ParameterRule {
    /// Rule for directories named `<label>_<number><unit>`.
    ///
    /// The label may only hold ASCII letters, digits, `_` and `-`.
    pub fn new(label: impl Into<String>, unit: Option<SizeUnit>) -> Result<Self> {
        let label = label.into();
        if label.is_empty() || !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(TraceError::InvalidRule {
                label,
                reason: "label must be non-empty ASCII letters, digits, '_' or '-'".to_string(),
            });
        }
        let pattern = Regex::new(&format!(
            r"^{}_([0-9]+(?:\.[0-9]+)?)([A-Za-z]*)$",
            regex::escape(&label)
        ))
        .map_err(|e| TraceError::InvalidRule {
            label: label.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            label,
            unit,
            pattern,
        })
    }

    /// `cache_<n>GB`, values in GB
    pub fn cache_size_gb() -> Result<Self> {
        Self::new("cache", Some(SizeUnit::GB))
    }

    /// `tau_dt_<n>`
    pub fn tau_dt() -> Result<Self> {
        Self::new("tau_dt", None)
    }

    /// `protected_cap_<n>`
    pub fn protected_cap() -> Result<Self> {
        Self::new("protected_cap", None)
    }

    /// `alpha_tti_<n>`
    pub fn alpha_tti() -> Result<Self> {
        Self::new("alpha_tti", None)
    }

    /// Directory name prefix
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Size unit values are expressed in, if any
    pub fn unit(&self) -> Option<SizeUnit> {
        self.unit
    }

    /// Parameter value encoded in `name`, or `None` if it does not match.
    ///
    /// ```
    /// use flash_dt::sweep::ParameterRule;
    ///
    /// let rule = ParameterRule::cache_size_gb().unwrap();
    /// assert_eq!(rule.parse_dir_name("cache_64GB"), Some(64.0));
    /// assert_eq!(rule.parse_dir_name("cache_512MB"), Some(0.5));
    /// assert_eq!(rule.parse_dir_name("cache_bogus"), None);
    /// ```
    pub fn parse_dir_name(&self, name: &str) -> Option<f64> {
        let caps = self.pattern.captures(name)?;
        let value: f64 = caps[1].parse().ok()?;
        let suffix = &caps[2];

        match self.unit {
            None if suffix.is_empty() => Some(value),
            None => None,
            Some(_) if suffix.is_empty() => Some(value),
            Some(unit) => {
                let from: SizeUnit = suffix.parse().ok()?;
                Some(value * from.bytes() / unit.bytes())
            }
        }
    }

    /// A value of this rule expressed in bytes, for size rules only
    pub fn to_bytes(&self, value: f64) -> Option<f64> {
        self.unit.map(|unit| value * unit.bytes())
    }
}

/// Statistic computed for each sweep point
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum SweepMetric {
    /// 95th percentile DT of one scheme, or of all samples
    PeakDt(Option<SchemeLabel>),
    /// Median DT of one scheme, or of all samples
    MedianDt(Option<SchemeLabel>),
    /// Mean of per-group peak DTs belonging to a scheme
    MeanGroupPeakDt(SchemeLabel),
    /// Hit rate of a fixed cache size
    HitRate(CacheCapacity),
    /// Hit rate of a cache as large as the swept parameter
    HitRateAtParameter,
}

impl fmt::Display for SweepMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepMetric::PeakDt(None) => f.write_str("peak_dt_ms"),
            SweepMetric::PeakDt(Some(s)) => write!(f, "peak_dt_ms_{s}"),
            SweepMetric::MedianDt(None) => f.write_str("median_dt_ms"),
            SweepMetric::MedianDt(Some(s)) => write!(f, "median_dt_ms_{s}"),
            SweepMetric::MeanGroupPeakDt(s) => write!(f, "mean_group_peak_dt_ms_{s}"),
            SweepMetric::HitRate(_) | SweepMetric::HitRateAtParameter => f.write_str("hit_rate"),
        }
    }
}

/// One swept configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SweepPoint {
    /// Swept parameter, in the rule's unit
    pub parameter_value: f64,
    /// `None` when the trace had too little data for the metric
    pub metric_value: Option<f64>,
    /// Samples (or requests, for hit rates) the metric was computed from
    pub sample_count: usize,
    /// The entry cap stopped reading this trace early
    pub truncated: bool,
}

/// Sweep points in ascending parameter order, one per parameter value
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepSeries {
    points: Vec<SweepPoint>,
}

impl SweepSeries {
    /// Sorts `points` by parameter value. If a value repeats, the first
    /// point given for it is kept.
    pub fn new(mut points: Vec<SweepPoint>) -> Self {
        points.sort_by(|a, b| a.parameter_value.total_cmp(&b.parameter_value));
        points.dedup_by(|later, earlier| later.parameter_value == earlier.parameter_value);
        Self { points }
    }

    /// Points in parameter order
    pub fn points(&self) -> &[SweepPoint] {
        &self.points
    }

    /// Iterates the points in parameter order
    pub fn iter(&self) -> std::slice::Iter<'_, SweepPoint> {
        self.points.iter()
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when no point was collected
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point at exactly `parameter_value`
    pub fn get(&self, parameter_value: f64) -> Option<&SweepPoint> {
        self.points
            .iter()
            .find(|p| p.parameter_value == parameter_value)
    }

    /// `(parameter_value, metric_value)` pairs, ready for plotting
    pub fn values(&self) -> Vec<(f64, Option<f64>)> {
        self.points
            .iter()
            .map(|p| (p.parameter_value, p.metric_value))
            .collect()
    }

    /// Every metric divided by the metric at `baseline`.
    ///
    /// `None` when there is no point at `baseline` or its metric is missing
    /// or zero. Points with a missing metric stay missing.
    pub fn normalized_to(&self, baseline: f64) -> Option<SweepSeries> {
        let base = self
            .get(baseline)?
            .metric_value
            .filter(|v| *v != 0.0 && v.is_finite())?;
        let points = self
            .points
            .iter()
            .map(|p| SweepPoint {
                metric_value: p.metric_value.map(|v| v / base),
                ..*p
            })
            .collect();
        Some(SweepSeries { points })
    }
}

impl<'a> IntoIterator for &'a SweepSeries {
    type Item = &'a SweepPoint;
    type IntoIter = std::slice::Iter<'a, SweepPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// A subdirectory that did not make it into the series
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OmittedPoint {
    /// Directory name
    pub name: String,
    /// Why it was left out
    pub reason: String,
}

/// Result of one sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    /// Collected points
    pub series: SweepSeries,
    /// Directories left out, in name order
    pub omitted: Vec<OmittedPoint>,
    /// Entry cap every trace was read with
    pub max_entries: usize,
}

impl SweepReport {
    /// Points whose trace was cut off by the entry cap
    pub fn truncated_points(&self) -> usize {
        self.series.iter().filter(|p| p.truncated).count()
    }
}

#[derive(Debug)]
struct Candidate {
    name: String,
    path: PathBuf,
    value: f64,
}

/// Runs one metric over every configuration directory of a sweep root
#[derive(Debug)]
pub struct SweepCollator<C = PipelineModulo> {
    config: AnalysisConfig,
    classifier: C,
}

impl SweepCollator<PipelineModulo> {
    /// Collator attributing records with `pipeline_id mod 3`
    pub fn new(config: AnalysisConfig) -> Self {
        Self::with_classifier(config, PipelineModulo)
    }
}

impl<C: SchemeClassifier> SweepCollator<C> {
    /// Collator attributing records with `classifier`
    pub fn with_classifier(config: AnalysisConfig, classifier: C) -> Self {
        Self { config, classifier }
    }

    /// Configuration every trace is read with
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Collects `metric` for every subdirectory of the configured
    /// `data_dir` matching `rule`, one directory at a time.
    ///
    /// Fails only when the sweep as a whole cannot run: an invalid
    /// configuration, a metric that does not fit the rule, or an unreadable
    /// root. Everything else ends up in [`SweepReport::omitted`].
    pub fn collect(&self, rule: &ParameterRule, metric: &SweepMetric) -> Result<SweepReport> {
        let (candidates, omitted) = self.plan(rule, metric)?;
        let outcomes = candidates
            .into_iter()
            .map(|candidate| {
                let outcome = self.measure(&candidate, rule, metric);
                (candidate, outcome)
            })
            .collect();
        Ok(self.assemble(outcomes, omitted))
    }

    /// Same as [`collect`](Self::collect) with one scoped thread per
    /// directory. The series is ordered by parameter value and the omitted
    /// list by name, whatever order the workers finish in.
    #[cfg(feature = "concurrent")]
    pub fn collect_parallel(&self, rule: &ParameterRule, metric: &SweepMetric) -> Result<SweepReport>
    where
        C: Sync,
    {
        use parking_lot::Mutex;

        let (candidates, omitted) = self.plan(rule, metric)?;
        let results = Mutex::new(Vec::with_capacity(candidates.len()));

        std::thread::scope(|scope| {
            for (index, candidate) in candidates.iter().enumerate() {
                let results = &results;
                scope.spawn(move || {
                    let outcome = self.measure(candidate, rule, metric);
                    results.lock().push((index, outcome));
                });
            }
        });

        let mut results = results.into_inner();
        results.sort_by_key(|(index, _)| *index);
        let outcomes = candidates
            .into_iter()
            .zip(results.into_iter().map(|(_, outcome)| outcome))
            .collect();
        Ok(self.assemble(outcomes, omitted))
    }

    /// Lists the directories to measure, in name order, with the ones that
    /// are left out up front.
    fn plan(
        &self,
        rule: &ParameterRule,
        metric: &SweepMetric,
    ) -> Result<(Vec<Candidate>, Vec<OmittedPoint>)> {
        self.config.validate()?;
        let root = self.config.data_dir.as_path();
        if matches!(metric, SweepMetric::HitRateAtParameter) && rule.unit().is_none() {
            return Err(TraceError::InvalidRule {
                label: rule.label().to_string(),
                reason: "hit rate at parameter needs a size unit".to_string(),
            });
        }

        let entries = fs::read_dir(root).map_err(|e| TraceError::io(root, e))?;
        let mut dirs: Vec<(String, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TraceError::io(root, e))?;
            let path = entry.path();
            if path.is_dir() {
                dirs.push((entry.file_name().to_string_lossy().into_owned(), path));
            }
        }
        dirs.sort();

        let mut candidates = Vec::with_capacity(dirs.len());
        let mut omitted = Vec::new();
        let mut seen = HashSet::new();
        for (name, path) in dirs {
            let Some(value) = rule.parse_dir_name(&name) else {
                warn!(dir = %name, label = rule.label(), "directory name does not match parameter rule");
                omitted.push(OmittedPoint {
                    name,
                    reason: format!("name does not match '{}_<number>'", rule.label()),
                });
                continue;
            };
            if !seen.insert(value.to_bits()) {
                warn!(dir = %name, value, "duplicate parameter value, keeping the first directory");
                omitted.push(OmittedPoint {
                    name,
                    reason: format!("duplicate parameter value {value}"),
                });
                continue;
            }
            candidates.push(Candidate { name, path, value });
        }
        debug!(
            root = %root.display(),
            points = candidates.len(),
            omitted = omitted.len(),
            "planned sweep"
        );
        Ok((candidates, omitted))
    }

    fn measure(&self, candidate: &Candidate, rule: &ParameterRule, metric: &SweepMetric) -> Result<SweepPoint> {
        let (metric_value, sample_count, truncated) = match *metric {
            SweepMetric::PeakDt(scheme) | SweepMetric::MedianDt(scheme) => {
                let (dt, truncated) = self.read_dt(&candidate.path)?;
                let count = dt
                    .samples()
                    .iter()
                    .filter(|s| scheme.map_or(true, |wanted| s.scheme == wanted))
                    .count();
                let peak = matches!(metric, SweepMetric::PeakDt(_));
                let value = match (peak, scheme) {
                    (true, Some(s)) => dt.peak_dt(s),
                    (true, None) => dt.overall_peak_dt(),
                    (false, Some(s)) => dt.median_dt(s),
                    (false, None) => dt.overall_median_dt(),
                };
                (value, count, truncated)
            }
            SweepMetric::MeanGroupPeakDt(scheme) => {
                let (dt, truncated) = self.read_dt(&candidate.path)?;
                let count = dt
                    .group_peaks()
                    .iter()
                    .filter(|g| g.scheme == scheme)
                    .map(|g| g.samples)
                    .sum();
                (dt.mean_group_peak_dt(scheme), count, truncated)
            }
            SweepMetric::HitRate(capacity) => self.read_hit_rate(&candidate.path, capacity)?,
            SweepMetric::HitRateAtParameter => {
                let capacity = rule
                    .to_bytes(candidate.value)
                    .and_then(CacheCapacity::from_bytes_f64)
                    .ok_or_else(|| TraceError::InvalidRule {
                        label: rule.label().to_string(),
                        reason: format!("{} is not a usable cache size", candidate.value),
                    })?;
                self.read_hit_rate(&candidate.path, capacity)?
            }
        };

        Ok(SweepPoint {
            parameter_value: candidate.value,
            metric_value,
            sample_count,
            truncated,
        })
    }

    fn read_dt(&self, dir: &Path) -> Result<(DtAggregator<&C>, bool)> {
        let mut dt = DtAggregator::with_classifier(&self.classifier, self.config.grouping)
            .with_max_gap(self.config.max_gap_seconds);
        let stats = read_records(dir, &self.config, |record| dt.observe(&record))?;
        Ok((dt, stats.truncated))
    }

    fn read_hit_rate(&self, dir: &Path, capacity: CacheCapacity) -> Result<(Option<f64>, usize, bool)> {
        let mut hits = HitRateAggregator::with_classifier(&self.classifier, capacity);
        let stats = read_records(dir, &self.config, |record| hits.observe(&record))?;
        let requests = usize::try_from(hits.requests()).unwrap_or(usize::MAX);
        Ok((hits.hit_rate(), requests, stats.truncated))
    }

    fn assemble(&self, outcomes: Vec<(Candidate, Result<SweepPoint>)>, mut omitted: Vec<OmittedPoint>) -> SweepReport {
        let mut points = Vec::with_capacity(outcomes.len());
        for (candidate, outcome) in outcomes {
            match outcome {
                Ok(point) => points.push(point),
                Err(e) => {
                    warn!(dir = %candidate.name, error = %e, "omitting sweep point");
                    omitted.push(OmittedPoint {
                        name: candidate.name,
                        reason: e.to_string(),
                    });
                }
            }
        }
        omitted.sort_by(|a, b| a.name.cmp(&b.name));

        let series = SweepSeries::new(points);
        info!(
            points = series.len(),
            omitted = omitted.len(),
            max_entries = self.config.max_entries,
            "sweep complete"
        );
        SweepReport {
            series,
            omitted,
            max_entries: self.config.max_entries,
        }
    }
}
