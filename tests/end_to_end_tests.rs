//! End-to-End Tests for Trace Analysis
//!
//! These tests drive the public API the way a report would: write traces to a
//! temporary directory, read them back through the bounded reader and check
//! the figures the aggregators produce.
//!
//! ## Test Strategy
//! - Tiny hand-written traces with gaps that are easy to verify by hand
//! - Directory layouts that mirror real sweep roots
//! - Properties that must hold for any trace (line accounting, determinism)

use flash_dt::config::{AnalysisConfig, DtGrouping, TimeUnit, TraceFormat};
use flash_dt::metrics::{CacheCapacity, DtAggregator, HitRateAggregator, PeakBinning, TraceMetrics};
use flash_dt::reader::{read_records, BoundedTraceReader};
use flash_dt::record::{ParsedLine, SkipReason, TraceRecord};
use flash_dt::scheme::{PipelineModulo, SchemeClassifier, SchemeLabel, TagThenPipeline};
use flash_dt::sweep::{ParameterRule, SweepCollator, SweepMetric};
use std::fs;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

// ============================================================================
// HELPERS
// ============================================================================

fn write_trace(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    let mut file = fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    path
}

fn lines(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

fn read_all(path: &Path, config: &AnalysisConfig) -> Vec<ParsedLine> {
    BoundedTraceReader::open(path, config)
        .unwrap()
        .map(|parsed| parsed.unwrap())
        .collect()
}

/// Deterministic mix of keys, pipelines and junk lines
fn synthetic_trace(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            if i % 17 == 5 {
                "# checkpoint".to_string()
            } else if i % 23 == 7 {
                "garbage".to_string()
            } else {
                let ts = i as f64 * 0.25 + ((i * 7) % 5) as f64 * 0.01;
                format!("{ts},key{},{},{}", i % 11, 512 * (1 + i % 4), i % 6)
            }
        })
        .collect()
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn test_single_trace_peak_and_median() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_trace(
        dir.path(),
        "a.trace",
        &lines(&[
            "1000.0,keyA,4096,0",
            "1000.5,keyA,4096,1",
            "# comment",
            "bogus,line",
            "1001.0,keyA,4096,2",
        ]),
    );
    let config = AnalysisConfig::new(dir.path(), TimeUnit::Seconds).with_max_entries(10);

    let parsed = read_all(&path, &config);
    assert_eq!(parsed.len(), 5);
    let records: Vec<&TraceRecord> = parsed.iter().filter_map(ParsedLine::record).collect();
    assert_eq!(records.len(), 3);
    let schemes: Vec<SchemeLabel> = records.iter().map(|r| PipelineModulo.classify(r)).collect();
    assert_eq!(schemes, vec![SchemeLabel::E0, SchemeLabel::E1, SchemeLabel::E2]);

    let skips: Vec<SkipReason> = parsed
        .iter()
        .filter_map(|p| match p {
            ParsedLine::Skipped { reason, .. } => Some(*reason),
            ParsedLine::Ok(_) => None,
        })
        .collect();
    assert_eq!(skips, vec![SkipReason::Comment, SkipReason::BadTimestamp]);

    let mut dt = DtAggregator::from_config(&config);
    read_records(dir.path(), &config, |record| dt.observe(&record)).unwrap();
    let gaps: Vec<f64> = dt.samples().iter().map(|s| s.inter_arrival_seconds).collect();
    assert_eq!(gaps, vec![0.5, 0.5]);
    assert!((dt.overall_peak_dt().unwrap() - 500.0).abs() < 1e-6);
    assert_eq!(dt.overall_median_dt(), Some(500.0));

    // one sample per scheme is not enough for a per-scheme percentile
    assert!(dt.peak_by_scheme().values().all(Option::is_none));
}

#[test]
fn test_cache_size_sweep() {
    let root = tempfile::tempdir().unwrap();
    for (name, step) in [("cache_64GB", 2.0), ("cache_128GB", 1.0), ("cache_bogus", 9.0)] {
        let trace: Vec<String> = (0..6).map(|i| format!("{},blk,4096,0", i as f64 * step)).collect();
        write_trace(&root.path().join(name), "run.trace", &trace);
    }

    let config = AnalysisConfig::new(root.path(), TimeUnit::Seconds);
    let report = SweepCollator::new(config)
        .collect(
            &ParameterRule::cache_size_gb().unwrap(),
            &SweepMetric::PeakDt(Some(SchemeLabel::E0)),
        )
        .unwrap();

    let values: Vec<f64> = report.series.iter().map(|p| p.parameter_value).collect();
    assert_eq!(values, vec![64.0, 128.0]);
    assert_eq!(report.series.points()[0].metric_value, Some(2000.0));
    assert_eq!(report.series.points()[1].metric_value, Some(1000.0));
    assert_eq!(report.omitted.len(), 1);
    assert_eq!(report.omitted[0].name, "cache_bogus");

    let normalized = report.series.normalized_to(64.0).unwrap();
    assert_eq!(normalized.values(), vec![(64.0, Some(1.0)), (128.0, Some(0.5))]);
}

#[test]
fn test_entry_cap_stops_reading() {
    let dir = tempfile::tempdir().unwrap();
    let mut trace = lines(&["# a", "# b", "# c", "# d", "# e"]);
    trace.extend((0..95).map(|i| format!("{i}.0,k{i},1,0")));
    let path = write_trace(dir.path(), "big.trace", &trace);
    let config = AnalysisConfig::new(dir.path(), TimeUnit::Seconds).with_max_entries(5);

    let mut reader = BoundedTraceReader::open(&path, &config).unwrap();
    let records: Vec<TraceRecord> = (&mut reader)
        .filter_map(|parsed| parsed.unwrap().into_record())
        .collect();
    assert_eq!(records.len(), 5);
    assert_eq!(records[4].key, "k4");

    let stats = reader.stats();
    assert_eq!(stats.lines_read, 10);
    assert!(stats.truncated);
    assert!(reader.next().is_none());
}

#[test]
fn test_baleen_trace_in_microseconds() {
    let dir = tempfile::tempdir().unwrap();
    write_trace(
        dir.path(),
        "region1.trace",
        &lines(&[
            "7 0 131072 1000000 1 3 ns user",
            "7 0 131072 1250000 1 4 ns user",
            "short line",
            "7 0 131072 1750000 1 3 ns user",
        ]),
    );
    let config = AnalysisConfig::new(dir.path(), TimeUnit::Microseconds)
        .with_format(TraceFormat::Baleen)
        .with_grouping(DtGrouping::Pipeline);

    let mut dt = DtAggregator::from_config(&config);
    let stats = read_records(dir.path(), &config, |record| dt.observe(&record)).unwrap();
    assert_eq!(stats.records, 3);
    assert_eq!(stats.skipped, 1);

    // pipeline 3 sees a single 0.75 s gap; pipeline 4 has nothing to pair with
    let gaps: Vec<f64> = dt.samples().iter().map(|s| s.inter_arrival_seconds).collect();
    assert_eq!(gaps.len(), 1);
    assert!((gaps[0] - 0.75).abs() < 1e-9);
    assert_eq!(dt.samples()[0].scheme, SchemeLabel::E0);
}

#[test]
fn test_baleen_recorded_hits_and_binned_peaks() {
    let dir = tempfile::tempdir().unwrap();
    // block 1 returns every second, block 2 every four seconds; last column is the hit flag
    write_trace(
        dir.path(),
        "region2.trace",
        &lines(&[
            "1 0 4096 0 1 0 0 0",
            "2 0 4096 0 1 1 0 0",
            "1 0 4096 1000000 1 0 0 1",
            "1 0 4096 2000000 1 0 0 1",
            "2 0 4096 4000000 1 1 0 1",
            "2 0 4096 8000000 1 1 0 0",
        ]),
    );
    let config = AnalysisConfig::new(dir.path(), TimeUnit::Microseconds).with_format(TraceFormat::Baleen);

    let mut dt = DtAggregator::from_config(&config);
    let mut hits = HitRateAggregator::new(CacheCapacity::Entries(NonZeroUsize::new(1).unwrap()));
    read_records(dir.path(), &config, |record| {
        dt.observe(&record);
        hits.observe(&record);
    })
    .unwrap();

    assert_eq!(hits.recorded_hit_rate(), Some(0.5));
    let recorded = hits.recorded_scheme_hit_rates();
    assert_eq!(recorded[&SchemeLabel::E0], Some(2.0 / 3.0));
    assert_eq!(recorded[&SchemeLabel::E1], Some(1.0 / 3.0));
    assert_eq!(recorded[&SchemeLabel::E2], None);

    let tau = dt.binned_peaks(&PeakBinning::tau().with_bins(2));
    let tau: Vec<_> = tau.iter().map(|b| (b.bin_start, b.peak_dt_ms)).collect();
    assert_eq!(tau, vec![(1000.0, Some(1000.0)), (2500.0, Some(4000.0))]);

    // access rate runs the other way: the slow block sits in the low bin
    let alpha = dt.binned_peaks(&PeakBinning::alpha_tti().with_bins(2));
    let alpha: Vec<_> = alpha.iter().map(|b| b.peak_dt_ms).collect();
    assert_eq!(alpha, vec![Some(4000.0), Some(1000.0)]);
}

#[test]
fn test_median_series_over_time() {
    let dir = tempfile::tempdir().unwrap();
    // 12 one-minute buckets, the gap shrinks towards the middle and grows again
    let mut trace = Vec::new();
    let mut ts = 0.0;
    for bucket in 0..12 {
        let gap = 1.0 + (bucket as f64 - 6.0).abs();
        while ts < (bucket + 1) as f64 * 60.0 {
            trace.push(format!("{ts},hot,64,0"));
            ts += gap;
        }
    }
    write_trace(dir.path(), "t.trace", &trace);
    let config = AnalysisConfig::new(dir.path(), TimeUnit::Seconds).with_bucket_width(60.0);

    let mut dt = DtAggregator::from_config(&config);
    read_records(dir.path(), &config, |record| dt.observe(&record)).unwrap();

    let series = dt.median_series(config.bucket_width_seconds);
    assert_eq!(series.len(), 12);
    let starts: Vec<f64> = series.iter().map(|b| b.bucket_start).collect();
    assert!(starts.windows(2).all(|w| w[0] < w[1]));
    let (min_start, min_value) = series.min_marker().unwrap();
    assert_eq!(min_start, 360.0);
    assert_eq!(min_value, 1000.0);

    let smoothed = series.smoothed(1.0);
    assert_eq!(smoothed.len(), 12);
    assert_eq!(smoothed.min_marker().unwrap().0, 360.0);
}

#[test]
fn test_scheme_tag_overrides_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    write_trace(
        dir.path(),
        "tagged.trace",
        &lines(&["0.0,k,1,0,E2-DT-LRU", "1.0,k,1,0,E2", "3.0,k,1,0,E2", "4.0,k,1,0"]),
    );
    let config = AnalysisConfig::new(dir.path(), TimeUnit::Seconds);

    let mut tagged = DtAggregator::with_classifier(TagThenPipeline, DtGrouping::Key);
    read_records(dir.path(), &config, |record| tagged.observe(&record)).unwrap();
    assert_eq!(tagged.median_dt(SchemeLabel::E2), Some(1500.0));
    assert_eq!(tagged.median_dt(SchemeLabel::E0), None);

    let mut plain = DtAggregator::new(DtGrouping::Key);
    read_records(dir.path(), &config, |record| plain.observe(&record)).unwrap();
    assert_eq!(plain.median_dt(SchemeLabel::E2), None);
    assert_eq!(plain.median_dt(SchemeLabel::E0), Some(1000.0));
}

// ============================================================================
// PROPERTIES
// ============================================================================

#[test]
fn test_every_line_accounted_for() {
    let dir = tempfile::tempdir().unwrap();
    let trace = synthetic_trace(400);
    let path = write_trace(dir.path(), "s.trace", &trace);
    let config = AnalysisConfig::new(dir.path(), TimeUnit::Seconds).with_max_entries(usize::MAX);

    let parsed = read_all(&path, &config);
    assert_eq!(parsed.len(), trace.len());
    let numbers: Vec<usize> = parsed
        .iter()
        .filter_map(|p| match p {
            ParsedLine::Skipped { line_number, .. } => Some(*line_number),
            ParsedLine::Ok(_) => None,
        })
        .collect();
    assert!(numbers.iter().all(|&n| n >= 1 && n <= trace.len()));
}

#[test]
fn test_rereading_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_trace(dir.path(), "s.trace", &synthetic_trace(300));
    let config = AnalysisConfig::new(dir.path(), TimeUnit::Seconds).with_max_entries(120);

    let first = read_all(&path, &config);
    let second = read_all(&path, &config);
    assert_eq!(first, second);
    assert_eq!(first.iter().filter(|p| p.is_ok()).count(), 120);
}

#[test]
fn test_peak_never_below_median() {
    let dir = tempfile::tempdir().unwrap();
    write_trace(dir.path(), "s.trace", &synthetic_trace(500));
    let config = AnalysisConfig::new(dir.path(), TimeUnit::Seconds);

    let mut dt = DtAggregator::from_config(&config);
    read_records(dir.path(), &config, |record| dt.observe(&record)).unwrap();

    assert!(dt.overall_peak_dt().unwrap() >= dt.overall_median_dt().unwrap());
    for scheme in SchemeLabel::all() {
        if let (Some(peak), Some(median)) = (dt.peak_dt(scheme), dt.median_dt(scheme)) {
            assert!(peak >= median, "{scheme}: {peak} < {median}");
        }
    }
}

#[test]
fn test_classification_depends_only_on_pipeline_residue() {
    for pipeline in -12i64..12 {
        let base = PipelineModulo.classify(&TraceRecord::new(0.0, "a", pipeline));
        for shift in [-6i64, 3, 9, 300] {
            let other = TraceRecord::new(99.0, "b", pipeline + shift).with_size(7);
            assert_eq!(PipelineModulo.classify(&other), base);
        }
        assert_eq!(base.index() as i64, pipeline.rem_euclid(3));
    }
}

#[test]
fn test_too_few_records_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    write_trace(dir.path(), "one.trace", &lines(&["# only one", "5.0,k,1,0"]));
    let config = AnalysisConfig::new(dir.path(), TimeUnit::Seconds);

    let mut dt = DtAggregator::from_config(&config);
    read_records(dir.path(), &config, |record| dt.observe(&record)).unwrap();
    assert_eq!(dt.overall_peak_dt(), None);
    assert_eq!(dt.overall_median_dt(), None);
    assert!(dt.median_series(60.0).min_marker().is_none());
    assert!(!dt.metrics().contains_key("peak_dt_ms"));
}
