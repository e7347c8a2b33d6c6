// Turning aggregator results into printed tables and CSV files

use std::path::Path;

use flash_dt::metrics::{
    CacheCapacity, DtAggregator, GroupStatistic, HitRateAggregator, MedianSeries, PeakBin,
};
use flash_dt::scheme::{SchemeClassifier, SchemeLabel};
use flash_dt::sweep::{ParameterRule, SweepMetric, SweepReport};
use serde::Serialize;

use crate::models::{BinRow, HitRateRow, MedianRow, PeakRow, SweepRow};

/// Label used for rows that cover every scheme
pub const ALL_SCHEMES: &str = "all";

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{v:.precision$}"),
        None => "n/a".to_string(),
    }
}

pub fn capacity_label(capacity: CacheCapacity) -> String {
    match capacity {
        CacheCapacity::Entries(n) => format!("{n} entries"),
        CacheCapacity::Bytes(n) => format!("{n} B"),
    }
}

/// One row per scheme followed by the `all` row
pub fn peak_rows<C: SchemeClassifier>(dt: &DtAggregator<C>) -> Vec<PeakRow> {
    let mut rows: Vec<PeakRow> = SchemeLabel::all()
        .into_iter()
        .map(|scheme| PeakRow {
            scheme: scheme.to_string(),
            samples: dt.samples().iter().filter(|s| s.scheme == scheme).count(),
            peak_dt_ms: dt.peak_dt(scheme),
            median_dt_ms: dt.median_dt(scheme),
            mean_group_peak_dt_ms: dt.mean_group_peak_dt(scheme),
        })
        .collect();
    rows.push(PeakRow {
        scheme: ALL_SCHEMES.to_string(),
        samples: dt.samples().len(),
        peak_dt_ms: dt.overall_peak_dt(),
        median_dt_ms: dt.overall_median_dt(),
        mean_group_peak_dt_ms: None,
    });
    rows
}

pub fn median_rows(series: &MedianSeries) -> Vec<MedianRow> {
    let min_start = series.min_marker().map(|(start, _)| start);
    series
        .iter()
        .map(|bucket| MedianRow {
            bucket_start: bucket.bucket_start,
            median_dt_ms: bucket.median_dt_ms,
            request_volume: bucket.request_volume,
            is_min: Some(bucket.bucket_start) == min_start,
        })
        .collect()
}

pub fn hit_rate_rows<C: SchemeClassifier>(hits: &HitRateAggregator<C>) -> Vec<HitRateRow> {
    let capacity = capacity_label(hits.capacity());
    let recorded = hits.recorded_scheme_hit_rates();
    let mut rows: Vec<HitRateRow> = hits
        .scheme_hit_rates()
        .into_iter()
        .map(|(scheme, rate)| HitRateRow {
            scheme: scheme.to_string(),
            capacity: capacity.clone(),
            hit_rate: rate,
            recorded_hit_rate: recorded.get(&scheme).copied().flatten(),
        })
        .collect();
    rows.push(HitRateRow {
        scheme: ALL_SCHEMES.to_string(),
        capacity,
        hit_rate: hits.hit_rate(),
        recorded_hit_rate: hits.recorded_hit_rate(),
    });
    rows
}

fn statistic_label(statistic: GroupStatistic) -> &'static str {
    match statistic {
        GroupStatistic::MeanGapMs => "mean_gap_ms",
        GroupStatistic::AlphaTti => "alpha_tti",
    }
}

pub fn bin_rows(bins: &[PeakBin], statistic: GroupStatistic) -> Vec<BinRow> {
    bins.iter()
        .map(|bin| BinRow {
            statistic: statistic_label(statistic).to_string(),
            bin_start: bin.bin_start,
            bin_end: bin.bin_end,
            bin_center: bin.center(),
            groups: bin.groups,
            mean_statistic: bin.mean_statistic,
            peak_dt_ms: bin.peak_dt_ms,
        })
        .collect()
}

/// Sweep rows in parameter order, normalized to `baseline` when given
pub fn sweep_rows(
    report: &SweepReport,
    rule: &ParameterRule,
    metric: &SweepMetric,
    baseline: Option<f64>,
) -> Vec<SweepRow> {
    let normalized = baseline.and_then(|b| report.series.normalized_to(b));
    if let (Some(b), None) = (baseline, &normalized) {
        tracing::warn!(baseline = b, "no usable metric at the baseline, skipping normalization");
    }
    let parameter = match rule.unit() {
        Some(unit) => format!("{}_{}", rule.label(), unit),
        None => rule.label().to_string(),
    };

    report
        .series
        .iter()
        .enumerate()
        .map(|(i, point)| SweepRow {
            parameter: parameter.clone(),
            parameter_value: point.parameter_value,
            metric: metric.to_string(),
            metric_value: point.metric_value,
            normalized: normalized
                .as_ref()
                .and_then(|series| series.points()[i].metric_value),
            sample_count: point.sample_count,
            truncated: point.truncated,
        })
        .collect()
}

/// Writes `rows` with a header line taken from the row fields
pub fn export_csv<R: Serialize>(rows: &[R], path: &Path) -> Result<(), std::io::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn print_peak_summary(rows: &[PeakRow]) {
    println!("\nPeak DT by Eviction Scheme");
    println!("==========================");
    println!(
        "{:<6} {:>10} {:>14} {:>14} {:>16}",
        "Scheme", "Samples", "Peak (ms)", "Median (ms)", "Grp Peak (ms)"
    );
    println!("{}", "-".repeat(64));
    for row in rows {
        println!(
            "{:<6} {:>10} {:>14} {:>14} {:>16}",
            row.scheme,
            row.samples,
            fmt_opt(row.peak_dt_ms, 2),
            fmt_opt(row.median_dt_ms, 2),
            fmt_opt(row.mean_group_peak_dt_ms, 2),
        );
    }
}

pub fn print_median_summary(rows: &[MedianRow], smoothed: bool) {
    println!(
        "\nMedian DT over Time{}",
        if smoothed { " (smoothed)" } else { "" }
    );
    println!("===================");
    println!(
        "{:>14} {:>14} {:>12} {:>4}",
        "Start (s)", "Median (ms)", "Requests", ""
    );
    println!("{}", "-".repeat(48));
    for row in rows {
        println!(
            "{:>14.1} {:>14.2} {:>12.1} {:>4}",
            row.bucket_start,
            row.median_dt_ms,
            row.request_volume,
            if row.is_min { "min" } else { "" }
        );
    }
    if rows.is_empty() {
        println!("(no buckets with DT samples)");
    }
}

pub fn print_hit_rate_summary(rows: &[HitRateRow]) {
    println!("\nCache Hit Rate");
    println!("==============");
    println!("{:<6} {:>20} {:>10} {:>10}", "Scheme", "Capacity", "Hit Rate", "Recorded");
    println!("{}", "-".repeat(49));
    for row in rows {
        let rate = row.hit_rate.map(|r| r * 100.0);
        let recorded = row.recorded_hit_rate.map(|r| r * 100.0);
        println!(
            "{:<6} {:>20} {:>9}% {:>9}%",
            row.scheme,
            row.capacity,
            fmt_opt(rate, 2),
            fmt_opt(recorded, 2)
        );
    }
}

pub fn print_bin_summary(rows: &[BinRow]) {
    println!("\nPeak DT by Group Statistic");
    println!("==========================");
    println!(
        "{:>12} {:>12} {:>8} {:>14} {:>14}",
        "Bin Start", "Bin End", "Groups", "Mean Stat", "Peak (ms)"
    );
    println!("{}", "-".repeat(64));
    for row in rows {
        println!(
            "{:>12.3} {:>12.3} {:>8} {:>14} {:>14}",
            row.bin_start,
            row.bin_end,
            row.groups,
            fmt_opt(row.mean_statistic, 3),
            fmt_opt(row.peak_dt_ms, 2)
        );
    }
    if rows.is_empty() {
        println!("(no groups with a peak)");
    }
}

pub fn print_sweep_summary(rows: &[SweepRow], report: &SweepReport) {
    println!("\nParameter Sweep");
    println!("===============");
    println!("Entry cap per trace: {}", report.max_entries);
    println!(
        "{:>12} {:>16} {:>12} {:>10} {:>10}",
        "Parameter", "Metric", "Normalized", "Samples", "Truncated"
    );
    println!("{}", "-".repeat(64));
    for row in rows {
        println!(
            "{:>12} {:>16} {:>12} {:>10} {:>10}",
            row.parameter_value,
            fmt_opt(row.metric_value, 4),
            fmt_opt(row.normalized, 4),
            row.sample_count,
            if row.truncated { "yes" } else { "" }
        );
    }
    if !report.omitted.is_empty() {
        println!("\nOmitted directories:");
        for omitted in &report.omitted {
            println!("  {}: {}", omitted.name, omitted.reason);
        }
    }
}
