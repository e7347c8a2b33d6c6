//! Allocation Bound Tests for the Bounded Reader
//!
//! Reading a trace with an entry cap must cost the same no matter how much of
//! the file is left unread. The global allocator is instrumented, so this file
//! holds a single test to keep other threads from adding noise.

use flash_dt::config::{AnalysisConfig, TimeUnit};
use flash_dt::metrics::{DtAggregator, TraceMetrics};
use flash_dt::reader::BoundedTraceReader;
use stats_alloc::{Region, StatsAlloc, INSTRUMENTED_SYSTEM};
use std::alloc::System;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[global_allocator]
static GLOBAL: &StatsAlloc<System> = &INSTRUMENTED_SYSTEM;

const MAX_ENTRIES: usize = 5;

/// Slack for allocations that depend on path length and line content
const ALLOCATION_SLACK_BYTES: usize = 16 * 1024;

fn write_trace(path: &Path, valid_lines: usize) {
    let mut out = BufWriter::new(fs::File::create(path).unwrap());
    for i in 0..5 {
        writeln!(out, "# comment {i}").unwrap();
    }
    for i in 0..valid_lines {
        writeln!(out, "{}.0,key{:08},4096,{}", i, i % 1000, i % 3).unwrap();
    }
    out.flush().unwrap();
}

/// Bytes allocated while reading `path` up to the cap and aggregating DT
fn bytes_for_capped_read(path: &PathBuf, config: &AnalysisConfig) -> (usize, usize) {
    let region = Region::new(GLOBAL);
    let mut dt = DtAggregator::from_config(config);
    let mut reader = BoundedTraceReader::open(path, config).unwrap();
    let mut records = 0;
    for parsed in &mut reader {
        if let Some(record) = parsed.unwrap().into_record() {
            dt.observe(&record);
            records += 1;
        }
    }
    drop(reader);
    drop(dt);
    (region.change().bytes_allocated, records)
}

#[test]
fn test_capped_read_allocation_independent_of_file_size() {
    let dir = tempfile::tempdir().unwrap();
    let small = dir.path().join("small.trace");
    let large = dir.path().join("large.trace");
    write_trace(&small, 95);
    write_trace(&large, 200_000);

    let config = AnalysisConfig::new(dir.path(), TimeUnit::Seconds).with_max_entries(MAX_ENTRIES);

    let (small_bytes, small_records) = bytes_for_capped_read(&small, &config);
    let (large_bytes, large_records) = bytes_for_capped_read(&large, &config);

    assert_eq!(small_records, MAX_ENTRIES);
    assert_eq!(large_records, MAX_ENTRIES);
    assert!(
        large_bytes <= small_bytes + ALLOCATION_SLACK_BYTES,
        "capped read of a large trace allocated {large_bytes} bytes, small trace {small_bytes}"
    );
}
