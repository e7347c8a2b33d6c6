//! Cache hit-rate aggregation
//!
//! Approximates the hit rate a cache of a given size would see on the trace:
//! a request hits when its key is still resident in an LRU of that size,
//! otherwise it is admitted (possibly evicting the least recently used keys).
//! This is an admission approximation, not a replay of the real eviction
//! policy under evaluation.
//!
//! Capacity is either a number of keys or a number of bytes. In byte mode a
//! record without a size is charged zero bytes, and an object larger than the
//! whole cache is never admitted.
//!
//! Traces that carry the hit flag of the cache that produced them also get
//! the recorded hit rate, counted over the records that have a flag and
//! independent of the simulated capacity.

use std::collections::BTreeMap;
use std::num::{NonZeroU64, NonZeroUsize};

use lru::LruCache;
use serde::Serialize;

use crate::record::TraceRecord;
use crate::scheme::{PipelineModulo, SchemeClassifier, SchemeLabel, SCHEME_COUNT};

use super::TraceMetrics;

/// Size of the simulated cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CacheCapacity {
    /// At most this many resident keys
    Entries(NonZeroUsize),
    /// At most this many resident bytes
    Bytes(NonZeroU64),
}

impl CacheCapacity {
    /// Byte capacity from a (possibly fractional) byte count; `None` unless it
    /// rounds to at least one byte.
    pub fn from_bytes_f64(bytes: f64) -> Option<Self> {
        if !bytes.is_finite() || bytes < 1.0 || bytes >= u64::MAX as f64 {
            return None;
        }
        NonZeroU64::new(bytes.round() as u64).map(CacheCapacity::Bytes)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SchemeCounts {
    requests: u64,
    hits: u64,
    flagged: u64,
    flagged_hits: u64,
}

/// Streams records through an LRU residency model and counts hits
#[derive(Debug)]
pub struct HitRateAggregator<C = PipelineModulo> {
    classifier: C,
    capacity: CacheCapacity,
    resident: LruCache<String, u64>,
    resident_bytes: u64,
    requests: u64,
    hits: u64,
    bytes_requested: u64,
    bytes_hit: u64,
    evictions: u64,
    flagged: u64,
    flagged_hits: u64,
    per_scheme: [SchemeCounts; SCHEME_COUNT],
}

impl HitRateAggregator<PipelineModulo> {
    /// Aggregator using the `pipeline_id mod 3` scheme mapping
    pub fn new(capacity: CacheCapacity) -> Self {
        Self::with_classifier(PipelineModulo, capacity)
    }
}

impl<C: SchemeClassifier> HitRateAggregator<C> {
    /// Aggregator attributing records with `classifier`
    pub fn with_classifier(classifier: C, capacity: CacheCapacity) -> Self {
        Self {
            classifier,
            capacity,
            // grown on demand; a large capacity must not preallocate
            resident: LruCache::unbounded(),
            resident_bytes: 0,
            requests: 0,
            hits: 0,
            bytes_requested: 0,
            bytes_hit: 0,
            evictions: 0,
            flagged: 0,
            flagged_hits: 0,
            per_scheme: [SchemeCounts::default(); SCHEME_COUNT],
        }
    }

    /// Size of the simulated cache
    pub fn capacity(&self) -> CacheCapacity {
        self.capacity
    }

    /// Records observed
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Simulated hits
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Keys pushed out of the simulated cache
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Records that carried a hit flag
    pub fn flagged_requests(&self) -> u64 {
        self.flagged
    }

    /// `hits / requests`, or `None` before any request was observed
    pub fn hit_rate(&self) -> Option<f64> {
        ratio(self.hits, self.requests)
    }

    /// Share of requested bytes served from the cache
    pub fn byte_hit_rate(&self) -> Option<f64> {
        ratio(self.bytes_hit, self.bytes_requested)
    }

    /// Hit rate of the requests attributed to each scheme
    pub fn scheme_hit_rates(&self) -> BTreeMap<SchemeLabel, Option<f64>> {
        SchemeLabel::all()
            .into_iter()
            .map(|scheme| {
                let counts = self.per_scheme[scheme.index()];
                (scheme, ratio(counts.hits, counts.requests))
            })
            .collect()
    }

    /// Share of flagged records the trace marks as hits; `None` when no
    /// record carried a flag
    pub fn recorded_hit_rate(&self) -> Option<f64> {
        ratio(self.flagged_hits, self.flagged)
    }

    /// Recorded hit rate of the flagged records attributed to each scheme
    pub fn recorded_scheme_hit_rates(&self) -> BTreeMap<SchemeLabel, Option<f64>> {
        SchemeLabel::all()
            .into_iter()
            .map(|scheme| {
                let counts = self.per_scheme[scheme.index()];
                (scheme, ratio(counts.flagged_hits, counts.flagged))
            })
            .collect()
    }

    fn admit(&mut self, key: &str, size: u64) {
        match self.capacity {
            CacheCapacity::Entries(limit) => {
                self.resident.push(key.to_string(), size);
                while self.resident.len() > limit.get() {
                    self.evict_one();
                }
            }
            CacheCapacity::Bytes(limit) => {
                if size > limit.get() {
                    return;
                }
                self.resident.push(key.to_string(), size);
                self.resident_bytes += size;
                while self.resident_bytes > limit.get() {
                    self.evict_one();
                }
            }
        }
    }

    fn evict_one(&mut self) {
        if let Some((_, size)) = self.resident.pop_lru() {
            self.resident_bytes -= size;
            self.evictions += 1;
        }
    }
}

fn ratio(part: u64, total: u64) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(part as f64 / total as f64)
    }
}

impl<C: SchemeClassifier> TraceMetrics for HitRateAggregator<C> {
    fn observe(&mut self, record: &TraceRecord) {
        let size = record.size.unwrap_or(0);
        let scheme = self.classifier.classify(record);
        let counts = &mut self.per_scheme[scheme.index()];
        counts.requests += 1;
        self.requests += 1;
        self.bytes_requested += size;
        if let Some(hit) = record.hit {
            counts.flagged += 1;
            self.flagged += 1;
            if hit {
                counts.flagged_hits += 1;
                self.flagged_hits += 1;
            }
        }

        if self.resident.get(record.key.as_str()).is_some() {
            counts.hits += 1;
            self.hits += 1;
            self.bytes_hit += size;
        } else {
            self.admit(&record.key, size);
        }
    }

    fn metrics(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        metrics.insert("requests".to_string(), self.requests as f64);
        metrics.insert("cache_hits".to_string(), self.hits as f64);
        metrics.insert("cache_misses".to_string(), (self.requests - self.hits) as f64);
        metrics.insert("evictions".to_string(), self.evictions as f64);
        metrics.insert("resident_entries".to_string(), self.resident.len() as f64);
        metrics.insert("resident_bytes".to_string(), self.resident_bytes as f64);

        if let Some(rate) = self.hit_rate() {
            metrics.insert("hit_rate".to_string(), rate);
        }
        if let Some(rate) = self.byte_hit_rate() {
            metrics.insert("byte_hit_rate".to_string(), rate);
        }
        for (scheme, rate) in self.scheme_hit_rates() {
            if let Some(rate) = rate {
                metrics.insert(format!("hit_rate_{scheme}"), rate);
            }
        }
        if let Some(rate) = self.recorded_hit_rate() {
            metrics.insert("recorded_hit_rate".to_string(), rate);
        }
        for (scheme, rate) in self.recorded_scheme_hit_rates() {
            if let Some(rate) = rate {
                metrics.insert(format!("recorded_hit_rate_{scheme}"), rate);
            }
        }
        metrics
    }

    fn name(&self) -> &'static str {
        "HitRate"
    }
}
