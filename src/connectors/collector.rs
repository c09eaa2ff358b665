//! Data collection pipeline.
//!
//! Fans out to all enabled analytics sources concurrently, concatenates
//! the returned frames, drops malformed rows, and manages TTL-based
//! caching to keep API traffic inside rate limits. A failing source
//! degrades the run to partial data; only all sources failing is an
//! error.

use anyhow::Result;
use chrono::{Duration, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::AnalyticsSource;
use crate::types::ChannelRecord;

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Simple in-memory TTL cache for fetched frames, keyed by source name.
struct FrameCache {
    entries: HashMap<String, CacheEntry>,
}

struct CacheEntry {
    records: Vec<ChannelRecord>,
    inserted_at: chrono::DateTime<Utc>,
    ttl: Duration,
}

impl FrameCache {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    fn get(&self, key: &str) -> Option<&Vec<ChannelRecord>> {
        self.entries.get(key).and_then(|entry| {
            if Utc::now() - entry.inserted_at < entry.ttl {
                Some(&entry.records)
            } else {
                None
            }
        })
    }

    fn insert(&mut self, key: String, records: Vec<ChannelRecord>, ttl: Duration) {
        self.entries.insert(
            key,
            CacheEntry {
                records,
                inserted_at: Utc::now(),
                ttl,
            },
        );
    }

    /// Remove expired entries.
    fn evict_expired(&mut self) {
        let now = Utc::now();
        self.entries.retain(|_, entry| now - entry.inserted_at < entry.ttl);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// ---------------------------------------------------------------------------
// Collect report
// ---------------------------------------------------------------------------

/// Outcome of a collection pass across all sources.
#[derive(Debug, Clone)]
pub struct CollectReport {
    pub records: Vec<ChannelRecord>,
    /// Rows rejected by validation during this pass.
    pub dropped: usize,
    pub sources_ok: usize,
    pub sources_failed: Vec<String>,
    /// API cost incurred during this pass (cache hits are free).
    pub cost: Decimal,
}

impl CollectReport {
    /// Whether any source failed while others succeeded.
    pub fn is_partial(&self) -> bool {
        !self.sources_failed.is_empty() && self.sources_ok > 0
    }
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Aggregates performance frames from all configured sources with caching.
pub struct Collector {
    sources: Vec<Box<dyn AnalyticsSource>>,
    cache: FrameCache,
    cache_ttl: Duration,
    total_cost: Decimal,
    total_calls: u64,
    cache_hits: u64,
}

impl Collector {
    pub fn new(sources: Vec<Box<dyn AnalyticsSource>>, cache_ttl_mins: i64) -> Self {
        Self {
            sources,
            cache: FrameCache::new(),
            cache_ttl: Duration::minutes(cache_ttl_mins),
            total_cost: Decimal::ZERO,
            total_calls: 0,
            cache_hits: 0,
        }
    }

    /// Number of configured sources.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Collect records from every source, serving from cache where fresh.
    ///
    /// Returns partial results when some sources fail; errors only when
    /// no source produced data.
    pub async fn collect(&mut self) -> Result<CollectReport> {
        info!(sources = self.sources.len(), "Starting collection pass");

        if self.sources.is_empty() {
            anyhow::bail!("No analytics sources configured");
        }

        // Periodic cache cleanup
        self.cache.evict_expired();

        let mut report = CollectReport {
            records: Vec::new(),
            dropped: 0,
            sources_ok: 0,
            sources_failed: Vec::new(),
            cost: Decimal::ZERO,
        };

        // Phase 1 — serve fresh cache entries, note the misses.
        let mut hits = 0u64;
        let mut misses: Vec<usize> = Vec::new();
        for (i, source) in self.sources.iter().enumerate() {
            match self.cache.get(source.name()) {
                Some(cached) => {
                    debug!(source = source.name(), rows = cached.len(), "Cache hit");
                    report.records.extend(cached.iter().cloned());
                    report.sources_ok += 1;
                    hits += 1;
                }
                None => misses.push(i),
            }
        }
        self.cache_hits += hits;

        // Phase 2 — fetch all cache misses concurrently.
        let fetches = misses.iter().map(|&i| {
            let source = &self.sources[i];
            async move { (i, source.fetch_performance().await) }
        });
        let results = join_all(fetches).await;

        for (i, result) in results {
            let name = self.sources[i].name().to_string();
            match result {
                Ok(rows) => {
                    let fetched = rows.len();
                    let valid: Vec<ChannelRecord> =
                        rows.into_iter().filter(|r| r.is_valid()).collect();
                    let dropped = fetched - valid.len();
                    if dropped > 0 {
                        warn!(source = %name, dropped, "Dropped malformed rows");
                    }

                    let cost = self.sources[i].cost_per_call();
                    self.cache.insert(name, valid.clone(), self.cache_ttl);
                    self.total_calls += 1;
                    self.total_cost += cost;

                    report.records.extend(valid);
                    report.dropped += dropped;
                    report.sources_ok += 1;
                    report.cost += cost;
                }
                Err(e) => {
                    warn!(source = %name, error = %e, "Source fetch failed");
                    report.sources_failed.push(name);
                }
            }
        }

        if report.sources_ok == 0 {
            anyhow::bail!(
                "All analytics sources failed: {}",
                report.sources_failed.join(", ")
            );
        }

        info!(
            records = report.records.len(),
            dropped = report.dropped,
            sources_ok = report.sources_ok,
            sources_failed = report.sources_failed.len(),
            cache_size = self.cache.len(),
            "Collection pass complete"
        );

        Ok(report)
    }

    // -- Accessors for monitoring ----------------------------------------

    /// Total API cost incurred so far.
    pub fn total_cost(&self) -> Decimal {
        self.total_cost
    }

    /// Total API calls made (cache misses).
    pub fn total_calls(&self) -> u64 {
        self.total_calls
    }

    /// Total cache hits.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    /// Cache hit rate as a fraction (0.0 to 1.0).
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.total_calls + self.cache_hits;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
