//! Cache Metrics Collection
//!
//! Prometheus counters and gauges for the tiered cache. Each engine owns its
//! own `Registry` so several engines (e.g. in tests) never collide.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use super::record::StorageTier;
use crate::error::{Error, Result};

/// How an eviction displaced its victim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionKind {
    MemorySwap,
    DiskSwap,
}

impl EvictionKind {
    fn label(&self) -> &'static str {
        match self {
            EvictionKind::MemorySwap => "memory_swap",
            EvictionKind::DiskSwap => "disk_swap",
        }
    }
}

/// Cache metrics collector
#[derive(Clone)]
pub struct CacheMetrics {
    registry: Registry,
    hits: IntCounterVec,
    admissions: IntCounterVec,
    evictions: IntCounterVec,
    origin_fetches: IntCounter,
    origin_failures: IntCounter,
    admissions_denied: IntCounter,
    not_found: IntCounter,
    memory_used_bytes: IntGauge,
    disk_used_bytes: IntGauge,
}

fn prom(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics registration failed: {}", e))
}

impl CacheMetrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("cdn_cache".to_string()), None).map_err(prom)?;

        let hits = IntCounterVec::new(
            Opts::new("hits_total", "Requests served from a cache tier"),
            &["tier"],
        )
        .map_err(prom)?;
        let admissions = IntCounterVec::new(
            Opts::new("admissions_total", "Fetched articles admitted into a tier"),
            &["tier"],
        )
        .map_err(prom)?;
        let evictions = IntCounterVec::new(
            Opts::new("evictions_total", "Memory-resident articles displaced"),
            &["kind"],
        )
        .map_err(prom)?;
        let origin_fetches =
            IntCounter::new("origin_fetches_total", "Cache misses fetched from origin")
                .map_err(prom)?;
        let origin_failures =
            IntCounter::new("origin_failures_total", "Origin fetches that failed").map_err(prom)?;
        let admissions_denied = IntCounter::new(
            "admissions_denied_total",
            "Fetched articles served without being cached",
        )
        .map_err(prom)?;
        let not_found =
            IntCounter::new("not_found_total", "Requests for unknown articles").map_err(prom)?;
        let memory_used_bytes =
            IntGauge::new("memory_used_bytes", "Live bytes in the memory tier").map_err(prom)?;
        let disk_used_bytes =
            IntGauge::new("disk_used_bytes", "Bytes in the disk tier").map_err(prom)?;

        registry.register(Box::new(hits.clone())).map_err(prom)?;
        registry.register(Box::new(admissions.clone())).map_err(prom)?;
        registry.register(Box::new(evictions.clone())).map_err(prom)?;
        registry.register(Box::new(origin_fetches.clone())).map_err(prom)?;
        registry.register(Box::new(origin_failures.clone())).map_err(prom)?;
        registry.register(Box::new(admissions_denied.clone())).map_err(prom)?;
        registry.register(Box::new(not_found.clone())).map_err(prom)?;
        registry.register(Box::new(memory_used_bytes.clone())).map_err(prom)?;
        registry.register(Box::new(disk_used_bytes.clone())).map_err(prom)?;

        Ok(Self {
            registry,
            hits,
            admissions,
            evictions,
            origin_fetches,
            origin_failures,
            admissions_denied,
            not_found,
            memory_used_bytes,
            disk_used_bytes,
        })
    }

    pub fn record_hit(&self, tier: StorageTier) {
        self.hits.with_label_values(&[tier.label()]).inc();
    }

    pub fn record_admission(&self, tier: StorageTier) {
        self.admissions.with_label_values(&[tier.label()]).inc();
    }

    pub fn record_eviction(&self, kind: EvictionKind) {
        self.evictions.with_label_values(&[kind.label()]).inc();
    }

    pub fn record_origin_fetch(&self) {
        self.origin_fetches.inc();
    }

    pub fn record_origin_failure(&self) {
        self.origin_failures.inc();
    }

    pub fn record_admission_denied(&self) {
        self.admissions_denied.inc();
    }

    pub fn record_not_found(&self) {
        self.not_found.inc();
    }

    pub fn update_usage(&self, memory_used: u64, disk_used: u64) {
        self.memory_used_bytes.set(memory_used as i64);
        self.disk_used_bytes.set(disk_used as i64);
    }

    pub fn hits(&self, tier: StorageTier) -> u64 {
        self.hits.with_label_values(&[tier.label()]).get()
    }

    pub fn admissions(&self, tier: StorageTier) -> u64 {
        self.admissions.with_label_values(&[tier.label()]).get()
    }

    pub fn evictions(&self, kind: EvictionKind) -> u64 {
        self.evictions.with_label_values(&[kind.label()]).get()
    }

    pub fn origin_fetches(&self) -> u64 {
        self.origin_fetches.get()
    }

    pub fn origin_failures(&self) -> u64 {
        self.origin_failures.get()
    }

    pub fn admissions_denied(&self) -> u64 {
        self.admissions_denied.get()
    }

    pub fn not_found(&self) -> u64 {
        self.not_found.get()
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// Returns `(content_type, body)`.
    pub fn encode_text(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(prom)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

impl std::fmt::Debug for CacheMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheMetrics")
            .field("origin_fetches", &self.origin_fetches())
            .field("admissions_denied", &self.admissions_denied())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = CacheMetrics::new().unwrap();
        assert_eq!(metrics.hits(StorageTier::Memory), 0);
        assert_eq!(metrics.hits(StorageTier::Disk), 0);
        assert_eq!(metrics.origin_fetches(), 0);
    }

    #[test]
    fn test_independent_registries() {
        // Two collectors must not clash on metric names
        let a = CacheMetrics::new().unwrap();
        let b = CacheMetrics::new().unwrap();
        a.record_origin_fetch();
        assert_eq!(a.origin_fetches(), 1);
        assert_eq!(b.origin_fetches(), 0);
    }

    #[test]
    fn test_hit_and_eviction_tracking() {
        let metrics = CacheMetrics::new().unwrap();

        metrics.record_hit(StorageTier::Memory);
        metrics.record_hit(StorageTier::Memory);
        metrics.record_hit(StorageTier::Disk);
        metrics.record_eviction(EvictionKind::MemorySwap);

        assert_eq!(metrics.hits(StorageTier::Memory), 2);
        assert_eq!(metrics.hits(StorageTier::Disk), 1);
        assert_eq!(metrics.evictions(EvictionKind::MemorySwap), 1);
        assert_eq!(metrics.evictions(EvictionKind::DiskSwap), 0);
    }

    #[test]
    fn test_encode_text() {
        let metrics = CacheMetrics::new().unwrap();
        metrics.record_admission(StorageTier::Disk);
        metrics.update_usage(1024, 2048);

        let (content_type, body) = metrics.encode_text().unwrap();
        let body = String::from_utf8(body).unwrap();

        assert!(content_type.starts_with("text/plain"));
        assert!(body.contains("cdn_cache_admissions_total{tier=\"disk\"} 1"));
        assert!(body.contains("cdn_cache_memory_used_bytes 1024"));
        assert!(body.contains("cdn_cache_disk_used_bytes 2048"));
    }
}
