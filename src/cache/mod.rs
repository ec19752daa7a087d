//! Tiered Article Cache
//!
//! Two storage tiers with independent byte budgets:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 CacheEngine                  │
//! │  records ──▶ Location { NotCached,           │
//! │                         OnDisk,              │
//! │                         InMemory(slot) }     │
//! ├──────────────────────┬───────────────────────┤
//! │     MemoryTier       │       DiskTier        │
//! │  slot buffer, 19 MiB │  one file per article │
//! │  ▲                   │  19 MiB               │
//! │  └ EvictionIndex     │                       │
//! │    (min views)       │                       │
//! └──────────────────────┴───────────────────────┘
//! ```
//!
//! Every article is stored gzip-compressed. Admission prefers memory, then
//! disk; when both are full, a fetched article may displace the least viewed
//! memory-resident one, but only if it is strictly more popular.

pub mod compression;
pub mod disk;
pub mod engine;
pub mod eviction;
pub mod manifest;
pub mod memory;
pub mod metrics;
pub mod record;

pub use compression::{CompressionAlgorithm, Compressor, GzipCompressor, NoopCompressor};
pub use engine::{CacheConfig, CacheEngine, CacheResult, CacheSource, CacheStats, EvictionMode};
pub use manifest::{parse_manifest, read_manifest, ManifestEntry};
pub use metrics::{CacheMetrics, EvictionKind};
pub use record::{ArticleRecord, Location, RecordId, StorageTier};

/// Default memory tier budget
pub const DEFAULT_MAX_MEMORY_BYTES: u64 = 19 * 1024 * 1024;

/// Default disk tier budget
pub const DEFAULT_MAX_DISK_BYTES: u64 = 19 * 1024 * 1024;

/// Default cache directory, relative to the working directory
pub const DEFAULT_CACHE_DIR: &str = "cache";
