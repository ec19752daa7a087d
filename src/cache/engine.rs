//! Tiered Cache Engine
//!
//! Owns the memory tier, the disk tier, the per-article records and the
//! eviction index. Every mutation goes through one async mutex; origin
//! fetches, compression and reads of disk-resident articles run outside it.
//!
//! # Request flow
//!
//! ```text
//! get(id) ──▶ views += 1 ──┬─ InMemory(slot) ─▶ clone blob
//!                          ├─ OnDisk ─────────▶ read file
//!                          └─ NotCached ──────▶ fetch ─▶ gzip ─▶ admit ─┬─▶ memory
//!                                                                       ├─▶ disk
//!                                                                       └─▶ evict & replace
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::compression::{CompressionAlgorithm, Compressor};
use super::disk::DiskTier;
use super::eviction::EvictionIndex;
use super::manifest::ManifestEntry;
use super::memory::MemoryTier;
use super::metrics::{CacheMetrics, EvictionKind};
use super::record::{ArticleRecord, Location, RecordId, StorageTier};
use super::{DEFAULT_CACHE_DIR, DEFAULT_MAX_DISK_BYTES, DEFAULT_MAX_MEMORY_BYTES};
use crate::domain::ports::{ArticleId, OriginClient};
use crate::error::{Error, Result};

// =============================================================================
// Configuration
// =============================================================================

/// What happens to a victim displaced by an in-memory swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionMode {
    /// Drop the victim's bytes; it becomes `NotCached`
    #[default]
    Discard,
    /// Move the victim to disk when the disk budget allows
    Demote,
}

impl FromStr for EvictionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "discard" => Ok(EvictionMode::Discard),
            "demote" => Ok(EvictionMode::Demote),
            other => Err(format!("unknown eviction mode '{}'", other)),
        }
    }
}

impl std::fmt::Display for EvictionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionMode::Discard => write!(f, "discard"),
            EvictionMode::Demote => write!(f, "demote"),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Disk tier directory
    pub cache_dir: PathBuf,
    /// Memory tier budget in bytes
    pub max_memory_bytes: u64,
    /// Disk tier budget in bytes
    pub max_disk_bytes: u64,
    /// Victim handling on in-memory swaps
    pub eviction_mode: EvictionMode,
    /// Put a popped victim back into the index when no swap was feasible
    pub restore_orphaned_victims: bool,
    /// Create records for ids missing from the manifest on first request
    pub admit_unknown: bool,
    /// Keep disk copies of payloads promoted to memory at startup
    pub retain_disk_copies: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
            max_disk_bytes: DEFAULT_MAX_DISK_BYTES,
            eviction_mode: EvictionMode::Discard,
            restore_orphaned_victims: false,
            admit_unknown: false,
            retain_disk_copies: false,
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
    Memory,
    Disk,
    Origin,
}

impl CacheSource {
    pub fn label(&self) -> &'static str {
        match self {
            CacheSource::Memory => "memory",
            CacheSource::Disk => "disk",
            CacheSource::Origin => "origin",
        }
    }
}

impl std::fmt::Display for CacheSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Cache lookup result
#[derive(Debug, Clone)]
pub struct CacheResult {
    /// Compressed payload
    pub data: Bytes,
    /// Which tier (or the origin) produced it
    pub source: CacheSource,
    /// Where the article lives after this request
    pub location: Location,
    /// Lookup latency
    pub latency: Duration,
}

/// Engine statistics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub records: usize,
    pub memory_entries: usize,
    pub memory_used_bytes: u64,
    pub memory_capacity_bytes: u64,
    pub disk_entries: usize,
    pub disk_used_bytes: u64,
    pub disk_capacity_bytes: u64,
    pub eviction_index_len: usize,
    pub origin_fetches: u64,
    pub admissions_denied: u64,
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug)]
struct CacheState {
    records: Vec<ArticleRecord>,
    by_id: HashMap<ArticleId, RecordId>,
    memory: MemoryTier,
    disk: DiskTier,
    index: EvictionIndex,
}

impl CacheState {
    fn new(config: &CacheConfig) -> Self {
        Self {
            records: Vec::new(),
            by_id: HashMap::new(),
            memory: MemoryTier::new(config.max_memory_bytes),
            disk: DiskTier::new(&config.cache_dir, config.max_disk_bytes),
            index: EvictionIndex::new(),
        }
    }

    fn insert_record(&mut self, id: ArticleId, views: u64) -> RecordId {
        let rid = RecordId(self.records.len());
        self.by_id.insert(id.clone(), rid);
        self.records.push(ArticleRecord::new(id, views));
        rid
    }

    fn record(&self, rid: RecordId) -> &ArticleRecord {
        &self.records[rid.0]
    }

    fn record_mut(&mut self, rid: RecordId) -> &mut ArticleRecord {
        &mut self.records[rid.0]
    }
}

enum Plan {
    ReadDisk(PathBuf),
    Fetch(RecordId),
    /// Not in the manifest; a record exists only once the origin serves it
    FetchUnknown,
}

// =============================================================================
// Engine
// =============================================================================

/// Popularity-driven two-tier article cache
pub struct CacheEngine {
    state: Mutex<CacheState>,
    origin: Arc<dyn OriginClient>,
    compressor: Arc<dyn Compressor>,
    config: CacheConfig,
    metrics: CacheMetrics,
}

impl CacheEngine {
    /// Build the engine from a popularity manifest and the cache directory.
    ///
    /// Every manifest row becomes a record seeded with its view count. Files
    /// found in the cache directory are placed in memory when they fit (their
    /// disk copy is then removed unless `retain_disk_copies`), otherwise on
    /// disk. Files with no manifest row are registered with zero views.
    #[instrument(skip_all, fields(cache_dir = %config.cache_dir.display()))]
    pub async fn build(
        config: CacheConfig,
        manifest: Vec<ManifestEntry>,
        origin: Arc<dyn OriginClient>,
        compressor: Arc<dyn Compressor>,
    ) -> Result<Self> {
        let metrics = CacheMetrics::new()?;
        let mut state = CacheState::new(&config);
        state.disk.ensure_dir().await?;

        let mut files: HashMap<ArticleId, u64> = state.disk.scan().await?.into_iter().collect();

        for entry in manifest {
            if state.by_id.contains_key(&entry.id) {
                warn!(article = %entry.id, "Duplicate manifest row ignored");
                continue;
            }
            let rid = state.insert_record(entry.id.clone(), entry.views);
            if let Some(len) = files.remove(&entry.id) {
                Self::place_existing(&config, &mut state, rid, len).await;
            }
        }

        let mut unlisted: Vec<_> = files.into_iter().collect();
        unlisted.sort();
        for (id, len) in unlisted {
            debug!(article = %id, "Registering cache file without manifest row");
            let rid = state.insert_record(id, 0);
            Self::place_existing(&config, &mut state, rid, len).await;
        }

        let CacheState { records, index, .. } = &mut state;
        index.rebuild(|rid| records[rid.0].views);

        metrics.update_usage(state.memory.used(), state.disk.used());
        info!(
            "Cache built: {} records, {} in memory ({} bytes), {} on disk ({} bytes)",
            state.records.len(),
            state.memory.len(),
            state.memory.used(),
            state.disk.len(),
            state.disk.used()
        );

        Ok(Self {
            state: Mutex::new(state),
            origin,
            compressor,
            config,
            metrics,
        })
    }

    /// Place a pre-existing cache file during the startup build.
    async fn place_existing(config: &CacheConfig, state: &mut CacheState, rid: RecordId, len: u64) {
        let id = state.record(rid).id.clone();

        if state.memory.fits(len) {
            match DiskTier::read_path(&state.disk.path_for(&id)).await {
                Ok(data) => {
                    if let Some(slot) = state.memory.insert(data) {
                        state.record_mut(rid).location = Location::InMemory(slot);
                        let views = state.record(rid).views;
                        state.index.push(rid, views);
                        if !config.retain_disk_copies {
                            if let Err(e) = state.disk.discard_unaccounted(&id).await {
                                warn!(article = %id, "Failed to remove promoted disk copy: {}", e);
                            }
                        }
                        return;
                    }
                }
                Err(e) => {
                    warn!(article = %id, "Failed to read cache file: {}", e);
                    return;
                }
            }
        }

        if state.disk.adopt(&id, len) {
            state.record_mut(rid).location = Location::OnDisk;
            return;
        }

        warn!(article = %id, bytes = len, "Cache file exceeds both budgets");
        if !config.retain_disk_copies {
            if let Err(e) = state.disk.discard_unaccounted(&id).await {
                warn!(article = %id, "Failed to remove oversized cache file: {}", e);
            }
        }
    }

    /// Fetch an article's compressed bytes.
    pub async fn get(&self, article: &str) -> Result<Bytes> {
        self.lookup(article).await.map(|result| result.data)
    }

    /// Like [`get`](Self::get), also reporting where the bytes came from.
    #[instrument(skip(self))]
    pub async fn lookup(&self, article: &str) -> Result<CacheResult> {
        let start = Instant::now();
        let id = ArticleId::from_request_path(article);

        let plan = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;

            match state.by_id.get(&id).copied() {
                Some(rid) => {
                    state.records[rid.0].record_view();
                    state.index.mark_stale();

                    match state.records[rid.0].location {
                        Location::InMemory(slot) => {
                            let data = state.memory.get(slot).cloned().ok_or_else(|| {
                                Error::Internal(format!(
                                    "record {} points at freed slot {}",
                                    id, slot
                                ))
                            })?;
                            debug!(article = %id, "Serving from in-memory cache");
                            self.metrics.record_hit(StorageTier::Memory);
                            return Ok(CacheResult {
                                data,
                                source: CacheSource::Memory,
                                location: Location::InMemory(slot),
                                latency: start.elapsed(),
                            });
                        }
                        Location::OnDisk => Plan::ReadDisk(state.disk.path_for(&id)),
                        Location::NotCached => Plan::Fetch(rid),
                    }
                }
                None if self.config.admit_unknown && !id.is_empty() => Plan::FetchUnknown,
                None => {
                    self.metrics.record_not_found();
                    return Err(Error::NotFound(id.to_string()));
                }
            }
        };

        let (rid, data) = match plan {
            Plan::ReadDisk(path) => {
                debug!(article = %id, "Serving from disk cache");
                let data = DiskTier::read_path(&path).await.map_err(|e| {
                    error!(article = %id, "Disk tier read failed: {}", e);
                    e
                })?;
                self.metrics.record_hit(StorageTier::Disk);
                return Ok(CacheResult {
                    data,
                    source: CacheSource::Disk,
                    location: Location::OnDisk,
                    latency: start.elapsed(),
                });
            }
            Plan::Fetch(rid) => {
                debug!(article = %id, "Not cached, fetching from origin");
                let data = self.fetch_compressed(&id).await.map_err(|e| match e {
                    Error::OriginNotFound(_) if self.config.admit_unknown => {
                        Error::NotFound(id.to_string())
                    }
                    e => e,
                })?;
                (rid, data)
            }
            Plan::FetchUnknown => {
                debug!(article = %id, "Unknown article, asking origin");
                let data = self.fetch_compressed(&id).await.map_err(|e| match e {
                    Error::OriginNotFound(_) => {
                        self.metrics.record_not_found();
                        Error::NotFound(id.to_string())
                    }
                    e => e,
                })?;
                (self.register_unknown(&id).await, data)
            }
        };

        let location = self.populate(rid, &data).await;
        Ok(CacheResult {
            data,
            source: CacheSource::Origin,
            location,
            latency: start.elapsed(),
        })
    }

    /// Record the first successful view of an article missing from the
    /// manifest. A concurrent request may already have registered it.
    async fn register_unknown(&self, id: &ArticleId) -> RecordId {
        let mut state = self.state.lock().await;
        let rid = match state.by_id.get(id).copied() {
            Some(rid) => rid,
            None => {
                debug!(article = %id, "Admitting unknown article");
                state.insert_record(id.clone(), 0)
            }
        };
        state.record_mut(rid).record_view();
        state.index.mark_stale();
        rid
    }

    async fn fetch_compressed(&self, id: &ArticleId) -> Result<Bytes> {
        self.metrics.record_origin_fetch();
        let raw = self.origin.fetch(id).await.map_err(|e| {
            self.metrics.record_origin_failure();
            error!(article = %id, "Origin fetch failed: {}", e);
            e
        })?;

        let compressor = Arc::clone(&self.compressor);
        tokio::task::spawn_blocking(move || compressor.compress(&raw))
            .await
            .map_err(|e| Error::Internal(format!("compression task failed: {}", e)))?
    }

    /// Try to cache freshly fetched bytes. Never fails the request.
    async fn populate(&self, rid: RecordId, data: &Bytes) -> Location {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let current = state.record(rid).location;
        if current.is_cached() {
            // A concurrent request for the same article got here first
            debug!(article = %state.record(rid).id, "Already cached by a concurrent request");
            return current;
        }

        if self.admit(state, rid, data).await.is_none() {
            self.evict_and_replace(state, rid, data).await;
        }

        self.metrics
            .update_usage(state.memory.used(), state.disk.used());
        state.record(rid).location
    }

    /// Memory first, then disk. No side effects when neither fits.
    async fn admit(&self, state: &mut CacheState, rid: RecordId, data: &Bytes) -> Option<StorageTier> {
        let len = data.len() as u64;

        if let Some(slot) = state.memory.insert(data.clone()) {
            state.record_mut(rid).location = Location::InMemory(slot);
            let views = state.record(rid).views;
            state.index.push(rid, views);
            self.metrics.record_admission(StorageTier::Memory);
            debug!(article = %state.record(rid).id, slot, "Admitted to memory tier");
            return Some(StorageTier::Memory);
        }

        if state.disk.fits(len) {
            let id = state.record(rid).id.clone();
            match state.disk.write(&id, data).await {
                Ok(()) => {
                    state.record_mut(rid).location = Location::OnDisk;
                    self.metrics.record_admission(StorageTier::Disk);
                    debug!(article = %id, "Admitted to disk tier");
                    return Some(StorageTier::Disk);
                }
                Err(e) => warn!(article = %id, "Disk admission failed: {}", e),
            }
        }

        None
    }

    /// Displace the least popular memory-resident article if the candidate
    /// is strictly more popular.
    async fn evict_and_replace(
        &self,
        state: &mut CacheState,
        rid: RecordId,
        data: &Bytes,
    ) -> Option<StorageTier> {
        let CacheState { records, index, .. } = &mut *state;
        index.refresh(|member| records[member.0].views);

        let Some((victim, victim_views)) = state.index.pop_min() else {
            self.metrics.record_admission_denied();
            return None;
        };
        let candidate_views = state.record(rid).views;

        if victim_views >= candidate_views {
            state.index.push(victim, victim_views);
            self.metrics.record_admission_denied();
            debug!(
                article = %state.record(rid).id,
                candidate_views,
                victim_views,
                "Not popular enough to evict"
            );
            return None;
        }

        let Location::InMemory(slot) = state.record(victim).location else {
            warn!(article = %state.record(victim).id, "Eviction index held a non-resident record");
            self.metrics.record_admission_denied();
            return None;
        };
        let victim_len = state.memory.slot_len(slot).unwrap_or(0);
        let len = data.len() as u64;

        // In-memory swap
        if state.memory.fits_swap(victim_len, len) {
            if let Some(victim_bytes) = state.memory.replace(slot, data.clone()) {
                state.record_mut(rid).location = Location::InMemory(slot);
                state.index.push(rid, candidate_views);
                state.record_mut(victim).location = Location::NotCached;
                self.metrics.record_eviction(EvictionKind::MemorySwap);
                info!(
                    candidate = %state.record(rid).id,
                    victim = %state.record(victim).id,
                    slot,
                    "Evicted from memory tier"
                );
                if self.config.eviction_mode == EvictionMode::Demote {
                    self.demote(state, victim, &victim_bytes).await;
                }
                return Some(StorageTier::Memory);
            }
        }

        // Disk swap. Admission already checked this budget, so it only
        // succeeds after a failed disk write there.
        if state.disk.fits(len) {
            let id = state.record(rid).id.clone();
            match state.disk.write(&id, data).await {
                Ok(()) => {
                    state.memory.free(slot);
                    state.record_mut(victim).location = Location::NotCached;
                    state.record_mut(rid).location = Location::OnDisk;
                    self.metrics.record_eviction(EvictionKind::DiskSwap);
                    info!(
                        candidate = %id,
                        victim = %state.record(victim).id,
                        "Evicted via disk swap"
                    );
                    return Some(StorageTier::Disk);
                }
                Err(e) => warn!(article = %id, "Disk swap failed: {}", e),
            }
        }

        if self.config.restore_orphaned_victims {
            state.index.push(victim, victim_views);
        } else {
            debug!(victim = %state.record(victim).id, "No swap feasible; victim left out of the index");
        }
        self.metrics.record_admission_denied();
        None
    }

    async fn demote(&self, state: &mut CacheState, victim: RecordId, data: &Bytes) {
        if !state.disk.fits(data.len() as u64) {
            return;
        }
        let id = state.record(victim).id.clone();
        match state.disk.write(&id, data).await {
            Ok(()) => {
                state.record_mut(victim).location = Location::OnDisk;
                debug!(article = %id, "Demoted evicted article to disk");
            }
            Err(e) => warn!(article = %id, "Demotion to disk failed: {}", e),
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Snapshot of a record, by request path or id.
    pub async fn record(&self, article: &str) -> Option<ArticleRecord> {
        let id = ArticleId::from_request_path(article);
        let state = self.state.lock().await;
        state.by_id.get(&id).map(|rid| state.record(*rid).clone())
    }

    /// Whether a record is currently a member of the eviction index.
    pub async fn is_eviction_candidate(&self, article: &str) -> bool {
        let id = ArticleId::from_request_path(article);
        let state = self.state.lock().await;
        state
            .by_id
            .get(&id)
            .map(|rid| state.index.contains(*rid))
            .unwrap_or(false)
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            records: state.records.len(),
            memory_entries: state.memory.len(),
            memory_used_bytes: state.memory.used(),
            memory_capacity_bytes: state.memory.capacity(),
            disk_entries: state.disk.len(),
            disk_used_bytes: state.disk.used(),
            disk_capacity_bytes: state.disk.capacity(),
            eviction_index_len: state.index.len(),
            origin_fetches: self.metrics.origin_fetches(),
            admissions_denied: self.metrics.admissions_denied(),
        }
    }

    /// Verify tier exclusivity and capacity accounting.
    ///
    /// Returns a description of the first violation found.
    pub async fn check_invariants(&self) -> std::result::Result<(), String> {
        let state = self.state.lock().await;

        if state.memory.used() > state.memory.capacity() {
            return Err(format!(
                "memory over budget: {} > {}",
                state.memory.used(),
                state.memory.capacity()
            ));
        }
        if state.disk.used() > state.disk.capacity() {
            return Err(format!(
                "disk over budget: {} > {}",
                state.disk.used(),
                state.disk.capacity()
            ));
        }

        let mut slots_seen = HashMap::new();
        let mut memory_bytes = 0u64;
        for record in &state.records {
            let on_disk = state.disk.contains(&record.id);
            match record.location {
                Location::InMemory(slot) => {
                    let Some(len) = state.memory.slot_len(slot) else {
                        return Err(format!("{} points at freed slot {}", record.id, slot));
                    };
                    if let Some(other) = slots_seen.insert(slot, record.id.clone()) {
                        return Err(format!("slot {} shared by {} and {}", slot, other, record.id));
                    }
                    if on_disk {
                        return Err(format!("{} is in memory and on disk", record.id));
                    }
                    memory_bytes += len;
                }
                Location::OnDisk if !on_disk => {
                    return Err(format!("{} marked on disk but not accounted", record.id));
                }
                Location::NotCached if on_disk => {
                    return Err(format!("{} not cached but accounted on disk", record.id));
                }
                _ => {}
            }
        }

        if memory_bytes != state.memory.used() {
            return Err(format!(
                "memory accounting drift: records hold {} bytes, tier reports {}",
                memory_bytes,
                state.memory.used()
            ));
        }
        Ok(())
    }

    /// Content encoding of every payload this engine serves
    pub fn compression(&self) -> CompressionAlgorithm {
        self.compressor.algorithm()
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("config", &self.config)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
