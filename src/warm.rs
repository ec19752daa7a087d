//! Cache Warming
//!
//! Pre-populates the cache directory from the popularity manifest so a
//! freshly started replica finds its most popular articles on disk.
//!
//! ```text
//! manifest ──▶ fetch ×N (bounded) ──▶ gzip ──▶ write in manifest order
//!                                                 │
//!                                   stop at the disk budget or an I/O error
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::cache::disk::DiskTier;
use crate::cache::{Compressor, ManifestEntry, DEFAULT_CACHE_DIR, DEFAULT_MAX_DISK_BYTES};
use crate::domain::ports::{ArticleId, OriginClient};
use crate::error::{Error, Result};

/// Warming configuration
#[derive(Debug, Clone)]
pub struct WarmConfig {
    pub cache_dir: PathBuf,
    pub max_disk_bytes: u64,
    /// Origin fetches in flight at once
    pub concurrency: usize,
}

impl Default for WarmConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            max_disk_bytes: DEFAULT_MAX_DISK_BYTES,
            concurrency: 8,
        }
    }
}

/// Why a warming run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmOutcome {
    /// Every manifest row was processed
    Completed,
    /// The next article would not fit the disk budget
    BudgetReached { article: String },
    /// Writing to the cache directory failed
    IoError { article: String, reason: String },
}

/// Summary of a warming run
#[derive(Debug, Clone, Serialize)]
pub struct WarmReport {
    pub written: usize,
    pub already_cached: usize,
    pub skipped: usize,
    pub bytes_written: u64,
    pub disk_used_bytes: u64,
    pub outcome: WarmOutcome,
}

/// Fetch and write manifest articles until the disk budget is reached.
///
/// Files already in the directory count against the budget and are not
/// fetched again. Origin errors skip the article.
#[instrument(skip_all, fields(cache_dir = %config.cache_dir.display()))]
pub async fn warm_cache(
    config: &WarmConfig,
    manifest: Vec<ManifestEntry>,
    origin: Arc<dyn OriginClient>,
    compressor: Arc<dyn Compressor>,
) -> Result<WarmReport> {
    if config.concurrency == 0 {
        return Err(Error::Config("warm concurrency must be at least 1".to_string()));
    }

    let mut disk = DiskTier::new(&config.cache_dir, config.max_disk_bytes);
    disk.ensure_dir().await?;
    for (id, len) in disk.scan().await? {
        if !disk.adopt(&id, len) {
            warn!(article = %id, bytes = len, "Existing cache file exceeds the budget");
        }
    }

    let total = manifest.len();
    let mut report = WarmReport {
        written: 0,
        already_cached: 0,
        skipped: 0,
        bytes_written: 0,
        disk_used_bytes: disk.used(),
        outcome: WarmOutcome::Completed,
    };

    let mut pending = Vec::with_capacity(total);
    for entry in manifest {
        if disk.contains(&entry.id) {
            report.already_cached += 1;
        } else {
            pending.push(entry.id);
        }
    }

    info!(
        "Warming {} of {} articles ({} already cached)",
        pending.len(),
        total,
        report.already_cached
    );

    let mut fetched = stream::iter(pending)
        .map(|id| {
            let origin = Arc::clone(&origin);
            let compressor = Arc::clone(&compressor);
            async move {
                let result = fetch_compressed(origin.as_ref(), compressor, &id).await;
                (id, result)
            }
        })
        .buffered(config.concurrency);

    while let Some((id, result)) = fetched.next().await {
        let data = match result {
            Ok(data) => data,
            Err(e) => {
                warn!(article = %id, "Skipping article: {}", e);
                report.skipped += 1;
                continue;
            }
        };

        let len = data.len() as u64;
        if !disk.fits(len) {
            info!(article = %id, bytes = len, "Disk budget reached");
            report.outcome = WarmOutcome::BudgetReached {
                article: id.to_string(),
            };
            break;
        }

        if let Err(e) = disk.write(&id, &data).await {
            error!(article = %id, "Cache write failed, stopping: {}", e);
            report.outcome = WarmOutcome::IoError {
                article: id.to_string(),
                reason: e.to_string(),
            };
            break;
        }
        report.written += 1;
        report.bytes_written += len;
    }

    report.disk_used_bytes = disk.used();
    info!(
        "Warming finished: {} written ({} bytes), {} skipped, {} of {} bytes used",
        report.written,
        report.bytes_written,
        report.skipped,
        disk.used(),
        disk.capacity()
    );
    Ok(report)
}

async fn fetch_compressed(
    origin: &dyn OriginClient,
    compressor: Arc<dyn Compressor>,
    id: &ArticleId,
) -> Result<bytes::Bytes> {
    let raw = origin.fetch(id).await?;
    tokio::task::spawn_blocking(move || compressor.compress(&raw))
        .await
        .map_err(|e| Error::Internal(format!("compression task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{GzipCompressor, NoopCompressor};
    use async_trait::async_trait;
    use bytes::Bytes;
    use tempfile::TempDir;

    /// Bodies of `len` bytes, keyed by id; anything else is a 404.
    struct SizedOrigin(Vec<(&'static str, usize)>);

    #[async_trait]
    impl OriginClient for SizedOrigin {
        async fn fetch(&self, article: &ArticleId) -> Result<Bytes> {
            self.0
                .iter()
                .find(|(id, _)| *id == article.as_str())
                .map(|(_, len)| Bytes::from(vec![b'a'; *len]))
                .ok_or_else(|| Error::OriginNotFound(article.to_string()))
        }
    }

    fn manifest(ids: &[&str]) -> Vec<ManifestEntry> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| ManifestEntry {
                id: ArticleId::from_normalized(*id),
                views: 100 - i as u64,
            })
            .collect()
    }

    fn config(dir: &TempDir, budget: u64) -> WarmConfig {
        WarmConfig {
            cache_dir: dir.path().to_path_buf(),
            max_disk_bytes: budget,
            concurrency: 3,
        }
    }

    #[tokio::test]
    async fn test_warm_writes_in_order_until_budget() {
        let dir = TempDir::new().unwrap();
        let origin = SizedOrigin(vec![("A", 4), ("B", 4), ("C", 4), ("D", 1)]);

        let report = warm_cache(
            &config(&dir, 10),
            manifest(&["A", "B", "C", "D"]),
            Arc::new(origin),
            Arc::new(NoopCompressor),
        )
        .await
        .unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(report.disk_used_bytes, 8);
        assert_eq!(
            report.outcome,
            WarmOutcome::BudgetReached {
                article: "C".to_string()
            }
        );
        assert!(dir.path().join("A").exists());
        assert!(dir.path().join("B").exists());
        assert!(!dir.path().join("C").exists());
        // Stops at the first article that does not fit, even if later ones would
        assert!(!dir.path().join("D").exists());
    }

    #[tokio::test]
    async fn test_origin_errors_are_skipped() {
        let dir = TempDir::new().unwrap();
        let origin = SizedOrigin(vec![("A", 2), ("C", 2)]);

        let report = warm_cache(
            &config(&dir, 100),
            manifest(&["A", "Missing", "C"]),
            Arc::new(origin),
            Arc::new(NoopCompressor),
        )
        .await
        .unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.outcome, WarmOutcome::Completed);
    }

    #[tokio::test]
    async fn test_existing_files_count_and_are_kept() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("A"), b"old!").unwrap();
        let origin = SizedOrigin(vec![("A", 50), ("B", 3)]);

        let report = warm_cache(
            &config(&dir, 10),
            manifest(&["A", "B"]),
            Arc::new(origin),
            Arc::new(NoopCompressor),
        )
        .await
        .unwrap();

        assert_eq!(report.already_cached, 1);
        assert_eq!(report.written, 1);
        assert_eq!(report.disk_used_bytes, 7);
        assert_eq!(std::fs::read(dir.path().join("A")).unwrap(), b"old!");
    }

    #[tokio::test]
    async fn test_written_files_are_gzip() {
        let dir = TempDir::new().unwrap();
        let origin = SizedOrigin(vec![("A", 1000)]);

        warm_cache(
            &config(&dir, 10_000),
            manifest(&["A"]),
            Arc::new(origin),
            Arc::new(GzipCompressor::new()),
        )
        .await
        .unwrap();

        let written = std::fs::read(dir.path().join("A")).unwrap();
        assert_eq!(&written[..2], &[0x1f, 0x8b]);
        assert!(written.len() < 1000);
    }

    #[tokio::test]
    async fn test_zero_concurrency_rejected() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir, 10);
        cfg.concurrency = 0;
        let result = warm_cache(&cfg, vec![], Arc::new(SizedOrigin(vec![])), Arc::new(NoopCompressor)).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
