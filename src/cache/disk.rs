//! Disk Tier
//!
//! One file per article under the cache directory, named by the normalized
//! article id. The tier tracks the size of every file it accounts for.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tracing::{debug, warn};

use crate::domain::ports::ArticleId;
use crate::error::Result;

/// Directory-backed tier with a byte budget
#[derive(Debug)]
pub struct DiskTier {
    dir: PathBuf,
    files: HashMap<ArticleId, u64>,
    used: u64,
    capacity: u64,
    /// Writes left to fail before the disk behaves again
    #[cfg(test)]
    fail_writes: u32,
}

impl DiskTier {
    pub fn new(dir: impl Into<PathBuf>, capacity: u64) -> Self {
        Self {
            dir: dir.into(),
            files: HashMap::new(),
            used: 0,
            capacity,
            #[cfg(test)]
            fail_writes: 0,
        }
    }

    /// Create the cache directory if needed.
    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// List `(id, size)` of every regular file currently in the directory.
    pub async fn scan(&self) -> Result<Vec<(ArticleId, u64)>> {
        let mut found = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => found.push((ArticleId::from_normalized(name), meta.len())),
                Err(name) => warn!("Skipping non UTF-8 cache file {:?}", name),
            }
        }
        found.sort();
        Ok(found)
    }

    pub fn path_for(&self, id: &ArticleId) -> PathBuf {
        self.dir.join(id.as_str())
    }

    pub fn fits(&self, len: u64) -> bool {
        self.used.saturating_add(len) <= self.capacity
    }

    /// Account for a file that is already on disk (startup build).
    ///
    /// Returns `false` and accounts nothing if it would exceed the budget.
    pub fn adopt(&mut self, id: &ArticleId, len: u64) -> bool {
        if !self.fits(len) {
            return false;
        }
        self.used += len;
        self.files.insert(id.clone(), len);
        true
    }

    /// Write a payload and account for it.
    ///
    /// The caller is expected to have checked the budget; a failed write
    /// leaves accounting untouched and removes any partial file.
    pub async fn write(&mut self, id: &ArticleId, data: &Bytes) -> Result<()> {
        self.injected_failure()?;
        let path = self.path_for(id);
        if let Err(e) = fs::write(&path, data).await {
            let _ = fs::remove_file(&path).await;
            return Err(e.into());
        }
        let len = data.len() as u64;
        if let Some(previous) = self.files.insert(id.clone(), len) {
            self.used -= previous;
        }
        self.used += len;
        debug!(article = %id, bytes = len, "Wrote article to disk tier");
        Ok(())
    }

    /// Read a file without touching accounting.
    pub async fn read_path(path: &Path) -> Result<Bytes> {
        Ok(Bytes::from(fs::read(path).await?))
    }

    /// Delete a file that was never accounted for.
    pub async fn discard_unaccounted(&self, id: &ArticleId) -> Result<()> {
        fs::remove_file(self.path_for(id)).await?;
        Ok(())
    }

    pub fn contains(&self, id: &ArticleId) -> bool {
        self.files.contains_key(id)
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Make the next `count` writes fail as if the device errored.
    #[cfg(test)]
    pub(crate) fn fail_next_writes(&mut self, count: u32) {
        self.fail_writes = count;
    }

    #[cfg(test)]
    fn injected_failure(&mut self) -> Result<()> {
        if self.fail_writes == 0 {
            return Ok(());
        }
        self.fail_writes -= 1;
        Err(std::io::Error::new(std::io::ErrorKind::Other, "injected write failure").into())
    }

    #[cfg(not(test))]
    fn injected_failure(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(name: &str) -> ArticleId {
        ArticleId::from_title(name)
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let mut tier = DiskTier::new(temp_dir.path(), 100);

        tier.write(&id("Shakira"), &Bytes::from_static(b"compressed"))
            .await
            .unwrap();
        assert_eq!(tier.used(), 10);
        assert!(tier.contains(&id("Shakira")));

        let data = DiskTier::read_path(&tier.path_for(&id("Shakira")))
            .await
            .unwrap();
        assert_eq!(data.as_ref(), b"compressed");
    }

    #[tokio::test]
    async fn test_overwrite_adjusts_accounting() {
        let temp_dir = TempDir::new().unwrap();
        let mut tier = DiskTier::new(temp_dir.path(), 100);

        tier.write(&id("A"), &Bytes::from(vec![1u8; 30])).await.unwrap();
        tier.write(&id("A"), &Bytes::from(vec![1u8; 10])).await.unwrap();
        assert_eq!(tier.used(), 10);
        assert_eq!(tier.len(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_leaves_accounting() {
        let temp_dir = TempDir::new().unwrap();
        let mut tier = DiskTier::new(temp_dir.path().join("missing"), 100);

        let result = tier.write(&id("A"), &Bytes::from_static(b"data")).await;
        assert!(result.is_err());
        assert_eq!(tier.used(), 0);
        assert!(tier.is_empty());
    }

    #[tokio::test]
    async fn test_scan_lists_files() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("B"), b"12345").unwrap();
        std::fs::write(temp_dir.path().join("A"), b"123").unwrap();
        std::fs::create_dir(temp_dir.path().join("subdir")).unwrap();

        let tier = DiskTier::new(temp_dir.path(), 100);
        let found = tier.scan().await.unwrap();
        assert_eq!(
            found,
            vec![
                (ArticleId::from_normalized("A"), 3),
                (ArticleId::from_normalized("B"), 5)
            ]
        );
    }

    #[test]
    fn test_adopt_respects_budget() {
        let mut tier = DiskTier::new("/tmp/unused", 10);
        assert!(tier.adopt(&id("A"), 6));
        assert!(!tier.adopt(&id("B"), 6));
        assert_eq!(tier.used(), 6);
        assert!(tier.fits(4));
        assert!(!tier.fits(5));
    }

    #[tokio::test]
    async fn test_injected_failure_is_transient() {
        let temp_dir = TempDir::new().unwrap();
        let mut tier = DiskTier::new(temp_dir.path(), 10);
        tier.fail_next_writes(1);

        assert!(tier.write(&id("A"), &Bytes::from_static(b"abc")).await.is_err());
        assert_eq!(tier.used(), 0);
        tier.write(&id("A"), &Bytes::from_static(b"abc")).await.unwrap();
        assert_eq!(tier.used(), 3);
    }

    #[tokio::test]
    async fn test_discard_unaccounted_deletes_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("Stray"), b"1234").unwrap();
        let tier = DiskTier::new(temp_dir.path(), 10);

        tier.discard_unaccounted(&id("Stray")).await.unwrap();
        assert!(!temp_dir.path().join("Stray").exists());
        assert_eq!(tier.used(), 0);
    }
}
