//! Per-article bookkeeping.

use serde::Serialize;

use crate::domain::ports::ArticleId;

/// Index of a record in the engine's record arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub usize);

/// The two storage levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageTier {
    /// In-process buffer
    Memory,
    /// Cache directory
    Disk,
}

impl StorageTier {
    pub fn label(&self) -> &'static str {
        match self {
            StorageTier::Memory => "memory",
            StorageTier::Disk => "disk",
        }
    }
}

impl std::fmt::Display for StorageTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Where an article's compressed bytes currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "tier", content = "slot", rename_all = "snake_case")]
pub enum Location {
    NotCached,
    OnDisk,
    InMemory(usize),
}

impl Location {
    pub fn is_cached(&self) -> bool {
        !matches!(self, Location::NotCached)
    }
}

/// One per known article. Records are never removed; only `views` and
/// `location` change.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleRecord {
    /// Back-reference to the key, for records reached through the eviction index
    pub id: ArticleId,
    pub views: u64,
    pub location: Location,
}

impl ArticleRecord {
    pub fn new(id: ArticleId, views: u64) -> Self {
        Self {
            id,
            views,
            location: Location::NotCached,
        }
    }

    /// Count one request.
    pub fn record_view(&mut self) -> u64 {
        self.views = self.views.saturating_add(1);
        self.views
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_not_cached() {
        let record = ArticleRecord::new(ArticleId::from_title("Shakira"), 12);
        assert_eq!(record.location, Location::NotCached);
        assert_eq!(record.views, 12);
        assert!(!record.location.is_cached());
    }

    #[test]
    fn test_record_view_increments() {
        let mut record = ArticleRecord::new(ArticleId::from_title("Shakira"), 0);
        assert_eq!(record.record_view(), 1);
        assert_eq!(record.record_view(), 2);
    }

    #[test]
    fn test_location_is_cached() {
        assert!(Location::OnDisk.is_cached());
        assert!(Location::InMemory(0).is_cached());
        assert!(!Location::NotCached.is_cached());
    }

    #[test]
    fn test_record_serializes() {
        let mut record = ArticleRecord::new(ArticleId::from_title("50 Cent"), 4);
        record.location = Location::InMemory(2);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "50_Cent");
        assert_eq!(json["location"]["tier"], "in_memory");
        assert_eq!(json["location"]["slot"], 2);
    }
}
