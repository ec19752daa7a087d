//! Popularity Manifest
//!
//! CSV with (at least) an `article` title column and a `views` count column,
//! one row per known article, most popular first by convention.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::domain::ports::ArticleId;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct ManifestRow {
    article: String,
    views: u64,
}

/// One manifest row, normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub id: ArticleId,
    pub views: u64,
}

/// Read a manifest file.
pub fn read_manifest(path: impl AsRef<Path>) -> Result<Vec<ManifestEntry>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|e| Error::Manifest(format!("cannot open {}: {}", path.display(), e)))?;
    parse_manifest(file)
}

/// Parse manifest rows from any reader. Extra columns are ignored.
pub fn parse_manifest<R: Read>(reader: R) -> Result<Vec<ManifestEntry>> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut entries = Vec::new();
    for (line, row) in csv.deserialize::<ManifestRow>().enumerate() {
        let row = row.map_err(|e| Error::Manifest(format!("row {}: {}", line + 1, e)))?;
        entries.push(ManifestEntry {
            id: ArticleId::from_title(&row.article),
            views: row.views,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_manifest() {
        let data = "article,views,rank\nMain Page,1000,1\n\"Foo, Bar\",20,2\n";
        let entries = parse_manifest(data.as_bytes()).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id.as_str(), "Main_Page");
        assert_eq!(entries[0].views, 1000);
        assert_eq!(entries[1].id, ArticleId::from_title("Foo, Bar"));
        assert_eq!(entries[1].views, 20);
    }

    #[test]
    fn test_parse_manifest_bad_views() {
        let data = "article,views\nMain Page,lots\n";
        let err = parse_manifest(data.as_bytes()).unwrap_err();
        assert_matches!(err, Error::Manifest(msg) if msg.contains("row 1"));
    }

    #[test]
    fn test_missing_manifest_file() {
        let err = read_manifest("/nonexistent/pageviews.csv").unwrap_err();
        assert_matches!(err, Error::Manifest(_));
    }
}
