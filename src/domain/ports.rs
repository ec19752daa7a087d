//! Domain Ports (DDD Port/Adapter Pattern)
//!
//! This module defines the core abstractions (ports) that the cache engine and
//! the replica selector depend on. Infrastructure adapters implement these
//! traits to provide concrete implementations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │        OriginClient      │      GeoLocator           │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  HttpOriginClient │ MaxMindLocator │ StaticLocator  │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::net::IpAddr;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// =============================================================================
// Value Objects
// =============================================================================

/// Article identifier (value object).
///
/// Always held in normalized, URL-safe form: spaces become `_` and everything
/// outside the unreserved set is percent-encoded. The same string is used as
/// the record key, the origin path and the on-disk filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ArticleId(String);

impl ArticleId {
    /// Normalize a human-readable title, e.g. `"Albert Einstein"`.
    pub fn from_title(title: &str) -> Self {
        Self(urlencoding::encode(&title.replace(' ', "_")).into_owned())
    }

    /// Normalize a request path such as `/Albert_Einstein`.
    ///
    /// A single leading `/` is stripped. The remainder is percent-decoded and
    /// re-encoded so that `/Foo_(bar)` and `/Foo_%28bar%29` name the same
    /// article.
    pub fn from_request_path(path: &str) -> Self {
        let path = path.strip_prefix('/').unwrap_or(path);
        match urlencoding::decode(path) {
            Ok(decoded) => Self::from_title(&decoded),
            Err(_) => Self(path.to_string()),
        }
    }

    /// Wrap an identifier that is already normalized (e.g. a cache filename).
    pub fn from_normalized(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ArticleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Geographic coordinate in decimal degrees (value object).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

// =============================================================================
// Origin Port
// =============================================================================

/// Port for fetching article bytes from the origin.
///
/// Implementations return the raw, uncompressed body. A missing article must
/// be reported as [`Error::OriginNotFound`](crate::error::Error::OriginNotFound)
/// so the serving layer can answer 404 instead of 502.
#[async_trait]
pub trait OriginClient: Send + Sync {
    /// Fetch the raw bytes of an article.
    async fn fetch(&self, article: &ArticleId) -> Result<Bytes>;
}

// =============================================================================
// Geo Port
// =============================================================================

/// Port for IP geolocation.
pub trait GeoLocator: Send + Sync {
    /// Locate an address. Fails for addresses the database does not know.
    fn locate(&self, address: IpAddr) -> Result<Coordinate>;
}
