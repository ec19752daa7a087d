//! CDN Replica - Popularity-Driven Edge Cache
//!
//! An edge replica that serves gzip-compressed articles out of a two-tier
//! cache, plus a DNS server that steers clients to the nearest replica.
//!
//! # Architecture
//!
//! ```text
//!            DNS query                          GET /<article>
//!               │                                     │
//!               ▼                                     ▼
//!   ┌─────────────────────┐             ┌──────────────────────────┐
//!   │  DnsServer          │             │  HttpServer              │
//!   │   └ ReplicaSelector │             │   └ CacheEngine          │
//!   │      └ GeoLocator   │             │      ├ MemoryTier        │
//!   └─────────────────────┘             │      ├ DiskTier          │
//!                                       │      └ OriginClient ──▶ origin
//!                                       └──────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Origin HTTP client and GeoIP locators
//! - [`cache`] - Tiered cache engine
//! - [`dns`] - DNS codec and steering server
//! - [`domain`] - Domain ports and value objects
//! - [`error`] - Error types
//! - [`geo`] - Great-circle replica selection
//! - [`http`] - Content server
//! - [`warm`] - Cache warming tool

pub mod adapters;
pub mod cache;
pub mod dns;
pub mod domain;
pub mod error;
pub mod geo;
pub mod http;
pub mod warm;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheEngine, EvictionMode};
pub use domain::{ArticleId, Coordinate, GeoLocator, OriginClient};
pub use error::{Error, Result};
pub use geo::{ReplicaSelector, ReplicaTable};
