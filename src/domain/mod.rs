//! Domain Layer
//!
//! Value objects and the ports the core depends on.
//!
//! # Usage
//!
//! ```ignore
//! use cdn_replica::domain::{ArticleId, OriginClient};
//!
//! async fn warm<O: OriginClient>(origin: &O) -> Result<()> {
//!     let body = origin.fetch(&ArticleId::from_title("Albert Einstein")).await?;
//!     // ...
//! }
//! ```

pub mod ports;

pub use ports::{ArticleId, Coordinate, GeoLocator, OriginClient};
