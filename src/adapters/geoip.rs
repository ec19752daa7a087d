//! GeoIP Adapters
//!
//! Implements the `GeoLocator` port on top of a MaxMind GeoLite2-City
//! database, plus a static table used for configuration and tests.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use maxminddb::{geoip2, Reader};
use tracing::info;

use crate::domain::ports::{Coordinate, GeoLocator};
use crate::error::{Error, Result};

/// Locator backed by a MaxMind `.mmdb` database.
pub struct MaxMindLocator {
    reader: Reader<Vec<u8>>,
}

impl MaxMindLocator {
    /// Open a database file (e.g. `GeoLite2-City.mmdb`).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = Reader::open_readfile(path).map_err(|e| {
            Error::Config(format!("Failed to open GeoIP database {}: {}", path.display(), e))
        })?;
        info!("Opened GeoIP database {}", path.display());
        Ok(Self { reader })
    }
}

impl std::fmt::Debug for MaxMindLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaxMindLocator")
            .field("database_type", &self.reader.metadata.database_type)
            .finish()
    }
}

impl GeoLocator for MaxMindLocator {
    fn locate(&self, address: IpAddr) -> Result<Coordinate> {
        let lookup_error = |reason: String| Error::GeoLookup {
            address: address.to_string(),
            reason,
        };

        let city: geoip2::City = self
            .reader
            .lookup(address)
            .map_err(|e| lookup_error(e.to_string()))?;

        let location = city
            .location
            .ok_or_else(|| lookup_error("no location record".to_string()))?;

        match (location.latitude, location.longitude) {
            (Some(latitude), Some(longitude)) => Ok(Coordinate::new(latitude, longitude)),
            _ => Err(lookup_error("location has no coordinates".to_string())),
        }
    }
}

/// Fixed address → coordinate table.
#[derive(Debug, Clone, Default)]
pub struct StaticLocator {
    entries: HashMap<IpAddr, Coordinate>,
}

impl StaticLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, address: IpAddr, coordinate: Coordinate) -> Self {
        self.entries.insert(address, coordinate);
        self
    }

    pub fn insert(&mut self, address: IpAddr, coordinate: Coordinate) {
        self.entries.insert(address, coordinate);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl GeoLocator for StaticLocator {
    fn locate(&self, address: IpAddr) -> Result<Coordinate> {
        self.entries
            .get(&address)
            .copied()
            .ok_or_else(|| Error::GeoLookup {
                address: address.to_string(),
                reason: "address not in table".to_string(),
            })
    }
}
