//! Replica Selection
//!
//! Steers each client to the replica with the smallest great-circle distance.
//!
//! ```text
//! client IP ──▶ GeoLocator ──▶ (lat, lon) ──▶ haversine to every replica
//!                                                    │
//!                                  min by (distance, address) ──▶ Replica
//! ```

mod replicas;

pub use replicas::{load_replicas, parse_replicas, ReplicaSpec};

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::domain::ports::{Coordinate, GeoLocator};
use crate::error::{Error, Result};

/// Mean Earth radius used for distances, in kilometres
pub const EARTH_RADIUS_KM: f64 = 6373.0;

/// Great-circle distance between two points, in kilometres.
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let (lat1, lon1) = (a.latitude.to_radians(), a.longitude.to_radians());
    let (lat2, lon2) = (b.latitude.to_radians(), b.longitude.to_radians());

    let d_lat = lat2 - lat1;
    let d_lon = lon2 - lon1;

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// A content replica with a resolved position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Replica {
    pub name: String,
    pub address: Ipv4Addr,
    pub location: Coordinate,
}

/// Replicas keyed by network address.
#[derive(Debug, Clone, Default)]
pub struct ReplicaTable {
    replicas: BTreeMap<Ipv4Addr, Replica>,
}

impl ReplicaTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a replica.
    pub fn insert(&mut self, replica: Replica) {
        self.replicas.insert(replica.address, replica);
    }

    pub fn get(&self, address: Ipv4Addr) -> Option<&Replica> {
        self.replicas.get(&address)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Replica> {
        self.replicas.values().find(|replica| replica.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Replica> {
        self.replicas.values()
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Closest replica to `client`.
    ///
    /// Exact ties go to the smallest address in dotted-quad text form, so
    /// `10.0.0.10` wins over `10.0.0.9`.
    pub fn closest(&self, client: Coordinate) -> Option<&Replica> {
        self.replicas
            .values()
            .map(|replica| (haversine_km(client, replica.location), replica))
            .min_by(|(da, ra), (db, rb)| {
                da.total_cmp(db)
                    .then_with(|| ra.address.to_string().cmp(&rb.address.to_string()))
            })
            .map(|(_, replica)| replica)
    }
}

impl FromIterator<Replica> for ReplicaTable {
    fn from_iter<I: IntoIterator<Item = Replica>>(iter: I) -> Self {
        let mut table = ReplicaTable::new();
        for replica in iter {
            table.insert(replica);
        }
        table
    }
}

/// Maps client addresses to replicas
pub struct ReplicaSelector {
    table: ReplicaTable,
    locator: Arc<dyn GeoLocator>,
}

impl ReplicaSelector {
    /// Fails if the table is empty; there would be nothing to answer with.
    pub fn new(table: ReplicaTable, locator: Arc<dyn GeoLocator>) -> Result<Self> {
        if table.is_empty() {
            return Err(Error::Config("replica table is empty".to_string()));
        }
        Ok(Self { table, locator })
    }

    /// Pick the replica for a client address.
    pub fn select(&self, client: IpAddr) -> Result<&Replica> {
        let position = self.locator.locate(client)?;
        let replica = self
            .table
            .closest(position)
            .ok_or_else(|| Error::Internal("replica table is empty".to_string()))?;
        debug!(%client, %position, replica = %replica.name, "Selected replica");
        Ok(replica)
    }

    pub fn table(&self) -> &ReplicaTable {
        &self.table
    }
}

impl std::fmt::Debug for ReplicaSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaSelector")
            .field("replicas", &self.table.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
