//! Replica list loading.
//!
//! ```yaml
//! - name: repl1
//!   address: 139.144.30.25
//! - name: repl2
//!   address: 173.255.210.124
//!   latitude: 37.5625
//!   longitude: -122.0004
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::{Replica, ReplicaTable};
use crate::domain::ports::{Coordinate, GeoLocator};
use crate::error::{Error, Result};

/// One replica as written in the list file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplicaSpec {
    pub name: String,
    pub address: Ipv4Addr,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl ReplicaSpec {
    /// Use configured coordinates, or ask the locator.
    fn resolve(self, locator: &dyn GeoLocator) -> Result<Replica> {
        let location = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Coordinate::new(latitude, longitude),
            (None, None) => locator.locate(IpAddr::V4(self.address)).map_err(|e| {
                Error::Config(format!("cannot locate replica {}: {}", self.name, e))
            })?,
            _ => {
                return Err(Error::Config(format!(
                    "replica {} needs both latitude and longitude",
                    self.name
                )))
            }
        };
        Ok(Replica {
            name: self.name,
            address: self.address,
            location,
        })
    }
}

/// Parse a YAML replica list and resolve every position.
pub fn parse_replicas(yaml: &str, locator: &dyn GeoLocator) -> Result<ReplicaTable> {
    let specs: Vec<ReplicaSpec> = serde_yaml::from_str(yaml)?;

    let mut table = ReplicaTable::new();
    for spec in specs {
        if table.find_by_name(&spec.name).is_some() {
            return Err(Error::Config(format!("duplicate replica name {}", spec.name)));
        }
        if table.get(spec.address).is_some() {
            return Err(Error::Config(format!("duplicate replica address {}", spec.address)));
        }
        table.insert(spec.resolve(locator)?);
    }
    Ok(table)
}

/// Read and resolve a replica list file.
pub fn load_replicas(path: impl AsRef<Path>, locator: &dyn GeoLocator) -> Result<ReplicaTable> {
    let path = path.as_ref();
    let yaml = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
    let table = parse_replicas(&yaml, locator)?;
    info!("Loaded {} replicas from {}", table.len(), path.display());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::StaticLocator;
    use assert_matches::assert_matches;

    const LIST: &str = r#"
- name: repl1
  address: 139.144.30.25
- name: repl2
  address: 173.255.210.124
  latitude: 37.5625
  longitude: -122.0004
"#;

    #[test]
    fn test_parse_resolves_through_locator() {
        let locator = StaticLocator::new().with(
            "139.144.30.25".parse().unwrap(),
            Coordinate::new(40.7357, -74.1724),
        );

        let table = parse_replicas(LIST, &locator).unwrap();
        assert_eq!(table.len(), 2);
        let repl1 = table.get(Ipv4Addr::new(139, 144, 30, 25)).unwrap();
        assert_eq!(repl1.name, "repl1");
        assert_eq!(repl1.location.latitude, 40.7357);
        let repl2 = table.find_by_name("repl2").unwrap();
        assert_eq!(repl2.location.longitude, -122.0004);
        assert_eq!(repl2.address, Ipv4Addr::new(173, 255, 210, 124));
    }

    #[test]
    fn test_unlocatable_replica_is_an_error() {
        let err = parse_replicas(LIST, &StaticLocator::new()).unwrap_err();
        assert_matches!(err, Error::Config(msg) if msg.contains("repl1"));
    }

    #[test]
    fn test_half_coordinates_rejected() {
        let yaml = "- name: r\n  address: 10.0.0.1\n  latitude: 1.0\n";
        let err = parse_replicas(yaml, &StaticLocator::new()).unwrap_err();
        assert_matches!(err, Error::Config(_));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let yaml = "- {name: r, address: 10.0.0.1, latitude: 0.0, longitude: 0.0}\n\
                    - {name: r, address: 10.0.0.2, latitude: 1.0, longitude: 1.0}\n";
        let err = parse_replicas(yaml, &StaticLocator::new()).unwrap_err();
        assert_matches!(err, Error::Config(msg) if msg.contains("duplicate"));
    }

    #[test]
    fn test_duplicate_addresses_rejected() {
        let yaml = "- {name: r1, address: 10.0.0.1, latitude: 0.0, longitude: 0.0}\n\
                    - {name: r2, address: 10.0.0.1, latitude: 1.0, longitude: 1.0}\n";
        let err = parse_replicas(yaml, &StaticLocator::new()).unwrap_err();
        assert_matches!(err, Error::Config(msg) if msg.contains("address"));
    }

    #[test]
    fn test_bad_address_is_config_error() {
        let yaml = "- name: r\n  address: not-an-ip\n";
        assert_matches!(
            parse_replicas(yaml, &StaticLocator::new()),
            Err(Error::Config(_))
        );
    }
}
