//! DNS Steering
//!
//! Authoritative-only UDP server for the CDN name. Each A query is answered
//! with the replica closest to the querying address.

pub mod codec;
mod server;

pub use codec::Rcode;
pub use server::{DnsConfig, DnsServer, DEFAULT_CDN_NAME, DEFAULT_TTL_SECS};
