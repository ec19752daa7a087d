//! UDP DNS steering server.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::codec::{self, Rcode, CLASS_IN, TYPE_A};
use crate::error::{Error, Result};
use crate::geo::ReplicaSelector;

/// Default TTL of steering answers, in seconds
pub const DEFAULT_TTL_SECS: u32 = 60;

/// Default name the server is authoritative for
pub const DEFAULT_CDN_NAME: &str = "cs5700cdn.example.com";

/// DNS server configuration
#[derive(Debug, Clone)]
pub struct DnsConfig {
    /// UDP bind address
    pub bind_addr: SocketAddr,
    /// The CDN name answered with a replica address
    pub name: String,
    /// TTL of A answers
    pub ttl: u32,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 53)),
            name: DEFAULT_CDN_NAME.to_string(),
            ttl: DEFAULT_TTL_SECS,
        }
    }
}

/// Answers A queries for the CDN name with the closest replica
pub struct DnsServer {
    config: DnsConfig,
    selector: Arc<ReplicaSelector>,
}

impl DnsServer {
    pub fn new(config: DnsConfig, selector: Arc<ReplicaSelector>) -> Self {
        Self { config, selector }
    }

    /// Bind and serve until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let socket = UdpSocket::bind(self.config.bind_addr).await.map_err(|e| {
            Error::Config(format!("Failed to bind DNS server on {}: {}", self.config.bind_addr, e))
        })?;
        self.serve(socket, shutdown).await
    }

    /// Serve on an already bound socket.
    pub async fn serve(&self, socket: UdpSocket, shutdown: CancellationToken) -> Result<()> {
        info!(
            "DNS server listening on {} for {}",
            socket.local_addr()?,
            self.config.name
        );

        let mut buf = vec![0u8; 1500];
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("DNS server shutting down");
                    return Ok(());
                }
                received = socket.recv_from(&mut buf) => {
                    let (len, peer) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            warn!("DNS receive error: {}", e);
                            continue;
                        }
                    };
                    if let Some(response) = self.handle(&buf[..len], peer.ip()) {
                        if let Err(e) = socket.send_to(&response, peer).await {
                            warn!(%peer, "DNS send error: {}", e);
                        }
                    }
                }
            }
        }
    }

    /// Compute the response for one datagram. `None` means stay silent.
    #[instrument(skip(self, packet), fields(len = packet.len()))]
    pub fn handle(&self, packet: &[u8], client: IpAddr) -> Option<Bytes> {
        let query = match codec::parse_query(packet) {
            Ok(query) => query,
            Err(e) => {
                debug!("Malformed query: {}", e);
                let (id, flags) = codec::peek_id(packet)?;
                // Never answer something that claims to be a response
                if flags & 0x8000 != 0 {
                    return None;
                }
                return Some(codec::build_error(id, flags, Rcode::FormErr));
            }
        };

        if query.opcode() != 0 {
            return Some(codec::build_response(&query, Rcode::NotImp, None));
        }

        let question = &query.question;
        if !question.is_for(&self.config.name) {
            debug!(name = %question.name, "Query outside our zone");
            return Some(codec::build_response(&query, Rcode::NxDomain, None));
        }

        if question.qtype != TYPE_A || question.qclass != CLASS_IN {
            return Some(codec::build_response(&query, Rcode::NoError, None));
        }

        match self.selector.select(client) {
            Ok(replica) => {
                info!(%client, replica = %replica.name, address = %replica.address, "Steering client");
                Some(codec::build_response(
                    &query,
                    Rcode::NoError,
                    Some((replica.address, self.config.ttl)),
                ))
            }
            Err(e) => {
                warn!(%client, "Replica selection failed: {}", e);
                Some(codec::build_response(&query, Rcode::ServFail, None))
            }
        }
    }

    pub fn config(&self) -> &DnsConfig {
        &self.config
    }
}
