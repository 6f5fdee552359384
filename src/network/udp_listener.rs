//! # UDP Hint Listener
//!
//! Stateless request/response: one location datagram in, one hint datagram out. A live
//! `session_id` personalises the hint and refreshes the session; anything else gets the generic
//! hint. Datagrams that are not JSON are logged and dropped without reply.

use super::types::{unix_timestamp, HintResponse, LocationUpdate};
use crate::error_handling::types::{NetworkError, ProtocolError};
use crate::session_management::SessionRegistry;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Receive buffer; larger datagrams are truncated by the OS and then fail to parse.
pub const MAX_DATAGRAM_SIZE: usize = 2048;

pub const GENERIC_HINT: &str = "You are in uncharted territory. Be careful!";

pub struct UdpHintListener {
    socket: UdpSocket,
    registry: Arc<SessionRegistry>,
}

impl UdpHintListener {
    pub async fn bind(addr: SocketAddr, registry: Arc<SessionRegistry>) -> Result<Self, NetworkError> {
        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            error!("[UDP] Unable to bind {}: {}", addr, e);
            NetworkError::BindError(e)
        })?;
        Ok(Self { socket, registry })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.socket.local_addr().map_err(NetworkError::SockError)
    }

    /// Receive loop. Never returns.
    pub async fn run(self) {
        if let Ok(addr) = self.socket.local_addr() {
            info!("[UDP] Hint listener running on {}", addr);
        }

        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (len, peer) = match self.socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(e) => {
                    // ICMP port unreachable from a previous reply surfaces here on some platforms
                    warn!("[UDP] Receive failed: {}", e);
                    continue;
                }
            };

            let hint = match respond(&buffer[..len], &self.registry) {
                Ok(hint) => hint,
                Err(e) => {
                    warn!(
                        "[UDP] Dropping datagram from {}: {} (data: '{}')",
                        peer,
                        e,
                        String::from_utf8_lossy(&buffer[..len.min(200)])
                    );
                    continue;
                }
            };

            match serde_json::to_vec(&hint) {
                Ok(bytes) => {
                    if let Err(e) = self.socket.send_to(&bytes, peer).await {
                        warn!("[UDP] Unable to reply to {}: {}", peer, e);
                    }
                }
                Err(e) => error!("[UDP] Unable to encode hint for {}: {}", peer, e),
            }
        }
    }
}

/// Builds the reply for one datagram.
pub fn respond(datagram: &[u8], registry: &SessionRegistry) -> Result<HintResponse, ProtocolError> {
    let update: LocationUpdate = serde_json::from_slice(datagram)?;
    debug!(
        "[UDP] {} at ({:?}, {:?})",
        update.action, update.latitude, update.longitude
    );

    let owner = update
        .session_id
        .as_deref()
        .and_then(|sid| registry.touch(sid));

    let hint = match owner {
        Some(owner) => format!("{}, you are near an ancient obelisk. Be careful!", owner),
        None => String::from(GENERIC_HINT),
    };

    Ok(HintResponse {
        hint,
        timestamp: unix_timestamp(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Duration::from_secs(1800))
    }

    #[test]
    fn test_generic_hint_without_session() {
        let registry = registry();
        let hint = respond(br#"{"latitude":55.75,"longitude":37.61,"action":"location_update"}"#, &registry).unwrap();
        assert_eq!(hint.hint, GENERIC_HINT);
        assert!(hint.timestamp > 0.0);
    }

    #[test]
    fn test_bogus_session_gets_generic_hint() {
        let registry = registry();
        let hint = respond(
            br#"{"latitude":55.75,"longitude":37.61,"action":"location_update","session_id":"bogus"}"#,
            &registry,
        )
        .unwrap();
        assert_eq!(hint.hint, GENERIC_HINT);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_live_session_is_personalised_and_refreshed() {
        let registry = registry();
        let issued = registry.create_or_renew(None, Some("Ann"), "127.0.0.1:4000".parse().unwrap());
        let before = registry.get(&issued.id).unwrap().last_seen;

        let raw = format!(
            r#"{{"latitude":1.0,"longitude":2.0,"action":"location_update","session_id":"{}"}}"#,
            issued.id
        );
        let hint = respond(raw.as_bytes(), &registry).unwrap();
        assert!(hint.hint.starts_with("Ann,"));
        assert!(registry.get(&issued.id).unwrap().last_seen > before);
    }

    #[test]
    fn test_malformed_datagram_is_an_error() {
        let registry = registry();
        assert!(matches!(respond(b"{oops", &registry), Err(ProtocolError::InvalidJson(_))));
    }
}
