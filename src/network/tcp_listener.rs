//! # TCP Profile Listener
//!
//! Accepts one JSON profile message per connection, issues or renews a session through the
//! [`SessionRegistry`] and replies with a single JSON object before closing.
//!
//! ```text
//! ┌────────────┐  profile JSON   ┌─────────────────────┐  create_or_renew  ┌─────────────────┐
//! │ TCP client │────────────────▶│ TcpProfileListener  │──────────────────▶│ SessionRegistry │
//! │            │◀────────────────│ (task per conn)     │                   └─────────────────┘
//! └────────────┘  status + id    └─────────────────────┘
//! ```
//!
//! There is no framing: the whole request must arrive in the first read. There is no
//! connection limit either, every accepted connection gets its own task.

use super::types::ProfileResponse;
use crate::error_handling::types::{NetworkError, ProtocolError};
use crate::session_management::SessionRegistry;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

/// Size of the single read performed on each connection.
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TcpProfileListener {
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
}

impl TcpProfileListener {
    /// Binds the listening socket. Failing here is fatal for the server.
    pub async fn bind(addr: SocketAddr, registry: Arc<SessionRegistry>) -> Result<Self, NetworkError> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!("[TCP] Unable to bind {}: {}", addr, e);
            NetworkError::BindError(e)
        })?;
        Ok(Self { listener, registry })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.listener.local_addr().map_err(NetworkError::SockError)
    }

    /// Accept loop. Never returns; accept errors are logged and the loop keeps going.
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("[TCP] Profile listener running on {}", addr);
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("[TCP] Connection from {}", peer);
                    let registry = Arc::clone(&self.registry);
                    tokio::spawn(async move {
                        handle_connection(stream, peer, &registry).await;
                    });
                }
                Err(e) => {
                    warn!("[TCP] Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

/// Serves one connection: one read, one reply, then close.
pub async fn handle_connection<S>(mut stream: S, peer: SocketAddr, registry: &SessionRegistry)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; MAX_MESSAGE_SIZE];
    let read = match tokio::time::timeout(READ_TIMEOUT, stream.read(&mut buffer)).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            warn!("[TCP] Read from {} failed: {}", peer, e);
            send_response(&mut stream, peer, &ProfileResponse::error("server error while reading request")).await;
            let _ = stream.shutdown().await;
            return;
        }
        Err(_) => {
            warn!("[TCP] {} sent nothing within {:?}", peer, READ_TIMEOUT);
            send_response(&mut stream, peer, &ProfileResponse::error("timed out waiting for request")).await;
            let _ = stream.shutdown().await;
            return;
        }
    };

    match process_request(&buffer[..read], peer, registry) {
        Ok(response) => send_response(&mut stream, peer, &response).await,
        Err(ProtocolError::EmptyMessage) => {
            debug!("[TCP] {} closed without sending data", peer);
        }
        Err(ProtocolError::InvalidJson(e)) => {
            warn!(
                "[TCP] Invalid JSON from {}: {} (data: '{}')",
                peer,
                e,
                String::from_utf8_lossy(&buffer[..read.min(200)])
            );
            send_response(&mut stream, peer, &ProfileResponse::error("invalid JSON")).await;
        }
        Err(ProtocolError::UnexpectedShape(e)) => {
            warn!("[TCP] Unexpected message from {}: {}", peer, e);
            send_response(&mut stream, peer, &ProfileResponse::error("expected a JSON object")).await;
        }
    }

    let _ = stream.shutdown().await;
}

/// Turns raw request bytes into the reply, issuing or renewing the session on the way.
pub fn process_request(
    raw: &[u8],
    peer: SocketAddr,
    registry: &SessionRegistry,
) -> Result<ProfileResponse, ProtocolError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(ProtocolError::EmptyMessage);
    }

    let payload: Value = serde_json::from_slice(raw)?;
    let fields = payload
        .as_object()
        .ok_or_else(|| ProtocolError::UnexpectedShape(format!("JSON {} instead of an object", kind_of(&payload))))?;

    let candidate = fields.get("session_id").and_then(Value::as_str);
    let name = fields.get("name").and_then(Value::as_str);
    let action = fields.get("action").and_then(Value::as_str).unwrap_or("unspecified");
    debug!("[TCP] Action '{}' from {}", action, peer);

    let issued = registry.create_or_renew(candidate, name, peer);
    let status = if issued.renewed {
        format!("Session {} for '{}' confirmed and refreshed.", issued.id, issued.owner)
    } else {
        format!("New session {} created for '{}'.", issued.id, issued.owner)
    };
    info!("[TCP] {}", status);

    Ok(ProfileResponse::success(
        format!("Profile '{}' processed. {}", issued.owner, status),
        issued.id.to_string(),
    ))
}

async fn send_response<S>(stream: &mut S, peer: SocketAddr, response: &ProfileResponse)
where
    S: AsyncWrite + Unpin,
{
    let bytes = match serde_json::to_vec(response) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("[TCP] Unable to encode response for {}: {}", peer, e);
            return;
        }
    };
    if let Err(e) = stream.write_all(&bytes).await {
        warn!("[TCP] Unable to reply to {}: {}", peer, e);
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
