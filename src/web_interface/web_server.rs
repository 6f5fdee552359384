use super::broadcaster::Broadcaster;
use super::types::ClientMessage;
use crate::error_handling::types::NetworkError;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Interval between server-initiated Ping frames.
pub const PING_INTERVAL: Duration = Duration::from_secs(20);
/// How long a peer may stay silent after a Ping before it is dropped.
pub const PONG_TIMEOUT: Duration = Duration::from_secs(20);

/// Ping cadence of a connection and the grace period for the peer to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
}

impl KeepAlive {
    /// Longest silence tolerated from a peer: one ping period plus the time to answer it.
    pub fn idle_limit(&self) -> Duration {
        self.ping_interval + self.pong_timeout
    }
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            ping_interval: PING_INTERVAL,
            pong_timeout: PONG_TIMEOUT,
        }
    }
}

/// WebSocket accept loop feeding the [`Broadcaster`].
pub struct WsServer {
    listener: TcpListener,
    broadcaster: Arc<Broadcaster>,
    keep_alive: KeepAlive,
}

impl WsServer {
    pub async fn bind(addr: SocketAddr, broadcaster: Arc<Broadcaster>) -> Result<Self, NetworkError> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!("[WS] Unable to bind {}: {}", addr, e);
            NetworkError::BindError(e)
        })?;
        Ok(Self {
            listener,
            broadcaster,
            keep_alive: KeepAlive::default(),
        })
    }

    pub fn with_keep_alive(mut self, keep_alive: KeepAlive) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.listener.local_addr().map_err(NetworkError::SockError)
    }

    /// Accept loop. Never returns.
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("[WS] Broadcast service running on ws://{}", addr);
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let broadcaster = Arc::clone(&self.broadcaster);
                    let keep_alive = self.keep_alive;
                    tokio::spawn(async move {
                        if let Err(e) = handle_ws_connection(stream, peer, broadcaster, keep_alive).await {
                            warn!("[WS] Connection from {} failed: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    warn!("[WS] Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

/// Runs one client from handshake to disconnect.
///
/// Outbound frames come from the broadcaster through an unbounded queue drained by a writer
/// task, which also emits the keep-alive pings. The reader loop owns the connection lifetime:
/// whatever ends it, the client is unregistered and the writer stopped. A peer that sends
/// nothing, not even a Pong, for [`KeepAlive::idle_limit`] is dropped.
pub async fn handle_ws_connection(
    stream: TcpStream,
    peer: SocketAddr,
    broadcaster: Arc<Broadcaster>,
    keep_alive: KeepAlive,
) -> Result<(), NetworkError> {
    let ws = match tokio::time::timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::accept_async(stream)).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => return Err(NetworkError::HandshakeFailed(e.to_string())),
        Err(_) => return Err(NetworkError::Timeout),
    };

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    let id = broadcaster.register(peer, outbound_tx).await;

    let writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(keep_alive.ping_interval);
        // First tick completes immediately
        ping.tick().await;

        loop {
            tokio::select! {
                message = outbound_rx.recv() => {
                    let Some(message) = message else { break };
                    if ws_tx.send(message).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        let frame = match tokio::time::timeout(keep_alive.idle_limit(), ws_rx.next()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(_) => {
                info!("[WS] {} did not answer the keep-alive ping, dropping it", peer);
                break;
            }
        };
        match frame {
            Ok(Message::Text(text)) => on_client_message(peer, text.as_str()),
            Ok(Message::Close(reason)) => {
                debug!("[WS] {} sent close ({:?})", peer, reason);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!("[WS] {} transport error: {}", peer, e);
                break;
            }
        }
    }

    broadcaster.unregister(id).await;
    writer.abort();
    Ok(())
}

/// Logging hook for client text frames. Nothing the client sends changes server state.
pub fn on_client_message(peer: SocketAddr, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::WsIdentify { session_id }) => {
            info!("[WS] {} identified with session {}", peer, session_id);
        }
        Err(_) => debug!("[WS] Unrecognised message from {}: {}", peer, text),
    }
}
