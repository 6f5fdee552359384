//! Fan-out of server events to connected WebSocket clients.

use super::types::ServerEvent;
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;

struct ClientHandle {
    addr: SocketAddr,
    outbound: UnboundedSender<Message>,
}

/// Registry of connected WebSocket clients plus the server-side diagnostic event cache.
///
/// Each client is a queue drained by its own connection task, so broadcasting never waits on a
/// slow peer. Delivery is best effort: no retry, no acknowledgement, no per-client filtering.
pub struct Broadcaster {
    clients: RwLock<HashMap<u64, ClientHandle>>,
    next_id: AtomicU64,
    recent: Mutex<VecDeque<ServerEvent>>,
    recent_capacity: usize,
}

impl Broadcaster {
    pub fn new(recent_capacity: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            recent: Mutex::new(VecDeque::with_capacity(recent_capacity)),
            recent_capacity,
        }
    }

    /// Adds a client and returns the key to unregister it with.
    pub async fn register(&self, addr: SocketAddr, outbound: UnboundedSender<Message>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut clients = self.clients.write().await;
        clients.insert(id, ClientHandle { addr, outbound });
        info!("[WS] Client connected: {} (total: {})", addr, clients.len());
        id
    }

    pub async fn unregister(&self, id: u64) {
        let mut clients = self.clients.write().await;
        if let Some(handle) = clients.remove(&id) {
            info!("[WS] Client disconnected: {} (remaining: {})", handle.addr, clients.len());
        }
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Sends `event` to every client connected at the time of the call and returns how many
    /// queues accepted it.
    pub async fn broadcast(&self, event: &ServerEvent) -> usize {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                warn!("[WS] Unable to encode {}: {}", event.kind(), e);
                return 0;
            }
        };

        // Snapshot so register/unregister never contend with the sends
        let snapshot: Vec<(SocketAddr, UnboundedSender<Message>)> = {
            let clients = self.clients.read().await;
            clients
                .values()
                .map(|handle| (handle.addr, handle.outbound.clone()))
                .collect()
        };

        if snapshot.is_empty() {
            debug!("[WS] No client for {}", event.kind());
            return 0;
        }

        let mut delivered = 0;
        for (addr, outbound) in snapshot {
            // A closed queue means the connection task is already on its way out
            match outbound.send(Message::text(json.clone())) {
                Ok(()) => delivered += 1,
                Err(_) => debug!("[WS] {} is gone, skipping", addr),
            }
        }
        info!("[WS] Broadcast {} to {} client(s)", event.kind(), delivered);
        delivered
    }

    /// Appends to the diagnostic cache, evicting the oldest entry when full.
    pub fn record(&self, event: ServerEvent) {
        let mut recent = self.recent.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if recent.len() == self.recent_capacity {
            recent.pop_front();
        }
        recent.push_back(event);
    }

    /// Diagnostic cache content, oldest first.
    pub fn recent_events(&self) -> Vec<ServerEvent> {
        self.recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}
