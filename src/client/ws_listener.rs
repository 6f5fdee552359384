//! # Client WebSocket Listener
//!
//! Background subscription to the server's broadcast service.
//!
//! ```text
//!  command loop                      listener thread (current-thread runtime)
//!  ────────────                      ────────────────────────────────────────
//!  start() ──spawn──────────────────▶ connect ─▶ ws_identify ─▶ receive loop
//!                                         ▲                       │ 1 s timeout
//!  stop()  ──set flag──▶ [stop flag] ─────┴───────────────────────┘
//!          ◀──done (≤ 3 s)───────────────────────────────────── exit
//! ```
//!
//! Stopping is cooperative: the thread checks the flag at least once per
//! [`POLL_INTERVAL`], while connecting and between receives.

use crate::storage::EventCache;
use crate::web_interface::ClientMessage;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// Source label of lifecycle milestones in the event cache.
const CLIENT_SOURCE: &str = "client";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    Stopped = 0,
    Starting = 1,
    Connected = 2,
    Stopping = 3,
}

impl ListenerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ListenerState::Starting,
            2 => ListenerState::Connected,
            3 => ListenerState::Stopping,
            _ => ListenerState::Stopped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyActive,
    /// The OS refused to spawn the listener thread
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotActive,
    Stopped,
    /// The thread did not exit within [`STOP_TIMEOUT`]; it keeps running until it sees the flag
    TimedOut,
}

struct Shared {
    stop: AtomicBool,
    state: AtomicU8,
}

impl Shared {
    fn set_state(&self, state: ListenerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

struct Worker {
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

/// Handle to at most one background listener thread.
pub struct WsListener {
    shared: Arc<Shared>,
    worker: Option<Worker>,
}

impl Default for WsListener {
    fn default() -> Self {
        Self::new()
    }
}

impl WsListener {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                stop: AtomicBool::new(false),
                state: AtomicU8::new(ListenerState::Stopped as u8),
            }),
            worker: None,
        }
    }

    pub fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    /// True while the listener thread is alive.
    pub fn is_active(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    pub fn start(&mut self, uri: &str, session_id: Option<String>, cache: Arc<EventCache>) -> StartOutcome {
        if self.is_active() {
            info!("[WS] Listener already active");
            return StartOutcome::AlreadyActive;
        }
        self.reap();

        // Cleared here rather than in the thread so an early stop() is never lost
        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.set_state(ListenerState::Starting);

        let (done_tx, done_rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let uri = uri.to_string();
        let spawned = thread::Builder::new()
            .name(String::from("ws-listener"))
            .spawn(move || {
                run_thread(&uri, session_id, &cache, &shared);
                shared.set_state(ListenerState::Stopped);
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(handle) => {
                self.worker = Some(Worker { handle, done: done_rx });
                StartOutcome::Started
            }
            Err(e) => {
                error!("[WS] Unable to spawn the listener thread: {}", e);
                self.shared.set_state(ListenerState::Stopped);
                StartOutcome::Failed
            }
        }
    }

    /// Asks the listener to stop and waits up to [`STOP_TIMEOUT`] for it.
    pub fn stop(&mut self) -> StopOutcome {
        if !self.is_active() {
            self.reap();
            return StopOutcome::NotActive;
        }

        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.set_state(ListenerState::Stopping);
        let Some(worker) = self.worker.take() else {
            return StopOutcome::NotActive;
        };

        match worker.done.recv_timeout(STOP_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    warn!("[WS] Listener thread panicked");
                }
                self.shared.set_state(ListenerState::Stopped);
                StopOutcome::Stopped
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("[WS] Listener did not stop within {:?}", STOP_TIMEOUT);
                self.worker = Some(worker);
                StopOutcome::TimedOut
            }
        }
    }

    fn reap(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.handle.join().is_err() {
                warn!("[WS] Listener thread panicked");
            }
        }
    }
}

fn run_thread(uri: &str, session_id: Option<String>, cache: &EventCache, shared: &Shared) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("[WS] Unable to build the listener runtime: {}", e);
            record(cache, "websocket_connect_fail", json!({"uri": uri, "error": e.to_string()}), CLIENT_SOURCE);
            return;
        }
    };
    runtime.block_on(listen(uri, session_id, cache, shared));
}

async fn listen(uri: &str, session_id: Option<String>, cache: &EventCache, shared: &Shared) {
    println!("WS: connecting to {}...", uri);
    record(cache, "websocket_attempt", json!({"uri": uri}), CLIENT_SOURCE);

    let connect = tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(uri));
    let connected = tokio::select! {
        result = connect => match result {
            Ok(Ok((stream, _))) => Some(stream),
            Ok(Err(e)) => {
                connect_failed(uri, &e.to_string(), cache);
                None
            }
            Err(_) => {
                connect_failed(uri, "connection timed out", cache);
                None
            }
        },
        _ = wait_for_stop(shared) => {
            info!("[WS] Stop requested while connecting to {}", uri);
            None
        }
    };

    if let Some(stream) = connected {
        shared.set_state(ListenerState::Connected);
        println!("WS: connected to {}, waiting for events.", uri);
        record(cache, "websocket_connect", json!({"uri": uri, "status": "connected"}), CLIENT_SOURCE);

        let (mut ws_tx, mut ws_rx) = stream.split();
        if let Some(session_id) = session_id {
            match serde_json::to_string(&ClientMessage::WsIdentify { session_id }) {
                Ok(identify) => {
                    if let Err(e) = ws_tx.send(Message::text(identify)).await {
                        warn!("[WS] Unable to identify to {}: {}", uri, e);
                    }
                }
                Err(e) => warn!("[WS] Unable to encode identify message: {}", e),
            }
        }

        while !shared.stop_requested() {
            match tokio::time::timeout(POLL_INTERVAL, ws_rx.next()).await {
                Err(_) => continue,
                Ok(Some(Ok(Message::Text(text)))) => dispatch(text.as_str(), uri, cache),
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                    println!("WS: connection closed by the server.");
                    break;
                }
                Ok(Some(Ok(_))) => {}
                Ok(Some(Err(e))) => {
                    println!("WS: connection lost: {}", e);
                    break;
                }
            }
        }
        let _ = ws_tx.close().await;
    }

    println!("WS: listener for {} stopped.", uri);
    record(cache, "websocket_disconnect", json!({"uri": uri, "status": "stopped"}), CLIENT_SOURCE);
}

fn connect_failed(uri: &str, reason: &str, cache: &EventCache) {
    warn!("[WS] Unable to connect to {}: {}", uri, reason);
    println!("WS: unable to connect to {}: {}", uri, reason);
    record(cache, "websocket_connect_fail", json!({"uri": uri, "error": reason}), CLIENT_SOURCE);
}

async fn wait_for_stop(shared: &Shared) {
    while !shared.stop_requested() {
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Routes one text frame to the console and the event cache by its `type`.
pub fn dispatch(text: &str, uri: &str, cache: &EventCache) {
    let data: Value = match serde_json::from_str(text) {
        Ok(data) => data,
        Err(_) => {
            let raw: String = text.chars().take(200).collect();
            println!("WS: received non-JSON frame: {}", raw);
            record(cache, "invalid_ws_json", json!({"raw_message": raw}), uri);
            return;
        }
    };

    let field = |key: &str| data.get(key).and_then(Value::as_str).unwrap_or("N/A").to_string();
    match data.get("type").and_then(Value::as_str) {
        Some("day_event") => {
            println!("\nWS: event of the day: {}\n  {}", field("event_name"), field("description"));
            record(cache, "day_event", data.clone(), uri);
        }
        Some("data_update") => {
            let content = data.get("content").cloned().unwrap_or(Value::Null);
            println!("\nWS: data update from {}\n  {}", field("source"), content);
            record(cache, "data_update", data.clone(), uri);
        }
        other => {
            println!("\nWS: unknown message type {:?}: {}", other, data);
            record(cache, "unknown_ws_message", data.clone(), uri);
        }
    }
}

fn record(cache: &EventCache, event_type: &str, content: Value, source: &str) {
    if let Err(e) = cache.add(event_type, content, source) {
        debug!("[WS] {} not cached: {}", event_type, e);
    }
}
