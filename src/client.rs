//! # Client
//!
//! Interactive counterpart of the server: blocking TCP/UDP helpers, a background WebSocket
//! listener and the context tying them to the local stores.
//!
//! ```text
//! stdin ─▶ Command ─▶ ClientContext ─┬─▶ transport (TCP profile, UDP location)
//!                                    ├─▶ WsListener (thread) ─▶ EventCache
//!                                    └─▶ ProfileStore / ServerRegistry
//! ```
pub mod commands;
pub mod context;
pub mod transport;
pub mod ws_listener;


pub use commands::Command;
pub use context::ClientContext;
pub use ws_listener::{ListenerState, StartOutcome, StopOutcome, WsListener};
