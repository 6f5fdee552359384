//! # WebSocket Broadcast Service
//!
//! ```text
//!                 ┌──────────────────┐ record  ┌──────────────────────┐
//!                 │ event_generator  │────────▶│ recent events (ring) │
//!                 └────────┬─────────┘         └──────────────────────┘
//!                          │ broadcast
//!                          ▼
//! ┌──────────┐  register  ┌─────────────┐  queue   ┌──────────────────┐
//! │ WsServer │───────────▶│ Broadcaster │─────────▶│ connection tasks │──▶ clients
//! └──────────┘            └─────────────┘          └──────────────────┘
//! ```
pub mod broadcaster;
pub mod event_generator;
pub mod types;
pub mod web_server;

pub use broadcaster::Broadcaster;
pub use types::{ClientMessage, ServerEvent};
pub use web_server::{KeepAlive, WsServer};
