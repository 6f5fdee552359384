use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload pushed by the broadcast service to every WebSocket client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    DayEvent {
        event_name: String,
        description: String,
        timestamp_event: f64,
    },
    DataUpdate {
        source: String,
        content: Value,
        timestamp_update: f64,
    },
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::DayEvent { .. } => "day_event",
            ServerEvent::DataUpdate { .. } => "data_update",
        }
    }
}

/// Frames a WebSocket client may send to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    WsIdentify { session_id: String },
}
