//! Wire messages of the TCP profile and UDP hint protocols.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unix time in seconds with sub-second precision, as carried by every timestamp on the wire.
pub fn unix_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Profile message sent by the client over TCP.
///
/// Only `session_id` and `name` matter to the server; every other field is profile data kept
/// as-is in `profile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRequest {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl ProfileRequest {
    pub fn update_profile(name: &str, session_id: Option<String>) -> Self {
        Self {
            action: String::from("update_profile"),
            name: Some(name.to_string()),
            session_id,
            profile: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.profile.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Reply of the TCP profile listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub status: ResponseStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ProfileResponse {
    pub fn success(message: String, session_id: String) -> Self {
        Self {
            status: ResponseStatus::Success,
            message,
            session_id: Some(session_id),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.to_string(),
            session_id: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Datagram sent by the client to the UDP hint listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default = "LocationUpdate::default_action")]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl LocationUpdate {
    fn default_action() -> String {
        String::from("location_update")
    }

    pub fn new(latitude: f64, longitude: f64, session_id: Option<String>) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            action: Self::default_action(),
            session_id,
        }
    }
}

/// Reply of the UDP hint listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintResponse {
    pub hint: String,
    pub timestamp: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_request_keeps_extra_fields() {
        let raw = json!({"action": "update_profile", "name": "Ann", "age": 30, "city": "Oslo"});
        let request: ProfileRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(request.name.as_deref(), Some("Ann"));
        assert_eq!(request.session_id, None);
        assert_eq!(request.profile.get("age"), Some(&json!(30)));

        let encoded = serde_json::to_value(ProfileRequest::update_profile("Ann", None).with_field("age", 30)).unwrap();
        assert_eq!(encoded, json!({"action": "update_profile", "name": "Ann", "age": 30}));
    }

    #[test]
    fn test_error_response_shape() {
        let encoded = serde_json::to_string(&ProfileResponse::error("invalid JSON")).unwrap();
        assert_eq!(encoded, r#"{"status":"error","message":"invalid JSON"}"#);
    }

    #[test]
    fn test_location_update_tolerates_missing_fields() {
        let update: LocationUpdate = serde_json::from_str(r#"{"session_id": "abc"}"#).unwrap();
        assert_eq!(update.latitude, None);
        assert_eq!(update.action, "location_update");
    }

    #[test]
    fn test_unix_timestamp_is_seconds() {
        let ts = unix_timestamp();
        assert!(ts > 1_600_000_000.0 && ts < 10_000_000_000.0);
    }
}
