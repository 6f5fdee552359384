//! # Client-Side Event Cache
//!
//! A capped JSON array on disk, newest entry first. Every write re-reads the whole file,
//! prepends and truncates, so the file is always the current window of the last
//! [`MAX_EVENTS`] entries. Reads additionally hide entries older than [`MAX_AGE_DAYS`] without
//! rewriting the file.

use super::json_file::{read_json, write_json};
use crate::error_handling::types::StorageError;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const MAX_EVENTS: usize = 100;
pub const MAX_AGE_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub content: Value,
    /// RFC 3339 reception time
    pub timestamp_client_received: String,
}

impl CachedEvent {
    fn received_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp_client_received)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

pub struct EventCache {
    path: Option<PathBuf>,
    // Serialises read-modify-write cycles between the command loop and the listener thread
    write_lock: Mutex<()>,
}

impl EventCache {
    /// Opens the cache at `path`. When its directory cannot be created the cache is disabled:
    /// events are then only logged.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(
                    "Event cache disabled, unable to create {}: {}",
                    parent.display(),
                    e
                );
                return Self::disabled();
            }
        }
        info!("Event cache at {}", path.display());
        Self {
            path: Some(path),
            write_lock: Mutex::new(()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            path: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    pub fn add(&self, event_type: &str, content: Value, source: &str) -> Result<(), StorageError> {
        self.add_at(event_type, content, source, Utc::now())
    }

    pub(crate) fn add_at(
        &self,
        event_type: &str,
        content: Value,
        source: &str,
        received: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let Some(path) = self.path.as_deref() else {
            info!("[CACHE] (disabled) {} from {}: {}", event_type, source, content);
            return Err(StorageError::Disabled);
        };

        let entry = CachedEvent {
            event_type: event_type.to_string(),
            source: source.to_string(),
            content,
            timestamp_client_received: received.to_rfc3339(),
        };
        let entry = serde_json::to_value(&entry).map_err(|_| StorageError::WriteFailed)?;

        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut events = read_window(path);
        events.insert(0, entry);
        events.truncate(MAX_EVENTS);
        write_json(path, &events)?;
        debug!("[CACHE] Stored {} from {} ({} in window)", event_type, source, events.len());
        Ok(())
    }

    /// Entries received within the last [`MAX_AGE_DAYS`] days, newest first.
    pub fn load(&self) -> Vec<CachedEvent> {
        self.load_at(Utc::now())
    }

    pub(crate) fn load_at(&self, now: DateTime<Utc>) -> Vec<CachedEvent> {
        let cutoff = now - Duration::days(MAX_AGE_DAYS);
        self.read_all()
            .into_iter()
            .filter_map(|raw| serde_json::from_value::<CachedEvent>(raw).ok())
            .filter(|event| event.received_at().is_some_and(|ts| ts >= cutoff))
            .collect()
    }

    /// The `n` most recent live entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<CachedEvent> {
        let mut events = self.load();
        events.truncate(n);
        events.reverse();
        events
    }

    pub fn show_recent(&self, n: usize) {
        let events = self.recent(n);
        if events.is_empty() {
            println!("No cached events.");
            return;
        }
        println!("--- Last {} cached event(s) ---", events.len());
        for event in events {
            println!(
                "[{}] {} ({}): {}",
                event.timestamp_client_received, event.event_type, event.source, event.content
            );
        }
    }

    /// The raw on-disk window, expired entries included.
    pub(crate) fn read_all(&self) -> Vec<Value> {
        match self.path.as_deref() {
            Some(path) => read_window(path),
            None => Vec::new(),
        }
    }
}

fn read_window(path: &Path) -> Vec<Value> {
    match read_json::<Vec<Value>>(path) {
        Ok(events) => events.unwrap_or_default(),
        Err(_) => {
            warn!("[CACHE] Unreadable cache at {}, starting over", path.display());
            Vec::new()
        }
    }
}
