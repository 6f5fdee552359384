use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use uuid::Uuid;

/// Server-side record of a live session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: Uuid,
    /// Display name sent by the client, or `ip:port` when it never sent one
    pub owner: String,
    pub client_addr: SocketAddr,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Session {
    pub fn new(id: Uuid, owner: String, client_addr: SocketAddr, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner,
            client_addr,
            created_at: now,
            last_seen: now,
        }
    }

    /// Idle strictly longer than `expiry` at instant `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, expiry: chrono::Duration) -> bool {
        now - self.last_seen > expiry
    }

    /// Moves `last_seen` forward, never backwards and never in place.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_seen = if now > self.last_seen {
            now
        } else {
            self.last_seen + chrono::Duration::nanoseconds(1)
        };
    }
}
