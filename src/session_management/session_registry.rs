use crate::session_management::session::Session;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

/// Result of [`SessionRegistry::create_or_renew`].
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedSession {
    pub id: Uuid,
    pub owner: String,
    /// `true` when the candidate id was live and got refreshed
    pub renewed: bool,
}

/// In-memory registry of live sessions, shared by the TCP handlers, the UDP loop and the
/// periodic sweeper.
///
/// Every read-modify-write happens under a single mutex, so a record is never observed half
/// updated and a sweep cannot drop a session renewed before it took the lock.
///
/// There is no authentication: any peer presenting the id of a live session is trusted.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use voxlink::session_management::SessionRegistry;
///
/// let registry = SessionRegistry::new(Duration::from_secs(1800));
/// let addr = "127.0.0.1:40000".parse().unwrap();
/// let first = registry.create_or_renew(None, Some("Ann"), addr);
/// let again = registry.create_or_renew(Some(&first.id.to_string()), None, addr);
/// assert_eq!(first.id, again.id);
/// assert!(again.renewed);
/// ```
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Session>>,
    expiry: Duration,
}

impl SessionRegistry {
    pub fn new(expiry: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            expiry,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Session>> {
        // A panicking holder cannot leave a record half written, so the map stays usable
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn chrono_expiry(expiry: Duration) -> chrono::Duration {
        chrono::Duration::from_std(expiry).unwrap_or(chrono::Duration::MAX)
    }

    /// Renews `candidate` when it names a live session, otherwise mints a new one.
    ///
    /// An owner label replaces the stored one on renewal. A new session without a label is
    /// owned by `ip:port` of the peer. Candidates that are not UUIDs, unknown, or idle past the
    /// expiry window are treated as absent.
    pub fn create_or_renew(
        &self,
        candidate: Option<&str>,
        owner_label: Option<&str>,
        remote_addr: SocketAddr,
    ) -> IssuedSession {
        self.create_or_renew_at(candidate, owner_label, remote_addr, Utc::now())
    }

    pub(crate) fn create_or_renew_at(
        &self,
        candidate: Option<&str>,
        owner_label: Option<&str>,
        remote_addr: SocketAddr,
        now: DateTime<Utc>,
    ) -> IssuedSession {
        let expiry = Self::chrono_expiry(self.expiry);
        let candidate_id = candidate.and_then(|raw| Uuid::parse_str(raw.trim()).ok());
        let owner_label = owner_label.map(str::trim).filter(|label| !label.is_empty());

        let mut sessions = self.lock();

        if let Some(id) = candidate_id {
            match sessions.get_mut(&id) {
                Some(session) if !session.is_expired(now, expiry) => {
                    session.touch(now);
                    if let Some(label) = owner_label {
                        session.owner = label.to_string();
                    }
                    debug!("Renewed session {} for '{}'", id, session.owner);
                    return IssuedSession {
                        id,
                        owner: session.owner.clone(),
                        renewed: true,
                    };
                }
                Some(_) => {
                    sessions.remove(&id);
                    debug!("Session {} presented after expiry, issuing a new one", id);
                }
                None => debug!("Unknown session {} presented by {}", id, remote_addr),
            }
        }

        let mut id = Uuid::new_v4();
        while sessions.contains_key(&id) {
            id = Uuid::new_v4();
        }
        let owner = owner_label
            .map(str::to_string)
            .unwrap_or_else(|| remote_addr.to_string());
        sessions.insert(id, Session::new(id, owner.clone(), remote_addr, now));
        info!("Created session {} for '{}' ({} live)", id, owner, sessions.len());

        IssuedSession {
            id,
            owner,
            renewed: false,
        }
    }

    /// Refreshes a live session and returns its owner label.
    pub fn touch(&self, candidate: &str) -> Option<String> {
        let id = Uuid::parse_str(candidate.trim()).ok()?;
        let now = Utc::now();
        let expiry = Self::chrono_expiry(self.expiry);

        let mut sessions = self.lock();
        let session = sessions.get_mut(&id)?;
        if session.is_expired(now, expiry) {
            return None;
        }
        session.touch(now);
        Some(session.owner.clone())
    }

    pub fn get(&self, id: &Uuid) -> Option<Session> {
        self.lock().get(id).cloned()
    }

    /// Removes every session idle for longer than `expiry` and returns how many were dropped.
    pub fn sweep(&self, expiry: Duration) -> usize {
        self.sweep_at(expiry, Utc::now())
    }

    pub(crate) fn sweep_at(&self, expiry: Duration, now: DateTime<Utc>) -> usize {
        let expiry = Self::chrono_expiry(expiry);
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|id, session| {
            let keep = !session.is_expired(now, expiry);
            if !keep {
                info!("Expired session {} ('{}') removed", id, session.owner);
            }
            keep
        });
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
