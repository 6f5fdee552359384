//! Client-side persistence
//!
//! Everything here is plain JSON files read and written whole:
//! - `event_cache`: capped, time-expiring history of received events and responses.
//! - `profile_store`: one file per local user profile.
//! - `server_registry`: the named server endpoints the client can talk to.
//! - `json_file`: the read/write helpers the three stores share.

pub mod event_cache;
pub mod json_file;
pub mod profile_store;
pub mod server_registry;

pub use event_cache::{CachedEvent, EventCache};
pub use profile_store::{ProfileStore, UserProfile};
pub use server_registry::ServerRegistry;
