//! Session management core module.
//!
//! Sessions correlate otherwise stateless TCP and UDP requests coming from the same logical
//! client. They live only in memory: a server restart forgets every session.

/// Submodule for session data structures.
pub mod session;
/// Submodule for the synchronized session registry.
pub mod session_registry;

pub use session::Session;
pub use session_registry::{IssuedSession, SessionRegistry};
