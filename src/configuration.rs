//! Server and client configuration.
pub mod client_config;
pub mod config;
pub mod types;

pub use client_config::{ClientArgs, ClientPaths};
pub use config::{Args, Config};
pub use types::{BroadcastSchedule, ServerEndpoint};
