//! Server start-up and shutdown.
pub mod controller_handler;

pub use controller_handler::{BoundAddresses, Controller};
