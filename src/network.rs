//! # Network Listeners
//!
//! The TCP profile listener and the UDP hint listener, plus the wire types they share with the
//! client.
pub mod tcp_listener;
pub mod types;
pub mod udp_listener;

#[cfg(test)]
mod integration_tests;

pub use tcp_listener::TcpProfileListener;
pub use udp_listener::UdpHintListener;
