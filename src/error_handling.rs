//! Error types shared by the server and the client.

pub mod types;
