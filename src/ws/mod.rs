//! WebSocket transport: swarm feed and view streams

pub mod handler;
pub mod protocol;
