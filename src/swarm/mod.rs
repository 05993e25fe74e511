//! Swarm state and simulation synchronization

pub mod animator;
pub mod command;
pub mod console;
pub mod handler;
pub mod position;
pub mod reconcile;
pub mod session;
pub mod snapshot;
pub mod store;

pub use console::ConsoleSettings;
pub use position::Position;
pub use session::{ConsoleHandle, ConsoleSession};

/// Errors raised by the swarm core. None of them are fatal to the console.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SwarmError {
    #[error("drone index {index} is out of range for a fleet of {fleet_size}")]
    OutOfRange { index: String, fleet_size: usize },

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("feed connection closed")]
    TransportClosed,

    #[error("commands are locked until the swarm reports ready")]
    CommandsLocked,

    #[error("no feed connected")]
    NotConnected,

    #[error("no roster received yet")]
    EmptyFleet,

    #[error("a feed is already connected")]
    FeedBusy,

    #[error("console session is not running")]
    ConsoleStopped,
}

impl SwarmError {
    /// Short machine-readable code for view clients and API responses
    pub fn code(&self) -> &'static str {
        match self {
            SwarmError::OutOfRange { .. } => "out_of_range",
            SwarmError::InvalidPlan(_) => "invalid_plan",
            SwarmError::MalformedMessage(_) => "malformed_message",
            SwarmError::TransportClosed => "transport_closed",
            SwarmError::CommandsLocked => "commands_locked",
            SwarmError::NotConnected => "not_connected",
            SwarmError::EmptyFleet => "empty_fleet",
            SwarmError::FeedBusy => "feed_busy",
            SwarmError::ConsoleStopped => "console_stopped",
        }
    }
}
