//! WebSocket protocol message definitions
//! Wire types for the swarm feed and for view clients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::swarm::animator::{AnimatorState, RunId};
use crate::swarm::position::{Position, RenderedPosition, WireIndex};

/// One document of an inbound feed batch.
///
/// Every field is optional and independent; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InboundMessage {
    /// Operator/session identifier to display
    #[serde(rename = "Identifier", default)]
    pub identifier: Option<String>,

    /// Full roster replacement
    #[serde(rename = "Drones", default)]
    pub drones: Option<Vec<Position>>,

    /// One path of relative moves per drone
    #[serde(rename = "Paths", default)]
    pub paths: Option<Vec<Vec<Position>>>,

    /// Index of a drone for a single authoritative update
    #[serde(rename = "DroneId", default)]
    pub drone_id: Option<WireIndex>,

    /// New live position for `drone_id`
    #[serde(rename = "Location", default)]
    pub location: Option<Position>,

    /// Swarm finished executing the last command
    #[serde(rename = "Ready", default)]
    pub ready: Option<bool>,
}

/// The only document the console sends to the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "Targets")]
    pub targets: Vec<Position>,
}

/// Things that happened inside the console, reported to view clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ConsoleEvent {
    IdentifierChanged {
        identifier: String,
    },

    /// New roster; the drone-count display resets
    RosterReplaced {
        drone_count: usize,
    },

    LiveUpdated {
        drone_id: u32,
    },

    AnimationStarted {
        run_id: RunId,
        steps: usize,
    },

    AnimationCompleted {
        run_id: RunId,
    },

    /// Run dropped because the roster no longer matches its paths
    AnimationCancelled {
        run_id: RunId,
    },

    /// Completion seen while commands are locked; commit waits for ready
    CommitDeferred {
        run_id: RunId,
    },

    Reconciled {
        drones: usize,
        changed: usize,
    },

    /// Swarm reported ready, command controls are enabled again
    ControlsEnabled,

    CommandSent {
        targets: Vec<Position>,
    },

    /// Non-fatal problem with inbound content
    Rejected {
        code: String,
        message: String,
    },

    FeedConnected {
        session_id: Uuid,
    },

    /// Terminal: the feed will not come back
    FeedClosed {
        notice: String,
    },
}

/// Connection state of the feed transport
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FeedStatus {
    Waiting,
    Connected {
        session_id: Uuid,
        since: DateTime<Utc>,
    },
    Closed {
        at: DateTime<Utc>,
    },
}

/// Animation progress as shown to view clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimationStatus {
    pub state: AnimatorState,
    pub run_id: Option<RunId>,
    pub remaining_moves: usize,
    pub sub_step: u32,
}

/// Everything a renderer or UI needs to draw one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleSnapshot {
    /// Increases with every published snapshot
    pub seq: u64,
    pub identifier: Option<String>,
    pub drone_count: usize,
    /// Raw target space
    pub live: Vec<Position>,
    /// Rendered space (vertical offset applied)
    pub simulated: Vec<RenderedPosition>,
    pub initial: Vec<Position>,
    pub y_offset: f64,
    pub running: bool,
    pub controls_enabled: bool,
    pub animation: AnimationStatus,
    pub feed: FeedStatus,
}

/// Messages sent from the console to view clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewMsg {
    /// Sent once after a view client connects
    Welcome { server_time: u64 },

    Snapshot {
        snapshot: ConsoleSnapshot,
        /// Events since the previous snapshot
        events: Vec<ConsoleEvent>,
    },
}
