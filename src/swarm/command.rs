//! Outbound target construction for operator commands

use serde::{Deserialize, Serialize};

use super::position::Position;

/// Directional operator commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    XPlus,
    XMinus,
    ZPlus,
    ZMinus,
}

impl Direction {
    /// Move vector for a step of `step` scene units
    pub fn delta(self, step: f64) -> Position {
        match self {
            Direction::Up => Position::new(0.0, step, 0.0),
            Direction::Down => Position::new(0.0, -step, 0.0),
            Direction::XPlus => Position::new(step, 0.0, 0.0),
            Direction::XMinus => Position::new(-step, 0.0, 0.0),
            Direction::ZPlus => Position::new(0.0, 0.0, step),
            Direction::ZMinus => Position::new(0.0, 0.0, -step),
        }
    }
}

/// Shift every live position by `delta`, never below ground
pub fn build_targets(live: &[Position], delta: Position) -> Vec<Position> {
    live.iter().map(|p| p.offset_by(delta).grounded()).collect()
}

/// Targets for "return to start": the initial formation, unclamped
pub fn return_targets(initial: &[Position]) -> Vec<Position> {
    initial.to_vec()
}
