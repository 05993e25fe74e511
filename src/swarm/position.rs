//! Drone identity and the raw/rendered coordinate spaces

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable drone key, assigned from the slot order of the most recent roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DroneId(pub u32);

impl DroneId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DroneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Drone index exactly as it arrived on the wire.
///
/// Any JSON number is accepted so that a negative, fractional or oversized
/// index fails only its own update, not the document it came in.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct WireIndex(serde_json::Number);

impl WireIndex {
    /// The index as a drone slot, if it is a non-negative integer that fits
    pub fn slot(&self) -> Option<DroneId> {
        self.0
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(DroneId)
    }
}

impl fmt::Display for WireIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position in raw target space (scene units, no render offset).
///
/// Also used for relative moves inside a path.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    #[serde(rename = "Z")]
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn offset_by(self, delta: Position) -> Self {
        Self::new(self.x + delta.x, self.y + delta.y, self.z + delta.z)
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    /// Round every axis to the nearest integer, halves towards +inf
    pub fn rounded(self) -> Self {
        let round = |v: f64| (v + 0.5).floor();
        Self::new(round(self.x), round(self.y), round(self.z))
    }

    /// Clamp Y so a target never goes below ground
    pub fn grounded(self) -> Self {
        Self::new(self.x, self.y.max(0.0), self.z)
    }

    pub fn distance_to(self, other: Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Position as realized in the scene, carrying the vertical render offset.
///
/// Only [`RenderedPosition::from_raw`] adds the offset and only
/// [`RenderedPosition::to_raw_rounded`] removes it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct RenderedPosition(Position);

impl RenderedPosition {
    pub fn from_raw(raw: Position, y_offset: f64) -> Self {
        Self(Position::new(raw.x, raw.y + y_offset, raw.z))
    }

    /// Back to raw target space, rounded to whole scene units
    pub fn to_raw_rounded(self, y_offset: f64) -> Position {
        Position::new(self.0.x, self.0.y - y_offset, self.0.z).rounded()
    }

    pub fn translate(&mut self, delta: Position) {
        self.0 = self.0.offset_by(delta);
    }

    pub fn position(self) -> Position {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_uses_capitalized_wire_fields() {
        let p: Position = serde_json::from_str(r#"{"X":1.5,"Y":2,"Z":-3}"#).unwrap();
        assert_eq!(p, Position::new(1.5, 2.0, -3.0));

        let json = serde_json::to_string(&Position::new(0.0, 1.0, 2.0)).unwrap();
        assert_eq!(json, r#"{"X":0.0,"Y":1.0,"Z":2.0}"#);
    }

    #[test]
    fn rendered_position_removes_offset_once() {
        let mut rendered = RenderedPosition::from_raw(Position::new(3.0, 0.0, 1.0), 0.5);
        assert_eq!(rendered.position(), Position::new(3.0, 0.5, 1.0));

        rendered.translate(Position::new(0.0, 1.0, 0.0));
        assert_eq!(rendered.to_raw_rounded(0.5), Position::new(3.0, 1.0, 1.0));
    }

    #[test]
    fn ground_level_survives_the_round_trip() {
        // y = 0 must not round to -1 after removing the offset
        let rendered = RenderedPosition::from_raw(Position::new(0.0, 0.0, 0.0), 0.5);
        assert_eq!(rendered.to_raw_rounded(0.5), Position::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn halves_round_towards_positive_infinity() {
        let p = Position::new(-2.5, 2.5, -0.4).rounded();
        assert_eq!(p, Position::new(-2.0, 3.0, 0.0));
    }

    #[test]
    fn wire_index_accepts_any_number() {
        let index = |json: &str| serde_json::from_str::<WireIndex>(json).unwrap();
        assert_eq!(index("7").slot(), Some(DroneId(7)));
        assert_eq!(index("-1").slot(), None);
        assert_eq!(index("1e3").slot(), None);
        assert_eq!(index("18446744073709551615").slot(), None);
        assert_eq!(index("4294967296").slot(), None);
        assert_eq!(index("1e3").to_string(), "1000.0");
    }

    #[test]
    fn grounded_clamps_only_y() {
        let p = Position::new(-4.0, -8.0, -1.0).grounded();
        assert_eq!(p, Position::new(-4.0, 0.0, -1.0));
    }
}
