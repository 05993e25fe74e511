//! Live, simulated and initial position datasets

use std::collections::BTreeMap;

use super::position::{DroneId, Position, RenderedPosition, WireIndex};
use super::SwarmError;

/// Owns both position datasets for the current fleet.
///
/// Live positions are kept in raw target space, simulated positions in
/// rendered space (with the vertical offset applied).
#[derive(Debug, Clone)]
pub struct PositionStore {
    y_offset: f64,
    live: BTreeMap<DroneId, Position>,
    simulated: BTreeMap<DroneId, RenderedPosition>,
    initial: BTreeMap<DroneId, Position>,
}

impl PositionStore {
    pub fn new(y_offset: f64) -> Self {
        Self {
            y_offset,
            live: BTreeMap::new(),
            simulated: BTreeMap::new(),
            initial: BTreeMap::new(),
        }
    }

    pub fn y_offset(&self) -> f64 {
        self.y_offset
    }

    pub fn fleet_size(&self) -> usize {
        self.live.len()
    }

    /// Replace the whole fleet. Drone keys follow roster order.
    pub fn set_roster(&mut self, positions: &[Position]) {
        self.live = positions
            .iter()
            .enumerate()
            .map(|(i, p)| (DroneId(i as u32), *p))
            .collect();
        self.simulated = self
            .live
            .iter()
            .map(|(id, p)| (*id, RenderedPosition::from_raw(*p, self.y_offset)))
            .collect();
        self.initial = self.live.clone();
    }

    /// Resolve a wire index against the current fleet
    pub fn resolve(&self, index: &WireIndex) -> Result<DroneId, SwarmError> {
        index
            .slot()
            .filter(|id| self.live.contains_key(id))
            .ok_or_else(|| SwarmError::OutOfRange {
                index: index.to_string(),
                fleet_size: self.fleet_size(),
            })
    }

    pub fn update_live(&mut self, id: DroneId, position: Position) -> Result<(), SwarmError> {
        let fleet_size = self.fleet_size();
        match self.live.get_mut(&id) {
            Some(slot) => {
                *slot = position;
                Ok(())
            }
            None => Err(SwarmError::OutOfRange {
                index: id.to_string(),
                fleet_size,
            }),
        }
    }

    pub fn read_live(&self) -> Vec<Position> {
        self.live.values().copied().collect()
    }

    pub fn read_simulated(&self) -> Vec<RenderedPosition> {
        self.simulated.values().copied().collect()
    }

    pub fn read_initial(&self) -> Vec<Position> {
        self.initial.values().copied().collect()
    }

    pub(crate) fn simulated_mut(
        &mut self,
    ) -> impl Iterator<Item = (DroneId, &mut RenderedPosition)> + '_ {
        self.simulated.iter_mut().map(|(id, p)| (*id, p))
    }

    /// Reconciliation access: simulated values paired with their live slots
    pub(crate) fn live_and_simulated_mut(
        &mut self,
    ) -> impl Iterator<Item = (&mut Position, &RenderedPosition)> + '_ {
        self.live
            .values_mut()
            .zip(self.simulated.values())
    }
}
