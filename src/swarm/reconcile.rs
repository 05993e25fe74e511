//! Folding the simulated outcome back into live state

use tracing::debug;

use super::store::PositionStore;

/// Displacement below which a reconciled drone counts as unchanged
const UNCHANGED_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSummary {
    pub drones: usize,
    pub changed: usize,
}

/// Copies simulated positions into live state.
///
/// This is the only place the render offset is removed from simulated
/// values; the result is rounded to whole scene units.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler;

impl Reconciler {
    pub fn commit(&self, store: &mut PositionStore) -> CommitSummary {
        let y_offset = store.y_offset();
        let mut summary = CommitSummary {
            drones: 0,
            changed: 0,
        };

        for (live, simulated) in store.live_and_simulated_mut() {
            let reconciled = simulated.to_raw_rounded(y_offset);
            if live.distance_to(reconciled) > UNCHANGED_EPSILON {
                summary.changed += 1;
            }
            *live = reconciled;
            summary.drones += 1;
        }

        debug!(
            drones = summary.drones,
            changed = summary.changed,
            "Simulated positions committed to live state"
        );
        summary
    }
}
