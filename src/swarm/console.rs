//! Console core: both datasets, the animator and the command lock

use std::time::Duration;

use tracing::{debug, info};

use crate::ws::protocol::{
    AnimationStatus, ConsoleEvent, ConsoleSnapshot, FeedStatus, OutboundMessage,
};

use super::animator::{Animator, RunId, SimulationClock, TickOutcome};
use super::command::{build_targets, return_targets};
use super::position::Position;
use super::reconcile::Reconciler;
use super::store::PositionStore;
use super::SwarmError;

/// Timing and rendering constants for one console session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsoleSettings {
    /// Duration of one logical move
    pub single_move_time: Duration,
    /// Sub-steps per logical move
    pub refresh_frequency: u32,
    /// Vertical render offset; fixed for the whole session
    pub y_offset: f64,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            single_move_time: Duration::from_millis(1000),
            refresh_frequency: 30,
            y_offset: 0.5,
        }
    }
}

/// Swarm state owned by the console loop.
///
/// `running` is the command lock: set when a command goes out, cleared by the
/// swarm's `Ready`. While it is set, live state only changes through feed
/// updates or a commit deferred from a completed run.
#[derive(Debug, Clone)]
pub struct SwarmConsole {
    pub(crate) store: PositionStore,
    pub(crate) animator: Animator,
    reconciler: Reconciler,
    pub(crate) identifier: Option<String>,
    pub(crate) running: bool,
    pub(crate) deferred_commit: Option<RunId>,
}

impl SwarmConsole {
    pub fn new(settings: ConsoleSettings) -> Self {
        let clock = SimulationClock::new(settings.single_move_time, settings.refresh_frequency);
        Self {
            store: PositionStore::new(settings.y_offset),
            animator: Animator::new(clock),
            reconciler: Reconciler,
            identifier: None,
            running: false,
            deferred_commit: None,
        }
    }

    pub fn store(&self) -> &PositionStore {
        &self.store
    }

    pub fn animator(&self) -> &Animator {
        &self.animator
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Advance the current run by one sub-step
    pub fn tick(&mut self, run_id: RunId) -> Vec<ConsoleEvent> {
        match self.animator.tick(run_id, &mut self.store) {
            TickOutcome::Completed { run_id } => self.complete_run(run_id),
            TickOutcome::Stale => {
                debug!(run_id, "Dropped tick of superseded run");
                Vec::new()
            }
            TickOutcome::Idle | TickOutcome::Stepped { .. } => Vec::new(),
        }
    }

    /// Completion handling: commit now, or wait for ready if commands are locked
    pub(crate) fn complete_run(&mut self, run_id: RunId) -> Vec<ConsoleEvent> {
        info!(run_id, running = self.running, "Animation run completed");
        let mut events = vec![ConsoleEvent::AnimationCompleted { run_id }];

        if self.running {
            self.deferred_commit = Some(run_id);
            events.push(ConsoleEvent::CommitDeferred { run_id });
        } else {
            events.push(self.commit());
        }
        events
    }

    /// Copy simulated positions into live state
    pub fn commit(&mut self) -> ConsoleEvent {
        self.deferred_commit = None;
        let summary = self.reconciler.commit(&mut self.store);
        ConsoleEvent::Reconciled {
            drones: summary.drones,
            changed: summary.changed,
        }
    }

    /// Operator declares the simulation authoritative
    pub fn operator_commit(&mut self) -> Result<ConsoleEvent, SwarmError> {
        if self.running {
            return Err(SwarmError::CommandsLocked);
        }
        if self.store.fleet_size() == 0 {
            return Err(SwarmError::EmptyFleet);
        }
        Ok(self.commit())
    }

    /// Build a directional command and lock the controls
    pub fn move_command(&mut self, delta: Position) -> Result<OutboundMessage, SwarmError> {
        self.ensure_commandable()?;
        let targets = build_targets(&self.store.read_live(), delta);
        self.running = true;
        Ok(OutboundMessage { targets })
    }

    /// Send the initial formation back and lock the controls
    pub fn return_command(&mut self) -> Result<OutboundMessage, SwarmError> {
        self.ensure_commandable()?;
        let targets = return_targets(&self.store.read_initial());
        self.running = true;
        Ok(OutboundMessage { targets })
    }

    fn ensure_commandable(&self) -> Result<(), SwarmError> {
        if self.running {
            return Err(SwarmError::CommandsLocked);
        }
        if self.store.fleet_size() == 0 {
            return Err(SwarmError::EmptyFleet);
        }
        Ok(())
    }

    pub fn snapshot(&self, seq: u64, feed: FeedStatus) -> ConsoleSnapshot {
        ConsoleSnapshot {
            seq,
            identifier: self.identifier().map(str::to_string),
            drone_count: self.store.fleet_size(),
            live: self.store.read_live(),
            simulated: self.store.read_simulated(),
            initial: self.store.read_initial(),
            y_offset: self.store.y_offset(),
            running: self.is_running(),
            controls_enabled: !self.is_running(),
            animation: AnimationStatus {
                state: self.animator.state(),
                run_id: self.animator.current_run(),
                remaining_moves: self.animator.remaining_moves(),
                sub_step: self.animator.sub_step(),
            },
            feed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::position::DroneId;

    fn console_with(positions: &[Position]) -> SwarmConsole {
        let mut console = SwarmConsole::new(ConsoleSettings::default());
        console.store.set_roster(positions);
        console
    }

    #[test]
    fn move_command_locks_controls() {
        let mut console = console_with(&[Position::new(0.0, 2.0, 0.0)]);
        let msg = console.move_command(Position::new(0.0, -10.0, 0.0)).unwrap();

        assert_eq!(msg.targets, vec![Position::new(0.0, 0.0, 0.0)]);
        assert!(console.is_running());
        assert_eq!(
            console.move_command(Position::new(1.0, 0.0, 0.0)),
            Err(SwarmError::CommandsLocked)
        );
    }

    #[test]
    fn return_command_sends_initial_formation() {
        let mut console = console_with(&[Position::new(1.0, 0.0, 1.0)]);
        console
            .store
            .update_live(DroneId(0), Position::new(5.0, 5.0, 5.0))
            .unwrap();

        let msg = console.return_command().unwrap();
        assert_eq!(msg.targets, vec![Position::new(1.0, 0.0, 1.0)]);
    }

    #[test]
    fn commands_need_a_roster() {
        let mut console = SwarmConsole::new(ConsoleSettings::default());
        assert_eq!(console.return_command(), Err(SwarmError::EmptyFleet));
        assert!(!console.is_running());
    }

    #[test]
    fn completion_while_locked_defers_commit() {
        let mut console = console_with(&[Position::new(0.0, 0.0, 0.0)]);
        console.running = true;

        let events = console.complete_run(7);
        assert_eq!(
            events,
            vec![
                ConsoleEvent::AnimationCompleted { run_id: 7 },
                ConsoleEvent::CommitDeferred { run_id: 7 }
            ]
        );
        assert_eq!(console.deferred_commit, Some(7));
    }

    #[test]
    fn operator_commit_refused_while_locked() {
        let mut console = console_with(&[Position::new(0.0, 0.0, 0.0)]);
        console.running = true;
        assert_eq!(console.operator_commit(), Err(SwarmError::CommandsLocked));

        console.running = false;
        assert!(matches!(
            console.operator_commit(),
            Ok(ConsoleEvent::Reconciled { drones: 1, .. })
        ));
    }
}
