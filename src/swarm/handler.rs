//! Inbound feed decoding and dispatch

use tracing::{debug, info, warn};

use crate::ws::protocol::{ConsoleEvent, InboundMessage};

use super::animator::RunStart;
use super::console::SwarmConsole;
use super::position::{DroneId, Position, WireIndex};
use super::SwarmError;

/// Split a feed frame into documents, in arrival order.
///
/// Blank lines are skipped; a line that does not parse is reported as
/// `MalformedMessage` without affecting the other lines.
pub fn decode_batch(text: &str) -> impl Iterator<Item = Result<InboundMessage, SwarmError>> + '_ {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str::<InboundMessage>(line)
                .map_err(|e| SwarmError::MalformedMessage(e.to_string()))
        })
}

fn rejected(error: &SwarmError) -> ConsoleEvent {
    ConsoleEvent::Rejected {
        code: error.code().to_string(),
        message: error.to_string(),
    }
}

impl SwarmConsole {
    /// Handle every document of a feed frame strictly in order
    pub fn handle_batch(&mut self, text: &str) -> Vec<ConsoleEvent> {
        let mut events = Vec::new();
        for decoded in decode_batch(text) {
            match decoded {
                Ok(message) => events.extend(self.handle(message)),
                Err(e) => {
                    warn!(error = %e, "Skipping feed line");
                    events.push(rejected(&e));
                }
            }
        }
        events
    }

    /// Dispatch one decoded document.
    ///
    /// Fields are handled in a fixed order: identifier, roster, single drone
    /// update, plan, ready. A failing field never stops the others.
    pub fn handle(&mut self, message: InboundMessage) -> Vec<ConsoleEvent> {
        let mut events = Vec::new();

        if let Some(identifier) = message.identifier {
            info!(identifier = %identifier, "Session identifier updated");
            self.identifier = Some(identifier.clone());
            events.push(ConsoleEvent::IdentifierChanged { identifier });
        }

        if let Some(drones) = message.drones {
            events.extend(self.apply_roster(&drones));
        }

        match (message.drone_id, message.location) {
            (Some(index), Some(location)) => {
                match self.apply_drone_update(&index, location) {
                    Ok(id) => events.push(ConsoleEvent::LiveUpdated { drone_id: id.0 }),
                    Err(e) => {
                        warn!(error = %e, "Ignoring drone update");
                        events.push(rejected(&e));
                    }
                }
            }
            (Some(index), None) => {
                debug!(drone_id = %index, "Drone update without location");
            }
            (None, Some(_)) => debug!("Location without drone id"),
            (None, None) => {}
        }

        if let Some(paths) = message.paths {
            match self.start_simulation(paths) {
                Ok(started) => events.extend(started),
                Err(e) => {
                    warn!(error = %e, "Rejected animation plan");
                    events.push(rejected(&e));
                }
            }
        }

        if message.ready == Some(true) {
            events.extend(self.apply_ready());
        }

        events
    }

    fn apply_roster(&mut self, drones: &[Position]) -> Vec<ConsoleEvent> {
        let mut events = Vec::new();
        let previous_size = self.store.fleet_size();
        self.store.set_roster(drones);
        // Simulated state now equals the roster, nothing left to commit
        self.deferred_commit = None;

        // A run whose paths no longer match the fleet cannot continue; a run
        // of the same size carries on from the new baseline.
        if drones.len() != previous_size {
            if let Some(run_id) = self.animator.cancel() {
                info!(run_id, "Animation cancelled by roster of a different size");
                events.push(ConsoleEvent::AnimationCancelled { run_id });
            }
        }

        info!(drone_count = drones.len(), "Roster replaced");
        events.push(ConsoleEvent::RosterReplaced {
            drone_count: drones.len(),
        });
        events
    }

    fn apply_drone_update(
        &mut self,
        index: &WireIndex,
        location: Position,
    ) -> Result<DroneId, SwarmError> {
        let id = self.store.resolve(index)?;
        self.store.update_live(id, location)?;
        Ok(id)
    }

    /// Start (or replace) an animation run from the current simulated state
    pub fn start_simulation(
        &mut self,
        paths: Vec<Vec<Position>>,
    ) -> Result<Vec<ConsoleEvent>, SwarmError> {
        let fleet_size = self.store.fleet_size();
        match self.animator.start(paths, fleet_size)? {
            RunStart::Started { run_id, steps } => {
                // A newer run supersedes a commit still waiting for ready
                self.deferred_commit = None;
                info!(run_id, steps, drone_count = fleet_size, "Animation run started");
                Ok(vec![ConsoleEvent::AnimationStarted { run_id, steps }])
            }
            RunStart::Finished { run_id } => {
                self.deferred_commit = None;
                let mut events = vec![ConsoleEvent::AnimationStarted { run_id, steps: 0 }];
                events.extend(self.complete_run(run_id));
                Ok(events)
            }
            RunStart::Empty => {
                debug!("Empty plan ignored");
                Ok(Vec::new())
            }
        }
    }

    fn apply_ready(&mut self) -> Vec<ConsoleEvent> {
        self.running = false;
        let mut events = vec![ConsoleEvent::ControlsEnabled];
        if let Some(run_id) = self.deferred_commit {
            info!(run_id, "Performing deferred commit");
            events.push(self.commit());
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::animator::{AnimatorState, RunId};
    use crate::swarm::console::ConsoleSettings;

    fn console() -> SwarmConsole {
        SwarmConsole::new(ConsoleSettings::default())
    }

    fn finish(console: &mut SwarmConsole, run_id: RunId) -> Vec<ConsoleEvent> {
        let mut events = Vec::new();
        while console.animator().state() == AnimatorState::Running {
            events.extend(console.tick(run_id));
        }
        events
    }

    fn started_run(events: &[ConsoleEvent]) -> RunId {
        events
            .iter()
            .find_map(|e| match e {
                ConsoleEvent::AnimationStarted { run_id, .. } => Some(*run_id),
                _ => None,
            })
            .expect("animation should have started")
    }

    #[test]
    fn malformed_line_does_not_stop_the_batch() {
        let mut console = console();
        let events = console.handle_batch(
            "{\"Identifier\":\"gs\"}\nnot json\n\n{\"Drones\":[{\"X\":0,\"Y\":0,\"Z\":0}]}\n",
        );

        assert_eq!(console.identifier(), Some("gs"));
        assert_eq!(console.store().fleet_size(), 1);
        assert!(events.iter().any(|e| matches!(
            e,
            ConsoleEvent::Rejected { code, .. } if code == "malformed_message"
        )));
    }

    #[test]
    fn roster_plan_ready_scenario() {
        let mut console = console();
        console.handle_batch(r#"{"Drones":[{"X":0,"Y":0,"Z":0},{"X":3,"Y":0,"Z":0}]}"#);
        let events =
            console.handle_batch(r#"{"Paths":[[{"X":0,"Y":1,"Z":0}],[{"X":0,"Y":1,"Z":0}]]}"#);
        let run_id = started_run(&events);

        finish(&mut console, run_id);
        console.handle_batch(r#"{"Ready":true}"#);

        assert_eq!(
            console.store().read_live(),
            vec![Position::new(0.0, 1.0, 0.0), Position::new(3.0, 1.0, 0.0)]
        );
    }

    #[test]
    fn completion_while_locked_waits_for_ready() {
        let mut console = console();
        console.handle_batch(r#"{"Drones":[{"X":0,"Y":0,"Z":0}]}"#);
        console.move_command(Position::new(0.0, 1.0, 0.0)).unwrap();

        let events = console.handle_batch(r#"{"Paths":[[{"X":0,"Y":1,"Z":0}]]}"#);
        let run_id = started_run(&events);
        let events = finish(&mut console, run_id);

        assert!(events.contains(&ConsoleEvent::CommitDeferred { run_id }));
        assert_eq!(console.store().read_live(), vec![Position::new(0.0, 0.0, 0.0)]);

        let events = console.handle_batch(r#"{"Ready":true}"#);
        assert_eq!(events[0], ConsoleEvent::ControlsEnabled);
        assert!(matches!(events[1], ConsoleEvent::Reconciled { changed: 1, .. }));
        assert_eq!(console.store().read_live(), vec![Position::new(0.0, 1.0, 0.0)]);
        assert!(!console.is_running());
    }

    #[test]
    fn ready_before_completion_commits_at_completion() {
        let mut console = console();
        console.handle_batch(r#"{"Drones":[{"X":0,"Y":0,"Z":0}]}"#);
        console.move_command(Position::new(1.0, 0.0, 0.0)).unwrap();

        let events = console.handle_batch(r#"{"Paths":[[{"X":1,"Y":0,"Z":0}]]}"#);
        let run_id = started_run(&events);
        console.tick(run_id);
        console.handle_batch(r#"{"Ready":true}"#);
        let events = finish(&mut console, run_id);

        assert!(events.iter().any(|e| matches!(e, ConsoleEvent::Reconciled { .. })));
        assert_eq!(console.store().read_live(), vec![Position::new(1.0, 0.0, 0.0)]);
    }

    #[test]
    fn out_of_range_drone_update_is_local() {
        let mut console = console();
        console.handle_batch(r#"{"Drones":[{"X":0,"Y":0,"Z":0}]}"#);

        let events = console.handle_batch(
            r#"{"DroneId":5,"Location":{"X":9,"Y":9,"Z":9},"Identifier":"still-applied"}
{"DroneId":0,"Location":{"X":1,"Y":2,"Z":3}}"#,
        );

        assert_eq!(console.identifier(), Some("still-applied"));
        assert_eq!(console.store().read_live(), vec![Position::new(1.0, 2.0, 3.0)]);
        assert!(events.iter().any(|e| matches!(
            e,
            ConsoleEvent::Rejected { code, .. } if code == "out_of_range"
        )));
        assert!(events.contains(&ConsoleEvent::LiveUpdated { drone_id: 0 }));
    }

    #[test]
    fn unrepresentable_drone_index_keeps_the_rest_of_the_message() {
        let mut console = console();
        console.handle_batch(r#"{"Drones":[{"X":0,"Y":0,"Z":0}]}"#);
        console.move_command(Position::new(0.0, 1.0, 0.0)).unwrap();
        assert!(console.is_running());

        let batch = [
            r#"{"Identifier":"gs","DroneId":18446744073709551615,"#,
            r#""Location":{"X":9,"Y":9,"Z":9},"Ready":true}"#,
            "\n",
            r#"{"DroneId":1e3,"Location":{"X":9,"Y":9,"Z":9}}"#,
            "\n",
            r#"{"DroneId":-2,"Location":{"X":9,"Y":9,"Z":9}}"#,
        ]
        .concat();
        let events = console.handle_batch(&batch);

        assert_eq!(console.identifier(), Some("gs"));
        assert!(!console.is_running());
        assert!(events.contains(&ConsoleEvent::ControlsEnabled));
        assert_eq!(console.store().read_live(), vec![Position::new(0.0, 0.0, 0.0)]);
        let rejected_with = |wanted: &str| {
            events
                .iter()
                .filter(|e| matches!(e, ConsoleEvent::Rejected { code, .. } if code == wanted))
                .count()
        };
        assert_eq!(rejected_with("out_of_range"), 3);
        assert_eq!(rejected_with("malformed_message"), 0);
    }

    #[test]
    fn drone_update_during_animation_touches_live_only() {
        let mut console = console();
        console.handle_batch(r#"{"Drones":[{"X":0,"Y":0,"Z":0}]}"#);
        let events = console.handle_batch(r#"{"Paths":[[{"X":3,"Y":0,"Z":0}]]}"#);
        let run_id = started_run(&events);

        for _ in 0..10 {
            console.tick(run_id);
        }
        let simulated = console.store().read_simulated();
        console.handle_batch(r#"{"DroneId":0,"Location":{"X":0,"Y":4,"Z":0}}"#);

        assert_eq!(console.store().read_simulated(), simulated);
        assert_eq!(console.store().read_live(), vec![Position::new(0.0, 4.0, 0.0)]);
    }

    #[test]
    fn roster_mid_animation_rebases_the_run() {
        let mut console = console();
        console.handle_batch(r#"{"Drones":[{"X":0,"Y":0,"Z":0}]}"#);
        let events = console.handle_batch(r#"{"Paths":[[{"X":3,"Y":0,"Z":0}]]}"#);
        let run_id = started_run(&events);
        for _ in 0..10 {
            console.tick(run_id);
        }

        console.handle_batch(r#"{"Drones":[{"X":10,"Y":0,"Z":0}]}"#);
        let reset = console.store().read_simulated()[0].position();
        assert_eq!(reset, Position::new(10.0, 0.5, 0.0));
        assert_eq!(console.animator().current_run(), Some(run_id));

        finish(&mut console, run_id);
        let end = console.store().read_simulated()[0].position();
        assert!(end.distance_to(Position::new(12.0, 0.5, 0.0)) < 1e-9);
        assert_eq!(console.store().read_live(), vec![Position::new(12.0, 0.0, 0.0)]);
    }

    #[test]
    fn roster_of_different_size_cancels_the_run() {
        let mut console = console();
        console.handle_batch(r#"{"Drones":[{"X":0,"Y":0,"Z":0}]}"#);
        let events = console.handle_batch(r#"{"Paths":[[{"X":3,"Y":0,"Z":0}]]}"#);
        let run_id = started_run(&events);

        let events =
            console.handle_batch(r#"{"Drones":[{"X":0,"Y":0,"Z":0},{"X":1,"Y":0,"Z":0}]}"#);
        assert!(events.contains(&ConsoleEvent::AnimationCancelled { run_id }));
        assert_eq!(console.animator().state(), AnimatorState::Idle);
        assert!(console.tick(run_id).is_empty());
    }

    #[test]
    fn invalid_plan_leaves_state_untouched() {
        let mut console = console();
        console.handle_batch(r#"{"Drones":[{"X":0,"Y":0,"Z":0},{"X":3,"Y":0,"Z":0}]}"#);
        let simulated = console.store().read_simulated();

        let events = console.handle_batch(r#"{"Paths":[[{"X":0,"Y":1,"Z":0}],[]]}"#);
        assert!(events.iter().any(|e| matches!(
            e,
            ConsoleEvent::Rejected { code, .. } if code == "invalid_plan"
        )));
        assert_eq!(console.animator().current_run(), None);
        assert_eq!(console.store().read_simulated(), simulated);
    }

    #[test]
    fn empty_paths_commit_immediately_when_unlocked() {
        let mut console = console();
        console.handle_batch(r#"{"Drones":[{"X":0,"Y":0,"Z":0}]}"#);
        console.handle_batch(r#"{"DroneId":0,"Location":{"X":5,"Y":5,"Z":5}}"#);

        let events = console.handle_batch(r#"{"Paths":[[]]}"#);
        assert!(events.iter().any(|e| matches!(e, ConsoleEvent::Reconciled { .. })));
        assert_eq!(console.store().read_live(), vec![Position::new(0.0, 0.0, 0.0)]);
    }

    #[test]
    fn ready_false_is_a_no_op() {
        let mut console = console();
        console.handle_batch(r#"{"Drones":[{"X":0,"Y":0,"Z":0}]}"#);
        console.move_command(Position::new(0.0, 1.0, 0.0)).unwrap();

        let events = console.handle_batch(r#"{"Ready":false}"#);
        assert!(events.is_empty());
        assert!(console.is_running());
    }
}
