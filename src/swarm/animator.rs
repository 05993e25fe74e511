//! Path animation state machine and its fixed-rate clock

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::position::Position;
use super::store::PositionStore;
use super::SwarmError;

/// Identifies one animation run. Ticks are only applied to the current run.
pub type RunId = u64;

/// Subdivides each logical move into equal sub-steps at a fixed cadence
#[derive(Debug, Clone, Copy)]
pub struct SimulationClock {
    refresh_frequency: u32,
    waiting_time: Duration,
}

impl SimulationClock {
    pub fn new(single_move_time: Duration, refresh_frequency: u32) -> Self {
        let refresh_frequency = refresh_frequency.max(1);
        Self {
            refresh_frequency,
            waiting_time: single_move_time / refresh_frequency,
        }
    }

    pub fn refresh_frequency(&self) -> u32 {
        self.refresh_frequency
    }

    /// Delay between two sub-steps
    pub fn waiting_time(&self) -> Duration {
        self.waiting_time
    }

    fn sub_step(&self, logical_move: Position) -> Position {
        logical_move.scaled(1.0 / f64::from(self.refresh_frequency))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimatorState {
    Idle,
    Running,
}

/// Result of starting a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStart {
    /// Ticks are due for this run
    Started { run_id: RunId, steps: usize },
    /// Every path was empty; completion handling is due immediately
    Finished { run_id: RunId },
    /// No drones in the plan, nothing happened
    Empty,
}

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Stale,
    Stepped { run_id: RunId },
    Completed { run_id: RunId },
}

#[derive(Debug, Clone)]
struct AnimationRun {
    id: RunId,
    paths: Vec<VecDeque<Position>>,
    sub_step: u32,
}

impl AnimationRun {
    fn remaining_moves(&self) -> usize {
        self.paths.first().map(VecDeque::len).unwrap_or(0)
    }
}

/// Drives simulated positions along a multi-drone plan in lock-step
#[derive(Debug, Clone)]
pub struct Animator {
    clock: SimulationClock,
    run: Option<AnimationRun>,
    last_run_id: RunId,
}

impl Animator {
    pub fn new(clock: SimulationClock) -> Self {
        Self {
            clock,
            run: None,
            last_run_id: 0,
        }
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn state(&self) -> AnimatorState {
        if self.run.is_some() {
            AnimatorState::Running
        } else {
            AnimatorState::Idle
        }
    }

    pub fn current_run(&self) -> Option<RunId> {
        self.run.as_ref().map(|r| r.id)
    }

    pub fn remaining_moves(&self) -> usize {
        self.run.as_ref().map(AnimationRun::remaining_moves).unwrap_or(0)
    }

    pub fn sub_step(&self) -> u32 {
        self.run.as_ref().map(|r| r.sub_step).unwrap_or(0)
    }

    /// Validate a plan and replace any in-flight run with it.
    ///
    /// The plan starts from whatever the simulated dataset holds right now.
    pub fn start(
        &mut self,
        paths: Vec<Vec<Position>>,
        fleet_size: usize,
    ) -> Result<RunStart, SwarmError> {
        if paths.is_empty() {
            return Ok(RunStart::Empty);
        }

        if paths.len() != fleet_size {
            return Err(SwarmError::InvalidPlan(format!(
                "plan has {} paths for a fleet of {}",
                paths.len(),
                fleet_size
            )));
        }

        let steps = paths[0].len();
        if let Some((drone, path)) = paths.iter().enumerate().find(|(_, p)| p.len() != steps) {
            return Err(SwarmError::InvalidPlan(format!(
                "path of drone {} has {} moves, expected {}",
                drone,
                path.len(),
                steps
            )));
        }

        self.last_run_id += 1;
        let run_id = self.last_run_id;

        if let Some(previous) = self.run.take() {
            debug!(run_id = previous.id, superseded_by = run_id, "Animation run replaced");
        }

        if steps == 0 {
            return Ok(RunStart::Finished { run_id });
        }

        self.run = Some(AnimationRun {
            id: run_id,
            paths: paths.into_iter().map(VecDeque::from).collect(),
            sub_step: 0,
        });

        Ok(RunStart::Started { run_id, steps })
    }

    /// Drop the in-flight run, returning its id
    pub fn cancel(&mut self) -> Option<RunId> {
        self.run.take().map(|r| r.id)
    }

    /// Apply one sub-step of `run_id` to every simulated position.
    ///
    /// A tick scheduled for a superseded run is ignored.
    pub fn tick(&mut self, run_id: RunId, store: &mut PositionStore) -> TickOutcome {
        let Some(run) = self.run.as_mut() else {
            return TickOutcome::Idle;
        };
        if run.id != run_id {
            return TickOutcome::Stale;
        }

        for (id, simulated) in store.simulated_mut() {
            if let Some(logical_move) = run.paths.get(id.index()).and_then(VecDeque::front) {
                simulated.translate(self.clock.sub_step(*logical_move));
            }
        }

        run.sub_step += 1;
        if run.sub_step < self.clock.refresh_frequency() {
            return TickOutcome::Stepped { run_id };
        }

        run.sub_step = 0;
        for path in run.paths.iter_mut() {
            path.pop_front();
        }

        if run.paths.iter().all(VecDeque::is_empty) {
            self.run = None;
            TickOutcome::Completed { run_id }
        } else {
            TickOutcome::Stepped { run_id }
        }
    }
}
