//! Snapshot building for view clients

use crate::ws::protocol::{ConsoleEvent, ConsoleSnapshot, FeedStatus, ViewMsg};

use super::console::SwarmConsole;

/// Decides when a snapshot is due and collects events in between
pub struct SnapshotBuilder {
    /// Animation ticks since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in animation ticks
    snapshot_interval: u32,
    /// Send on the next check regardless of ticks
    forced: bool,
    seq: u64,
    pending_events: Vec<ConsoleEvent>,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
            forced: false,
            seq: 0,
            pending_events: Vec::new(),
        }
    }

    /// Count an animation tick and keep its events
    pub fn record_tick(&mut self, events: Vec<ConsoleEvent>) {
        self.ticks_since_snapshot += 1;
        self.record(events);
    }

    /// Keep events; any event makes the next snapshot due
    pub fn record(&mut self, events: Vec<ConsoleEvent>) {
        if !events.is_empty() {
            self.forced = true;
        }
        self.pending_events.extend(events);
    }

    /// Force snapshot on next check (state changed outside a tick)
    pub fn force_next(&mut self) {
        self.forced = true;
    }

    pub fn is_due(&self) -> bool {
        self.forced || self.ticks_since_snapshot >= self.snapshot_interval
    }

    /// Build the next snapshot message and reset the counters
    pub fn build(
        &mut self,
        console: &SwarmConsole,
        feed: FeedStatus,
    ) -> (ConsoleSnapshot, ViewMsg) {
        self.ticks_since_snapshot = 0;
        self.forced = false;
        self.seq += 1;

        let snapshot = console.snapshot(self.seq, feed);
        let msg = ViewMsg::Snapshot {
            snapshot: snapshot.clone(),
            events: std::mem::take(&mut self.pending_events),
        };
        (snapshot, msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::ConsoleSettings;

    #[test]
    fn snapshots_follow_tick_interval() {
        let mut builder = SnapshotBuilder::new(2);
        assert!(!builder.is_due());

        builder.record_tick(Vec::new());
        assert!(!builder.is_due());
        builder.record_tick(Vec::new());
        assert!(builder.is_due());

        let console = SwarmConsole::new(ConsoleSettings::default());
        let (snapshot, _) = builder.build(&console, FeedStatus::Waiting);
        assert_eq!(snapshot.seq, 1);
        assert!(!builder.is_due());
    }

    #[test]
    fn events_force_a_snapshot_and_are_drained() {
        let mut builder = SnapshotBuilder::new(30);
        builder.record(vec![ConsoleEvent::ControlsEnabled]);
        assert!(builder.is_due());

        let console = SwarmConsole::new(ConsoleSettings::default());
        let (_, msg) = builder.build(&console, FeedStatus::Waiting);
        match msg {
            ViewMsg::Snapshot { events, .. } => {
                assert_eq!(events, vec![ConsoleEvent::ControlsEnabled])
            }
            other => panic!("unexpected message {:?}", other),
        }

        let (_, msg) = builder.build(&console, FeedStatus::Waiting);
        assert!(matches!(msg, ViewMsg::Snapshot { ref events, .. } if events.is_empty()));
    }
}
