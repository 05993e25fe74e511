//! Console session: the single loop that owns swarm state

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ws::protocol::{ConsoleEvent, ConsoleSnapshot, FeedStatus, OutboundMessage, ViewMsg};

use super::animator::RunId;
use super::console::{ConsoleSettings, SwarmConsole};
use super::position::Position;
use super::snapshot::SnapshotBuilder;
use super::SwarmError;

/// Requests processed by the console loop, one at a time
#[derive(Debug)]
pub enum ConsoleRequest {
    FeedOpened {
        session_id: Uuid,
        outbound: mpsc::Sender<OutboundMessage>,
        reply: oneshot::Sender<Result<(), SwarmError>>,
    },
    FeedBatch {
        session_id: Uuid,
        text: String,
    },
    FeedClosed {
        session_id: Uuid,
    },
    Move {
        delta: Position,
        reply: oneshot::Sender<Result<OutboundMessage, SwarmError>>,
    },
    ReturnToInitial {
        reply: oneshot::Sender<Result<OutboundMessage, SwarmError>>,
    },
    Commit {
        reply: oneshot::Sender<Result<ConsoleEvent, SwarmError>>,
    },
}

/// Feed transport as seen from the loop. `Closed` is terminal.
enum FeedLink {
    Waiting,
    Connected {
        session_id: Uuid,
        since: DateTime<Utc>,
        outbound: mpsc::Sender<OutboundMessage>,
    },
    Closed {
        at: DateTime<Utc>,
    },
}

impl FeedLink {
    fn status(&self) -> FeedStatus {
        match self {
            FeedLink::Waiting => FeedStatus::Waiting,
            FeedLink::Connected {
                session_id, since, ..
            } => FeedStatus::Connected {
                session_id: *session_id,
                since: *since,
            },
            FeedLink::Closed { at } => FeedStatus::Closed { at: *at },
        }
    }

    fn is_session(&self, id: Uuid) -> bool {
        matches!(self, FeedLink::Connected { session_id, .. } if *session_id == id)
    }
}

/// Handle to the running console loop
#[derive(Clone)]
pub struct ConsoleHandle {
    request_tx: mpsc::Sender<ConsoleRequest>,
    view_tx: broadcast::Sender<ViewMsg>,
    latest: Arc<RwLock<ConsoleSnapshot>>,
}

impl ConsoleHandle {
    /// Most recently published snapshot
    pub fn snapshot(&self) -> ConsoleSnapshot {
        self.latest.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewMsg> {
        self.view_tx.subscribe()
    }

    pub async fn open_feed(
        &self,
        session_id: Uuid,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> Result<(), SwarmError> {
        self.request(|reply| ConsoleRequest::FeedOpened {
            session_id,
            outbound,
            reply,
        })
        .await
    }

    pub async fn feed_batch(&self, session_id: Uuid, text: String) -> Result<(), SwarmError> {
        self.request_tx
            .send(ConsoleRequest::FeedBatch { session_id, text })
            .await
            .map_err(|_| SwarmError::ConsoleStopped)
    }

    pub async fn close_feed(&self, session_id: Uuid) {
        let _ = self
            .request_tx
            .send(ConsoleRequest::FeedClosed { session_id })
            .await;
    }

    pub async fn move_by(&self, delta: Position) -> Result<OutboundMessage, SwarmError> {
        self.request(|reply| ConsoleRequest::Move { delta, reply }).await
    }

    pub async fn return_to_initial(&self) -> Result<OutboundMessage, SwarmError> {
        self.request(|reply| ConsoleRequest::ReturnToInitial { reply })
            .await
    }

    pub async fn commit(&self) -> Result<ConsoleEvent, SwarmError> {
        self.request(|reply| ConsoleRequest::Commit { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, SwarmError>>) -> ConsoleRequest,
    ) -> Result<T, SwarmError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| SwarmError::ConsoleStopped)?;
        reply_rx.await.map_err(|_| SwarmError::ConsoleStopped)?
    }
}

/// Owns the console and serializes ticks, feed batches and operator
/// requests onto one task
pub struct ConsoleSession {
    console: SwarmConsole,
    request_rx: mpsc::Receiver<ConsoleRequest>,
    view_tx: broadcast::Sender<ViewMsg>,
    latest: Arc<RwLock<ConsoleSnapshot>>,
    snapshot_builder: SnapshotBuilder,
    feed: FeedLink,
    /// Next tick: which run it belongs to and when it is due
    scheduled: Option<(RunId, Instant)>,
}

impl ConsoleSession {
    pub fn new(settings: ConsoleSettings, view_fps: u32) -> (Self, ConsoleHandle) {
        let (request_tx, request_rx) = mpsc::channel(256);
        let (view_tx, _) = broadcast::channel(64);

        let console = SwarmConsole::new(settings);
        let feed = FeedLink::Waiting;
        let latest = Arc::new(RwLock::new(console.snapshot(0, feed.status())));

        let ticks_per_second =
            f64::from(settings.refresh_frequency) / settings.single_move_time.as_secs_f64();
        let snapshot_interval = (ticks_per_second / f64::from(view_fps.max(1))).round() as u32;

        let handle = ConsoleHandle {
            request_tx,
            view_tx: view_tx.clone(),
            latest: latest.clone(),
        };

        let session = Self {
            console,
            request_rx,
            view_tx,
            latest,
            snapshot_builder: SnapshotBuilder::new(snapshot_interval),
            feed,
            scheduled: None,
        };

        (session, handle)
    }

    /// Run until every handle is dropped
    pub async fn run(mut self) {
        info!("Console session started");

        loop {
            self.schedule_next_tick();
            let due = self.scheduled;

            tokio::select! {
                request = self.request_rx.recv() => match request {
                    Some(request) => self.process_request(request),
                    None => break,
                },
                _ = sleep_until(due.map_or_else(Instant::now, |(_, at)| at)), if due.is_some() => {
                    if let Some((run_id, _)) = self.scheduled.take() {
                        let events = self.console.tick(run_id);
                        self.snapshot_builder.record_tick(events);
                    }
                }
            }

            if self.snapshot_builder.is_due() {
                self.publish();
            }
        }

        info!("Console session stopped");
    }

    /// Keep the pending tick if it belongs to the current run, otherwise
    /// schedule one relative to now
    fn schedule_next_tick(&mut self) {
        let animator = self.console.animator();
        self.scheduled = match (animator.current_run(), self.scheduled) {
            (Some(run_id), Some((scheduled_run, at))) if scheduled_run == run_id => {
                Some((run_id, at))
            }
            (Some(run_id), _) => Some((run_id, Instant::now() + animator.clock().waiting_time())),
            (None, _) => None,
        };
    }

    fn process_request(&mut self, request: ConsoleRequest) {
        match request {
            ConsoleRequest::FeedOpened {
                session_id,
                outbound,
                reply,
            } => {
                let _ = reply.send(self.open_feed(session_id, outbound));
            }
            ConsoleRequest::FeedBatch { session_id, text } => {
                if !self.feed.is_session(session_id) {
                    warn!(session_id = %session_id, "Dropping batch from inactive feed");
                    return;
                }
                let events = self.console.handle_batch(&text);
                debug!(
                    session_id = %session_id,
                    events = events.len(),
                    drone_count = self.console.store().fleet_size(),
                    "Feed batch handled"
                );
                self.snapshot_builder.record(events);
                self.snapshot_builder.force_next();
            }
            ConsoleRequest::FeedClosed { session_id } => {
                if self.feed.is_session(session_id) {
                    warn!(session_id = %session_id, "Feed closed, console is now offline");
                    self.feed = FeedLink::Closed { at: Utc::now() };
                    self.snapshot_builder.record(vec![ConsoleEvent::FeedClosed {
                        notice: "Connection to the swarm closed".to_string(),
                    }]);
                }
            }
            ConsoleRequest::Move { delta, reply } => {
                let result = self.send_command(|console| console.move_command(delta));
                let _ = reply.send(result);
            }
            ConsoleRequest::ReturnToInitial { reply } => {
                let result = self.send_command(SwarmConsole::return_command);
                let _ = reply.send(result);
            }
            ConsoleRequest::Commit { reply } => {
                let result = self.console.operator_commit();
                if let Ok(event) = &result {
                    info!("Operator committed simulated positions");
                    self.snapshot_builder.record(vec![event.clone()]);
                }
                let _ = reply.send(result);
            }
        }
    }

    fn open_feed(
        &mut self,
        session_id: Uuid,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> Result<(), SwarmError> {
        match self.feed {
            FeedLink::Waiting => {
                info!(session_id = %session_id, "Feed connected");
                self.feed = FeedLink::Connected {
                    session_id,
                    since: Utc::now(),
                    outbound,
                };
                self.snapshot_builder
                    .record(vec![ConsoleEvent::FeedConnected { session_id }]);
                Ok(())
            }
            FeedLink::Connected { .. } => Err(SwarmError::FeedBusy),
            FeedLink::Closed { .. } => Err(SwarmError::TransportClosed),
        }
    }

    /// Build a command and hand it to the feed writer.
    ///
    /// Capacity on the outbound channel is reserved first so a failed send
    /// never leaves the controls locked.
    fn send_command(
        &mut self,
        build: impl FnOnce(&mut SwarmConsole) -> Result<OutboundMessage, SwarmError>,
    ) -> Result<OutboundMessage, SwarmError> {
        let outbound = match &self.feed {
            FeedLink::Connected { outbound, .. } => outbound.clone(),
            FeedLink::Waiting => return Err(SwarmError::NotConnected),
            FeedLink::Closed { .. } => return Err(SwarmError::TransportClosed),
        };
        let permit = outbound
            .try_reserve()
            .map_err(|_| SwarmError::NotConnected)?;

        let message = build(&mut self.console)?;
        debug!(targets = message.targets.len(), "Sending targets to swarm");
        permit.send(message.clone());

        self.snapshot_builder.record(vec![ConsoleEvent::CommandSent {
            targets: message.targets.clone(),
        }]);
        Ok(message)
    }

    fn publish(&mut self) {
        let (snapshot, msg) = self.snapshot_builder.build(&self.console, self.feed.status());
        *self.latest.write() = snapshot;
        // No view clients is fine
        let _ = self.view_tx.send(msg);
    }
}
