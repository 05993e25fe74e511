//! WebSocket upgrade handlers for the swarm feed and view clients

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::swarm::ConsoleHandle;
use crate::util::time::server_time_millis;
use crate::ws::protocol::{FeedStatus, OutboundMessage, ViewMsg};

type WsSink = futures::stream::SplitSink<WebSocket, Message>;
type WsStream = futures::stream::SplitStream<WebSocket>;

/// Feed upgrade handler. Only one feed session is ever accepted; once it
/// has closed the console stays offline.
pub async fn feed_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    match state.console.snapshot().feed {
        FeedStatus::Waiting => {
            ws.on_upgrade(move |socket| handle_feed_socket(socket, state.console))
        }
        FeedStatus::Connected { session_id, .. } => {
            warn!(active_session = %session_id, "Refusing second feed connection");
            (StatusCode::CONFLICT, "A feed is already connected").into_response()
        }
        FeedStatus::Closed { .. } => {
            (StatusCode::GONE, "Feed session has ended").into_response()
        }
    }
}

/// Handle the upgraded feed connection
async fn handle_feed_socket(socket: WebSocket, console: ConsoleHandle) {
    let session_id = Uuid::new_v4();
    let (ws_sink, ws_stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundMessage>(16);

    if let Err(e) = console.open_feed(session_id, outbound_tx).await {
        warn!(session_id = %session_id, error = %e, "Feed rejected by console");
        return;
    }

    info!(session_id = %session_id, "Feed connection established");
    run_feed_session(session_id, &console, ws_sink, ws_stream, outbound_rx).await;

    console.close_feed(session_id).await;
    info!(session_id = %session_id, "Feed connection closed");
}

/// Run the feed session with read/write split
async fn run_feed_session(
    session_id: Uuid,
    console: &ConsoleHandle,
    mut ws_sink: WsSink,
    mut ws_stream: WsStream,
    mut outbound_rx: mpsc::Receiver<OutboundMessage>,
) {
    // Writer task: console commands -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_json(&mut ws_sink, &msg).await {
                debug!(session_id = %session_id, error = %e, "Feed send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> console, one frame at a time
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if console.feed_batch(session_id, text).await.is_err() {
                    debug!(session_id = %session_id, "Console stopped");
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(session_id = %session_id, "Received binary frame, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "Feed initiated close");
                break;
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Feed WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// View upgrade handler for renderers and operator UIs
pub async fn view_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_view_socket(socket, state.console))
}

async fn handle_view_socket(socket: WebSocket, console: ConsoleHandle) {
    let viewer_id = Uuid::new_v4();
    let (mut ws_sink, mut ws_stream) = socket.split();

    // Subscribe before reading the current snapshot so nothing is missed
    let mut view_rx = console.subscribe();

    let welcome = ViewMsg::Welcome {
        server_time: server_time_millis(),
    };
    let current = ViewMsg::Snapshot {
        snapshot: console.snapshot(),
        events: Vec::new(),
    };
    for msg in [welcome, current] {
        if let Err(e) = send_json(&mut ws_sink, &msg).await {
            debug!(viewer_id = %viewer_id, error = %e, "Failed to send initial view state");
            return;
        }
    }
    info!(viewer_id = %viewer_id, "View client connected");

    let writer_handle = tokio::spawn(async move {
        loop {
            match view_rx.recv().await {
                Ok(msg) => {
                    if let Err(e) = send_json(&mut ws_sink, &msg).await {
                        debug!(viewer_id = %viewer_id, error = %e, "View send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        viewer_id = %viewer_id,
                        lagged_count = n,
                        "View client lagged, skipping {} snapshots", n
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(viewer_id = %viewer_id, "View channel closed");
                    break;
                }
            }
        }
    });

    // View clients only listen; drain until they go away
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    writer_handle.abort();
    info!(viewer_id = %viewer_id, "View client disconnected");
}

/// Send a JSON text frame over WebSocket
async fn send_json<T: Serialize>(sink: &mut WsSink, msg: &T) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json)).await.map_err(|e| e.to_string())
}
