//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

use crate::app::AppState;
use crate::http::middleware::request_id;
use crate::swarm::command::Direction;
use crate::swarm::{Position, SwarmError};
use crate::util::time::uptime_secs;
use crate::ws::handler::{feed_ws_handler, view_ws_handler};
use crate::ws::protocol::{ConsoleEvent, ConsoleSnapshot, FeedStatus, OutboundMessage};

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let api_routes = Router::new()
        .route("/state", get(state_handler))
        .route("/commands/move", post(move_handler))
        .route("/commands/return", post(return_handler))
        .route("/simulation/commit", post(commit_handler));

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/ws/feed", get(feed_ws_handler))
        .route("/ws/view", get(view_ws_handler))
        .nest("/api", api_routes);

    if let Some(dir) = &state.config.static_dir {
        info!(static_dir = %dir.display(), "Serving console assets");
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health and state endpoints
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    feed: FeedStatus,
    drone_count: usize,
    running: bool,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.console.snapshot();

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        feed: snapshot.feed,
        drone_count: snapshot.drone_count,
        running: snapshot.running,
    })
}

async fn state_handler(State(state): State<AppState>) -> Json<ConsoleSnapshot> {
    Json(state.console.snapshot())
}

// ============================================================================
// Command endpoints
// ============================================================================

/// Either a named direction (one configured step) or an explicit delta
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MoveRequest {
    Direction { direction: Direction },
    Delta { delta: Position },
}

#[derive(Serialize)]
struct CommandResponse {
    status: &'static str,
    targets: Vec<Position>,
}

impl From<OutboundMessage> for CommandResponse {
    fn from(msg: OutboundMessage) -> Self {
        Self {
            status: "sent",
            targets: msg.targets,
        }
    }
}

async fn move_handler(
    State(state): State<AppState>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<CommandResponse>, AppError> {
    if !state.command_limiter.check() {
        return Err(AppError::TooManyRequests);
    }

    let delta = match req {
        MoveRequest::Direction { direction } => direction.delta(state.config.command_step),
        MoveRequest::Delta { delta } => delta,
    };

    let sent = state.console.move_by(delta).await?;
    Ok(Json(sent.into()))
}

async fn return_handler(State(state): State<AppState>) -> Result<Json<CommandResponse>, AppError> {
    if !state.command_limiter.check() {
        return Err(AppError::TooManyRequests);
    }

    let sent = state.console.return_to_initial().await?;
    Ok(Json(sent.into()))
}

#[derive(Serialize)]
struct CommitResponse {
    drones: usize,
    changed: usize,
}

async fn commit_handler(State(state): State<AppState>) -> Result<Json<CommitResponse>, AppError> {
    match state.console.commit().await? {
        ConsoleEvent::Reconciled { drones, changed } => {
            Ok(Json(CommitResponse { drones, changed }))
        }
        other => Err(AppError::Internal(format!("unexpected commit result {:?}", other))),
    }
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Too many commands")]
    TooManyRequests,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SwarmError> for AppError {
    fn from(err: SwarmError) -> Self {
        let message = err.to_string();
        match err {
            SwarmError::OutOfRange { .. }
            | SwarmError::InvalidPlan(_)
            | SwarmError::MalformedMessage(_) => AppError::BadRequest(message),
            SwarmError::CommandsLocked | SwarmError::EmptyFleet | SwarmError::FeedBusy => {
                AppError::Conflict(message)
            }
            SwarmError::NotConnected | SwarmError::TransportClosed => {
                AppError::Unavailable(message)
            }
            SwarmError::ConsoleStopped => AppError::Internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::TooManyRequests => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tokio::sync::mpsc;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::config::Config;
    use crate::http::middleware::REQUEST_ID_HEADER;
    use crate::swarm::{ConsoleHandle, ConsoleSession};

    fn test_config(command_rate_limit: u32) -> Config {
        Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "info".to_string(),
            log_json: false,
            client_origin: "http://localhost:8080".to_string(),
            static_dir: None,
            single_move_time: Duration::from_millis(1000),
            refresh_frequency: 30,
            y_offset: 0.5,
            command_step: 2.0,
            view_fps: 30,
            command_rate_limit,
        }
    }

    fn app(command_rate_limit: u32) -> (Router, ConsoleHandle) {
        let config = test_config(command_rate_limit);
        let (session, handle) = ConsoleSession::new(config.console_settings(), config.view_fps);
        tokio::spawn(session.run());
        let router = build_router(AppState::new(config, handle.clone()));
        (router, handle)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_waiting_feed_and_echoes_request_id() {
        let (router, _) = app(5);
        let response = router
            .oneshot(
                Request::get("/health")
                    .header(&REQUEST_ID_HEADER, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[&REQUEST_ID_HEADER], "req-42");
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["feed"]["state"], "waiting");
    }

    #[tokio::test]
    async fn move_without_feed_is_unavailable() {
        let (router, _) = app(5);
        let response = router
            .oneshot(post_json("/api/commands/move", r#"{"direction":"up"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn move_sends_targets_then_locks() {
        let (router, handle) = app(5);
        let (tx, mut rx) = mpsc::channel(4);
        let session_id = Uuid::new_v4();
        handle.open_feed(session_id, tx).await.unwrap();
        handle
            .feed_batch(session_id, r#"{"Drones":[{"X":0,"Y":1,"Z":0}]}"#.to_string())
            .await
            .unwrap();

        let response = router
            .clone()
            .oneshot(post_json("/api/commands/move", r#"{"direction":"down"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["targets"][0]["Y"], 0.0);

        let sent = rx.recv().await.unwrap();
        assert_eq!(sent.targets, vec![Position::new(0.0, 0.0, 0.0)]);

        let response = router
            .oneshot(post_json("/api/commands/move", r#"{"delta":{"X":1,"Y":0,"Z":0}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn commands_are_rate_limited() {
        let (router, _) = app(1);
        let first = router
            .clone()
            .oneshot(post_json("/api/commands/return", ""))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::SERVICE_UNAVAILABLE);

        let second = router
            .oneshot(post_json("/api/commands/return", ""))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn commit_requires_a_roster() {
        let (router, _) = app(5);
        let response = router
            .oneshot(post_json("/api/simulation/commit", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(json["error"], "no roster received yet");
    }
}
