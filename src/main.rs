//! Swarm Console - ground console backend for a drone swarm
//!
//! This is the main entry point for the console. It handles:
//! - The WebSocket feed from the swarm ground station (telemetry in, targets out)
//! - Maneuver preview: simulated animation of path plans and reconciliation
//! - Operator commands and state over HTTP
//! - Snapshot streaming to rendering/UI clients

mod app;
mod config;
mod http;
mod swarm;
mod util;
mod ws;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;
use crate::swarm::ConsoleSession;
use crate::util::time::mark_started;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config.log_level, config.log_json);
    mark_started();

    info!("Starting Swarm Console");
    info!("Server address: {}", config.server_addr);
    info!(
        single_move_ms = config.single_move_time.as_millis() as u64,
        refresh_frequency = config.refresh_frequency,
        y_offset = config.y_offset,
        "Simulation settings"
    );

    // Spawn the console session; it owns all swarm state
    let (session, console) = ConsoleSession::new(config.console_settings(), config.view_fps);
    tokio::spawn(session.run());

    let state = AppState::new(config.clone(), console);
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("Feed endpoint: ws://{}/ws/feed", addr);
    info!("View endpoint: ws://{}/ws/view", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` overrides `LOG_LEVEL`.
fn init_tracing(log_level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
