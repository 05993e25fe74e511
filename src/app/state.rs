//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::swarm::ConsoleHandle;
use crate::util::rate_limit::CommandRateLimiter;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub console: ConsoleHandle,
    pub command_limiter: CommandRateLimiter,
}

impl AppState {
    pub fn new(config: Config, console: ConsoleHandle) -> Self {
        let command_limiter = CommandRateLimiter::new(config.command_rate_limit);

        Self {
            config: Arc::new(config),
            console,
            command_limiter,
        }
    }
}
