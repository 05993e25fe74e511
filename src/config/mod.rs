//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::swarm::ConsoleSettings;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text
    pub log_json: bool,
    /// Allowed client origins for CORS (comma-separated)
    pub client_origin: String,
    /// Directory with the console's static assets, if served by us
    pub static_dir: Option<PathBuf>,

    /// Duration of one logical move in an animation
    pub single_move_time: Duration,
    /// Sub-steps per logical move
    pub refresh_frequency: u32,
    /// Vertical render offset applied to simulated drones
    pub y_offset: f64,
    /// Scene units moved by one directional command
    pub command_step: f64,
    /// Snapshot rate for view clients while animating
    pub view_fps: u32,
    /// Max operator commands per second
    pub command_rate_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // PORT wins over SERVER_ADDR when both are set
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: parse_var("LOG_JSON", false)?,
            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            static_dir: env::var("STATIC_DIR").ok().map(PathBuf::from),

            single_move_time: Duration::from_millis(parse_var("SINGLE_MOVE_TIME_MS", 1000u64)?),
            refresh_frequency: parse_var("REFRESH_FREQUENCY", 30u32)?,
            y_offset: parse_var("Y_OFFSET", 0.5f64)?,
            command_step: parse_var("COMMAND_STEP", 1.0f64)?,
            view_fps: parse_var("VIEW_FPS", 30u32)?,
            command_rate_limit: parse_var("COMMAND_RATE_LIMIT", 5u32)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.single_move_time.is_zero() {
            return Err(ConfigError::Invalid("SINGLE_MOVE_TIME_MS", "must be positive"));
        }
        if self.refresh_frequency == 0 {
            return Err(ConfigError::Invalid("REFRESH_FREQUENCY", "must be positive"));
        }
        if self.view_fps == 0 {
            return Err(ConfigError::Invalid("VIEW_FPS", "must be positive"));
        }
        if !self.y_offset.is_finite() {
            return Err(ConfigError::Invalid("Y_OFFSET", "must be finite"));
        }
        if !(self.command_step.is_finite() && self.command_step > 0.0) {
            return Err(ConfigError::Invalid("COMMAND_STEP", "must be positive"));
        }
        Ok(())
    }

    /// Swarm timing and rendering constants for the console session
    pub fn console_settings(&self) -> ConsoleSettings {
        ConsoleSettings {
            single_move_time: self.single_move_time,
            refresh_frequency: self.refresh_frequency,
            y_offset: self.y_offset,
        }
    }
}

/// Read an optional variable, falling back to `default` when unset
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(name, "could not be parsed"))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            server_addr: "127.0.0.1:8080".parse().unwrap(),
            log_level: "info".to_string(),
            log_json: false,
            client_origin: "http://localhost:8080".to_string(),
            static_dir: None,
            single_move_time: Duration::from_millis(1000),
            refresh_frequency: 30,
            y_offset: 0.5,
            command_step: 1.0,
            view_fps: 30,
            command_rate_limit: 5,
        }
    }

    #[test]
    fn values_are_trimmed_and_parsed() {
        let v: u32 = parse_value("REFRESH_FREQUENCY", " 60 ").unwrap();
        assert_eq!(v, 60);
        let y: f64 = parse_value("Y_OFFSET", "0.25").unwrap();
        assert_eq!(y, 0.25);
    }

    #[test]
    fn unparsable_values_name_the_variable() {
        let err = parse_value::<u32>("VIEW_FPS", "fast").unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for VIEW_FPS: could not be parsed");
    }

    #[test]
    fn zero_refresh_frequency_is_rejected() {
        let mut config = sample();
        assert!(config.validate().is_ok());

        config.refresh_frequency = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid("REFRESH_FREQUENCY", _))
        ));
    }

    #[test]
    fn console_settings_follow_config() {
        let mut config = sample();
        config.y_offset = 1.0;
        let settings = config.console_settings();
        assert_eq!(settings.y_offset, 1.0);
        assert_eq!(settings.refresh_frequency, 30);
    }
}
