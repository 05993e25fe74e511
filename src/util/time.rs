//! Wall-clock and uptime helpers

use std::sync::OnceLock;
use std::time::Instant;

use chrono::Utc;

static STARTED_AT: OnceLock<Instant> = OnceLock::new();

/// Record process start. Later calls keep the first instant.
pub fn mark_started() {
    STARTED_AT.get_or_init(Instant::now);
}

/// Whole seconds since [`mark_started`], zero before it is called
pub fn uptime_secs() -> u64 {
    STARTED_AT
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Wall-clock time in milliseconds, as sent to view clients
pub fn server_time_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_starts_near_zero() {
        mark_started();
        assert!(uptime_secs() < 5);
    }

    #[test]
    fn server_time_is_after_2020() {
        assert!(server_time_millis() > 1_577_836_800_000);
    }
}
