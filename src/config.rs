use std::time::Duration;

use log::warn;

/// Tunables for [`WorkSessionTracker`](crate::tracker::WorkSessionTracker).
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Cadence of the display tickers. One second matches what users expect
    /// from a wall clock; tests shrink it.
    pub tick_interval: Duration,
    /// Whether an authenticated user with no open remote session gets one
    /// started automatically on reconciliation.
    pub auto_start: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            auto_start: true,
        }
    }
}

impl TrackerConfig {
    /// Reads `WORKTICK_TICK_MS` and `WORKTICK_AUTO_START` on top of the
    /// defaults. Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("WORKTICK_TICK_MS") {
            match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => config.tick_interval = Duration::from_millis(ms),
                _ => warn!("ignoring WORKTICK_TICK_MS={raw}: expected a positive integer"),
            }
        }

        if let Ok(raw) = std::env::var("WORKTICK_AUTO_START") {
            match raw.as_str() {
                "1" | "true" | "TRUE" => config.auto_start = true,
                "0" | "false" | "FALSE" => config.auto_start = false,
                _ => warn!("ignoring WORKTICK_AUTO_START={raw}: expected a boolean"),
            }
        }

        config
    }
}
