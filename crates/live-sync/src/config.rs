use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Interval between live fetches for pull-based sources
    pub poll_interval: Duration,

    /// How long a connect attempt may take before it is abandoned
    pub connect_timeout: Duration,

    /// Baud rate the server opens a board's serial port with
    pub baud_rate: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            connect_timeout: Duration::from_secs(10),
            baud_rate: 115_200,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: env::var("POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|ms: &u64| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            connect_timeout: env::var("CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            baud_rate: env::var("BOARD_BAUD_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.baud_rate),
        }
    }
}
