use std::env;
use std::time::Duration;

use chesslink_sync::SyncConfig;

#[derive(Clone, Debug)]
pub struct ViewerConfig {
    pub game_server_url: String,
    pub http_timeout: Duration,
    pub sync: SyncConfig,
}

impl ViewerConfig {
    pub fn from_env() -> Self {
        Self {
            game_server_url: env::var("GAME_SERVER_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://127.0.0.1:5000".to_string()),
            http_timeout: env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(30)),
            sync: SyncConfig::from_env(),
        }
    }
}
