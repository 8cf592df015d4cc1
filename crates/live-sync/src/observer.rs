//! Notifications delivered to the UI layer.

use std::sync::Arc;

use chesslink_core::{EndStatus, GameResult, Position};

use crate::connection::ConnectionPhase;

/// Observer of timeline and connection changes. All methods default to no-ops.
pub trait SyncObserver: Send + Sync {
    fn on_cursor_changed(&self, _index: usize, _position: &Position, _status: &EndStatus) {}

    fn on_connection_changed(&self, _phase: ConnectionPhase) {}

    fn on_result_committed(&self, _result: GameResult) {}

    /// The result could not be persisted; the user has to retry manually.
    fn on_commit_failed(&self, _result: GameResult, _reason: &str) {}

    /// Transient: a connect attempt failed or timed out.
    fn on_connection_failed(&self, _reason: &str) {}
}

pub type SharedObserver = Arc<dyn SyncObserver>;

pub struct NoopObserver;

impl SyncObserver for NoopObserver {}
