//! Observer that reports timeline and connection changes through tracing.

use tracing::{error, info, warn};

use chesslink_core::{EndReason, EndStatus, GameResult, Position};
use chesslink_sync::{ConnectionPhase, SyncObserver};

pub struct LogObserver;

impl SyncObserver for LogObserver {
    fn on_cursor_changed(&self, index: usize, position: &Position, status: &EndStatus) {
        let san = position.algebraic.as_deref().unwrap_or("-");
        match status.reason {
            EndReason::None => info!("Ply {index}: {san}"),
            reason => info!("Ply {index}: {san} ({})", reason.label()),
        }
    }

    fn on_connection_changed(&self, phase: ConnectionPhase) {
        info!("Connection {phase:?}");
    }

    fn on_result_committed(&self, result: GameResult) {
        info!("Result saved: {result}");
    }

    fn on_commit_failed(&self, result: GameResult, reason: &str) {
        error!("Could not save result {result}: {reason}. Set it again to retry.");
    }

    fn on_connection_failed(&self, reason: &str) {
        warn!("Connection failed: {reason}");
    }
}
