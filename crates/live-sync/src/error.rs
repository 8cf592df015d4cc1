//! Synchronizer, service and transport error types

use chesslink_core::CoreError;
use thiserror::Error;

use crate::synchronizer::SyncPhase;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Synchronizer is {actual:?}, expected {expected:?}")]
    Phase { expected: SyncPhase, actual: SyncPhase },

    #[error("Already connected")]
    AlreadyConnected,

    #[error("{0}")]
    Precondition(String),

    #[error("Game service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Session closed")]
    SessionClosed,
}

/// Failures reported by the game persistence service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Game not found: {0}")]
    NotFound(String),

    /// The game is no longer accepting live updates.
    #[error("Game {0} is not active")]
    NotActive(String),

    /// The server understood the request and refused it.
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Failed to open transport: {0}")]
    Open(String),

    #[error("Transport I/O error: {0}")]
    Io(String),
}
