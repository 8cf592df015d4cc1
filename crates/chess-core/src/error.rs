//! Core error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Sequence error: expected position index {expected}, got {got}")]
    Sequence { expected: usize, got: usize },

    #[error("Invalid initial position: {0}")]
    InitialPosition(String),

    #[error("Range error: index {index} out of bounds for {len} positions")]
    Range { index: usize, len: usize },

    #[error("Invalid FEN: {0}")]
    InvalidFen(String),

    #[error("Invalid move: {0}")]
    InvalidMove(String),

    #[error("Invalid result: {0}")]
    InvalidResult(String),

    #[error("PGN error: {0}")]
    Pgn(String),
}
