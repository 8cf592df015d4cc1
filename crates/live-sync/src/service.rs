//! Contract for the game persistence service.

use std::future::Future;

use serde::{Deserialize, Serialize};

use chesslink_core::{Game, GameResult, Position};

use crate::error::ServiceError;

/// A serial port the server can read a sensor board from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardPort {
    pub device: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
}

pub trait GameService: Send + Sync + 'static {
    /// Load a game with its full position history.
    fn fetch_game(&self, game_id: &str) -> impl Future<Output = Result<Game, ServiceError>> + Send;

    /// Current position sequence of a game that has a live source attached.
    /// Fails with [`ServiceError::NotActive`] once the game stops accepting updates.
    fn fetch_live_positions(
        &self,
        game_id: &str,
    ) -> impl Future<Output = Result<Vec<Position>, ServiceError>> + Send;

    fn commit_result(
        &self,
        game_id: &str,
        result: GameResult,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    fn list_ports(&self) -> impl Future<Output = Result<Vec<BoardPort>, ServiceError>> + Send;

    /// Have the server read the board on `port` into the game's live sequence.
    /// The server holds one board connection at a time and refuses finished games.
    fn attach_board(
        &self,
        game_id: &str,
        port: &str,
        baud_rate: u32,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;

    /// Close the server's board connection and flush what it read.
    fn detach_board(&self) -> impl Future<Output = Result<(), ServiceError>> + Send;
}
