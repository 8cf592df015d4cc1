use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    /// Label used by the board server ("White" / "Black").
    pub fn label(self) -> &'static str {
        match self {
            Side::White => "White",
            Side::Black => "Black",
        }
    }

    pub fn from_label(label: &str) -> Option<Side> {
        match label.to_ascii_lowercase().as_str() {
            "white" | "w" => Some(Side::White),
            "black" | "b" => Some(Side::Black),
            _ => None,
        }
    }
}

/// Whether a ply was verified against the rules engine.
/// Sensor moves that can't be read off the board diff are `Unknown`, not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Legality {
    Legal,
    Illegal,
    #[default]
    Unknown,
}

impl Legality {
    pub fn from_flag(is_legal: Option<bool>) -> Self {
        match is_legal {
            Some(true) => Legality::Legal,
            Some(false) => Legality::Illegal,
            None => Legality::Unknown,
        }
    }

    pub fn as_flag(self) -> Option<bool> {
        match self {
            Legality::Legal => Some(true),
            Legality::Illegal => Some(false),
            Legality::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameResult {
    #[serde(rename = "1-0")]
    WhiteWin,
    #[serde(rename = "0-1")]
    BlackWin,
    #[serde(rename = "1/2-1/2", alias = "½-½")]
    Draw,
    #[serde(rename = "*")]
    InProgress,
}

impl GameResult {
    pub fn win_for(side: Side) -> Self {
        match side {
            Side::White => GameResult::WhiteWin,
            Side::Black => GameResult::BlackWin,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != GameResult::InProgress
    }

    /// PGN result token.
    pub fn as_pgn(self) -> &'static str {
        match self {
            GameResult::WhiteWin => "1-0",
            GameResult::BlackWin => "0-1",
            GameResult::Draw => "1/2-1/2",
            GameResult::InProgress => "*",
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_pgn())
    }
}

impl FromStr for GameResult {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1-0" => Ok(GameResult::WhiteWin),
            "0-1" => Ok(GameResult::BlackWin),
            "1/2-1/2" | "½-½" => Ok(GameResult::Draw),
            "*" | "" => Ok(GameResult::InProgress),
            other => Err(CoreError::InvalidResult(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMetadata {
    pub event: String,
    pub site: String,
    pub date: String,
    pub round: String,
    pub white: String,
    pub black: String,
}

impl Default for GameMetadata {
    fn default() -> Self {
        Self {
            event: "Casual Game".to_string(),
            site: "?".to_string(),
            date: chrono::Local::now().format("%Y.%m.%d").to_string(),
            round: "1".to_string(),
            white: "White".to_string(),
            black: "Black".to_string(),
        }
    }
}

/// One ply of a game and the board it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub index: usize,
    /// FEN of the board after this ply.
    pub board_state: String,
    /// SAN of the move producing this position. `None` for index 0.
    pub algebraic: Option<String>,
    pub uci: Option<String>,
    /// `None` for index 0.
    pub mover: Option<Side>,
    pub legality: Legality,
    pub timestamp: Option<NaiveDateTime>,
}

impl Position {
    /// The position before any move has been made.
    pub fn initial(board_state: impl Into<String>) -> Self {
        Self {
            index: 0,
            board_state: board_state.into(),
            algebraic: None,
            uci: None,
            mover: None,
            legality: Legality::Legal,
            timestamp: None,
        }
    }

    pub fn standard_start() -> Self {
        Self::initial(STANDARD_START_FEN)
    }

    pub fn ply(
        index: usize,
        board_state: impl Into<String>,
        algebraic: Option<String>,
        mover: Side,
        legality: Legality,
    ) -> Self {
        Self {
            index,
            board_state: board_state.into(),
            algebraic,
            uci: None,
            mover: Some(mover),
            legality,
            timestamp: None,
        }
    }

    pub fn with_uci(mut self, uci: impl Into<String>) -> Self {
        self.uci = Some(uci.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Aggregate root: one game and its full history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub metadata: GameMetadata,
    pub positions: Vec<Position>,
    pub result: GameResult,
}

impl Game {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: GameMetadata::default(),
            positions: vec![Position::standard_start()],
            result: GameResult::InProgress,
        }
    }

    pub fn latest_index(&self) -> usize {
        self.positions.len().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_tokens() {
        assert_eq!("1-0".parse::<GameResult>().unwrap(), GameResult::WhiteWin);
        assert_eq!("½-½".parse::<GameResult>().unwrap(), GameResult::Draw);
        assert_eq!("*".parse::<GameResult>().unwrap(), GameResult::InProgress);
        assert!("2-0".parse::<GameResult>().is_err());
        assert_eq!(GameResult::Draw.to_string(), "1/2-1/2");
    }

    #[test]
    fn test_result_serde_uses_pgn_tokens() {
        let json = serde_json::to_string(&GameResult::BlackWin).unwrap();
        assert_eq!(json, "\"0-1\"");
        let draw: GameResult = serde_json::from_str("\"½-½\"").unwrap();
        assert_eq!(draw, GameResult::Draw);
    }

    #[test]
    fn test_legality_flags() {
        assert_eq!(Legality::from_flag(Some(false)), Legality::Illegal);
        assert_eq!(Legality::from_flag(None), Legality::Unknown);
        assert_eq!(Legality::Legal.as_flag(), Some(true));
    }

    #[test]
    fn test_new_game_starts_at_initial_position() {
        let game = Game::new("g1");
        assert_eq!(game.positions.len(), 1);
        assert_eq!(game.latest_index(), 0);
        assert!(game.positions[0].mover.is_none());
        assert_eq!(game.result, GameResult::InProgress);
    }
}
