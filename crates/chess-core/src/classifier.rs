//! Game-end detection for a single position.
//!
//! Threefold repetition needs history, so `classify` takes the sequence of
//! positions up to and including the one being classified. `classify_fen`
//! only sees one snapshot and never reports repetition.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::game_data::{GameResult, Position};
use crate::rules::RulesPosition;

const FIFTY_MOVE_HALFMOVES: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    ThreefoldRepetition,
    DrawRule,
    Check,
    None,
}

impl EndReason {
    pub fn label(self) -> &'static str {
        match self {
            EndReason::Checkmate => "Checkmate",
            EndReason::Stalemate => "Stalemate",
            EndReason::InsufficientMaterial => "Insufficient material",
            EndReason::ThreefoldRepetition => "Threefold repetition",
            EndReason::DrawRule => "Draw",
            EndReason::Check => "Check",
            EndReason::None => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndStatus {
    pub is_over: bool,
    pub result: Option<GameResult>,
    pub reason: EndReason,
}

impl EndStatus {
    pub fn ongoing() -> Self {
        Self {
            is_over: false,
            result: None,
            reason: EndReason::None,
        }
    }

    fn over(result: GameResult, reason: EndReason) -> Self {
        Self {
            is_over: true,
            result: Some(result),
            reason,
        }
    }
}

impl Default for EndStatus {
    fn default() -> Self {
        Self::ongoing()
    }
}

/// Classify `history[index]`, using `history[..=index]` for repetition.
pub fn classify(history: &[Position], index: usize) -> Result<EndStatus, CoreError> {
    let target = history.get(index).ok_or(CoreError::Range {
        index,
        len: history.len(),
    })?;
    let pos = RulesPosition::parse(&target.board_state)?;

    let repeated = || {
        let key = pos.repetition_key();
        let occurrences = history[..=index]
            .iter()
            .filter_map(|p| RulesPosition::parse(&p.board_state).ok())
            .filter(|p| p.repetition_key() == key)
            .count();
        occurrences >= 3
    };

    Ok(evaluate(&pos, repeated))
}

/// Classify a lone FEN snapshot.
pub fn classify_fen(board_state: &str) -> Result<EndStatus, CoreError> {
    let pos = RulesPosition::parse(board_state)?;
    Ok(evaluate(&pos, || false))
}

fn evaluate(pos: &RulesPosition, is_threefold: impl FnOnce() -> bool) -> EndStatus {
    if pos.is_checkmate() {
        return EndStatus::over(GameResult::win_for(pos.turn().opponent()), EndReason::Checkmate);
    }
    if pos.is_stalemate() {
        return EndStatus::over(GameResult::Draw, EndReason::Stalemate);
    }
    if pos.is_insufficient_material() {
        return EndStatus::over(GameResult::Draw, EndReason::InsufficientMaterial);
    }
    if is_threefold() {
        return EndStatus::over(GameResult::Draw, EndReason::ThreefoldRepetition);
    }
    if pos.halfmove_clock() >= FIFTY_MOVE_HALFMOVES {
        return EndStatus::over(GameResult::Draw, EndReason::DrawRule);
    }
    if pos.is_check() {
        return EndStatus {
            is_over: false,
            result: None,
            reason: EndReason::Check,
        };
    }
    EndStatus::ongoing()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_data::{Legality, Side, STANDARD_START_FEN};

    const FOOLS_MATE: &str = "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3";
    const STALEMATE: &str = "7k/5Q2/6K1/8/8/8/8/8 b - - 0 1";
    const BARE_KINGS: &str = "8/8/4k3/8/8/3K4/8/8 w - - 0 60";
    const FIFTY_MOVES: &str = "4k3/8/8/8/8/8/4P3/4K2R w K - 100 80";
    const CHECK: &str = "rnbqkbnr/ppp2ppp/3p4/1B2p3/4P3/8/PPPP1PPP/RNBQK1NR b KQkq - 1 3";

    #[test]
    fn test_checkmate_win_goes_to_side_not_to_move() {
        let status = classify_fen(FOOLS_MATE).unwrap();
        assert!(status.is_over);
        assert_eq!(status.reason, EndReason::Checkmate);
        assert_eq!(status.result, Some(GameResult::BlackWin));
    }

    #[test]
    fn test_checkmate_beats_fifty_move_clock() {
        // Mate delivered with the half-move clock past 100
        let status = classify_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 120 3").unwrap();
        assert_eq!(status.reason, EndReason::Checkmate);
    }

    #[test]
    fn test_draw_reasons() {
        let stalemate = classify_fen(STALEMATE).unwrap();
        assert_eq!(stalemate.reason, EndReason::Stalemate);
        assert_eq!(stalemate.result, Some(GameResult::Draw));

        let bare = classify_fen(BARE_KINGS).unwrap();
        assert_eq!(bare.reason, EndReason::InsufficientMaterial);

        let fifty = classify_fen(FIFTY_MOVES).unwrap();
        assert_eq!(fifty.reason, EndReason::DrawRule);
        assert!(fifty.is_over);
    }

    #[test]
    fn test_check_is_not_over() {
        let status = classify_fen(CHECK).unwrap();
        assert!(!status.is_over);
        assert_eq!(status.reason, EndReason::Check);
        assert_eq!(status.result, None);

        let start = classify_fen(STANDARD_START_FEN).unwrap();
        assert_eq!(start, EndStatus::ongoing());
    }

    #[test]
    fn test_classification_is_deterministic() {
        for fen in [FOOLS_MATE, STALEMATE, BARE_KINGS, FIFTY_MOVES, CHECK] {
            let first = classify_fen(fen).unwrap();
            for _ in 0..5 {
                assert_eq!(classify_fen(fen).unwrap(), first);
            }
        }
    }

    #[test]
    fn test_threefold_repetition_needs_history() {
        // Knights out and back twice: start position occurs three times
        let sans = ["Nf3", "Nf6", "Ng1", "Ng8", "Nf3", "Nf6", "Ng1", "Ng8"];
        let mut history = vec![Position::standard_start()];
        let mut pos = RulesPosition::default();
        for (i, san) in sans.iter().enumerate() {
            let mover = pos.turn();
            pos = pos.apply_san(san).unwrap();
            history.push(Position::ply(
                i + 1,
                pos.encode(),
                Some(san.to_string()),
                mover,
                Legality::Legal,
            ));
        }

        let last = history.len() - 1;
        let status = classify(&history, last).unwrap();
        assert_eq!(status.reason, EndReason::ThreefoldRepetition);
        assert_eq!(status.result, Some(GameResult::Draw));

        // Second occurrence is not enough
        assert_eq!(classify(&history, 4).unwrap().reason, EndReason::None);
        // A lone snapshot can't see the repetition
        assert_eq!(classify_fen(&history[last].board_state).unwrap().reason, EndReason::None);
        assert_eq!(history[1].mover, Some(Side::White));
    }

    #[test]
    fn test_classify_out_of_range() {
        let history = vec![Position::standard_start()];
        assert_eq!(
            classify(&history, 3).unwrap_err(),
            CoreError::Range { index: 3, len: 1 }
        );
    }
}
