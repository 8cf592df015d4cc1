//! Reconstruct the ply a physical board made from two consecutive FEN frames.
//!
//! The board only reports piece placement, so the move is recovered by
//! diffing squares and matching the diff against the legal moves of the
//! previous position.

use chrono::NaiveDateTime;
use shakmaty::{Position as _, Role, Square};

use crate::error::CoreError;
use crate::game_data::{Legality, Position};
use crate::rules::{describe, RulesPosition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inference {
    /// Same piece placement as the previous frame.
    Unchanged,
    Ply(Position),
}

/// Infer the position following `previous` from a raw board frame.
pub fn infer_next(
    previous: &Position,
    next_fen: &str,
    timestamp: Option<NaiveDateTime>,
) -> Result<Inference, CoreError> {
    let before = RulesPosition::parse(&previous.board_state)?;
    let after = RulesPosition::parse(next_fen)?;

    let target = after.placement();
    if before.placement() == target {
        return Ok(Inference::Unchanged);
    }

    let index = previous.index + 1;
    let mover = before.turn();

    let changed: Vec<Square> = Square::ALL
        .into_iter()
        .filter(|&sq| before.chess().board().piece_at(sq) != after.chess().board().piece_at(sq))
        .collect();

    let mut position = Position {
        index,
        board_state: next_fen.trim().to_string(),
        algebraic: None,
        uci: None,
        mover: Some(mover),
        legality: Legality::Unknown,
        timestamp,
    };

    if changed.len() < 2 || changed.len() > 4 {
        return Ok(Inference::Ply(position));
    }

    // Covers castling and en passant, which touch three or four squares
    for mv in before.chess().legal_moves() {
        let candidate = before.after(mv.clone());
        if candidate.placement() == target {
            let described = describe(before.chess(), mv);
            // The engine knows castling rights and counters; the board does not
            position.board_state = candidate.encode();
            position.algebraic = Some(described.san);
            position.uci = Some(described.uci);
            position.legality = Legality::Legal;
            return Ok(Inference::Ply(position));
        }
    }

    if changed.len() != 2 {
        return Ok(Inference::Ply(position));
    }

    let board_before = before.chess().board();
    let board_after = after.chess().board();
    let mut from = None;
    let mut to = None;
    for &sq in &changed {
        match (board_before.piece_at(sq), board_after.piece_at(sq)) {
            (Some(_), None) => from = Some(sq),
            (None, Some(_)) => to = Some(sq),
            (Some(b), Some(a)) if b.color != a.color => to = Some(sq),
            _ => {}
        }
    }

    if let (Some(from), Some(to)) = (from, to) {
        if let Some(moved) = board_before.piece_at(from) {
            let capture = board_before.piece_at(to).is_some();
            let letter = match moved.role {
                Role::Pawn => String::new(),
                role => role.upper_char().to_string(),
            };
            let promotion = match (moved.role, board_after.piece_at(to)) {
                (Role::Pawn, Some(p)) if p.role != Role::Pawn => Some(p.role),
                _ => None,
            };

            let mut notation = format!("{letter}{from}{}{to}", if capture { "x" } else { "" });
            let mut uci = format!("{from}{to}");
            if let Some(role) = promotion {
                notation.push('=');
                notation.push(role.upper_char());
                uci.push(role.char());
            }

            position.algebraic = Some(notation);
            position.uci = Some(uci);
            position.legality = Legality::Illegal;
        }
    }

    Ok(Inference::Ply(position))
}
