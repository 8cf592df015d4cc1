//! Thin rules-engine wrapper over shakmaty, speaking FEN / UCI / SAN strings.

use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position, Square};

use crate::error::CoreError;
use crate::game_data::Side;

/// A legal move described in both notations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulesMove {
    pub uci: String,
    /// SAN including the `+` / `#` suffix.
    pub san: String,
}

#[derive(Debug, Clone)]
pub struct RulesPosition {
    pos: Chess,
}

impl Default for RulesPosition {
    fn default() -> Self {
        Self {
            pos: Chess::default(),
        }
    }
}

impl RulesPosition {
    pub fn parse(board_state: &str) -> Result<Self, CoreError> {
        let fen: Fen = board_state
            .trim()
            .parse()
            .map_err(|e| CoreError::InvalidFen(format!("{board_state}: {e}")))?;
        let pos: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| CoreError::InvalidFen(format!("{board_state}: {e}")))?;
        Ok(Self { pos })
    }

    pub fn encode(&self) -> String {
        Fen::from_position(&self.pos, EnPassantMode::Legal).to_string()
    }

    /// Piece placement field of the FEN.
    pub fn placement(&self) -> String {
        self.encode()
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// Placement + side to move + castling + en passant, no move counters.
    pub fn repetition_key(&self) -> String {
        self.encode()
            .split_whitespace()
            .take(4)
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn turn(&self) -> Side {
        match self.pos.turn() {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }

    pub fn is_checkmate(&self) -> bool {
        self.pos.is_checkmate()
    }

    pub fn is_stalemate(&self) -> bool {
        self.pos.is_stalemate()
    }

    pub fn is_insufficient_material(&self) -> bool {
        self.pos.is_insufficient_material()
    }

    pub fn is_check(&self) -> bool {
        self.pos.is_check()
    }

    pub fn halfmove_clock(&self) -> u32 {
        self.pos.halfmoves()
    }

    pub fn fullmove_number(&self) -> u32 {
        self.pos.fullmoves().get()
    }

    /// Legal moves, optionally restricted to those starting on `square` (e.g. "e2").
    pub fn legal_moves(&self, square: Option<&str>) -> Result<Vec<RulesMove>, CoreError> {
        let from = match square {
            Some(s) => Some(
                s.parse::<Square>()
                    .map_err(|_| CoreError::InvalidMove(format!("bad square {s}")))?,
            ),
            None => None,
        };

        Ok(self
            .pos
            .legal_moves()
            .into_iter()
            .filter(|m| from.is_none() || m.from() == from)
            .map(|m| describe(&self.pos, m))
            .collect())
    }

    pub fn apply_uci(&self, uci: &str) -> Result<RulesPosition, CoreError> {
        let parsed: UciMove = uci
            .parse()
            .map_err(|_| CoreError::InvalidMove(format!("unparseable UCI {uci}")))?;
        let mv = parsed
            .to_move(&self.pos)
            .map_err(|_| CoreError::InvalidMove(format!("illegal move {uci}")))?;
        Ok(self.after(mv))
    }

    pub fn apply_san(&self, san: &str) -> Result<RulesPosition, CoreError> {
        let parsed: SanPlus = san
            .parse()
            .map_err(|_| CoreError::InvalidMove(format!("unparseable SAN {san}")))?;
        let mv = parsed
            .san
            .to_move(&self.pos)
            .map_err(|_| CoreError::InvalidMove(format!("illegal move {san}")))?;
        Ok(self.after(mv))
    }

    pub(crate) fn chess(&self) -> &Chess {
        &self.pos
    }

    pub(crate) fn after(&self, mv: Move) -> RulesPosition {
        let mut next = self.pos.clone();
        next.play_unchecked(mv);
        RulesPosition { pos: next }
    }
}

/// UCI + suffixed SAN for a move that is legal in `pos`.
pub(crate) fn describe(pos: &Chess, mv: Move) -> RulesMove {
    let uci = mv.to_uci(CastlingMode::Standard).to_string();
    let mut san = San::from_move(pos, mv.clone()).to_string();

    let mut after = pos.clone();
    after.play_unchecked(mv);
    if after.is_checkmate() {
        san.push('#');
    } else if after.is_check() {
        san.push('+');
    }

    RulesMove { uci, san }
}
