//! PGN export of a recorded game, and PGN import for replaying a finished one.

use std::ops::ControlFlow;

use pgn_reader::{RawTag, Reader, SanPlus, Visitor};
use tracing::warn;

use crate::error::CoreError;
use crate::game_data::{Game, GameMetadata, GameResult, Legality, Position, Side, STANDARD_START_FEN};
use crate::rules::{describe, RulesPosition};

/// Render a game as PGN.
/// Returns `None` when nothing has been played yet. Illegal plies and plies
/// without SAN are left out of the movetext.
pub fn export_pgn(game: &Game) -> Option<String> {
    if game.positions.len() <= 1 {
        return None;
    }

    let start_fen = game.positions[0].board_state.trim();
    let mut pos = match RulesPosition::parse(start_fen) {
        Ok(p) => p,
        Err(e) => {
            warn!("Cannot export PGN for game {}: {e}", game.id);
            return None;
        }
    };

    let meta = &game.metadata;
    let headers = [
        ("Event", meta.event.as_str()),
        ("Site", meta.site.as_str()),
        ("Date", meta.date.as_str()),
        ("Round", meta.round.as_str()),
        ("White", meta.white.as_str()),
        ("Black", meta.black.as_str()),
        ("Result", game.result.as_pgn()),
    ];

    let mut pgn = String::new();
    for (key, value) in headers {
        let value = if value.is_empty() { "?" } else { value };
        pgn.push_str(&format!("[{key} \"{}\"]\n", escape_tag(value)));
    }
    if start_fen != STANDARD_START_FEN {
        pgn.push_str("[SetUp \"1\"]\n");
        pgn.push_str(&format!("[FEN \"{}\"]\n", pos.encode()));
    }
    pgn.push('\n');

    let mut tokens: Vec<String> = Vec::new();
    let mut first = true;
    for ply in &game.positions[1..] {
        if ply.legality == Legality::Illegal {
            continue;
        }
        let Some(san) = ply.algebraic.as_deref() else {
            continue;
        };

        let next = match pos.apply_san(san) {
            Ok(next) => next,
            Err(e) => {
                warn!("Skipping move {san} at ply {} in PGN: {e}", ply.index);
                continue;
            }
        };

        let move_number = pos.fullmove_number();
        match pos.turn() {
            Side::White => tokens.push(format!("{move_number}.")),
            Side::Black if first => tokens.push(format!("{move_number}...")),
            Side::Black => {}
        }
        tokens.push(san.to_string());
        first = false;
        pos = next;
    }
    tokens.push(game.result.as_pgn().to_string());

    pgn.push_str(&tokens.join(" "));
    pgn.push('\n');
    Some(pgn)
}

/// Download name, e.g. `Magnus-vs-Hikaru-2025.01.15.pgn`.
pub fn pgn_file_name(meta: &GameMetadata) -> String {
    let name = format!("{}-vs-{}-{}.pgn", meta.white, meta.black, meta.date);
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

fn escape_tag(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A game read back from PGN: headers, result and one position per ply.
#[derive(Debug, Clone)]
pub struct ImportedGame {
    pub metadata: GameMetadata,
    pub result: GameResult,
    pub positions: Vec<Position>,
}

/// Parse the first game in `text`.
pub fn positions_from_pgn(text: &str) -> Result<ImportedGame, CoreError> {
    let mut collector = ReplayCollector::default();
    let mut reader = Reader::new(text.as_bytes());

    let found = reader
        .read_game(&mut collector)
        .map_err(|e| CoreError::Pgn(e.to_string()))?;
    if let Some(err) = collector.error.take() {
        return Err(err);
    }
    if found.is_none() {
        return Err(CoreError::Pgn("no game found".to_string()));
    }
    collector
        .game
        .take()
        .ok_or_else(|| CoreError::Pgn("game has no movetext".to_string()))
}

#[derive(Default)]
struct ReplayCollector {
    game: Option<ImportedGame>,
    error: Option<CoreError>,
}

#[derive(Default)]
struct ReplayTags {
    metadata: GameMetadata,
    result: Option<GameResult>,
    fen: Option<String>,
}

struct ReplayState {
    metadata: GameMetadata,
    result: GameResult,
    pos: RulesPosition,
    positions: Vec<Position>,
}

impl Visitor for ReplayCollector {
    type Tags = ReplayTags;
    type Movetext = ReplayState;
    type Output = ();

    fn begin_tags(&mut self) -> ControlFlow<(), ReplayTags> {
        ControlFlow::Continue(ReplayTags::default())
    }

    fn tag(&mut self, tags: &mut ReplayTags, name: &[u8], value: RawTag<'_>) -> ControlFlow<()> {
        let value = value.decode_utf8_lossy().to_string();
        match name {
            b"Event" => tags.metadata.event = value,
            b"Site" => tags.metadata.site = value,
            b"Date" => tags.metadata.date = value,
            b"Round" => tags.metadata.round = value,
            b"White" => tags.metadata.white = value,
            b"Black" => tags.metadata.black = value,
            b"Result" => tags.result = value.parse().ok(),
            b"FEN" => tags.fen = Some(value),
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: ReplayTags) -> ControlFlow<(), ReplayState> {
        let pos = match tags.fen.as_deref() {
            Some(fen) => match RulesPosition::parse(fen) {
                Ok(p) => p,
                Err(e) => {
                    self.error = Some(e);
                    return ControlFlow::Break(());
                }
            },
            None => RulesPosition::default(),
        };

        ControlFlow::Continue(ReplayState {
            metadata: tags.metadata,
            result: tags.result.unwrap_or(GameResult::InProgress),
            positions: vec![Position::initial(pos.encode())],
            pos,
        })
    }

    fn san(&mut self, state: &mut ReplayState, san_plus: SanPlus) -> ControlFlow<()> {
        let mv = match san_plus.san.to_move(state.pos.chess()) {
            Ok(mv) => mv,
            Err(_) => {
                self.error = Some(CoreError::InvalidMove(format!(
                    "{} at ply {}",
                    san_plus,
                    state.positions.len()
                )));
                return ControlFlow::Break(());
            }
        };

        let mover = state.pos.turn();
        let described = describe(state.pos.chess(), mv.clone());
        state.pos = state.pos.after(mv);
        state.positions.push(
            Position::ply(
                state.positions.len(),
                state.pos.encode(),
                Some(described.san),
                mover,
                Legality::Legal,
            )
            .with_uci(described.uci),
        );
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, state: ReplayState) {
        if self.error.is_none() {
            self.game = Some(ImportedGame {
                metadata: state.metadata,
                result: state.result,
                positions: state.positions,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game_from_sans(sans: &[&str]) -> Game {
        let mut game = Game::new("g1");
        game.metadata.white = "Magnus Carlsen".to_string();
        game.metadata.black = "Hikaru".to_string();
        game.metadata.date = "2025.01.15".to_string();
        let mut pos = RulesPosition::default();
        for (i, san) in sans.iter().enumerate() {
            let mover = pos.turn();
            pos = pos.apply_san(san).unwrap();
            game.positions.push(Position::ply(
                i + 1,
                pos.encode(),
                Some(san.to_string()),
                mover,
                Legality::Legal,
            ));
        }
        game
    }

    #[test]
    fn test_export_empty_game() {
        assert!(export_pgn(&Game::new("g1")).is_none());
    }

    #[test]
    fn test_export_headers_and_movetext() {
        let mut game = game_from_sans(&["e4", "e5", "Nf3"]);
        game.metadata.site = String::new();
        let pgn = export_pgn(&game).unwrap();

        assert!(pgn.contains("[White \"Magnus Carlsen\"]"));
        assert!(pgn.contains("[Site \"?\"]"));
        assert!(pgn.contains("[Result \"*\"]"));
        assert!(!pgn.contains("[FEN"));
        assert!(pgn.trim_end().ends_with("1. e4 e5 2. Nf3 *"));
    }

    #[test]
    fn test_export_skips_illegal_and_unknown_plies() {
        let mut game = game_from_sans(&["e4", "e5"]);
        // A sensor glitch recorded between the two real moves
        game.positions.insert(
            1,
            Position::ply(1, "x", Some("e2e5".to_string()), Side::White, Legality::Illegal),
        );
        game.positions.push(Position::ply(4, "y", None, Side::White, Legality::Unknown));
        game.result = GameResult::Draw;

        let pgn = export_pgn(&game).unwrap();
        assert!(pgn.trim_end().ends_with("1. e4 e5 1/2-1/2"));
    }

    #[test]
    fn test_file_name_replaces_whitespace() {
        let game = game_from_sans(&[]);
        assert_eq!(pgn_file_name(&game.metadata), "Magnus_Carlsen-vs-Hikaru-2025.01.15.pgn");
    }

    #[test]
    fn test_import_positions() {
        let text = r#"[Event "Club Night"]
[White "Alice"]
[Black "Bob"]
[Result "0-1"]

1. f3 e5 2. g4 Qh4# 0-1
"#;
        let imported = positions_from_pgn(text).unwrap();
        assert_eq!(imported.metadata.event, "Club Night");
        assert_eq!(imported.metadata.white, "Alice");
        assert_eq!(imported.result, GameResult::BlackWin);
        assert_eq!(imported.positions.len(), 5);
        assert_eq!(imported.positions[4].algebraic.as_deref(), Some("Qh4#"));
        assert_eq!(imported.positions[4].uci.as_deref(), Some("d8h4"));
        assert_eq!(imported.positions[4].mover, Some(Side::Black));
        for (i, p) in imported.positions.iter().enumerate() {
            assert_eq!(p.index, i);
        }
    }

    #[test]
    fn test_import_rejects_illegal_san() {
        let text = "1. e4 e5 2. Ke3 *\n";
        assert!(matches!(positions_from_pgn(text), Err(CoreError::InvalidMove(_))));
    }
}
