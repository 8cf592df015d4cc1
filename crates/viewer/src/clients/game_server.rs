use chrono::NaiveDateTime;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use chesslink_core::{Game, GameMetadata, GameResult, Legality, Position, Side};
use chesslink_sync::{BoardPort, GameService, ServiceError};

use crate::config::ViewerConfig;

/// Client for the board server's game API.
pub struct GameServerClient {
    client: Client,
    base_url: String,
}

impl GameServerClient {
    pub fn new(config: &ViewerConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .user_agent("ChessLink/1.0")
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ServiceError::Http(format!("Client build error: {e}")))?;
        Ok(Self {
            client,
            base_url: config.game_server_url.clone(),
        })
    }

    async fn get_text(&self, url: &str) -> Result<(StatusCode, String), ServiceError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ServiceError::Http(format!("Request error: {e}")))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ServiceError::Http(format!("Body read error: {e}")))?;
        Ok((status, text))
    }

    async fn post_json(&self, url: &str, body: Value) -> Result<(StatusCode, String), ServiceError> {
        let resp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Http(format!("Request error: {e}")))?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        Ok((status, text))
    }
}

/// The serial endpoints answer 400 when they refuse a request.
fn check_serial(status: StatusCode, body: &str) -> Result<(), ServiceError> {
    if status == StatusCode::BAD_REQUEST {
        return Err(ServiceError::Rejected(error_message(body)));
    }
    if !status.is_success() {
        return Err(ServiceError::Http(format!("HTTP {status}: {}", error_message(body))));
    }
    Ok(())
}

impl GameService for GameServerClient {
    async fn fetch_game(&self, game_id: &str) -> Result<Game, ServiceError> {
        let url = format!("{}/games/{}", self.base_url, game_id);
        let (status, body) = self.get_text(&url).await?;

        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(game_id.to_string()));
        }
        if !status.is_success() {
            return Err(ServiceError::Http(format!("HTTP {status}: {}", error_message(&body))));
        }
        decode_game(&body)
    }

    async fn fetch_live_positions(&self, game_id: &str) -> Result<Vec<Position>, ServiceError> {
        let url = format!("{}/games/{}/state", self.base_url, game_id);
        let (status, body) = self.get_text(&url).await?;

        // The server answers 400 once the game has no live board attached
        if status == StatusCode::BAD_REQUEST {
            return Err(ServiceError::NotActive(game_id.to_string()));
        }
        if !status.is_success() {
            return Err(ServiceError::Http(format!("HTTP {status}: {}", error_message(&body))));
        }
        Ok(decode_game(&body)?.positions)
    }

    async fn commit_result(&self, game_id: &str, result: GameResult) -> Result<(), ServiceError> {
        let url = format!("{}/games/{}/update-result", self.base_url, game_id);
        let (status, body) = self
            .post_json(&url, json!({ "result": result.as_pgn() }))
            .await?;

        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(game_id.to_string()));
        }
        if !status.is_success() {
            return Err(ServiceError::Http(format!("HTTP {status}: {}", error_message(&body))));
        }
        Ok(())
    }

    async fn list_ports(&self) -> Result<Vec<BoardPort>, ServiceError> {
        let url = format!("{}/serial/ports", self.base_url);
        let (status, body) = self.get_text(&url).await?;
        if !status.is_success() {
            return Err(ServiceError::Http(format!("HTTP {status}: {}", error_message(&body))));
        }
        decode_ports(&body)
    }

    async fn attach_board(&self, game_id: &str, port: &str, baud_rate: u32) -> Result<(), ServiceError> {
        let url = format!("{}/serial/connect", self.base_url);
        let (status, body) = self
            .post_json(
                &url,
                json!({ "port": port, "game_id": game_id, "baud_rate": baud_rate }),
            )
            .await?;
        check_serial(status, &body)
    }

    async fn detach_board(&self) -> Result<(), ServiceError> {
        let url = format!("{}/serial/disconnect", self.base_url);
        let (status, body) = self.post_json(&url, json!({})).await?;
        check_serial(status, &body)
    }
}

#[derive(Debug, Deserialize)]
struct PortsEnvelope {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    ports: Vec<BoardPort>,
}

/// Decode the `{status, ports}` body of the port listing.
pub fn decode_ports(body: &str) -> Result<Vec<BoardPort>, ServiceError> {
    let envelope: PortsEnvelope =
        serde_json::from_str(body).map_err(|e| ServiceError::Decode(format!("Ports JSON: {e}")))?;
    if envelope.status != "success" {
        return Err(ServiceError::Decode(
            envelope.message.unwrap_or_else(|| format!("status {}", envelope.status)),
        ));
    }
    Ok(envelope.ports)
}

#[derive(Debug, Deserialize)]
struct GameEnvelope {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    game: Option<GameDto>,
}

#[derive(Debug, Deserialize)]
struct GameDto {
    game_id: Value,
    event: Option<String>,
    site: Option<String>,
    date: Option<String>,
    round: Option<String>,
    white: Option<String>,
    black: Option<String>,
    result: Option<String>,
    #[serde(default)]
    moves: Vec<MoveDto>,
}

/// One entry of a game's `moves` list. The server identifies moves by UUID;
/// the list order is the ply order and entry 0 is the initial position.
#[derive(Debug, Deserialize)]
struct MoveDto {
    fen: String,
    player: Option<String>,
    timestamp: Option<NaiveDateTime>,
    algebraic: Option<String>,
    uci: Option<String>,
    is_legal: Option<bool>,
}

impl MoveDto {
    fn into_position(self, index: usize) -> Position {
        if index == 0 {
            return Position {
                timestamp: self.timestamp,
                ..Position::initial(self.fen)
            };
        }
        Position {
            index,
            board_state: self.fen,
            algebraic: self.algebraic,
            uci: self.uci,
            mover: self.player.as_deref().and_then(Side::from_label),
            legality: Legality::from_flag(self.is_legal),
            timestamp: self.timestamp,
        }
    }
}

/// Decode a `{status, game}` body from the board server.
pub fn decode_game(body: &str) -> Result<Game, ServiceError> {
    let envelope: GameEnvelope =
        serde_json::from_str(body).map_err(|e| ServiceError::Decode(format!("Game JSON: {e}")))?;

    if envelope.status != "success" {
        return Err(ServiceError::Decode(
            envelope.message.unwrap_or_else(|| format!("status {}", envelope.status)),
        ));
    }
    let dto = envelope
        .game
        .ok_or_else(|| ServiceError::Decode("response has no game".to_string()))?;

    let id = match dto.game_id {
        Value::String(s) => s,
        other => other.to_string(),
    };

    let defaults = GameMetadata::default();
    let or_default = |value: Option<String>, fallback: String| {
        value.filter(|v| !v.trim().is_empty()).unwrap_or(fallback)
    };
    let metadata = GameMetadata {
        event: or_default(dto.event, defaults.event),
        site: or_default(dto.site, defaults.site),
        date: or_default(dto.date, defaults.date),
        round: or_default(dto.round, defaults.round),
        white: or_default(dto.white, defaults.white),
        black: or_default(dto.black, defaults.black),
    };

    let result = match dto.result.as_deref() {
        None => GameResult::InProgress,
        Some(token) => token.parse().unwrap_or_else(|e| {
            tracing::warn!("Game {id} has unreadable result: {e}");
            GameResult::InProgress
        }),
    };

    let positions: Vec<Position> = if dto.moves.is_empty() {
        vec![Position::standard_start()]
    } else {
        dto.moves
            .into_iter()
            .enumerate()
            .map(|(index, m)| m.into_position(index))
            .collect()
    };

    Ok(Game {
        id,
        metadata,
        positions,
        result,
    })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAME_BODY: &str = r#"{
        "status": "success",
        "game": {
            "game_id": "3f2b8c1e-0000-4000-8000-000000000001",
            "event": "Club Night",
            "site": "",
            "date": "2025.03.01",
            "round": "2",
            "white": "Alice",
            "black": "Bob",
            "result": "*",
            "moves": [
                {"move_id": "0c6a52de-3b1f-4f0e-9a51-6f2d1c7e8a10", "fen": "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
                 "player": null, "timestamp": "2025-03-01T19:00:00", "algebraic": null, "uci": null, "is_legal": true},
                {"move_id": "9b1f7a3e-1111-4c22-8d33-aaaaaaaaaaaa", "fen": "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1",
                 "player": "White", "timestamp": "2025-03-01T19:00:05.250000", "algebraic": "e4", "uci": "e2e4", "is_legal": true},
                {"move_id": "5e0d9c44-2b7a-4d18-b6c3-0f9e8d7c6b5a", "fen": "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2",
                 "player": "Black", "timestamp": null, "algebraic": null, "uci": null, "is_legal": null}
            ]
        }
    }"#;

    #[test]
    fn test_decode_game() {
        let game = decode_game(GAME_BODY).unwrap();
        assert_eq!(game.id, "3f2b8c1e-0000-4000-8000-000000000001");
        assert_eq!(game.metadata.event, "Club Night");
        assert_eq!(game.metadata.site, "?");
        assert_eq!(game.metadata.white, "Alice");
        assert_eq!(game.result, GameResult::InProgress);
        assert_eq!(game.positions.len(), 3);

        let e4 = &game.positions[1];
        assert_eq!(e4.index, 1);
        assert_eq!(e4.mover, Some(Side::White));
        assert_eq!(e4.algebraic.as_deref(), Some("e4"));
        assert_eq!(e4.legality, Legality::Legal);
        assert!(e4.timestamp.is_some());

        let glitch = &game.positions[2];
        assert_eq!(glitch.legality, Legality::Unknown);
        assert_eq!(glitch.mover, Some(Side::Black));
        assert!(game.positions[0].mover.is_none());
    }

    #[test]
    fn test_decode_without_moves_starts_from_standard_position() {
        let body = r#"{"status": "success", "game": {"game_id": 42, "result": "1-0"}}"#;
        let game = decode_game(body).unwrap();
        assert_eq!(game.id, "42");
        assert_eq!(game.result, GameResult::WhiteWin);
        assert_eq!(game.positions, vec![Position::standard_start()]);
        assert_eq!(game.metadata.event, "Casual Game");
    }

    #[test]
    fn test_indices_follow_move_order() {
        let body = r#"{"status": "success", "game": {"game_id": "g", "moves": [
            {"move_id": "c1d2e3f4-0000-4000-8000-00000000000a", "fen": "8/8/8/8/8/8/8/K6k w - - 0 1",
             "player": "White", "algebraic": "Ka1", "uci": "a2a1", "is_legal": false},
            {"move_id": "a0b1c2d3-0000-4000-8000-00000000000b", "fen": "8/8/8/8/8/8/K7/7k b - - 1 1",
             "player": "White", "algebraic": "Ka2", "uci": "a1a2", "is_legal": true}
        ]}}"#;
        let game = decode_game(body).unwrap();
        let indices: Vec<usize> = game.positions.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 1]);

        // Entry 0 is the starting board whatever the server attached to it
        let initial = &game.positions[0];
        assert!(initial.algebraic.is_none());
        assert!(initial.uci.is_none());
        assert!(initial.mover.is_none());
        assert_eq!(initial.legality, Legality::Legal);
        assert_eq!(game.positions[1].algebraic.as_deref(), Some("Ka2"));
    }

    #[test]
    fn test_decode_error_status() {
        let body = r#"{"status": "error", "message": "Game abc is not active"}"#;
        assert_eq!(
            decode_game(body).unwrap_err(),
            ServiceError::Decode("Game abc is not active".to_string())
        );
        assert!(matches!(decode_game("<html>"), Err(ServiceError::Decode(_))));
    }

    #[test]
    fn test_decode_ports() {
        let body = r#"{"status": "success", "ports": [
            {"device": "/dev/ttyUSB0", "description": "CP2102 USB to UART", "manufacturer": "Silicon Labs"},
            {"device": "/dev/ttyS0", "description": "n/a", "manufacturer": null}
        ]}"#;
        let ports = decode_ports(body).unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].device, "/dev/ttyUSB0");
        assert_eq!(ports[0].manufacturer.as_deref(), Some("Silicon Labs"));
        assert!(ports[1].manufacturer.is_none());

        let failed = r#"{"status": "error", "message": "permission denied"}"#;
        assert_eq!(
            decode_ports(failed).unwrap_err(),
            ServiceError::Decode("permission denied".to_string())
        );
    }

    #[test]
    fn test_serial_refusal_is_rejected() {
        let body = r#"{"status": "error", "message": "Already connected to /dev/ttyUSB0. Disconnect first."}"#;
        assert_eq!(
            check_serial(StatusCode::BAD_REQUEST, body).unwrap_err(),
            ServiceError::Rejected("Already connected to /dev/ttyUSB0. Disconnect first.".to_string())
        );
        assert!(matches!(
            check_serial(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            Err(ServiceError::Http(_))
        ));
        assert!(check_serial(StatusCode::OK, "{}").is_ok());
    }

    #[test]
    fn test_error_message_prefers_json_message() {
        assert_eq!(error_message(r#"{"status":"error","message":"nope"}"#), "nope");
        assert_eq!(error_message("plain text"), "plain text");
    }
}
