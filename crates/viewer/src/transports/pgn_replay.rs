//! Replays a finished PGN game as a stream of board frames.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use chesslink_core::pgn::positions_from_pgn;
use chesslink_core::{CoreError, Position};
use chesslink_sync::{Transport, TransportError, TransportEvent};

pub struct PgnReplayTransport {
    positions: Vec<Position>,
    delay: Duration,
    next: usize,
    open: bool,
}

impl PgnReplayTransport {
    pub fn from_pgn(text: &str, delay: Duration) -> Result<Self, CoreError> {
        let imported = positions_from_pgn(text)?;
        Ok(Self::new(imported.positions, delay))
    }

    pub fn new(positions: Vec<Position>, delay: Duration) -> Self {
        Self {
            positions,
            delay,
            // The initial position is already on the board
            next: 1,
            open: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.positions.len().saturating_sub(self.next)
    }
}

impl Transport for PgnReplayTransport {
    fn open(&mut self) -> BoxFuture<'_, Result<(), TransportError>> {
        async move {
            if self.positions.is_empty() {
                return Err(TransportError::Open("PGN has no positions".to_string()));
            }
            self.open = true;
            Ok(())
        }
        .boxed()
    }

    fn next_event(&mut self) -> BoxFuture<'_, TransportEvent> {
        async move {
            if !self.open {
                return TransportEvent::Closed;
            }
            let Some(position) = self.positions.get(self.next) else {
                self.open = false;
                return TransportEvent::Closed;
            };
            let fen = position.board_state.clone();
            tokio::time::sleep(self.delay).await;
            self.next += 1;
            TransportEvent::Fen(fen)
        }
        .boxed()
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        async move {
            self.open = false;
        }
        .boxed()
    }

    fn describe(&self) -> String {
        format!("PGN replay ({} plies)", self.positions.len().saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHOLARS: &str = "1. e4 e5 2. Bc4 Nc6 3. Qh5 Nf6 4. Qxf7# 1-0\n";

    #[tokio::test(start_paused = true)]
    async fn test_replays_each_ply_after_delay() {
        let mut transport = PgnReplayTransport::from_pgn(SCHOLARS, Duration::from_secs(1)).unwrap();
        assert_eq!(transport.remaining(), 7);
        transport.open().await.unwrap();

        let started = tokio::time::Instant::now();
        let mut frames = Vec::new();
        loop {
            match transport.next_event().await {
                TransportEvent::Fen(fen) => frames.push(fen),
                TransportEvent::Closed => break,
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(frames.len(), 7);
        assert!(started.elapsed() >= Duration::from_secs(7));
        assert!(started.elapsed() < Duration::from_secs(8));
        assert!(frames[0].starts_with("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b"));
    }

    #[test]
    fn test_bad_pgn_is_rejected() {
        assert!(PgnReplayTransport::from_pgn("1. e4 e5 2. Ke3 *", Duration::ZERO).is_err());
    }
}
