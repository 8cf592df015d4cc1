//! Push-based move sources.

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;

use chesslink_core::Position;

use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A raw board frame, as reported by the sensor board.
    Fen(String),
    /// A full position sequence, as sent by a game feed.
    Positions(Vec<Position>),
    /// The source has gone away.
    Closed,
}

/// A live source of position events. Owned exclusively by the connection
/// controller once connected.
pub trait Transport: Send {
    fn open(&mut self) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Wait for the next event. Returns [`TransportEvent::Closed`] forever once closed.
    fn next_event(&mut self) -> BoxFuture<'_, TransportEvent>;

    fn close(&mut self) -> BoxFuture<'_, ()>;

    fn describe(&self) -> String {
        "transport".to_string()
    }
}

/// Transport fed from an in-process channel.
pub struct ChannelTransport {
    rx: mpsc::Receiver<TransportEvent>,
    open: bool,
}

impl ChannelTransport {
    pub fn new(buffer: usize) -> (mpsc::Sender<TransportEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx, open: false })
    }
}

impl Transport for ChannelTransport {
    fn open(&mut self) -> BoxFuture<'_, Result<(), TransportError>> {
        async move {
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
            match self.rx.recv().await {
                Some(event) => event,
                None => {
                    self.open = false;
                    TransportEvent::Closed
                }
            }
        }
        .boxed()
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        async move {
            self.open = false;
            self.rx.close();
        }
        .boxed()
    }

    fn describe(&self) -> String {
        "channel".to_string()
    }
}
