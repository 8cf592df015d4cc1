//! Newline-delimited FEN frames, as written by the board firmware and the
//! serial / socket emulators.

use std::path::PathBuf;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use chesslink_sync::{Transport, TransportError, TransportEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenSource {
    /// `host:port` of a socket emulator.
    Tcp(String),
    /// Serial device node, or any file producing lines.
    Device(PathBuf),
}

pub struct FenLineTransport {
    source: FenSource,
    reader: Option<Box<dyn AsyncBufRead + Unpin + Send>>,
    last_rejected: Option<String>,
}

impl FenLineTransport {
    pub fn new(source: FenSource) -> Self {
        Self {
            source,
            reader: None,
            last_rejected: None,
        }
    }

    /// Pull the board frame out of one line, or `None` if it isn't one.
    /// Accepts a bare FEN or a JSON message carrying a `fen` field.
    fn frame(&mut self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            self.last_rejected = None;
            return None;
        }

        let candidate = if line.starts_with('{') {
            serde_json::from_str::<Value>(line)
                .ok()
                .and_then(|v| v.get("fen").and_then(|f| f.as_str()).map(str::to_string))
        } else {
            Some(line.to_string())
        };

        match candidate {
            Some(fen) if has_eight_ranks(&fen) => {
                self.last_rejected = None;
                Some(fen)
            }
            _ => {
                // Boards repeat a bad frame until the pieces settle; log it once
                if self.last_rejected.as_deref() != Some(line) {
                    warn!("Ignoring malformed board frame: {line}");
                    self.last_rejected = Some(line.to_string());
                }
                None
            }
        }
    }
}

fn has_eight_ranks(fen: &str) -> bool {
    fen.split_whitespace()
        .next()
        .is_some_and(|placement| placement.split('/').count() == 8)
}

impl Transport for FenLineTransport {
    fn open(&mut self) -> BoxFuture<'_, Result<(), TransportError>> {
        async move {
            let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &self.source {
                FenSource::Tcp(addr) => {
                    let stream = TcpStream::connect(addr)
                        .await
                        .map_err(|e| TransportError::Open(format!("{addr}: {e}")))?;
                    Box::new(BufReader::new(stream))
                }
                FenSource::Device(path) => {
                    let file = tokio::fs::File::open(path)
                        .await
                        .map_err(|e| TransportError::Open(format!("{}: {e}", path.display())))?;
                    Box::new(BufReader::new(file))
                }
            };
            self.reader = Some(reader);
            debug!("Opened {}", self.describe());
            Ok(())
        }
        .boxed()
    }

    fn next_event(&mut self) -> BoxFuture<'_, TransportEvent> {
        async move {
            let mut line = String::new();
            loop {
                let Some(reader) = self.reader.as_mut() else {
                    return TransportEvent::Closed;
                };
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        self.reader = None;
                        return TransportEvent::Closed;
                    }
                    Ok(_) => {
                        if let Some(fen) = self.frame(&line) {
                            return TransportEvent::Fen(fen);
                        }
                    }
                    Err(e) => {
                        warn!("Read error on {}: {e}", self.describe());
                        self.reader = None;
                        return TransportEvent::Closed;
                    }
                }
            }
        }
        .boxed()
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        async move {
            self.reader = None;
        }
        .boxed()
    }

    fn describe(&self) -> String {
        match &self.source {
            FenSource::Tcp(addr) => format!("tcp {addr}"),
            FenSource::Device(path) => format!("device {}", path.display()),
        }
    }
}
