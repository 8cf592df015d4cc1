//! Connection lifecycle for a game's live move source.
//!
//! The controller owns the active source exclusively. Pull sources are polled
//! on a fixed interval with every fetch tagged by a request id; push sources
//! are drained by a pump task that closes the transport when stopped. A board
//! the server was asked to read is released again on disconnect.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::runtime::Handle;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use chesslink_core::{GameResult, Position};

use crate::config::SyncConfig;
use crate::error::{ServiceError, SyncError};
use crate::observer::SharedObserver;
use crate::service::GameService;
use crate::transport::{Transport, TransportEvent};

const PUSH_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
}

/// What to attach to the game.
pub enum SourceDescriptor {
    /// Poll the game service for the live position sequence. With a port the
    /// server is first asked to read the board on it.
    Poll { port: Option<String> },
    /// Take events from a push transport.
    Push(Box<dyn Transport>),
}

impl SourceDescriptor {
    /// Poll a game whose board the server is already reading.
    pub fn poll() -> Self {
        SourceDescriptor::Poll { port: None }
    }

    /// Attach the board on `port` server side, then poll.
    pub fn serial(port: impl Into<String>) -> Self {
        SourceDescriptor::Poll {
            port: Some(port.into()),
        }
    }

    fn describe(&self) -> String {
        match self {
            SourceDescriptor::Poll { port: None } => "poll".to_string(),
            SourceDescriptor::Poll { port: Some(port) } => format!("poll via {port}"),
            SourceDescriptor::Push(t) => t.describe(),
        }
    }
}

pub enum ConnectOutcome {
    /// Connected. A poll source hands back the sequence from its first fetch.
    Connected(Option<Vec<Position>>),
    /// The source did not confirm; back to disconnected.
    Failed(String),
}

/// Monotonic ids for outstanding fetches. Only the most recent one counts.
#[derive(Debug, Default)]
pub struct RequestTracker {
    last_issued: u64,
}

impl RequestTracker {
    pub fn issue(&mut self) -> u64 {
        self.last_issued += 1;
        self.last_issued
    }

    pub fn is_current(&self, request_id: u64) -> bool {
        request_id == self.last_issued
    }

    pub fn last_issued(&self) -> u64 {
        self.last_issued
    }
}

pub enum ControllerEvent {
    PollDue,
    Fetched {
        request_id: u64,
        result: Result<Vec<Position>, ServiceError>,
    },
    Pushed(TransportEvent),
}

enum ActiveSource {
    Poll {
        interval: Interval,
        /// Port the server was asked to read for this connection.
        board: Option<String>,
    },
    Push {
        events: mpsc::Receiver<TransportEvent>,
        stop: oneshot::Sender<()>,
    },
}

type FetchOutput = (u64, Result<Vec<Position>, ServiceError>);

pub struct ConnectionController<S: GameService> {
    game_id: String,
    service: Arc<S>,
    config: SyncConfig,
    phase: ConnectionPhase,
    requests: RequestTracker,
    fetches: JoinSet<FetchOutput>,
    source: Option<ActiveSource>,
    release: Option<JoinHandle<()>>,
    observer: SharedObserver,
}

impl<S: GameService> ConnectionController<S> {
    pub fn new(
        game_id: impl Into<String>,
        service: Arc<S>,
        config: SyncConfig,
        observer: SharedObserver,
    ) -> Self {
        Self {
            game_id: game_id.into(),
            service,
            config,
            phase: ConnectionPhase::Disconnected,
            requests: RequestTracker::default(),
            fetches: JoinSet::new(),
            source: None,
            release: None,
            observer,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Attach a live source. `game_result` must still be in progress.
    /// A source that fails or does not confirm within the connect timeout
    /// leaves the controller disconnected; that is reported as
    /// [`ConnectOutcome::Failed`], not as an error.
    pub async fn connect(
        &mut self,
        source: SourceDescriptor,
        game_result: GameResult,
    ) -> Result<ConnectOutcome, SyncError> {
        if self.phase != ConnectionPhase::Disconnected {
            return Err(SyncError::AlreadyConnected);
        }
        if game_result != GameResult::InProgress {
            return Err(SyncError::Precondition(format!(
                "Game {} is finished ({game_result}), cannot attach a live source",
                self.game_id
            )));
        }

        info!("Connecting game {} to {}", self.game_id, source.describe());
        self.set_phase(ConnectionPhase::Connecting);
        let limit = self.config.connect_timeout;

        match source {
            SourceDescriptor::Poll { port } => {
                if let Some(port) = &port {
                    let baud_rate = self.config.baud_rate;
                    let attach = self.service.attach_board(&self.game_id, port, baud_rate);
                    match timeout(limit, attach).await {
                        Ok(Ok(())) => info!("Server reading board on {port} for game {}", self.game_id),
                        Ok(Err(e)) => return Ok(self.connect_failed(e.to_string())),
                        Err(_) => {
                            // The server may still have opened the port
                            self.release_board(port.clone());
                            return Ok(self.connect_failed(format!("board attach not confirmed within {limit:?}")));
                        }
                    }
                }

                let first = timeout(limit, self.service.fetch_live_positions(&self.game_id)).await;
                let reason = match first {
                    Ok(Ok(positions)) => {
                        let period = self.config.poll_interval;
                        let mut interval = interval_at(Instant::now() + period, period);
                        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        self.source = Some(ActiveSource::Poll { interval, board: port });
                        self.set_phase(ConnectionPhase::Connected);
                        return Ok(ConnectOutcome::Connected(Some(positions)));
                    }
                    Ok(Err(e)) => e.to_string(),
                    Err(_) => format!("no response within {limit:?}"),
                };
                if let Some(port) = port {
                    self.release_board(port);
                }
                Ok(self.connect_failed(reason))
            }
            SourceDescriptor::Push(mut transport) => {
                let opened = timeout(limit, transport.open()).await;
                let reason = match opened {
                    Ok(Ok(())) => {
                        let (tx, events) = mpsc::channel(PUSH_BUFFER);
                        let (stop, stop_rx) = oneshot::channel();
                        tokio::spawn(pump(transport, tx, stop_rx));
                        self.source = Some(ActiveSource::Push { events, stop });
                        self.set_phase(ConnectionPhase::Connected);
                        return Ok(ConnectOutcome::Connected(None));
                    }
                    Ok(Err(e)) => e.to_string(),
                    Err(_) => format!("transport did not open within {limit:?}"),
                };
                transport.close().await;
                Ok(self.connect_failed(reason))
            }
        }
    }

    fn connect_failed(&mut self, reason: String) -> ConnectOutcome {
        warn!("Connection to game {} failed: {reason}", self.game_id);
        self.set_phase(ConnectionPhase::Disconnected);
        self.observer.on_connection_failed(&reason);
        ConnectOutcome::Failed(reason)
    }

    /// Wait for the next thing that needs handling. Cancel safe; pends
    /// forever while no source is attached and nothing is in flight.
    pub async fn next_event(&mut self) -> ControllerEvent {
        loop {
            tokio::select! {
                Some(joined) = self.fetches.join_next(), if !self.fetches.is_empty() => {
                    match joined {
                        Ok((request_id, result)) => {
                            return ControllerEvent::Fetched { request_id, result };
                        }
                        Err(e) if e.is_cancelled() => continue,
                        Err(e) => {
                            warn!("Live fetch task failed: {e}");
                            continue;
                        }
                    }
                }
                event = source_event(&mut self.source) => return event,
            }
        }
    }

    /// Issue one tagged live fetch. Ignored unless connected.
    pub fn poll(&mut self) {
        if self.phase != ConnectionPhase::Connected {
            return;
        }
        let request_id = self.requests.issue();
        let service = self.service.clone();
        let game_id = self.game_id.clone();
        debug!("Polling game {game_id}, request {request_id}");
        self.fetches.spawn(async move {
            let result = service.fetch_live_positions(&game_id).await;
            (request_id, result)
        });
    }

    /// Whether a fetch response may be merged.
    pub fn accept(&self, request_id: u64) -> bool {
        if self.phase != ConnectionPhase::Connected {
            debug!("Discarding response {request_id}: not connected");
            return false;
        }
        if !self.requests.is_current(request_id) {
            debug!(
                "Discarding stale response {request_id}, latest is {}",
                self.requests.last_issued()
            );
            return false;
        }
        true
    }

    /// The source ended normally, e.g. the game stopped accepting updates.
    pub fn source_gone(&mut self, reason: &str) {
        if self.phase == ConnectionPhase::Disconnected {
            return;
        }
        info!("Live source for game {} ended: {reason}", self.game_id);
        if let Some(ActiveSource::Poll { board, .. }) = &mut self.source {
            // The server no longer reads a board for this game; detaching
            // now could close a board attached to another game.
            board.take();
        }
        self.disconnect();
    }

    /// Detach the source. Safe to call in any phase, any number of times.
    /// Releasing a server-side board runs in the background; see [`Self::released`].
    pub fn disconnect(&mut self) {
        self.fetches.abort_all();
        match self.source.take() {
            Some(ActiveSource::Push { stop, .. }) => {
                // The pump closes the transport once it sees this
                let _ = stop.send(());
            }
            Some(ActiveSource::Poll {
                board: Some(port), ..
            }) => self.release_board(port),
            _ => {}
        }
        self.set_phase(ConnectionPhase::Disconnected);
    }

    /// Wait for a pending board release to finish, bounded by the connect timeout.
    pub async fn released(&mut self) {
        let Some(task) = self.release.take() else {
            return;
        };
        if timeout(self.config.connect_timeout, task).await.is_err() {
            warn!("Board release for game {} did not finish in time", self.game_id);
        }
    }

    fn release_board(&mut self, port: String) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("No runtime to release board on {port} for game {}", self.game_id);
            return;
        };
        let service = self.service.clone();
        let game_id = self.game_id.clone();
        self.release = Some(runtime.spawn(async move {
            match service.detach_board().await {
                Ok(()) => info!("Released board on {port} for game {game_id}"),
                Err(e) => warn!("Failed to release board on {port} for game {game_id}: {e}"),
            }
        }));
    }

    fn set_phase(&mut self, phase: ConnectionPhase) {
        if self.phase == phase {
            return;
        }
        info!("Game {} connection: {:?} -> {:?}", self.game_id, self.phase, phase);
        self.phase = phase;
        self.observer.on_connection_changed(phase);
    }
}

impl<S: GameService> Drop for ConnectionController<S> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn source_event(source: &mut Option<ActiveSource>) -> ControllerEvent {
    match source {
        Some(ActiveSource::Poll { interval, .. }) => {
            interval.tick().await;
            ControllerEvent::PollDue
        }
        Some(ActiveSource::Push { events, .. }) => match events.recv().await {
            Some(event) => ControllerEvent::Pushed(event),
            None => ControllerEvent::Pushed(TransportEvent::Closed),
        },
        None => std::future::pending().await,
    }
}

/// Forward transport events until the source closes or a stop arrives.
async fn pump(
    mut transport: Box<dyn Transport>,
    tx: mpsc::Sender<TransportEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    let name = transport.describe();
    loop {
        tokio::select! {
            _ = &mut stop => break,
            event = transport.next_event() => {
                let closed = event == TransportEvent::Closed;
                if tx.send(event).await.is_err() || closed {
                    break;
                }
            }
        }
    }
    transport.close().await;
    debug!("Closed {name} transport");
}
