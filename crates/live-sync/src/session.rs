//! Session driver: one task owns the timeline and the connection and handles
//! every command and source event to completion before the next one.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use chesslink_core::{CoreError, Game, GameResult};

use crate::config::SyncConfig;
use crate::connection::{
    ConnectOutcome, ConnectionController, ConnectionPhase, ControllerEvent, SourceDescriptor,
};
use crate::error::{ServiceError, SyncError};
use crate::observer::SharedObserver;
use crate::service::GameService;
use crate::synchronizer::{CommitRequest, MergeReport, SyncSnapshot, TimelineSynchronizer};
use crate::transport::TransportEvent;

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Start,
    Back,
    Forward,
    Latest,
    To(usize),
}

enum SessionCommand {
    Connect {
        source: SourceDescriptor,
        reply: oneshot::Sender<Result<ConnectionPhase, SyncError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Navigate {
        to: Navigation,
        reply: oneshot::Sender<Result<usize, SyncError>>,
    },
    SetResult {
        result: GameResult,
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    Snapshot {
        reply: oneshot::Sender<SyncSnapshot>,
    },
    Connection {
        reply: oneshot::Sender<ConnectionPhase>,
    },
    Shutdown,
}

type CommitOutput = (CommitRequest, Result<(), ServiceError>);

enum Step {
    Command(Option<SessionCommand>),
    Source(ControllerEvent),
    Committed(Result<CommitOutput, JoinError>),
}

pub struct LiveSession<S: GameService> {
    game_id: String,
    service: Arc<S>,
    sync: TimelineSynchronizer,
    controller: ConnectionController<S>,
    /// The result write in flight; at most one.
    commits: JoinSet<CommitOutput>,
    /// Result writes waiting their turn, in issue order.
    queued_commits: VecDeque<CommitRequest>,
}

impl<S: GameService> LiveSession<S> {
    /// Fetch the game and bring the timeline live. The cursor starts on the
    /// latest ply; a game that is already over at that ply gets its result
    /// committed.
    pub async fn start(
        game_id: &str,
        service: Arc<S>,
        config: SyncConfig,
        observer: SharedObserver,
    ) -> Result<Self, SyncError> {
        let mut sync = TimelineSynchronizer::new(observer.clone());
        sync.begin(game_id)?;
        let game = service.fetch_game(game_id).await?;
        let commit = sync.load(game)?;

        let controller = ConnectionController::new(game_id, service.clone(), config, observer);
        let mut session = Self {
            game_id: game_id.to_string(),
            service,
            sync,
            controller,
            commits: JoinSet::new(),
            queued_commits: VecDeque::new(),
        };
        session.queue_commit(commit);
        Ok(session)
    }

    pub fn synchronizer(&self) -> &TimelineSynchronizer {
        &self.sync
    }

    pub fn connection_phase(&self) -> ConnectionPhase {
        self.controller.phase()
    }

    /// Run the session on its own task.
    pub fn spawn(self) -> (SessionHandle, JoinHandle<Option<Game>>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(self.run(rx));
        (SessionHandle { tx }, task)
    }

    /// Process events until shutdown or until every handle is gone.
    /// Returns the game as last known.
    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) -> Option<Game> {
        info!("Session for game {} running", self.game_id);
        loop {
            let step = tokio::select! {
                command = commands.recv() => Step::Command(command),
                event = self.controller.next_event() => Step::Source(event),
                Some(done) = self.commits.join_next(), if !self.commits.is_empty() => {
                    Step::Committed(done)
                }
            };

            match step {
                Step::Command(None) | Step::Command(Some(SessionCommand::Shutdown)) => break,
                Step::Command(Some(command)) => self.handle_command(command).await,
                Step::Source(event) => self.handle_source_event(event),
                Step::Committed(done) => self.handle_commit(done),
            }
        }

        self.controller.disconnect();
        self.controller.released().await;
        // Let outstanding result writes land before reporting the final game
        while let Some(done) = self.commits.join_next().await {
            self.handle_commit(done);
        }
        info!("Session for game {} stopped", self.game_id);
        self.sync.game()
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect { source, reply } => {
                let outcome = self.controller.connect(source, self.sync.result()).await;
                let answer = match outcome {
                    Ok(ConnectOutcome::Connected(initial)) => {
                        if let Some(positions) = initial {
                            let merged = self.sync.merge(positions);
                            self.apply_merge(merged);
                        }
                        Ok(self.controller.phase())
                    }
                    Ok(ConnectOutcome::Failed(_)) => Ok(self.controller.phase()),
                    Err(e) => Err(e),
                };
                let _ = reply.send(answer);
            }
            SessionCommand::Disconnect { reply } => {
                self.controller.disconnect();
                self.controller.released().await;
                let _ = reply.send(());
            }
            SessionCommand::Navigate { to, reply } => {
                let _ = reply.send(self.navigate(to));
            }
            SessionCommand::SetResult { result, reply } => {
                let answer = match self.sync.set_result(result) {
                    Ok(request) => {
                        self.queue_commit(Some(request));
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(answer);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.sync.snapshot());
            }
            SessionCommand::Connection { reply } => {
                let _ = reply.send(self.controller.phase());
            }
            SessionCommand::Shutdown => {}
        }
    }

    fn navigate(&mut self, to: Navigation) -> Result<usize, SyncError> {
        match to {
            Navigation::Start => self.sync.go_to_start(),
            Navigation::Back => self.sync.step_back(),
            Navigation::Forward => self.sync.step_forward(),
            Navigation::Latest => self.sync.go_to_latest(),
            Navigation::To(index) => self.sync.go_to(index),
        }
    }

    fn handle_source_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::PollDue => self.controller.poll(),
            ControllerEvent::Fetched { request_id, result } => {
                if !self.controller.accept(request_id) {
                    return;
                }
                match result {
                    Ok(positions) => {
                        let merged = self.sync.merge(positions);
                        self.apply_merge(merged);
                    }
                    Err(ServiceError::NotActive(_)) => {
                        self.controller.source_gone("game is no longer live");
                    }
                    Err(e) => warn!("Live fetch for game {} failed: {e}", self.game_id),
                }
            }
            ControllerEvent::Pushed(event) => {
                if self.controller.phase() != ConnectionPhase::Connected {
                    debug!("Dropping push event received while disconnected");
                    return;
                }
                match event {
                    TransportEvent::Fen(fen) => {
                        let merged = self.sync.ingest_fen(&fen, Some(Utc::now().naive_utc()));
                        self.apply_merge(merged);
                    }
                    TransportEvent::Positions(positions) => {
                        let merged = self.sync.merge(positions);
                        self.apply_merge(merged);
                    }
                    TransportEvent::Closed => self.controller.source_gone("transport closed"),
                }
            }
        }
    }

    fn apply_merge(&mut self, merged: Result<MergeReport, SyncError>) {
        match merged {
            Ok(report) => self.queue_commit(report.commit),
            Err(SyncError::Core(e @ CoreError::Sequence { .. })) => {
                error!("Dropping update for game {}: {e}", self.game_id);
            }
            Err(e) => warn!("Dropping update for game {}: {e}", self.game_id),
        }
    }

    /// Result writes reach the service one at a time in issue order, so the
    /// last result set is the one persisted.
    fn queue_commit(&mut self, request: Option<CommitRequest>) {
        let Some(request) = request else {
            return;
        };
        if !request.automatic {
            let before = self.queued_commits.len();
            self.queued_commits.retain(|queued| !queued.automatic);
            if self.queued_commits.len() != before {
                debug!("Manual result {} supersedes queued detections", request.result);
            }
        }
        self.queued_commits.push_back(request);
        self.send_next_commit();
    }

    fn send_next_commit(&mut self) {
        if !self.commits.is_empty() {
            return;
        }
        let Some(request) = self.queued_commits.pop_front() else {
            return;
        };
        let service = self.service.clone();
        let game_id = self.game_id.clone();
        self.commits.spawn(async move {
            let outcome = service.commit_result(&game_id, request.result).await;
            (request, outcome)
        });
    }

    fn handle_commit(&mut self, done: Result<CommitOutput, JoinError>) {
        match done {
            Ok((request, Ok(()))) => self.sync.commit_succeeded(&request),
            Ok((request, Err(e))) => self.sync.commit_failed(&request, &e.to_string()),
            Err(e) => error!("Result commit task failed: {e}"),
        }
        self.send_next_commit();
    }
}

/// Cloneable front-end to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| SyncError::SessionClosed)?;
        rx.await.map_err(|_| SyncError::SessionClosed)
    }

    /// Returns the phase after the attempt; a failed or timed out source
    /// comes back as `Disconnected`.
    pub async fn connect(&self, source: SourceDescriptor) -> Result<ConnectionPhase, SyncError> {
        self.request(|reply| SessionCommand::Connect { source, reply })
            .await?
    }

    pub async fn disconnect(&self) -> Result<(), SyncError> {
        self.request(|reply| SessionCommand::Disconnect { reply }).await
    }

    pub async fn navigate(&self, to: Navigation) -> Result<usize, SyncError> {
        self.request(|reply| SessionCommand::Navigate { to, reply })
            .await?
    }

    pub async fn go_to(&self, index: usize) -> Result<usize, SyncError> {
        self.navigate(Navigation::To(index)).await
    }

    pub async fn step_back(&self) -> Result<usize, SyncError> {
        self.navigate(Navigation::Back).await
    }

    pub async fn step_forward(&self) -> Result<usize, SyncError> {
        self.navigate(Navigation::Forward).await
    }

    pub async fn go_to_start(&self) -> Result<usize, SyncError> {
        self.navigate(Navigation::Start).await
    }

    pub async fn go_to_latest(&self) -> Result<usize, SyncError> {
        self.navigate(Navigation::Latest).await
    }

    /// Manual result override.
    pub async fn set_result(&self, result: GameResult) -> Result<(), SyncError> {
        self.request(|reply| SessionCommand::SetResult { result, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<SyncSnapshot, SyncError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    pub async fn connection_phase(&self) -> Result<ConnectionPhase, SyncError> {
        self.request(|reply| SessionCommand::Connection { reply }).await
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(SessionCommand::Shutdown).await;
    }
}
