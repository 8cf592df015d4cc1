#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chesslink_core::rules::RulesPosition;
use chesslink_core::{EndStatus, Game, GameResult, Legality, Position};
use chesslink_sync::{BoardPort, ConnectionPhase, GameService, ServiceError, SyncObserver};

pub const GAME_ID: &str = "g1";

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Positions reached by playing `sans` from the standard start.
pub fn line(sans: &[&str]) -> Vec<Position> {
    let mut positions = vec![Position::standard_start()];
    let mut pos = RulesPosition::default();
    for (i, san) in sans.iter().enumerate() {
        let mover = pos.turn();
        pos = pos
            .apply_san(san)
            .unwrap_or_else(|e| panic!("bad fixture move {san}: {e}"));
        positions.push(Position::ply(
            i + 1,
            pos.encode(),
            Some(san.to_string()),
            mover,
            Legality::Legal,
        ));
    }
    positions
}

pub fn game(sans: &[&str]) -> Game {
    let mut game = Game::new(GAME_ID);
    game.metadata.white = "Alice".to_string();
    game.metadata.black = "Bob".to_string();
    game.positions = line(sans);
    game
}

// ---------------------------------------------------------------------------
// Game service double
// ---------------------------------------------------------------------------

struct MockState {
    game: Game,
    live: Vec<Position>,
    active: bool,
    hang: bool,
    fail_commits: bool,
    delays: VecDeque<Duration>,
    commit_delays: VecDeque<Duration>,
    commits: Vec<GameResult>,
    /// Live fetches need a board attached for this game, like the board server.
    require_board: bool,
    board: Option<String>,
    attaches: Vec<(String, u32)>,
    detaches: usize,
}

/// In-memory game server. Live fetches read the live sequence when they
/// complete, after any queued delay.
pub struct MockGameService {
    state: Mutex<MockState>,
    fetches: AtomicUsize,
}

impl MockGameService {
    pub fn new(game: Game) -> Self {
        let live = game.positions.clone();
        Self {
            state: Mutex::new(MockState {
                game,
                live,
                active: true,
                hang: false,
                fail_commits: false,
                delays: VecDeque::new(),
                commit_delays: VecDeque::new(),
                commits: Vec::new(),
                require_board: false,
                board: None,
                attaches: Vec::new(),
                detaches: 0,
            }),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn set_live(&self, sans: &[&str]) {
        self.state.lock().unwrap().live = line(sans);
    }

    pub fn set_active(&self, active: bool) {
        self.state.lock().unwrap().active = active;
    }

    /// Live fetches never answer.
    pub fn set_hang(&self, hang: bool) {
        self.state.lock().unwrap().hang = hang;
    }

    pub fn fail_commits(&self) {
        self.state.lock().unwrap().fail_commits = true;
    }

    /// Delay for each upcoming live fetch, in call order.
    pub fn queue_delays(&self, delays: &[Duration]) {
        self.state.lock().unwrap().delays.extend(delays.iter().copied());
    }

    /// Delay for each upcoming result commit, in call order.
    pub fn queue_commit_delays(&self, delays: &[Duration]) {
        self.state.lock().unwrap().commit_delays.extend(delays.iter().copied());
    }

    pub fn require_board(&self) {
        self.state.lock().unwrap().require_board = true;
    }

    /// A board attached by someone else.
    pub fn set_board(&self, port: Option<&str>) {
        self.state.lock().unwrap().board = port.map(str::to_string);
    }

    pub fn board(&self) -> Option<String> {
        self.state.lock().unwrap().board.clone()
    }

    pub fn attaches(&self) -> Vec<(String, u32)> {
        self.state.lock().unwrap().attaches.clone()
    }

    pub fn detach_count(&self) -> usize {
        self.state.lock().unwrap().detaches
    }

    /// Results in the order they landed.
    pub fn commits(&self) -> Vec<GameResult> {
        self.state.lock().unwrap().commits.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl GameService for MockGameService {
    async fn fetch_game(&self, game_id: &str) -> Result<Game, ServiceError> {
        let state = self.state.lock().unwrap();
        if state.game.id != game_id {
            return Err(ServiceError::NotFound(game_id.to_string()));
        }
        Ok(state.game.clone())
    }

    async fn fetch_live_positions(&self, game_id: &str) -> Result<Vec<Position>, ServiceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let (delay, hang) = {
            let mut state = self.state.lock().unwrap();
            (state.delays.pop_front().unwrap_or_default(), state.hang)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock().unwrap();
        if !state.active || (state.require_board && state.board.is_none()) {
            return Err(ServiceError::NotActive(game_id.to_string()));
        }
        Ok(state.live.clone())
    }

    async fn commit_result(&self, _game_id: &str, result: GameResult) -> Result<(), ServiceError> {
        let delay = self.state.lock().unwrap().commit_delays.pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.commits.push(result);
        if state.fail_commits {
            return Err(ServiceError::Http("HTTP 500".to_string()));
        }
        state.game.result = result;
        Ok(())
    }

    async fn list_ports(&self) -> Result<Vec<BoardPort>, ServiceError> {
        Ok(vec![BoardPort {
            device: "/dev/ttyUSB0".to_string(),
            description: Some("ChessLink board".to_string()),
            manufacturer: None,
        }])
    }

    async fn attach_board(&self, _game_id: &str, port: &str, baud_rate: u32) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        if let Some(current) = &state.board {
            return Err(ServiceError::Rejected(format!(
                "Already connected to {current}. Disconnect first."
            )));
        }
        if state.game.result.is_terminal() {
            return Err(ServiceError::Rejected("Cannot connect to a completed game".to_string()));
        }
        state.attaches.push((port.to_string(), baud_rate));
        state.board = Some(port.to_string());
        Ok(())
    }

    async fn detach_board(&self) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.detaches += 1;
        if state.board.take().is_none() {
            return Err(ServiceError::Rejected("Not connected to any serial port".to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Recorder {
    cursor: Mutex<Vec<usize>>,
    phases: Mutex<Vec<ConnectionPhase>>,
    committed: Mutex<Vec<GameResult>>,
    commit_failures: Mutex<Vec<GameResult>>,
    connection_failures: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn cursor(&self) -> Vec<usize> {
        self.cursor.lock().unwrap().clone()
    }

    pub fn phases(&self) -> Vec<ConnectionPhase> {
        self.phases.lock().unwrap().clone()
    }

    pub fn committed(&self) -> Vec<GameResult> {
        self.committed.lock().unwrap().clone()
    }

    pub fn commit_failures(&self) -> Vec<GameResult> {
        self.commit_failures.lock().unwrap().clone()
    }

    pub fn connection_failures(&self) -> Vec<String> {
        self.connection_failures.lock().unwrap().clone()
    }
}

impl SyncObserver for Recorder {
    fn on_cursor_changed(&self, index: usize, _position: &Position, _status: &EndStatus) {
        self.cursor.lock().unwrap().push(index);
    }

    fn on_connection_changed(&self, phase: ConnectionPhase) {
        self.phases.lock().unwrap().push(phase);
    }

    fn on_result_committed(&self, result: GameResult) {
        self.committed.lock().unwrap().push(result);
    }

    fn on_commit_failed(&self, result: GameResult, _reason: &str) {
        self.commit_failures.lock().unwrap().push(result);
    }

    fn on_connection_failed(&self, reason: &str) {
        self.connection_failures.lock().unwrap().push(reason.to_string());
    }
}
