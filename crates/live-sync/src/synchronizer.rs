//! Timeline state machine: merges live position updates into one game's
//! history without moving a user who is reviewing earlier plies.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use chesslink_core::move_inference::{infer_next, Inference};
use chesslink_core::{
    classify, CoreError, EndStatus, Game, GameMetadata, GameResult, Position, PositionStore,
};

use crate::error::SyncError;
use crate::observer::SharedObserver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    AwaitingFirstLoad,
    Live,
}

/// Which ply is on screen. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ViewCursor {
    pub selected_index: usize,
    /// Whether the cursor sat on the latest ply when the last update arrived.
    pub was_at_latest_before_update: bool,
}

/// A result that needs to be persisted by the game service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitRequest {
    pub result: GameResult,
    /// Raised by game-end detection rather than by the user.
    pub automatic: bool,
    /// Latest index when the request was raised.
    pub at_index: usize,
    /// Number of manual overrides made before the request was raised.
    pub overrides: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Same length as stored. Nothing happened.
    Unchanged,
    /// Shorter than stored; dropped as stale.
    Ignored,
    Grew { added: usize, cursor_moved: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    pub outcome: MergeOutcome,
    pub commit: Option<CommitRequest>,
}

impl MergeReport {
    fn quiet(outcome: MergeOutcome) -> Self {
        Self {
            outcome,
            commit: None,
        }
    }
}

/// Read-only copy of the synchronizer state handed to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSnapshot {
    pub phase: SyncPhase,
    pub game_id: Option<String>,
    pub cursor: ViewCursor,
    pub latest_index: Option<usize>,
    pub result: GameResult,
    pub status: EndStatus,
    pub metadata: GameMetadata,
    pub positions: Vec<Position>,
}

impl SyncSnapshot {
    pub fn selected(&self) -> Option<&Position> {
        self.positions.get(self.cursor.selected_index)
    }
}

pub struct TimelineSynchronizer {
    phase: SyncPhase,
    game_id: Option<String>,
    metadata: GameMetadata,
    store: Option<PositionStore>,
    cursor: ViewCursor,
    /// End status of the selected position.
    status: EndStatus,
    result: GameResult,
    /// Latest index for which a commit was already raised or a result set by hand.
    committed_at: Option<usize>,
    /// Manual results set so far.
    overrides: u64,
    observer: SharedObserver,
}

impl TimelineSynchronizer {
    pub fn new(observer: SharedObserver) -> Self {
        Self {
            phase: SyncPhase::Idle,
            game_id: None,
            metadata: GameMetadata::default(),
            store: None,
            cursor: ViewCursor::default(),
            status: EndStatus::ongoing(),
            result: GameResult::InProgress,
            committed_at: None,
            overrides: 0,
            observer,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn game_id(&self) -> Option<&str> {
        self.game_id.as_deref()
    }

    pub fn cursor(&self) -> ViewCursor {
        self.cursor
    }

    pub fn status(&self) -> EndStatus {
        self.status
    }

    pub fn result(&self) -> GameResult {
        self.result
    }

    pub fn latest_index(&self) -> Option<usize> {
        self.store.as_ref().map(PositionStore::latest_index)
    }

    /// Start a session for `game_id`.
    pub fn begin(&mut self, game_id: &str) -> Result<(), SyncError> {
        self.expect_phase(SyncPhase::Idle)?;
        self.game_id = Some(game_id.to_string());
        self.phase = SyncPhase::AwaitingFirstLoad;
        debug!("Awaiting first load of game {game_id}");
        Ok(())
    }

    /// Install the fetched game. The cursor starts on the latest ply.
    pub fn load(&mut self, game: Game) -> Result<Option<CommitRequest>, SyncError> {
        self.expect_phase(SyncPhase::AwaitingFirstLoad)?;

        let store = PositionStore::from_positions(game.positions)?;
        let latest = store.latest_index();
        self.store = Some(store);
        self.metadata = game.metadata;
        self.result = game.result;
        self.cursor = ViewCursor {
            selected_index: latest,
            was_at_latest_before_update: true,
        };
        self.phase = SyncPhase::Live;
        info!(
            "Loaded game {} with {} plies, result {}",
            game.id, latest, self.result
        );

        self.refresh_selected();
        Ok(self.check_termination())
    }

    /// Merge a full position sequence delivered by the live source.
    /// Plies already stored are assumed unchanged; only the tail is appended.
    pub fn merge(&mut self, mut positions: Vec<Position>) -> Result<MergeReport, SyncError> {
        let old_len = self.live_store()?.len();
        let new_len = positions.len();

        if new_len == old_len {
            return Ok(MergeReport::quiet(MergeOutcome::Unchanged));
        }
        if new_len < old_len {
            warn!("Ignoring stale sequence of {new_len} positions, {old_len} already stored");
            return Ok(MergeReport::quiet(MergeOutcome::Ignored));
        }

        let tail = positions.split_off(old_len);
        self.extend(tail)
    }

    /// Ingest a raw board frame from a sensor source.
    pub fn ingest_fen(
        &mut self,
        fen: &str,
        timestamp: Option<NaiveDateTime>,
    ) -> Result<MergeReport, SyncError> {
        let latest = self.live_store()?.latest();
        match infer_next(latest, fen, timestamp)? {
            Inference::Unchanged => Ok(MergeReport::quiet(MergeOutcome::Unchanged)),
            Inference::Ply(position) => {
                debug!(
                    "Inferred ply {} {:?} ({:?})",
                    position.index, position.algebraic, position.legality
                );
                self.extend(vec![position])
            }
        }
    }

    fn extend(&mut self, tail: Vec<Position>) -> Result<MergeReport, SyncError> {
        let selected = self.cursor.selected_index;
        let store = self.live_store_mut()?;
        let old_len = store.len();

        // Check every index first so a bad tail leaves the store untouched
        for (offset, position) in tail.iter().enumerate() {
            let expected = old_len + offset;
            if position.index != expected {
                error!("Rejecting merge: expected ply {expected}, got {}", position.index);
                return Err(CoreError::Sequence {
                    expected,
                    got: position.index,
                }
                .into());
            }
        }

        let added = tail.len();
        for position in tail {
            store.append(position)?;
        }
        let new_latest = store.latest_index();

        let was_at_latest = selected == old_len - 1;
        self.cursor.was_at_latest_before_update = was_at_latest;
        if was_at_latest {
            self.cursor.selected_index = new_latest;
            self.refresh_selected();
        }
        debug!(
            "Merged {added} plies, latest {new_latest}, cursor {}",
            self.cursor.selected_index
        );

        Ok(MergeReport {
            outcome: MergeOutcome::Grew {
                added,
                cursor_moved: was_at_latest,
            },
            commit: self.check_termination(),
        })
    }

    /// Move the cursor. View-only: never raises a commit.
    pub fn go_to(&mut self, index: usize) -> Result<usize, SyncError> {
        self.live_store()?.at(index)?;
        self.cursor.selected_index = index;
        self.refresh_selected();
        Ok(index)
    }

    pub fn step_back(&mut self) -> Result<usize, SyncError> {
        let target = self.cursor.selected_index.saturating_sub(1);
        self.go_to(target)
    }

    pub fn step_forward(&mut self) -> Result<usize, SyncError> {
        let latest = self.live_store()?.latest_index();
        let target = (self.cursor.selected_index + 1).min(latest);
        self.go_to(target)
    }

    pub fn go_to_start(&mut self) -> Result<usize, SyncError> {
        self.go_to(0)
    }

    pub fn go_to_latest(&mut self) -> Result<usize, SyncError> {
        let latest = self.live_store()?.latest_index();
        self.go_to(latest)
    }

    /// Manual result override. Always applied locally; the latest ply counts
    /// as resolved so detection does not fire again until a new ply arrives.
    pub fn set_result(&mut self, result: GameResult) -> Result<CommitRequest, SyncError> {
        let latest = self.live_store()?.latest_index();
        info!("Result set manually to {result} at ply {latest}");
        self.result = result;
        self.committed_at = Some(latest);
        self.overrides += 1;
        Ok(CommitRequest {
            result,
            automatic: false,
            at_index: latest,
            overrides: self.overrides,
        })
    }

    /// An automatic commit raised before a manual override is superseded:
    /// it changes nothing locally and is not reported.
    pub fn commit_succeeded(&mut self, request: &CommitRequest) {
        if request.automatic {
            if request.overrides != self.overrides {
                debug!(
                    "Automatic commit of {} superseded by manual result {}",
                    request.result, self.result
                );
                return;
            }
            self.result = request.result;
        }
        info!("Result {} committed", request.result);
        self.observer.on_result_committed(request.result);
    }

    /// The commit did not reach the service. Nothing is retried.
    pub fn commit_failed(&mut self, request: &CommitRequest, reason: &str) {
        error!("Failed to commit result {}: {reason}", request.result);
        self.observer.on_commit_failed(request.result, reason);
    }

    /// Result-commit rule: the game is in progress, the latest ply is
    /// terminal and no commit was raised for that ply yet.
    pub fn check_termination(&mut self) -> Option<CommitRequest> {
        if self.result != GameResult::InProgress {
            return None;
        }
        let store = self.store.as_ref()?;
        let latest = store.latest_index();
        if self.committed_at == Some(latest) {
            return None;
        }

        let status = classify_or_ongoing(store, latest);
        let result = match (status.is_over, status.result) {
            (true, Some(result)) => result,
            _ => return None,
        };

        self.committed_at = Some(latest);
        info!(
            "Game over at ply {latest}: {} ({result})",
            status.reason.label()
        );
        Some(CommitRequest {
            result,
            automatic: true,
            at_index: latest,
            overrides: self.overrides,
        })
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            phase: self.phase,
            game_id: self.game_id.clone(),
            cursor: self.cursor,
            latest_index: self.latest_index(),
            result: self.result,
            status: self.status,
            metadata: self.metadata.clone(),
            positions: self
                .store
                .as_ref()
                .map(|s| s.positions().to_vec())
                .unwrap_or_default(),
        }
    }

    /// The game as currently known, once loaded.
    pub fn game(&self) -> Option<Game> {
        let store = self.store.as_ref()?;
        Some(Game {
            id: self.game_id.clone().unwrap_or_default(),
            metadata: self.metadata.clone(),
            positions: store.positions().to_vec(),
            result: self.result,
        })
    }

    fn refresh_selected(&mut self) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let index = self.cursor.selected_index;
        self.status = classify_or_ongoing(store, index);
        if let Ok(position) = store.at(index) {
            self.observer.on_cursor_changed(index, position, &self.status);
        }
    }

    fn expect_phase(&self, expected: SyncPhase) -> Result<(), SyncError> {
        if self.phase != expected {
            return Err(SyncError::Phase {
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }

    fn live_store(&self) -> Result<&PositionStore, SyncError> {
        self.expect_phase(SyncPhase::Live)?;
        self.store.as_ref().ok_or(SyncError::Phase {
            expected: SyncPhase::Live,
            actual: self.phase,
        })
    }

    fn live_store_mut(&mut self) -> Result<&mut PositionStore, SyncError> {
        self.expect_phase(SyncPhase::Live)?;
        let phase = self.phase;
        self.store.as_mut().ok_or(SyncError::Phase {
            expected: SyncPhase::Live,
            actual: phase,
        })
    }
}

/// A board the rules engine can't read is shown as an ongoing game.
fn classify_or_ongoing(store: &PositionStore, index: usize) -> EndStatus {
    match classify(store.positions(), index) {
        Ok(status) => status,
        Err(e) => {
            warn!("Cannot classify ply {index}: {e}");
            EndStatus::ongoing()
        }
    }
}
