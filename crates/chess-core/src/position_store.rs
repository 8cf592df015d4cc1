//! Append-only, index-checked position history for one game.

use crate::error::CoreError;
use crate::game_data::Position;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionStore {
    positions: Vec<Position>,
}

impl PositionStore {
    /// Create a store holding only the initial position, which carries no
    /// move notation and no mover.
    pub fn new(initial: Position) -> Result<Self, CoreError> {
        if initial.index != 0 {
            return Err(CoreError::Sequence {
                expected: 0,
                got: initial.index,
            });
        }
        if initial.algebraic.is_some() || initial.mover.is_some() {
            return Err(CoreError::InitialPosition(
                "the initial position cannot carry a move".to_string(),
            ));
        }
        Ok(Self {
            positions: vec![initial],
        })
    }

    /// Build a store from a full sequence, checking every index along the way.
    pub fn from_positions(positions: Vec<Position>) -> Result<Self, CoreError> {
        let mut iter = positions.into_iter();
        let initial = iter.next().ok_or(CoreError::Sequence {
            expected: 0,
            got: usize::MAX,
        })?;
        let mut store = Self::new(initial)?;
        for position in iter {
            store.append(position)?;
        }
        Ok(store)
    }

    /// Append the next ply. The index must equal the current length.
    pub fn append(&mut self, position: Position) -> Result<(), CoreError> {
        let expected = self.positions.len();
        if position.index != expected {
            return Err(CoreError::Sequence {
                expected,
                got: position.index,
            });
        }
        self.positions.push(position);
        Ok(())
    }

    pub fn at(&self, index: usize) -> Result<&Position, CoreError> {
        self.positions.get(index).ok_or(CoreError::Range {
            index,
            len: self.positions.len(),
        })
    }

    pub fn latest_index(&self) -> usize {
        self.positions.len() - 1
    }

    pub fn latest(&self) -> &Position {
        &self.positions[self.latest_index()]
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Never true: a store always holds the initial position.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }
}
