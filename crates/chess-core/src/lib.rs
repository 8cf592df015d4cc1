pub use shakmaty;

pub mod classifier;
pub mod error;
pub mod game_data;
pub mod move_inference;
pub mod pgn;
pub mod position_store;
pub mod rules;

pub use classifier::{classify, classify_fen, EndReason, EndStatus};
pub use error::CoreError;
pub use game_data::{Game, GameMetadata, GameResult, Legality, Position, Side, STANDARD_START_FEN};
pub use position_store::PositionStore;
