pub mod fen_line;
pub mod pgn_replay;

pub use fen_line::{FenLineTransport, FenSource};
pub use pgn_replay::PgnReplayTransport;
