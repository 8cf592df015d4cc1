//! Live game timeline synchronization.
//!
//! A [`session::LiveSession`] owns one game's timeline and the connection to
//! its live move source. Incoming positions are merged without moving a user
//! who is reviewing history, and a detected game end is committed once.

pub mod config;
pub mod connection;
pub mod error;
pub mod observer;
pub mod service;
pub mod session;
pub mod synchronizer;
pub mod transport;

pub use config::SyncConfig;
pub use connection::{ConnectOutcome, ConnectionController, ConnectionPhase, SourceDescriptor};
pub use error::{ServiceError, SyncError, TransportError};
pub use observer::{NoopObserver, SharedObserver, SyncObserver};
pub use service::{BoardPort, GameService};
pub use session::{LiveSession, Navigation, SessionHandle};
pub use synchronizer::{CommitRequest, MergeOutcome, MergeReport, SyncPhase, SyncSnapshot, TimelineSynchronizer};
pub use transport::{ChannelTransport, Transport, TransportEvent};
