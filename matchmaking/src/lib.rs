//! Real-time pairing of dare requests.
//!
//! [`MatchQueue`] pairs compatible requests first-come-first-served,
//! [`MatchSession`] runs the accept/decline handshake for one pair, and the
//! [`Matchmaker`] actor ties both to connected clients and hands accepted
//! pairs to a [`GameCreator`].

pub mod error;
pub mod events;
pub mod matchmaker;
pub mod queue;
pub mod session;

pub use error::{GameCreationError, MatchError};
pub use events::{ClientCommand, ServerEvent};
pub use matchmaker::{
    ClientLink, ConnectionId, GameCreator, MatchCommand, MatchConfig, MatchStats, Matchmaker,
    MatchmakerHandle, DEFAULT_DEADLINE_SECS,
};
pub use queue::{MatchQueue, QueueEntry};
pub use session::{MatchSession, SessionState, Side, Transition};
