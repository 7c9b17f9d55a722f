//! Fundamental types for DareDuel.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! identifiers, coin amounts, timestamps and calendar days, dares, and the
//! battle/player state enums.

pub mod amount;
pub mod context;
pub mod dare;
pub mod error;
pub mod ids;
pub mod state;
pub mod time;

pub use amount::Coins;
pub use context::UserContext;
pub use dare::Dare;
pub use error::DuelError;
pub use ids::{BattleId, SessionId, SubmissionId, UserId};
pub use state::{BattleOrigin, BattleStatus, Outcome, PlayerDisposition, PlayerSlot};
pub use time::{CalendarDay, Clock, SystemClock, Timestamp};
