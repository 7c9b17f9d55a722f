//! Battle lifecycle for DareDuel.
//!
//! `pending → active → completed`, or `pending → declined` for invites.
//! Each player then sets their own disposition (archived, deleted, pinned)
//! independently of the opponent. All coin movement goes through the ledger.

pub mod error;
pub mod lifecycle;
pub mod policy;
pub mod sweep;

pub use error::BattleError;
pub use lifecycle::{BattleLifecycle, BothMissed, LifecycleStats, MatchSide, Payout};
pub use policy::BothMissedPolicy;
pub use sweep::{ForfeitSweep, SweepReport};
