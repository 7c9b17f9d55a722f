//! Abstract storage traits for DareDuel.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The rest of the codebase depends only on the traits.
//!
//! Reads return records together with the version they were read at.
//! Writes only ever happen through [`TransactionalStore::commit`], which
//! applies a whole [`WriteSet`] atomically or not at all.

pub mod account;
pub mod battle;
pub mod error;
pub mod pin;
pub mod submission;
pub mod transaction;

pub use account::{AccountStore, UserAccount};
pub use battle::{Battle, BattleStore, Settlement, Stake};
pub use error::StoreError;
pub use pin::{PinStore, ProfilePin};
pub use submission::{Submission, SubmissionStore};
pub use transaction::{TransactionalStore, Versioned, WriteOp, WriteSet};

/// Everything the ledger and lifecycle layers need from a backend.
pub trait DuelStore:
    AccountStore + BattleStore + SubmissionStore + PinStore + TransactionalStore + Send + Sync
{
}

impl<T> DuelStore for T where
    T: AccountStore + BattleStore + SubmissionStore + PinStore + TransactionalStore + Send + Sync
{
}
