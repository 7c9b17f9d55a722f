//! The multi-record atomic write primitive.
//!
//! Callers read records (each read carries a version), compute new values,
//! and hand the backend a [`WriteSet`]. The backend checks every expected
//! version first and only then applies every write. A single mismatch aborts
//! the whole set with [`StoreError::Conflict`].

use crate::{Battle, ProfilePin, StoreError, Submission, UserAccount};
use dareduel_types::{BattleId, UserId};
use serde::{Deserialize, Serialize};

/// A record together with the version it was stored at.
///
/// Versions start at 1 on creation and increase by one on every committed
/// write of that record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

impl<T> Versioned<T> {
    pub fn new(version: u64, value: T) -> Self {
        Self { version, value }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// One conditional write.
#[derive(Clone, Debug)]
pub enum WriteOp {
    /// `expected_version = None` means the account must not exist yet.
    PutAccount {
        expected_version: Option<u64>,
        account: UserAccount,
    },
    /// `expected_version = None` means the battle must not exist yet.
    PutBattle {
        expected_version: Option<u64>,
        battle: Battle,
    },
    /// Submissions are append-only; the id must be new.
    AppendSubmission(Submission),
    /// Replaces any earlier pin of the same battle by the same user.
    PutPin(ProfilePin),
    /// Removes the user's pin of the battle; a missing pin is not an error.
    DeletePin { user_id: UserId, battle_id: BattleId },
}

impl WriteOp {
    /// Human-readable key, used in conflict errors and logs.
    pub fn describe(&self) -> String {
        match self {
            Self::PutAccount { account, .. } => format!("account {}", account.user_id),
            Self::PutBattle { battle, .. } => format!("battle {}", battle.id),
            Self::AppendSubmission(s) => format!("submission {}", s.id),
            Self::PutPin(p) => format!("pin {}/{}", p.user_id, p.battle_id),
            Self::DeletePin { user_id, battle_id } => format!("pin {user_id}/{battle_id}"),
        }
    }
}

/// An ordered batch of conditional writes applied all-or-nothing.
#[derive(Clone, Debug, Default)]
pub struct WriteSet {
    ops: Vec<WriteOp>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Backend hook for the atomic commit.
pub trait TransactionalStore {
    /// Apply `writes` atomically.
    ///
    /// Returns [`StoreError::Conflict`] without applying anything if any
    /// expected version does not match the stored one.
    fn commit(&self, writes: WriteSet) -> Result<(), StoreError>;
}
