//! Account storage trait.

use crate::{StoreError, Versioned};
use dareduel_types::{Coins, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Per-user coin account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: UserId,
    pub display_name: String,
    /// Spendable coins. Stakes leave this balance on escrow.
    pub balance: Coins,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Trait for account storage reads.
pub trait AccountStore {
    fn get_account(&self, user: &UserId) -> Result<Versioned<UserAccount>, StoreError>;
    fn account_exists(&self, user: &UserId) -> Result<bool, StoreError>;
    fn account_count(&self) -> Result<u64, StoreError>;
}
