use dareduel_types::{BattleId, Coins, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient funds: {user} needs {needed}, has {available}")]
    InsufficientFunds {
        user: UserId,
        needed: Coins,
        available: Coins,
    },

    #[error("account not found: {0}")]
    AccountNotFound(UserId),

    #[error("account already exists: {0}")]
    AccountExists(UserId),

    #[error("battle not found: {0}")]
    BattleNotFound(BattleId),

    #[error("{user} is not a player in battle {battle}")]
    NotParticipant { user: UserId, battle: BattleId },

    #[error("{user} already staked on battle {battle}")]
    AlreadyStaked { user: UserId, battle: BattleId },

    #[error("battle {0} is already resolved")]
    AlreadyResolved(BattleId),

    #[error("battle {0} has already been paid out")]
    AlreadyPaid(BattleId),

    #[error("{user} is not the winner of battle {battle}")]
    NotWinner { user: UserId, battle: BattleId },

    #[error("payout of {requested} does not match the pot of {pot}")]
    AmountMismatch { pot: Coins, requested: Coins },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("balance overflow for {0}")]
    Overflow(UserId),

    #[error("{op} aborted after {attempts} conflicting attempts")]
    TransactionConflict { op: &'static str, attempts: u32 },

    #[error("storage error: {0}")]
    Storage(#[from] dareduel_store::StoreError),
}

impl LedgerError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::AccountNotFound(_) | Self::BattleNotFound(_) => "not_found",
            Self::AccountExists(_) => "account_exists",
            Self::NotParticipant { .. } => "not_participant",
            Self::AlreadyStaked { .. } => "already_staked",
            Self::AlreadyResolved(_) => "already_resolved",
            Self::AlreadyPaid(_) => "already_paid",
            Self::NotWinner { .. } => "not_winner",
            Self::AmountMismatch { .. } => "amount_mismatch",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::Overflow(_) => "overflow",
            Self::TransactionConflict { .. } => "transaction_conflict",
            Self::Storage(_) => "storage",
        }
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransactionConflict { .. })
    }
}
