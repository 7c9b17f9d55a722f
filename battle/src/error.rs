use dareduel_ledger::LedgerError;
use dareduel_types::{BattleId, BattleStatus, Coins, DuelError, PlayerDisposition, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BattleError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Invalid(#[from] DuelError),

    #[error("cannot challenge yourself ({0})")]
    SelfChallenge(UserId),

    #[error("{user} is not a player in battle {battle}")]
    NotParticipant { user: UserId, battle: BattleId },

    #[error("{user} was not invited to battle {battle}")]
    NotInvitee { user: UserId, battle: BattleId },

    #[error("stake of {offered} does not match the required {required}")]
    StakeMismatch { required: Coins, offered: Coins },

    #[error("battle {battle} is {status}, expected {expected}")]
    WrongStatus {
        battle: BattleId,
        status: &'static str,
        expected: &'static str,
    },

    #[error("battle {0} is already resolved")]
    AlreadyResolved(BattleId),

    #[error("{0:?} is not a terminal disposition")]
    InvalidDisposition(PlayerDisposition),
}

impl BattleError {
    pub(crate) fn wrong_status(battle: BattleId, status: BattleStatus, expected: BattleStatus) -> Self {
        Self::WrongStatus {
            battle,
            status: status.as_str(),
            expected: expected.as_str(),
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Ledger(e) => e.code(),
            Self::Invalid(_) => "invalid_request",
            Self::SelfChallenge(_) => "self_challenge",
            Self::NotParticipant { .. } => "not_participant",
            Self::NotInvitee { .. } => "not_invitee",
            Self::StakeMismatch { .. } => "stake_mismatch",
            Self::WrongStatus { .. } => "wrong_status",
            Self::AlreadyResolved(_) => "already_resolved",
            Self::InvalidDisposition(_) => "invalid_disposition",
        }
    }

    /// The underlying ledger error, if any.
    pub fn as_ledger(&self) -> Option<&LedgerError> {
        match self {
            Self::Ledger(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_already_paid(&self) -> bool {
        matches!(self, Self::Ledger(LedgerError::AlreadyPaid(_)))
    }
}
