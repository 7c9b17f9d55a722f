use dareduel_types::UserId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("matchmaker is not running")]
    Stopped,
}

/// Why a mutually accepted match did not become a battle.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GameCreationError {
    #[error("{user} cannot cover the stake")]
    InsufficientFunds { user: UserId },

    #[error("game creation failed: {0}")]
    Failed(String),
}

impl GameCreationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::Failed(_) => "game_creation_failed",
        }
    }
}
