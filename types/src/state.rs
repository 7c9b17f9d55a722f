//! State enums for battles and per-player dispositions.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// The lifecycle status of a battle.
///
/// Transitions are monotone: `Pending → Active → Completed`, or
/// `Pending → Declined` on the direct-invite path. Nothing re-enters
/// `Pending` or `Active` once it has left.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleStatus {
    /// Invite written, waiting for the opponent to accept.
    Pending,
    /// Both stakes escrowed; daily proof is being collected.
    Active,
    /// Resolved by forfeit, explicit win or draw.
    Completed,
    /// The invited player declined. Terminal.
    Declined,
}

impl BattleStatus {
    /// Whether the battle has reached a state it can never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Declined)
    }

    /// Whether moving from `self` to `next` respects the lifecycle order.
    pub fn can_transition_to(&self, next: BattleStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active)
                | (Self::Pending, Self::Declined)
                | (Self::Active, Self::Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Declined => "declined",
        }
    }
}

/// A player's own view of a finished battle, independent of the opponent's.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerDisposition {
    #[default]
    None,
    Archived,
    Deleted,
    Pinned,
}

impl PlayerDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Archived => "archived",
            Self::Deleted => "deleted",
            Self::Pinned => "pinned",
        }
    }
}

/// How a battle came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleOrigin {
    /// Direct friend invite.
    Invite,
    /// Anonymous pairing queue.
    Match,
}

/// Which seat a player occupies in a battle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerSlot {
    One,
    Two,
}

impl PlayerSlot {
    pub fn other(&self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
        }
    }
}

/// The final result of a completed battle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// One player won; the pot belongs to them.
    Won { winner: UserId },
    /// Neither side can claim the pot; stakes go back to their payers.
    Draw,
}
