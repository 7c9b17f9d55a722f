//! Profile pins: a player's snapshot of their own submissions from a battle.

use crate::{StoreError, Submission};
use dareduel_types::{BattleId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePin {
    pub user_id: UserId,
    pub battle_id: BattleId,
    pub submissions: Vec<Submission>,
    pub pinned_at: Timestamp,
}

pub trait PinStore {
    /// Pins on the user's profile, most recently pinned first.
    fn pins_for(&self, user: &UserId) -> Result<Vec<ProfilePin>, StoreError>;
}
