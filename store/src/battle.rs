//! Battle record and storage trait.

use crate::{StoreError, Versioned};
use dareduel_types::{
    BattleId, BattleOrigin, BattleStatus, Coins, Dare, Outcome, PlayerDisposition, PlayerSlot,
    Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

/// Escrow marker: one per payer, written in the same transaction that moved
/// the coins out of the payer's balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stake {
    pub user_id: UserId,
    pub coins: Coins,
    pub escrowed_at: Timestamp,
}

/// Payout marker. Once set, the pot has left the battle and never moves again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Settlement {
    Paid {
        winner: UserId,
        coins: Coins,
        paid_at: Timestamp,
    },
    Refunded {
        coins: Coins,
        refunded_at: Timestamp,
    },
}

/// The durable record of one matchup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Battle {
    pub id: BattleId,
    pub origin: BattleOrigin,
    pub player1: UserId,
    pub player2: UserId,
    pub player1_dare: Dare,
    /// Unknown until the invited player accepts.
    pub player2_dare: Option<Dare>,
    pub status: BattleStatus,
    pub player1_status: PlayerDisposition,
    pub player2_status: PlayerDisposition,
    /// Stake each player must put up.
    pub stake_coins: Coins,
    pub stakes: Vec<Stake>,
    /// Sum of escrowed stakes. Only the settlement transaction drains it.
    pub wager_pot: Coins,
    pub outcome: Option<Outcome>,
    pub settlement: Option<Settlement>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub updated_at: Timestamp,
    pub ended_at: Option<Timestamp>,
}

impl Battle {
    pub fn slot_of(&self, user: &UserId) -> Option<PlayerSlot> {
        if &self.player1 == user {
            Some(PlayerSlot::One)
        } else if &self.player2 == user {
            Some(PlayerSlot::Two)
        } else {
            None
        }
    }

    pub fn is_participant(&self, user: &UserId) -> bool {
        self.slot_of(user).is_some()
    }

    pub fn player(&self, slot: PlayerSlot) -> &UserId {
        match slot {
            PlayerSlot::One => &self.player1,
            PlayerSlot::Two => &self.player2,
        }
    }

    pub fn opponent_of(&self, user: &UserId) -> Option<&UserId> {
        self.slot_of(user).map(|slot| self.player(slot.other()))
    }

    pub fn winner(&self) -> Option<&UserId> {
        match &self.outcome {
            Some(Outcome::Won { winner }) => Some(winner),
            _ => None,
        }
    }

    pub fn dare(&self, slot: PlayerSlot) -> Option<&Dare> {
        match slot {
            PlayerSlot::One => Some(&self.player1_dare),
            PlayerSlot::Two => self.player2_dare.as_ref(),
        }
    }

    pub fn dare_mut(&mut self, slot: PlayerSlot) -> Option<&mut Dare> {
        match slot {
            PlayerSlot::One => Some(&mut self.player1_dare),
            PlayerSlot::Two => self.player2_dare.as_mut(),
        }
    }

    pub fn disposition(&self, slot: PlayerSlot) -> PlayerDisposition {
        match slot {
            PlayerSlot::One => self.player1_status,
            PlayerSlot::Two => self.player2_status,
        }
    }

    pub fn set_disposition(&mut self, slot: PlayerSlot, disposition: PlayerDisposition) {
        match slot {
            PlayerSlot::One => self.player1_status = disposition,
            PlayerSlot::Two => self.player2_status = disposition,
        }
    }

    pub fn stake_of(&self, user: &UserId) -> Option<&Stake> {
        self.stakes.iter().find(|s| &s.user_id == user)
    }

    /// Sum of the escrow markers; equals `wager_pot` until settlement.
    pub fn escrowed_total(&self) -> Coins {
        self.stakes.iter().map(|s| s.coins).sum()
    }
}

/// Trait for battle storage reads.
pub trait BattleStore {
    fn get_battle(&self, id: &BattleId) -> Result<Versioned<Battle>, StoreError>;
    fn battle_exists(&self, id: &BattleId) -> Result<bool, StoreError>;

    /// All battles currently in `status`.
    fn battles_with_status(&self, status: BattleStatus) -> Result<Vec<Battle>, StoreError>;

    /// All battles the user takes part in, newest first.
    fn battles_for_player(&self, user: &UserId) -> Result<Vec<Battle>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_battle() -> Battle {
        Battle {
            id: BattleId::new([7u8; 16]),
            origin: BattleOrigin::Match,
            player1: UserId::parse("alice").unwrap(),
            player2: UserId::parse("bob").unwrap(),
            player1_dare: Dare::single("run").unwrap(),
            player2_dare: Some(Dare::single("swim").unwrap()),
            status: BattleStatus::Active,
            player1_status: PlayerDisposition::None,
            player2_status: PlayerDisposition::None,
            stake_coins: Coins::new(20),
            stakes: vec![],
            wager_pot: Coins::ZERO,
            outcome: None,
            settlement: None,
            created_at: Timestamp::new(10),
            started_at: Some(Timestamp::new(10)),
            updated_at: Timestamp::new(10),
            ended_at: None,
        }
    }

    #[test]
    fn opponent_lookup() {
        let b = sample_battle();
        let alice = UserId::parse("alice").unwrap();
        let carol = UserId::parse("carol").unwrap();
        assert_eq!(b.opponent_of(&alice).map(UserId::as_str), Some("bob"));
        assert!(b.opponent_of(&carol).is_none());
    }

    #[test]
    fn winner_only_for_won_outcome() {
        let mut b = sample_battle();
        assert!(b.winner().is_none());
        b.outcome = Some(Outcome::Draw);
        assert!(b.winner().is_none());
        b.outcome = Some(Outcome::Won {
            winner: b.player2.clone(),
        });
        assert_eq!(b.winner(), Some(&b.player2));
    }
}
