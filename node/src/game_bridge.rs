//! Connects the matchmaker to the battle lifecycle.
//!
//! A mutually accepted pair becomes a `Match` battle with both stakes
//! escrowed in the same ledger transaction.

use std::sync::Arc;

use dareduel_battle::{BattleError, BattleLifecycle, MatchSide};
use dareduel_ledger::LedgerError;
use dareduel_matchmaking::{GameCreationError, GameCreator, QueueEntry};
use dareduel_store::DuelStore;
use dareduel_types::{BattleId, Dare};

pub struct LedgerGameCreator<S: ?Sized> {
    lifecycle: Arc<BattleLifecycle<S>>,
}

impl<S: ?Sized> LedgerGameCreator<S> {
    pub fn new(lifecycle: Arc<BattleLifecycle<S>>) -> Self {
        Self { lifecycle }
    }
}

fn side(entry: QueueEntry) -> Result<MatchSide, GameCreationError> {
    let dare = Dare::single(entry.dare).map_err(|e| GameCreationError::Failed(e.to_string()))?;
    Ok(MatchSide {
        user_id: entry.requester,
        dare,
    })
}

fn creation_error(e: BattleError) -> GameCreationError {
    match e {
        BattleError::Ledger(LedgerError::InsufficientFunds { user, .. }) => {
            GameCreationError::InsufficientFunds { user }
        }
        other => GameCreationError::Failed(other.to_string()),
    }
}

impl<S: DuelStore + ?Sized + 'static> GameCreator for LedgerGameCreator<S> {
    async fn create_game(
        &self,
        first: QueueEntry,
        second: QueueEntry,
    ) -> Result<BattleId, GameCreationError> {
        // Entries are only paired on equal wagers.
        let stake = first.wager_coins;
        let first = side(first)?;
        let second = side(second)?;
        let battle = self
            .lifecycle
            .create_from_match(&first, &second, stake)
            .await
            .map_err(creation_error)?;
        Ok(battle.id)
    }
}
