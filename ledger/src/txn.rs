//! Read-your-writes transaction buffer.
//!
//! A [`LedgerTxn`] caches every account and battle it reads together with
//! the version it was read at. Mutations only touch the cached copies; at
//! commit time the touched records become a [`WriteSet`] whose expected
//! versions are the read versions, so any concurrent change to one of them
//! aborts the whole set.
//!
//! Each coin primitive checks all of its preconditions before it mutates
//! anything, so a failed primitive leaves the buffer exactly as it was.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use dareduel_store::{
    Battle, DuelStore, ProfilePin, Settlement, Stake, StoreError, Submission, UserAccount,
    Versioned, WriteOp, WriteSet,
};
use dareduel_types::{BattleId, Coins, Timestamp, UserId};

use crate::LedgerError;

struct Cached<T> {
    /// `None` for records created inside this transaction.
    read_version: Option<u64>,
    value: T,
    dirty: bool,
}

impl<T> Cached<T> {
    fn read(stored: Versioned<T>) -> Self {
        Self {
            read_version: Some(stored.version),
            value: stored.value,
            dirty: false,
        }
    }

    fn created(value: T) -> Self {
        Self {
            read_version: None,
            value,
            dirty: true,
        }
    }
}

pub struct LedgerTxn<'a, S: ?Sized> {
    store: &'a S,
    now: Timestamp,
    accounts: HashMap<UserId, Cached<UserAccount>>,
    battles: HashMap<BattleId, Cached<Battle>>,
    appends: Vec<WriteOp>,
}

impl<'a, S: DuelStore + ?Sized> LedgerTxn<'a, S> {
    pub(crate) fn new(store: &'a S, now: Timestamp) -> Self {
        Self {
            store,
            now,
            accounts: HashMap::new(),
            battles: HashMap::new(),
            appends: Vec::new(),
        }
    }

    /// Time the transaction attempt started. Stable across one attempt.
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Underlying store, for reads that do not take part in the commit check.
    pub fn store(&self) -> &'a S {
        self.store
    }

    fn load_account(&mut self, user: &UserId) -> Result<&mut Cached<UserAccount>, LedgerError> {
        let store = self.store;
        match self.accounts.entry(user.clone()) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => match store.get_account(user) {
                Ok(stored) => Ok(e.insert(Cached::read(stored))),
                Err(StoreError::NotFound(_)) => Err(LedgerError::AccountNotFound(user.clone())),
                Err(err) => Err(err.into()),
            },
        }
    }

    fn load_battle(&mut self, id: &BattleId) -> Result<&mut Cached<Battle>, LedgerError> {
        let store = self.store;
        match self.battles.entry(*id) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => match store.get_battle(id) {
                Ok(stored) => Ok(e.insert(Cached::read(stored))),
                Err(StoreError::NotFound(_)) => Err(LedgerError::BattleNotFound(*id)),
                Err(err) => Err(err.into()),
            },
        }
    }

    pub fn account(&mut self, user: &UserId) -> Result<&UserAccount, LedgerError> {
        Ok(&self.load_account(user)?.value)
    }

    pub fn balance(&mut self, user: &UserId) -> Result<Coins, LedgerError> {
        Ok(self.account(user)?.balance)
    }

    /// Create a new account. Fails if the user already has one.
    pub fn create_account(&mut self, account: UserAccount) -> Result<(), LedgerError> {
        let exists =
            self.accounts.contains_key(&account.user_id) || self.store.account_exists(&account.user_id)?;
        if exists {
            return Err(LedgerError::AccountExists(account.user_id));
        }
        self.accounts
            .insert(account.user_id.clone(), Cached::created(account));
        Ok(())
    }

    pub fn battle(&mut self, id: &BattleId) -> Result<&Battle, LedgerError> {
        Ok(&self.load_battle(id)?.value)
    }

    /// Mutable access to a battle. Marks it for writing and bumps `updated_at`.
    pub fn battle_mut(&mut self, id: &BattleId) -> Result<&mut Battle, LedgerError> {
        let now = self.now;
        let cached = self.load_battle(id)?;
        cached.dirty = true;
        cached.value.updated_at = now;
        Ok(&mut cached.value)
    }

    /// Stage a battle that must not exist in the store yet.
    pub fn insert_battle(&mut self, battle: Battle) {
        self.battles.insert(battle.id, Cached::created(battle));
    }

    pub fn append_submission(&mut self, submission: Submission) {
        self.appends.push(WriteOp::AppendSubmission(submission));
    }

    pub fn put_pin(&mut self, pin: ProfilePin) {
        self.appends.push(WriteOp::PutPin(pin));
    }

    pub fn delete_pin(&mut self, user_id: &UserId, battle_id: &BattleId) {
        self.appends.push(WriteOp::DeletePin {
            user_id: user_id.clone(),
            battle_id: *battle_id,
        });
    }

    /// Apply a signed grant (`delta > 0`) or charge (`delta < 0`).
    /// Returns the new balance.
    pub fn adjust(&mut self, user: &UserId, delta: i64) -> Result<Coins, LedgerError> {
        let now = self.now;
        let account = self.load_account(user)?;
        let balance = account.value.balance;
        let next = balance.checked_apply(delta).ok_or_else(|| {
            if delta < 0 {
                LedgerError::InsufficientFunds {
                    user: user.clone(),
                    needed: Coins::new(delta.unsigned_abs()),
                    available: balance,
                }
            } else {
                LedgerError::Overflow(user.clone())
            }
        })?;
        account.value.balance = next;
        account.value.updated_at = now;
        account.dirty = true;
        Ok(next)
    }

    /// Move `amount` from the payer's balance into the battle's pot and
    /// record the escrow marker.
    pub fn escrow(
        &mut self,
        battle_id: &BattleId,
        payer: &UserId,
        amount: Coins,
    ) -> Result<(), LedgerError> {
        let now = self.now;
        let pot = {
            let battle = self.battle(battle_id)?;
            if !battle.is_participant(payer) {
                return Err(LedgerError::NotParticipant {
                    user: payer.clone(),
                    battle: *battle_id,
                });
            }
            if battle.status.is_terminal() || battle.settlement.is_some() {
                return Err(LedgerError::AlreadyResolved(*battle_id));
            }
            if battle.stake_of(payer).is_some() {
                return Err(LedgerError::AlreadyStaked {
                    user: payer.clone(),
                    battle: *battle_id,
                });
            }
            battle
                .wager_pot
                .checked_add(amount)
                .ok_or_else(|| LedgerError::Overflow(payer.clone()))?
        };

        let account = self.load_account(payer)?;
        let available = account.value.balance;
        let remaining = available
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientFunds {
                user: payer.clone(),
                needed: amount,
                available,
            })?;
        account.value.balance = remaining;
        account.value.updated_at = now;
        account.dirty = true;

        let battle = self.battle_mut(battle_id)?;
        battle.stakes.push(Stake {
            user_id: payer.clone(),
            coins: amount,
            escrowed_at: now,
        });
        battle.wager_pot = pot;

        tracing::debug!(battle = %battle_id, payer = %payer, %amount, "stake escrowed");
        Ok(())
    }

    /// Escrow several stakes on one battle. Either every stake lands or the
    /// transaction fails. Returns the resulting pot.
    pub fn escrow_joint(
        &mut self,
        battle_id: &BattleId,
        stakes: &[(UserId, Coins)],
    ) -> Result<Coins, LedgerError> {
        if stakes.is_empty() {
            return Err(LedgerError::InvalidAmount("joint escrow needs at least one stake".into()));
        }
        for (payer, amount) in stakes {
            self.escrow(battle_id, payer, *amount)?;
        }
        Ok(self.battle(battle_id)?.wager_pot)
    }

    /// Credit the whole pot to the stored winner and mark the battle paid.
    /// Returns the winner's new balance.
    pub fn payout(
        &mut self,
        battle_id: &BattleId,
        winner: &UserId,
        amount: Coins,
    ) -> Result<Coins, LedgerError> {
        let now = self.now;
        {
            let battle = self.battle(battle_id)?;
            if battle.settlement.is_some() {
                return Err(LedgerError::AlreadyPaid(*battle_id));
            }
            if battle.winner() != Some(winner) {
                return Err(LedgerError::NotWinner {
                    user: winner.clone(),
                    battle: *battle_id,
                });
            }
            if amount != battle.wager_pot {
                return Err(LedgerError::AmountMismatch {
                    pot: battle.wager_pot,
                    requested: amount,
                });
            }
        }

        let account = self.load_account(winner)?;
        let credited = account
            .value
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow(winner.clone()))?;
        account.value.balance = credited;
        account.value.updated_at = now;
        account.dirty = true;

        let battle = self.battle_mut(battle_id)?;
        battle.settlement = Some(Settlement::Paid {
            winner: winner.clone(),
            coins: amount,
            paid_at: now,
        });
        battle.wager_pot = Coins::ZERO;

        tracing::debug!(battle = %battle_id, winner = %winner, %amount, "payout staged");
        Ok(credited)
    }

    /// Return every escrowed stake to its payer and mark the battle refunded.
    /// Returns the total refunded.
    pub fn refund(&mut self, battle_id: &BattleId) -> Result<Coins, LedgerError> {
        let now = self.now;
        let stakes = {
            let battle = self.battle(battle_id)?;
            if battle.settlement.is_some() {
                return Err(LedgerError::AlreadyPaid(*battle_id));
            }
            battle.stakes.clone()
        };

        let mut credits = Vec::with_capacity(stakes.len());
        for stake in &stakes {
            let balance = self.load_account(&stake.user_id)?.value.balance;
            let next = balance
                .checked_add(stake.coins)
                .ok_or_else(|| LedgerError::Overflow(stake.user_id.clone()))?;
            credits.push((stake.user_id.clone(), next));
        }
        for (user, next) in credits {
            let account = self.load_account(&user)?;
            account.value.balance = next;
            account.value.updated_at = now;
            account.dirty = true;
        }

        let total: Coins = stakes.iter().map(|s| s.coins).sum();
        let battle = self.battle_mut(battle_id)?;
        battle.settlement = Some(Settlement::Refunded {
            coins: total,
            refunded_at: now,
        });
        battle.wager_pot = Coins::ZERO;

        tracing::debug!(battle = %battle_id, %total, "refund staged");
        Ok(total)
    }

    pub(crate) fn into_write_set(self) -> WriteSet {
        let mut writes = WriteSet::new();
        for cached in self.accounts.into_values().filter(|c| c.dirty) {
            writes.push(WriteOp::PutAccount {
                expected_version: cached.read_version,
                account: cached.value,
            });
        }
        for cached in self.battles.into_values().filter(|c| c.dirty) {
            writes.push(WriteOp::PutBattle {
                expected_version: cached.read_version,
                battle: cached.value,
            });
        }
        for op in self.appends {
            writes.push(op);
        }
        writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dareduel_nullables::NullStore;

    fn user(name: &str) -> UserId {
        UserId::parse(name).unwrap()
    }

    fn store_with(name: &str, coins: u64) -> NullStore {
        let store = NullStore::new();
        store.seed_account(UserAccount {
            user_id: user(name),
            display_name: name.to_string(),
            balance: Coins::new(coins),
            created_at: Timestamp::new(1),
            updated_at: Timestamp::new(1),
        });
        store
    }

    #[test]
    fn untouched_reads_produce_no_writes() {
        let store = store_with("x", 10);
        let mut txn = LedgerTxn::new(&store, Timestamp::new(5));
        assert_eq!(txn.balance(&user("x")).unwrap(), Coins::new(10));
        assert!(txn.into_write_set().is_empty());
    }

    #[test]
    fn writes_expect_the_version_they_read() {
        let store = store_with("x", 10);
        let mut txn = LedgerTxn::new(&store, Timestamp::new(5));
        txn.adjust(&user("x"), -4).unwrap();
        txn.create_account(UserAccount {
            user_id: user("y"),
            display_name: "y".into(),
            balance: Coins::new(3),
            created_at: Timestamp::new(5),
            updated_at: Timestamp::new(5),
        })
        .unwrap();

        let mut expected: Vec<(String, Option<u64>)> = txn
            .into_write_set()
            .into_ops()
            .into_iter()
            .map(|op| match op {
                WriteOp::PutAccount {
                    expected_version,
                    account,
                } => (account.user_id.to_string(), expected_version),
                other => panic!("unexpected op {}", other.describe()),
            })
            .collect();
        expected.sort();
        assert_eq!(
            expected,
            vec![("x".to_string(), Some(1)), ("y".to_string(), None)]
        );
    }

    #[test]
    fn overdraft_leaves_the_buffer_unchanged() {
        let store = store_with("x", 10);
        let mut txn = LedgerTxn::new(&store, Timestamp::new(5));
        let err = txn.adjust(&user("x"), -11).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(txn.balance(&user("x")).unwrap(), Coins::new(10));
        assert!(txn.into_write_set().is_empty());
    }

    #[test]
    fn duplicate_account_is_rejected_inside_the_buffer() {
        let store = NullStore::new();
        let mut txn = LedgerTxn::new(&store, Timestamp::new(5));
        let account = UserAccount {
            user_id: user("z"),
            display_name: "z".into(),
            balance: Coins::ZERO,
            created_at: Timestamp::new(5),
            updated_at: Timestamp::new(5),
        };
        txn.create_account(account.clone()).unwrap();
        assert!(matches!(
            txn.create_account(account),
            Err(LedgerError::AccountExists(_))
        ));
    }
}
