//! The ledger: bounded-retry atomic transactions over a [`DuelStore`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dareduel_store::{DuelStore, StoreError, UserAccount};
use dareduel_types::{BattleId, Clock, Coins, UserId};

use crate::{LedgerError, LedgerTxn, RetryPolicy};

pub struct Ledger<S: ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    conflicts: AtomicU64,
}

impl<S: DuelStore + ?Sized> Ledger<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
            conflicts: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Total commit conflicts seen since startup, including retried ones.
    pub fn conflict_count(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Run `f` against a fresh [`LedgerTxn`] and commit what it touched.
    ///
    /// On a commit conflict `f` is run again from scratch against freshly
    /// read records, after `base_delay * 2^retry` (capped). After
    /// `max_attempts` conflicting attempts the call fails with
    /// [`LedgerError::TransactionConflict`]. An error returned by `f` aborts
    /// immediately without retrying and without writing anything.
    pub async fn transact<T, E, F>(&self, op: &'static str, mut f: F) -> Result<T, E>
    where
        F: FnMut(&mut LedgerTxn<'_, S>) -> Result<T, E>,
        E: From<LedgerError>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let mut txn = LedgerTxn::new(&*self.store, self.clock.now());
            let value = f(&mut txn)?;
            let writes = txn.into_write_set();
            if writes.is_empty() {
                return Ok(value);
            }

            match self.store.commit(writes) {
                Ok(()) => {
                    tracing::debug!(op, attempt, "transaction committed");
                    return Ok(value);
                }
                Err(StoreError::Conflict(on)) => {
                    self.conflicts.fetch_add(1, Ordering::Relaxed);
                    if attempt >= self.policy.max_attempts {
                        tracing::warn!(op, attempts = attempt, %on, "transaction conflict, giving up");
                        return Err(LedgerError::TransactionConflict {
                            op,
                            attempts: attempt,
                        }
                        .into());
                    }
                    let delay = self.policy.delay_for(attempt - 1);
                    tracing::warn!(op, attempt, %on, ?delay, "transaction conflict, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(LedgerError::Storage(e).into()),
            }
        }
    }

    /// Create an account holding `initial_grant` coins.
    pub async fn open_account(
        &self,
        user: &UserId,
        display_name: &str,
        initial_grant: Coins,
    ) -> Result<UserAccount, LedgerError> {
        let account = self
            .transact("open_account", |txn| {
                let now = txn.now();
                let account = UserAccount {
                    user_id: user.clone(),
                    display_name: display_name.to_string(),
                    balance: initial_grant,
                    created_at: now,
                    updated_at: now,
                };
                txn.create_account(account.clone())?;
                Ok::<_, LedgerError>(account)
            })
            .await?;
        tracing::info!(user = %user, grant = %initial_grant, "account opened");
        Ok(account)
    }

    /// Current balance, read outside any transaction.
    pub fn balance(&self, user: &UserId) -> Result<Coins, LedgerError> {
        match self.store.get_account(user) {
            Ok(stored) => Ok(stored.value.balance),
            Err(StoreError::NotFound(_)) => Err(LedgerError::AccountNotFound(user.clone())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn adjust(&self, user: &UserId, delta: i64) -> Result<Coins, LedgerError> {
        self.transact("adjust", |txn| txn.adjust(user, delta)).await
    }

    pub async fn escrow(
        &self,
        battle: &BattleId,
        payer: &UserId,
        amount: Coins,
    ) -> Result<(), LedgerError> {
        self.transact("escrow", |txn| txn.escrow(battle, payer, amount))
            .await
    }

    pub async fn escrow_joint(
        &self,
        battle: &BattleId,
        stakes: &[(UserId, Coins)],
    ) -> Result<Coins, LedgerError> {
        self.transact("escrow_joint", |txn| txn.escrow_joint(battle, stakes))
            .await
    }

    pub async fn payout(
        &self,
        battle: &BattleId,
        winner: &UserId,
        amount: Coins,
    ) -> Result<Coins, LedgerError> {
        self.transact("payout", |txn| txn.payout(battle, winner, amount))
            .await
    }

    pub async fn refund(&self, battle: &BattleId) -> Result<Coins, LedgerError> {
        self.transact("refund", |txn| txn.refund(battle)).await
    }
}
