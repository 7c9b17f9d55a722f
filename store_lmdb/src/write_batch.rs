//! Atomic commit of a [`WriteSet`] inside one LMDB write transaction.
//!
//! LMDB allows a single writer at a time, so the version checks and the
//! writes below cannot interleave with another commit. If any check fails
//! the transaction is dropped without commit, which aborts it: nothing from
//! the write set reaches disk.

use heed::types::Bytes;
use heed::{Database, RwTxn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use dareduel_store::{
    Battle, StoreError, TransactionalStore, UserAccount, Versioned, WriteOp, WriteSet,
};

use crate::environment::decode;
use crate::keys::{player_battle_key, submission_key};
use crate::{LmdbError, LmdbStore};

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, LmdbError> {
    Ok(bincode::serialize(value)?)
}

/// Read the stored version of a versioned record, if present.
fn stored_version<T: DeserializeOwned>(
    txn: &RwTxn<'_>,
    db: Database<Bytes, Bytes>,
    key: &[u8],
) -> Result<Option<u64>, StoreError> {
    match db.get(txn, key).map_err(LmdbError::from)? {
        Some(raw) => {
            let v: Versioned<T> = decode(raw)?;
            Ok(Some(v.version))
        }
        None => Ok(None),
    }
}

impl LmdbStore {
    fn validate(&self, txn: &RwTxn<'_>, op: &WriteOp) -> Result<(), StoreError> {
        let (found, expected) = match op {
            WriteOp::PutAccount {
                expected_version,
                account,
            } => (
                stored_version::<UserAccount>(txn, self.accounts_db, account.user_id.as_bytes())?,
                *expected_version,
            ),
            WriteOp::PutBattle {
                expected_version,
                battle,
            } => (
                stored_version::<Battle>(txn, self.battles_db, battle.id.as_bytes())?,
                *expected_version,
            ),
            WriteOp::AppendSubmission(s) => {
                let exists = self
                    .submission_ids_db
                    .get(txn, s.id.as_bytes())
                    .map_err(LmdbError::from)?
                    .is_some();
                if exists {
                    return Err(StoreError::Conflict(op.describe()));
                }
                return Ok(());
            }
            WriteOp::PutPin(_) | WriteOp::DeletePin { .. } => return Ok(()),
        };
        if found != expected {
            tracing::debug!(
                target_record = %op.describe(),
                ?found,
                ?expected,
                "version mismatch, aborting write set"
            );
            return Err(StoreError::Conflict(op.describe()));
        }
        Ok(())
    }

    fn apply(&self, txn: &mut RwTxn<'_>, op: WriteOp) -> Result<(), StoreError> {
        match op {
            WriteOp::PutAccount {
                expected_version,
                account,
            } => {
                let version = expected_version.map_or(1, |v| v + 1);
                let key = account.user_id.as_bytes().to_vec();
                let bytes = encode(&Versioned::new(version, account))?;
                self.accounts_db
                    .put(txn, &key, &bytes)
                    .map_err(LmdbError::from)?;
            }
            WriteOp::PutBattle {
                expected_version,
                battle,
            } => {
                if expected_version.is_none() {
                    for player in [&battle.player1, &battle.player2] {
                        self.player_battles_db
                            .put(txn, &player_battle_key(player, &battle.id), &[])
                            .map_err(LmdbError::from)?;
                    }
                }
                let version = expected_version.map_or(1, |v| v + 1);
                let key = *battle.id.as_bytes();
                let bytes = encode(&Versioned::new(version, battle))?;
                self.battles_db
                    .put(txn, &key, &bytes)
                    .map_err(LmdbError::from)?;
            }
            WriteOp::AppendSubmission(s) => {
                let key = submission_key(&s.battle_id, &s.user_id, s.submitted_at, &s.id);
                let bytes = encode(&s)?;
                self.submissions_db
                    .put(txn, &key, &bytes)
                    .map_err(LmdbError::from)?;
                self.submission_ids_db
                    .put(txn, s.id.as_bytes(), &[])
                    .map_err(LmdbError::from)?;
            }
            WriteOp::PutPin(pin) => {
                let key = player_battle_key(&pin.user_id, &pin.battle_id);
                let bytes = encode(&pin)?;
                self.pins_db.put(txn, &key, &bytes).map_err(LmdbError::from)?;
            }
            WriteOp::DeletePin { user_id, battle_id } => {
                let key = player_battle_key(&user_id, &battle_id);
                self.pins_db.delete(txn, &key).map_err(LmdbError::from)?;
            }
        }
        Ok(())
    }
}

impl TransactionalStore for LmdbStore {
    fn commit(&self, writes: WriteSet) -> Result<(), StoreError> {
        let mut txn = self.env.write_txn().map_err(LmdbError::from)?;

        for op in writes.ops() {
            self.validate(&txn, op)?;
        }
        for op in writes.into_ops() {
            self.apply(&mut txn, op)?;
        }

        txn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
