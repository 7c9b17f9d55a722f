//! LMDB implementation of AccountStore.

use dareduel_store::{AccountStore, StoreError, UserAccount, Versioned};
use dareduel_types::UserId;

use crate::environment::decode;
use crate::{LmdbError, LmdbStore};

impl AccountStore for LmdbStore {
    fn get_account(&self, user: &UserId) -> Result<Versioned<UserAccount>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let raw = self
            .accounts_db
            .get(&rtxn, user.as_bytes())
            .map_err(LmdbError::from)?
            .ok_or_else(|| LmdbError::NotFound(format!("account {user}")))?;
        Ok(decode(raw)?)
    }

    fn account_exists(&self, user: &UserId) -> Result<bool, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let found = self
            .accounts_db
            .get(&rtxn, user.as_bytes())
            .map_err(LmdbError::from)?
            .is_some();
        Ok(found)
    }

    fn account_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let count = self.accounts_db.len(&rtxn).map_err(LmdbError::from)?;
        Ok(count)
    }
}
