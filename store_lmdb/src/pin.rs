//! LMDB implementation of PinStore.

use dareduel_store::{PinStore, ProfilePin, StoreError};
use dareduel_types::UserId;

use crate::environment::decode;
use crate::keys::user_prefix;
use crate::{LmdbError, LmdbStore};

impl PinStore for LmdbStore {
    fn pins_for(&self, user: &UserId) -> Result<Vec<ProfilePin>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let prefix = user_prefix(user);
        let iter = self
            .pins_db
            .prefix_iter(&rtxn, &prefix)
            .map_err(LmdbError::from)?;
        let mut out = Vec::new();
        for entry in iter {
            let (_key, raw) = entry.map_err(LmdbError::from)?;
            out.push(decode::<ProfilePin>(raw)?);
        }
        out.sort_by(|a, b| b.pinned_at.cmp(&a.pinned_at));
        Ok(out)
    }
}
