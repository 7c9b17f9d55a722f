//! LMDB implementation of BattleStore.
//!
//! `battles_with_status` scans the whole battles database. It is only used
//! by the once-a-day sweep, so an extra status index is not worth the
//! write amplification yet.

use dareduel_store::{Battle, BattleStore, StoreError, Versioned};
use dareduel_types::{BattleId, BattleStatus, UserId};

use crate::environment::decode;
use crate::keys::{battle_from_player_key, user_prefix};
use crate::{LmdbError, LmdbStore};

impl BattleStore for LmdbStore {
    fn get_battle(&self, id: &BattleId) -> Result<Versioned<Battle>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let raw = self
            .battles_db
            .get(&rtxn, id.as_bytes())
            .map_err(LmdbError::from)?
            .ok_or_else(|| LmdbError::NotFound(format!("battle {id}")))?;
        Ok(decode(raw)?)
    }

    fn battle_exists(&self, id: &BattleId) -> Result<bool, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let found = self
            .battles_db
            .get(&rtxn, id.as_bytes())
            .map_err(LmdbError::from)?
            .is_some();
        Ok(found)
    }

    fn battles_with_status(&self, status: BattleStatus) -> Result<Vec<Battle>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let iter = self.battles_db.iter(&rtxn).map_err(LmdbError::from)?;
        let mut out = Vec::new();
        for entry in iter {
            let (_key, raw) = entry.map_err(LmdbError::from)?;
            let battle: Versioned<Battle> = decode(raw)?;
            if battle.value.status == status {
                out.push(battle.value);
            }
        }
        out.sort_by_key(|b| (b.created_at, b.id));
        Ok(out)
    }

    fn battles_for_player(&self, user: &UserId) -> Result<Vec<Battle>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let prefix = user_prefix(user);
        let iter = self
            .player_battles_db
            .prefix_iter(&rtxn, &prefix)
            .map_err(LmdbError::from)?;
        let mut out = Vec::new();
        for entry in iter {
            let (key, _) = entry.map_err(LmdbError::from)?;
            let Some(id) = battle_from_player_key(key) else {
                return Err(StoreError::Corruption("short player_battles key".into()));
            };
            let raw = self
                .battles_db
                .get(&rtxn, id.as_bytes())
                .map_err(LmdbError::from)?
                .ok_or_else(|| {
                    StoreError::Corruption(format!("player index points at missing battle {id}"))
                })?;
            let battle: Versioned<Battle> = decode(raw)?;
            out.push(battle.value);
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }
}
