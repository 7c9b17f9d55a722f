//! LMDB environment setup.

use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use serde::de::DeserializeOwned;

use crate::LmdbError;

/// Number of named databases opened in the environment.
const MAX_DBS: u32 = 8;

/// Schema version written to `meta` on first open.
pub const SCHEMA_VERSION: u32 = 1;

/// The LMDB environment and all database handles.
///
/// Implements every `dareduel-store` trait, so one `Arc<LmdbStore>` serves as
/// the node's whole persistence layer.
pub struct LmdbStore {
    pub(crate) env: Env,
    /// `user` → `Versioned<UserAccount>`
    pub(crate) accounts_db: Database<Bytes, Bytes>,
    /// `battle` → `Versioned<Battle>`
    pub(crate) battles_db: Database<Bytes, Bytes>,
    /// `battle ++ user ++ be(ts) ++ id` → `Submission`
    pub(crate) submissions_db: Database<Bytes, Bytes>,
    /// `submission id` → empty (uniqueness)
    pub(crate) submission_ids_db: Database<Bytes, Bytes>,
    /// `user ++ battle` → empty (per-player index)
    pub(crate) player_battles_db: Database<Bytes, Bytes>,
    /// `user ++ battle` → `ProfilePin`
    pub(crate) pins_db: Database<Bytes, Bytes>,
    pub(crate) meta_db: Database<Bytes, Bytes>,
}

impl LmdbStore {
    /// Open or create an LMDB environment at the given path.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;

        // SAFETY: the environment is opened once per process for this path,
        // and the node never opens the same path twice concurrently.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let accounts_db = env.create_database(&mut wtxn, Some("accounts"))?;
        let battles_db = env.create_database(&mut wtxn, Some("battles"))?;
        let submissions_db = env.create_database(&mut wtxn, Some("submissions"))?;
        let submission_ids_db = env.create_database(&mut wtxn, Some("submission_ids"))?;
        let player_battles_db = env.create_database(&mut wtxn, Some("player_battles"))?;
        let pins_db = env.create_database(&mut wtxn, Some("pins"))?;
        let meta_db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some("meta"))?;

        if meta_db.get(&wtxn, b"schema_version")?.is_none() {
            meta_db.put(&mut wtxn, b"schema_version", &SCHEMA_VERSION.to_be_bytes())?;
        }
        wtxn.commit()?;

        tracing::info!(path = %path.display(), map_size, "opened LMDB environment");

        Ok(Self {
            env,
            accounts_db,
            battles_db,
            submissions_db,
            submission_ids_db,
            player_battles_db,
            pins_db,
            meta_db,
        })
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Schema version recorded in the `meta` database.
    pub fn schema_version(&self) -> Result<u32, LmdbError> {
        let rtxn = self.env.read_txn()?;
        let raw = self
            .meta_db
            .get(&rtxn, b"schema_version")?
            .ok_or_else(|| LmdbError::NotFound("schema_version".into()))?;
        let arr: [u8; 4] = raw
            .try_into()
            .map_err(|_| LmdbError::Serialization("schema_version is not 4 bytes".into()))?;
        Ok(u32::from_be_bytes(arr))
    }
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LmdbError> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Helper: open a temporary LMDB environment.
    pub(crate) fn temp_store() -> (tempfile::TempDir, LmdbStore) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let store = LmdbStore::open(dir.path(), 10 * 1024 * 1024).expect("failed to open env");
        (dir, store)
    }

    #[test]
    fn open_writes_schema_version() {
        let (_dir, store) = temp_store();
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn reopen_keeps_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _store = LmdbStore::open(dir.path(), 10 * 1024 * 1024).unwrap();
        }
        let store = LmdbStore::open(dir.path(), 10 * 1024 * 1024).unwrap();
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    }
}
