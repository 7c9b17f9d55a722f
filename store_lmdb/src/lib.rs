//! LMDB storage backend for DareDuel.
//!
//! Implements all storage traits from `dareduel-store` using the `heed` LMDB
//! bindings. Each logical store maps to one or more LMDB databases within a
//! single environment; [`LmdbStore::commit`](dareduel_store::TransactionalStore::commit)
//! applies a whole write set inside one LMDB write transaction.

pub mod account;
pub mod battle;
pub mod environment;
pub mod error;
pub mod keys;
pub mod pin;
pub mod submission;
pub mod write_batch;

pub use environment::LmdbStore;
pub use error::LmdbError;
