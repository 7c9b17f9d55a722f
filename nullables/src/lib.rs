//! Test doubles for the storage and time seams.
//!
//! [`NullStore`] keeps every record in memory with the same conditional
//! write rules as the LMDB backend, and can be told to fail commits with
//! conflicts. [`NullClock`] only moves when a test moves it.

pub mod clock;
pub mod store;

pub use clock::NullClock;
pub use store::NullStore;
