//! Transactional coin ledger.
//!
//! Coins only move through [`LedgerTxn`]'s primitives (escrow, payout,
//! refund, adjust), and a [`LedgerTxn`] only reaches the store through
//! [`Ledger::transact`], which commits its writes atomically and retries on
//! optimistic-concurrency conflicts with bounded exponential backoff.

pub mod error;
pub mod ledger;
pub mod retry;
pub mod txn;

pub use error::LedgerError;
pub use ledger::Ledger;
pub use retry::RetryPolicy;
pub use txn::LedgerTxn;
