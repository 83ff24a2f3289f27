//! censusline-ledger: Local guard for the Census API quota
//!
//! Tracks how many API calls were made in the current quota window and
//! persists that count across runs, so a restarted pipeline cannot blow
//! through the remote rate limit. Also keeps an append-only audit log of
//! every call made.

pub mod audit;
pub mod ledger;
pub mod record;
pub mod store;

pub use audit::{CallEntry, CallLog, redact_params};
pub use ledger::{LedgerStatus, UsageLedger};
pub use record::UsageRecord;
pub use store::{JsonFileStore, MemoryStore, UsageStore};
