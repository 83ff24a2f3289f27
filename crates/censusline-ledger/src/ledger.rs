//! Usage ledger: quota check before each call, increment after each success

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use censusline_core::Clock;

use crate::record::UsageRecord;
use crate::store::UsageStore;

/// Shortest sleep while waiting for a window to reset
const MIN_QUOTA_WAIT: Duration = Duration::from_secs(1);

/// Snapshot for display (`censusline usage`).
#[derive(Debug, Clone)]
pub struct LedgerStatus {
    pub record: UsageRecord,
    pub quota: u64,
    pub window: Duration,
    pub remaining: u64,
    pub resets_at: Option<DateTime<Utc>>,
    pub backend: String,
}

/// Persisted API call counter for one quota window.
///
/// Every method reads the store afresh, so two ledgers over the same file
/// (e.g. before and after a restart) agree on the count.
pub struct UsageLedger {
    store: Box<dyn UsageStore>,
    clock: Arc<dyn Clock>,
    quota: u64,
    window: Duration,
}

impl std::fmt::Debug for UsageLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageLedger")
            .field("store", &self.store.describe())
            .field("quota", &self.quota)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl UsageLedger {
    pub fn new(
        store: impl UsageStore + 'static,
        clock: Arc<dyn Clock>,
        quota: u64,
        window: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(quota > 0, "quota per window must be at least 1");
        anyhow::ensure!(!window.is_zero(), "quota window must be non-zero");
        Ok(Self {
            store: Box::new(store),
            clock,
            quota,
            window,
        })
    }

    pub fn quota(&self) -> u64 {
        self.quota
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Stored record with the window rolled forward if it elapsed.
    fn current(&self) -> Result<UsageRecord> {
        let now = self.clock.now();
        let stored = self
            .store
            .load()
            .with_context(|| format!("usage ledger {} unreadable", self.store.describe()))?;
        Ok(match stored {
            Some(rec) => rec.rolled(now, self.window),
            None => UsageRecord::fresh(now),
        })
    }

    /// Whether another call fits in the current window.
    pub fn can_proceed(&self) -> Result<bool> {
        Ok(self.current()?.call_count < self.quota)
    }

    /// Count one call against the quota and persist it.
    pub fn record_call(&self) -> Result<UsageRecord> {
        let mut rec = self.current()?;
        anyhow::ensure!(
            rec.call_count < self.quota,
            "quota of {} calls already used in window starting {}",
            self.quota,
            rec.window_start
        );
        rec.call_count += 1;
        self.store
            .save(&rec)
            .with_context(|| format!("failed to persist usage ledger {}", self.store.describe()))?;
        log::debug!("API usage: {}/{} this window", rec.call_count, self.quota);
        Ok(rec)
    }

    /// Time left until the current window closes (zero if already closed).
    pub fn time_until_reset(&self) -> Result<Duration> {
        let rec = self.current()?;
        let Some(end) = rec.window_end(self.window) else {
            anyhow::bail!("quota window too large to schedule a reset");
        };
        Ok((end - self.clock.now()).to_std().unwrap_or(Duration::ZERO))
    }

    /// Block until the quota admits another call.
    pub fn wait_for_quota(&self) -> Result<()> {
        while !self.can_proceed()? {
            let wait = self.time_until_reset()?.max(MIN_QUOTA_WAIT);
            log::warn!(
                "API quota of {} calls exhausted, sleeping {}s until the window resets",
                self.quota,
                wait.as_secs()
            );
            self.clock.sleep(wait);
        }
        Ok(())
    }

    pub fn status(&self) -> Result<LedgerStatus> {
        let record = self.current()?;
        Ok(LedgerStatus {
            record,
            quota: self.quota,
            window: self.window,
            remaining: self.quota.saturating_sub(record.call_count),
            resets_at: record.window_end(self.window),
            backend: self.store.describe(),
        })
    }

    /// Start a new empty window now.
    pub fn reset(&self) -> Result<()> {
        self.store
            .save(&UsageRecord::fresh(self.clock.now()))
            .context("failed to reset usage ledger")
    }
}
