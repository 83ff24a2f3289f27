//! Persistence backends for the usage record

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::record::UsageRecord;

/// Where the usage record lives between runs.
///
/// `load` returns `Ok(None)` only when nothing was ever saved; an unreadable
/// or corrupt backing store is an error, never an empty record.
pub trait UsageStore: Send + Sync {
    fn load(&self) -> Result<Option<UsageRecord>>;
    fn save(&self, record: &UsageRecord) -> Result<()>;
    fn describe(&self) -> String;
}

/// JSON file written with atomic tmp→rename.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl UsageStore for JsonFileStore {
    fn load(&self) -> Result<Option<UsageRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no usage ledger at {}, starting fresh", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to read usage ledger {}", self.path.display())
                });
            }
        };
        let record = serde_json::from_str(&content)
            .with_context(|| format!("corrupt usage ledger {}", self.path.display()))?;
        Ok(Some(record))
    }

    fn save(&self, record: &UsageRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json =
            serde_json::to_string_pretty(record).context("failed to serialize usage record")?;
        let tmp = self.tmp_path();
        fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).with_context(|| {
            format!("failed to rename {} → {}", tmp.display(), self.path.display())
        })?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process store, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<UsageRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: UsageRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }

    pub fn snapshot(&self) -> Option<UsageRecord> {
        *self.record.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl UsageStore for MemoryStore {
    fn load(&self) -> Result<Option<UsageRecord>> {
        Ok(self.snapshot())
    }

    fn save(&self, record: &UsageRecord) -> Result<()> {
        *self.record.lock().unwrap_or_else(|e| e.into_inner()) = Some(*record);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
