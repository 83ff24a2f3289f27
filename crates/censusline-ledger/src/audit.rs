//! Append-only JSONL log of every Census API call

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Query parameters never written to disk in clear
const SECRET_PARAMS: &[&str] = &["key"];

/// One logged request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEntry {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub params: BTreeMap<String, String>,
    /// `None` when no response arrived
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rate_limit: BTreeMap<String, String>,
}

/// Copy query parameters with secrets masked.
pub fn redact_params(params: &[(String, String)]) -> BTreeMap<String, String> {
    params
        .iter()
        .map(|(k, v)| {
            let value = if SECRET_PARAMS.contains(&k.as_str()) {
                "***".to_string()
            } else {
                v.clone()
            };
            (k.clone(), value)
        })
        .collect()
}

/// JSONL audit file.
#[derive(Debug, Clone)]
pub struct CallLog {
    path: PathBuf,
}

impl CallLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &CallEntry) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(entry).context("failed to serialize call entry")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        Ok(())
    }

    /// Append, downgrading failures to a warning.
    pub fn record(&self, entry: &CallEntry) {
        if let Err(e) = self.append(entry) {
            log::warn!("audit log: {e:#}");
        }
    }

    pub fn read_all(&self) -> Result<Vec<CallEntry>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path.display()));
            }
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!("{}: invalid entry on line {}", self.path.display(), i + 1)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(status: Option<u16>) -> CallEntry {
        CallEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            endpoint: "https://api.census.gov/data/2023/acs/acs5/profile".to_string(),
            params: redact_params(&[
                ("get".to_string(), "NAME,DP02_0001E".to_string()),
                ("key".to_string(), "secret".to_string()),
            ]),
            status,
            rate_limit: BTreeMap::new(),
        }
    }

    #[test]
    fn redacts_api_key() {
        let params = redact_params(&[
            ("for".to_string(), "tract:*".to_string()),
            ("key".to_string(), "abc123".to_string()),
        ]);
        assert_eq!(params["key"], "***");
        assert_eq!(params["for"], "tract:*");
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::new(dir.path().join("audit/calls.jsonl"));
        log.append(&entry(Some(200))).unwrap();
        log.append(&entry(None)).unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, Some(200));
        assert_eq!(entries[1].status, None);
        let raw = fs::read_to_string(log.path()).unwrap();
        assert!(!raw.contains("secret"));
    }

    #[test]
    fn read_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::new(dir.path().join("none.jsonl"));
        assert!(log.read_all().unwrap().is_empty());
    }
}
