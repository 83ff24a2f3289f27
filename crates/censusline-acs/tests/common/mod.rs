#![allow(dead_code)]

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use censusline_acs::CensusTransport;
use censusline_core::{FakeClock, HttpError, RetryPolicy};
use censusline_ledger::{MemoryStore, UsageLedger};
use chrono::{TimeZone, Utc};

pub type Handler = Box<dyn Fn(&str, &[(String, String)], usize) -> Result<String, HttpError>>;

/// One recorded request
#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub params: Vec<(String, String)>,
}

impl Call {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Transport answering from a closure `(url, params, call_index)`.
pub struct MockTransport {
    handler: Handler,
    calls: RefCell<Vec<Call>>,
}

impl MockTransport {
    pub fn new(
        handler: impl Fn(&str, &[(String, String)], usize) -> Result<String, HttpError> + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Replies in order; panics if asked more often than scripted.
    pub fn scripted(replies: Vec<Result<String, HttpError>>) -> Self {
        let replies = RefCell::new(replies.into_iter());
        Self::new(move |_, _, i| {
            replies
                .borrow_mut()
                .next()
                .unwrap_or_else(|| panic!("unexpected request #{}", i + 1))
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl CensusTransport for MockTransport {
    fn get(&self, url: &str, params: &[(String, String)]) -> Result<String, HttpError> {
        let index = {
            let mut calls = self.calls.borrow_mut();
            calls.push(Call {
                url: url.to_string(),
                params: params.to_vec(),
            });
            calls.len() - 1
        };
        (self.handler)(url, params, index)
    }
}

pub fn status(code: u16) -> HttpError {
    HttpError::Status {
        status: code,
        message: format!("status {code}"),
        retry_after: None,
    }
}

pub fn rate_limited(retry_after: Option<Duration>) -> HttpError {
    HttpError::Status {
        status: 429,
        message: "Too Many Requests".to_string(),
        retry_after,
    }
}

pub fn timeout() -> HttpError {
    HttpError::Transport {
        message: "operation timed out".to_string(),
        timed_out: true,
    }
}

pub fn clock() -> FakeClock {
    FakeClock::new(Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap())
}

pub fn ledger(clock: &FakeClock, quota: u64, window: Duration) -> UsageLedger {
    UsageLedger::new(MemoryStore::new(), Arc::new(clock.clone()), quota, window).unwrap()
}

pub fn policy(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts, Duration::from_secs(1), Duration::from_secs(60))
}

pub fn zcta_codes(start: u32, n: u32) -> Vec<String> {
    (start..start + n).map(|z| format!("{z:05}")).collect()
}

/// Census-style JSON body for the ZCTAs in a `for` clause.
pub fn zcta_body(for_clause: &str, vars: &[&str]) -> String {
    let list = for_clause.rsplit_once(':').map_or("", |(_, l)| l);
    let mut rows = vec![
        std::iter::once("NAME")
            .chain(vars.iter().copied())
            .chain(std::iter::once("zip code tabulation area"))
            .map(|h| serde_json::Value::from(h))
            .collect::<Vec<_>>(),
    ];
    for (i, z) in list.split(',').enumerate() {
        let mut row = vec![serde_json::Value::from(format!("ZCTA5 {z}"))];
        row.extend(vars.iter().map(|_| serde_json::Value::from((100 + i).to_string())));
        row.push(serde_json::Value::from(z));
        rows.push(row);
    }
    serde_json::to_string(&rows).unwrap()
}

/// Census-style JSON body with two tracts for each state in an `in` clause.
pub fn tract_body(in_clause: &str) -> String {
    let states = in_clause.trim_start_matches("state:");
    let mut rows = vec![serde_json::json!(["NAME", "DP03_0062E", "state", "county", "tract"])];
    for s in states.split(',') {
        for t in ["000100", "000200"] {
            rows.push(serde_json::json!([format!("Tract {t}, {s}"), "51234", s, "001", t]));
        }
    }
    serde_json::to_string(&rows).unwrap()
}

pub fn variables_body(names: &[&str]) -> String {
    let vars: serde_json::Map<String, serde_json::Value> = names
        .iter()
        .map(|n| (n.to_string(), serde_json::json!({ "label": n })))
        .collect();
    serde_json::json!({ "variables": vars }).to_string()
}
