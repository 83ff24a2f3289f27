//! Census Data API transport and response decoding.
//!
//! Responses are JSON arrays of arrays: the first row is the header, every
//! following row one geography. Values arrive as strings, occasionally as
//! bare numbers or `null`.

use std::collections::HashSet;
use std::sync::Arc;

use censusline_core::{Clock, HttpError, HttpSettings, build_client, send_get};
use censusline_ledger::{CallEntry, CallLog, redact_params};
use serde::Deserialize;
use serde_json::Value;

/// One HTTP GET against the API, returning the body of a 2xx response.
///
/// Non-2xx responses come back as [`HttpError::Status`] so the caller can
/// classify them.
pub trait CensusTransport {
    fn get(&self, url: &str, params: &[(String, String)]) -> Result<String, HttpError>;
}

/// Live transport: reqwest client, API key, optional audit log.
pub struct ReqwestTransport {
    client: reqwest::Client,
    api_key: Option<String>,
    audit: Option<CallLog>,
    clock: Arc<dyn Clock>,
}

impl ReqwestTransport {
    pub fn new(
        settings: &HttpSettings,
        api_key: Option<String>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, HttpError> {
        Ok(Self {
            client: build_client(settings)?,
            api_key: api_key.filter(|k| !k.is_empty()),
            audit: None,
            clock,
        })
    }

    pub fn with_audit(mut self, audit: CallLog) -> Self {
        self.audit = Some(audit);
        self
    }
}

impl CensusTransport for ReqwestTransport {
    fn get(&self, url: &str, params: &[(String, String)]) -> Result<String, HttpError> {
        let mut query = params.to_vec();
        if let Some(key) = &self.api_key {
            query.push(("key".to_string(), key.clone()));
        }

        let result = send_get(&self.client, url, &query, self.clock.now());

        if let Some(audit) = &self.audit {
            let (status, rate_limit) = match &result {
                Ok(resp) => (Some(resp.status), resp.rate_limit.clone()),
                Err(_) => (None, Default::default()),
            };
            audit.record(&CallEntry {
                timestamp: self.clock.now(),
                endpoint: url.to_string(),
                params: redact_params(&query),
                status,
                rate_limit,
            });
        }

        let resp = result?.into_result()?;
        log::debug!("GET {url} -> {} ({} bytes)", resp.status, resp.body.len());
        Ok(resp.body)
    }
}

/// Decoded response table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Decode a data response. An empty body (HTTP 204) is an empty table.
pub fn parse_table(body: &str) -> Result<RawTable, HttpError> {
    if body.trim().is_empty() {
        return Ok(RawTable::default());
    }
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)
        .map_err(|e| HttpError::Decode(format!("expected array of arrays: {e}")))?;
    let mut rows = rows.into_iter();
    let Some(header) = rows.next() else {
        return Ok(RawTable::default());
    };

    let header = header
        .into_iter()
        .map(|v| match v {
            Value::String(s) => Ok(s),
            other => Err(HttpError::Decode(format!("non-string header cell {other}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let width = header.len();
    let rows = rows
        .enumerate()
        .map(|(i, row)| {
            if row.len() != width {
                return Err(HttpError::Decode(format!(
                    "row {} has {} cells, header has {width}",
                    i + 1,
                    row.len()
                )));
            }
            Ok(row.into_iter().map(cell).collect())
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RawTable { header, rows })
}

fn cell(v: Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

#[derive(Deserialize)]
struct VariablesDoc {
    variables: std::collections::BTreeMap<String, serde::de::IgnoredAny>,
}

/// Variable names published by a dataset (`variables.json`).
pub fn parse_variables(body: &str) -> Result<HashSet<String>, HttpError> {
    let doc: VariablesDoc = serde_json::from_str(body)
        .map_err(|e| HttpError::Decode(format!("variables.json: {e}")))?;
    Ok(doc.variables.into_keys().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_rows() {
        let body = r#"[["NAME","DP02_0001E","zip code tabulation area"],
                       ["ZCTA5 00601","5397","00601"],
                       ["ZCTA5 00602",null,"00602"]]"#;
        let t = parse_table(body).unwrap();
        assert_eq!(t.header.len(), 3);
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[1][1], None);
        assert_eq!(t.column_index("zip code tabulation area"), Some(2));
    }

    #[test]
    fn numbers_become_strings() {
        let t = parse_table(r#"[["A"],[12.5],[-1]]"#).unwrap();
        assert_eq!(t.rows[0][0].as_deref(), Some("12.5"));
        assert_eq!(t.rows[1][0].as_deref(), Some("-1"));
    }

    #[test]
    fn empty_body_is_empty_table() {
        assert!(parse_table("").unwrap().is_empty());
        assert!(parse_table("  \n").unwrap().is_empty());
        assert!(parse_table("[]").unwrap().is_empty());
    }

    #[test]
    fn ragged_rows_rejected() {
        let err = parse_table(r#"[["A","B"],["1"]]"#).unwrap_err();
        assert!(matches!(err, HttpError::Decode(_)));
    }

    #[test]
    fn html_error_page_rejected() {
        assert!(parse_table("<html>error: unknown variable</html>").is_err());
    }

    #[test]
    fn variables_doc() {
        let body = r#"{"variables":{
            "NAME":{"label":"Geographic Area Name"},
            "DP02_0001E":{"label":"x","predicateType":"int"}}}"#;
        let vars = parse_variables(body).unwrap();
        assert!(vars.contains("NAME"));
        assert!(vars.contains("DP02_0001E"));
        assert_eq!(vars.len(), 2);
    }
}
