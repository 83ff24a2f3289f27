//! HTTP GET with a blocking facade and error classification.
//!
//! Uses async reqwest internally on a shared tokio runtime, but presents a
//! sync interface: the pipelines issue exactly one request at a time.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::retry::{Disposition, Retryable};

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Whole-request timeout (the Census API can take a while on large geographies)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest response excerpt carried in an error message
const ERROR_SNIPPET_CHARS: usize = 200;

/// Error types for HTTP operations
#[derive(Debug)]
pub enum HttpError {
    /// Server answered with a non-success status
    Status {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },
    /// No usable response: connect failure, connection reset, timeout
    Transport { message: String, timed_out: bool },
    /// Response arrived but its body could not be interpreted
    Decode(String),
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status {
                status, message, ..
            } => write!(f, "HTTP {status}: {message}"),
            Self::Transport {
                message,
                timed_out: true,
            } => write!(f, "timed out: {message}"),
            Self::Transport { message, .. } => write!(f, "HTTP error: {message}"),
            Self::Decode(message) => write!(f, "invalid response: {message}"),
        }
    }
}

impl std::error::Error for HttpError {}

impl HttpError {
    /// Create error from reqwest error, dropping the URL (it carries the API key)
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        let e = e.without_url();
        match e.status() {
            Some(status) => Self::Status {
                status: status.as_u16(),
                message: e.to_string(),
                retry_after: None,
            },
            None => Self::Transport {
                timed_out: e.is_timeout(),
                message: e.to_string(),
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }

    /// 5xx and transport failures (including client-side timeouts) are
    /// worth another attempt; every 4xx status is final
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => matches!(status, 500..=599),
            Self::Transport { .. } => true,
            Self::Decode(_) => false,
        }
    }
}

impl Retryable for HttpError {
    fn disposition(&self) -> Disposition {
        match self {
            Self::Status {
                status: 429,
                retry_after,
                ..
            } => Disposition::RateLimited(*retry_after),
            e if e.is_retryable() => Disposition::Retry,
            _ => Disposition::Fail,
        }
    }
}

/// Timeouts applied to every request
#[derive(Debug, Clone, Copy)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

/// Build an HTTP client with the given timeouts.
pub fn build_client(settings: &HttpSettings) -> Result<reqwest::Client, HttpError> {
    reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout)
        .user_agent(concat!("censusline/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(HttpError::from_reqwest)
}

/// Shared tokio runtime for HTTP and object storage operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// A fully read response, successful or not
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// `x-ratelimit-*` headers, lower-cased names
    pub rate_limit: BTreeMap<String, String>,
    pub retry_after: Option<Duration>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into an [`HttpError::Status`]
    pub fn into_result(self) -> Result<Self, HttpError> {
        if self.is_success() {
            return Ok(self);
        }
        let snippet: String = self.body.chars().take(ERROR_SNIPPET_CHARS).collect();
        Err(HttpError::Status {
            status: self.status,
            message: snippet.trim().to_string(),
            retry_after: self.retry_after,
        })
    }
}

/// Blocking GET. Only transport failures are errors here; the caller
/// decides what to do with the status via [`HttpResponse::into_result`].
///
/// `now` resolves an HTTP-date `Retry-After` into a wait.
pub fn send_get(
    client: &reqwest::Client,
    url: &str,
    query: &[(String, String)],
    now: DateTime<Utc>,
) -> Result<HttpResponse, HttpError> {
    SHARED_RUNTIME.block_on(async {
        let response = client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(HttpError::from_reqwest)?;

        let status = response.status().as_u16();
        let headers = response.headers();
        let rate_limit = headers
            .iter()
            .filter(|(name, _)| name.as_str().starts_with("x-ratelimit"))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let retry_after = headers
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, now));

        let body = response.text().await.map_err(HttpError::from_reqwest)?;
        Ok(HttpResponse {
            status,
            body,
            rate_limit,
            retry_after,
        })
    })
}

/// `Retry-After` as delta-seconds or as an HTTP date relative to `now`.
/// A date already past yields `None`, leaving the wait to the backoff.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    (at - now).to_std().ok().filter(|d| !d.is_zero())
}
