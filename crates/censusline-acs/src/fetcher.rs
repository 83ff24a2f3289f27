//! Paginated, quota-guarded fetch of one ACS product.
//!
//! Every request goes through the same path:
//!
//! 1. wait until the usage ledger admits another call
//! 2. GET through the transport
//! 3. on success, record the call; on failure, classify and maybe retry
//!
//! Transient failures (5xx, timeouts, dropped connections) are retried
//! with exponential backoff up to the policy's attempt budget. HTTP 429
//! waits and retries without spending an attempt. Anything else, every
//! other 4xx included, fails the page immediately.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use censusline_core::{
    Clock, Disposition, HttpError, RetryError, RetryPolicy, Retryable, retry_with_backoff,
};
use censusline_ledger::UsageLedger;
use indicatif::ProgressBar;

use crate::api::{CensusTransport, RawTable, parse_table, parse_variables};
use crate::dataset::Dataset;
use crate::geography::{GeographyLevel, PageParams};
use crate::product::Product;

pub const DEFAULT_BASE_URL: &str = "https://api.census.gov/data";

/// Why a page could not be fetched.
#[derive(Debug)]
pub enum FetchError {
    /// Retries (or rate-limit waits) exhausted
    Transient {
        page: String,
        attempts: u32,
        source: HttpError,
    },
    /// Not worth retrying: 4xx, undecodable body
    Permanent { page: String, source: HttpError },
    /// Usage ledger could not be read or written
    Ledger { page: String, source: anyhow::Error },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient {
                page,
                attempts,
                source,
            } => write!(f, "page {page} failed after {attempts} attempts: {source}"),
            Self::Permanent { page, source } => write!(f, "page {page} failed: {source}"),
            Self::Ledger { page, source } => {
                write!(f, "page {page}: usage ledger error: {source:#}")
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transient { source, .. } | Self::Permanent { source, .. } => Some(source),
            Self::Ledger { source, .. } => Some(&**source),
        }
    }
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Gave up because the API kept answering 429
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Transient { source, .. } if source.is_rate_limited())
    }

    pub fn page(&self) -> &str {
        match self {
            Self::Transient { page, .. }
            | Self::Permanent { page, .. }
            | Self::Ledger { page, .. } => page,
        }
    }
}

/// Failure of a single attempt inside the retry loop
#[derive(Debug)]
enum AttemptError {
    Http(HttpError),
    Ledger(anyhow::Error),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(e) => write!(f, "{e}"),
            Self::Ledger(e) => write!(f, "{e:#}"),
        }
    }
}

impl Retryable for AttemptError {
    fn disposition(&self) -> Disposition {
        match self {
            Self::Http(e) => e.disposition(),
            Self::Ledger(_) => Disposition::Fail,
        }
    }
}

fn into_fetch_error(page: String, err: RetryError<AttemptError>) -> FetchError {
    let attempts = err.attempts();
    let transient = !matches!(err, RetryError::Fatal { .. });
    match err.into_inner() {
        AttemptError::Ledger(source) => FetchError::Ledger { page, source },
        AttemptError::Http(source) if transient => FetchError::Transient {
            page,
            attempts,
            source,
        },
        AttemptError::Http(source) => FetchError::Permanent { page, source },
    }
}

/// Issues Census API requests for one pipeline run.
pub struct Fetcher<'a> {
    transport: &'a dyn CensusTransport,
    ledger: &'a UsageLedger,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    base_url: String,
    page_delay: Duration,
    split_failed_pages: bool,
}

impl<'a> Fetcher<'a> {
    pub fn new(
        transport: &'a dyn CensusTransport,
        ledger: &'a UsageLedger,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            ledger,
            clock,
            policy: RetryPolicy::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            page_delay: Duration::ZERO,
            split_failed_pages: true,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Pause between consecutive pages.
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Re-issue a multi-value page one value at a time after transient failure.
    pub fn with_split_failed_pages(mut self, split: bool) -> Self {
        self.split_failed_pages = split;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(
        &self,
        label: &str,
        url: &str,
        params: &[(String, String)],
    ) -> Result<String, FetchError> {
        retry_with_backoff(label, &self.policy, self.clock.as_ref(), |_attempt| {
            self.ledger.wait_for_quota().map_err(AttemptError::Ledger)?;
            let body = self.transport.get(url, params).map_err(AttemptError::Http)?;
            self.ledger.record_call().map_err(AttemptError::Ledger)?;
            Ok(body)
        })
        .map_err(|e| into_fetch_error(label.to_string(), e))
    }

    /// Variables the product's dataset publishes for `year`.
    pub fn available_variables(
        &self,
        year: u16,
        product: &Product,
    ) -> Result<HashSet<String>, FetchError> {
        let url = format!("{}/variables.json", product.endpoint(&self.base_url, year));
        let label = format!("{} variables.json", product.name);
        let body = self.request(&label, &url, &[])?;
        parse_variables(&body).map_err(|source| FetchError::Permanent {
            page: label,
            source,
        })
    }

    fn fetch_page(
        &self,
        year: u16,
        product: &Product,
        page: &PageParams,
    ) -> Result<RawTable, FetchError> {
        let url = product.endpoint(&self.base_url, year);
        let mut params = vec![("get".to_string(), product.request_variables().join(","))];
        params.extend(page.query());
        let label = format!("{} {page}", product.name);
        let body = self.request(&label, &url, &params)?;
        parse_table(&body).map_err(|source| FetchError::Permanent {
            page: label,
            source,
        })
    }

    fn append(
        &self,
        dataset: &mut Dataset,
        product: &Product,
        page: &PageParams,
        table: &RawTable,
    ) -> Result<(), FetchError> {
        let n = dataset
            .append_page(table)
            .map_err(|msg| FetchError::Permanent {
                page: format!("{} {page}", product.name),
                source: HttpError::Decode(msg),
            })?;
        log::debug!("{} {page}: {n} rows", product.name);
        Ok(())
    }

    fn pause(&self) {
        if !self.page_delay.is_zero() {
            self.clock.sleep(self.page_delay);
        }
    }

    /// Fetch every page of `product` into one dataset.
    pub fn fetch(
        &self,
        level: GeographyLevel,
        year: u16,
        product: &Product,
        pages: &[PageParams],
    ) -> Result<Dataset, FetchError> {
        self.fetch_with_progress(level, year, product, pages, &ProgressBar::hidden())
    }

    pub fn fetch_with_progress(
        &self,
        level: GeographyLevel,
        year: u16,
        product: &Product,
        pages: &[PageParams],
        pb: &ProgressBar,
    ) -> Result<Dataset, FetchError> {
        let mut dataset = Dataset::new(level, year, product.request_variables());
        self.fetch_into(&mut dataset, product, pages, pb)?;
        Ok(dataset)
    }

    /// Fetch every page of `product` into `dataset`, whose level and year
    /// select the geography and vintage.
    ///
    /// Only `product`'s variables are requested; dataset columns the API
    /// does not return stay empty.
    pub fn fetch_into(
        &self,
        dataset: &mut Dataset,
        product: &Product,
        pages: &[PageParams],
        pb: &ProgressBar,
    ) -> Result<(), FetchError> {
        let level = dataset.level();
        let year = dataset.year();
        let mut first = true;

        for page in pages {
            if !first {
                self.pause();
            }
            first = false;

            match self.fetch_page(year, product, page) {
                Ok(table) => self.append(dataset, product, page, &table)?,
                Err(e) if e.is_transient() && !e.is_rate_limited() && self.split_failed_pages => {
                    let Some(parts) = page.split() else {
                        return Err(e);
                    };
                    log::warn!("{e}; retrying {} values one at a time", parts.len());
                    for part in &parts {
                        self.pause();
                        let table = self.fetch_page(year, product, part)?;
                        self.append(dataset, product, part, &table)?;
                        log::info!("{}: recovered {part}", product.name);
                    }
                }
                Err(e) => return Err(e),
            }
            pb.inc(1);
            pb.set_message(format!("{} rows", dataset.len()));
        }

        log::info!(
            "{} {level} {year}: {} rows from {} pages",
            product.name,
            dataset.len(),
            pages.len()
        );
        Ok(())
    }
}
