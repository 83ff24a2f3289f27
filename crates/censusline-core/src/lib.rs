//! Censusline Core - Common infrastructure for the Census ACS pipelines
//!
//! This crate provides the pieces shared by every pipeline stage:
//! the blocking HTTP facade, error classification, bounded retry,
//! an injectable clock, logging and progress reporting.

pub mod clock;
pub mod http;
pub mod logging;
pub mod progress;
pub mod retry;

// Re-exports for convenience
pub use clock::{Clock, FakeClock, SystemClock};
pub use http::{HttpError, HttpResponse, HttpSettings, SHARED_RUNTIME, build_client, send_get};
pub use logging::init_logging;
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use retry::{Disposition, RetryError, RetryPolicy, Retryable, retry_with_backoff};
