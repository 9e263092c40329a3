//! Run configuration
//!
//! All upstream credentials, endpoints, and pacing parameters live in an
//! explicit [`HarvesterConfig`] passed to the components that need it; there
//! is no process-wide configuration state.

use std::time::Duration;

/// Default Salling Group API base URL
pub const DEFAULT_API_BASE: &str = "https://api.sallinggroup.com";

/// Maximum attempts per request (initial try plus retries).
/// Five attempts with exponential backoff recovers from transient rate-limit
/// windows without stalling a run on a persistently failing zip code.
pub const MAX_ATTEMPTS: u32 = 5;

/// Initial backoff delay in milliseconds.
/// The upstream's spike protection resets within a couple of seconds; 2s is
/// the smallest delay observed not to re-trigger it.
pub const INITIAL_BACKOFF_MS: u64 = 2_000;

/// Maximum backoff delay in milliseconds.
/// Caps exponential backoff (attempt 5 would otherwise wait 32s).
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Delay between consecutive per-zip requests in milliseconds.
/// Conservative pacing to stay clear of the upstream's spike-protection
/// quarantine; paid between iterations, skipped before the first.
pub const REQUEST_DELAY_MS: u64 = 2_000;

/// Number of zip codes accumulated before a batch is flushed to the sink.
/// Bounds memory and gives the sink incremental write checkpoints.
pub const FLUSH_THRESHOLD_ZIPS: usize = 20;

/// Per-request timeout in milliseconds
pub const REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Page size requested from the store directory endpoint
pub const STORES_PER_PAGE: u32 = 1_000;

/// Explicit configuration for one harvesting run.
///
/// Constructed once at the edge (CLI) and passed by reference into the
/// fetcher and harvester.
#[derive(Debug, Clone)]
pub struct HarvesterConfig {
    /// Bearer token for the Salling Group API
    pub token: String,
    /// API base URL; endpoints are derived from it
    pub api_base: String,
    /// Country filter for the store directory
    pub country: String,
    /// Store directory page size
    pub per_page: u32,
    /// Delay between consecutive per-zip requests
    pub request_delay: Duration,
    /// Maximum attempts per request
    pub max_attempts: u32,
    /// Initial retry backoff
    pub initial_backoff: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Zip codes accumulated per batch before flushing to the sink
    pub flush_threshold: usize,
}

impl HarvesterConfig {
    /// Create a configuration with defaults for everything but the token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            country: "DK".to_string(),
            per_page: STORES_PER_PAGE,
            request_delay: Duration::from_millis(REQUEST_DELAY_MS),
            max_attempts: MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            flush_threshold: FLUSH_THRESHOLD_ZIPS,
        }
    }

    /// Override the API base URL (trailing slash stripped)
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    /// Override the inter-request delay
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Override the attempt cap
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Override the batch flush threshold
    pub fn with_flush_threshold(mut self, zips: usize) -> Self {
        self.flush_threshold = zips.max(1);
        self
    }

    /// Full URL of the store directory endpoint
    pub fn stores_url(&self) -> String {
        format!("{}/v2/stores", self.api_base)
    }

    /// Full URL of the food-waste (clearance) endpoint
    pub fn food_waste_url(&self) -> String {
        format!("{}/v1/food-waste/", self.api_base)
    }
}
