//! Upstream API access
//!
//! The [`ClearanceApi`] trait is the seam between the harvesting state machine
//! and the network: production code uses [`salling::SallingApi`]; tests drive
//! the harvester with scripted implementations.

use crate::{Store, StoreOffers};
use async_trait::async_trait;

pub mod http;
pub mod parser;
pub mod salling;

/// Fetch errors, classified by retry disposition.
///
/// `RateLimited`, `ServerError`, and `NetworkError` are surfaced only after
/// the client has exhausted its attempt budget; `ClientError` is never
/// retried.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// HTTP 429 persisted through every attempt
    #[error("rate limited after {attempts} attempts")]
    RateLimited {
        /// Attempts made before giving up
        attempts: u32,
    },

    /// HTTP 5xx persisted through every attempt
    #[error("server error {status} after {attempts} attempts")]
    ServerError {
        /// Last observed status code
        status: u16,
        /// Attempts made before giving up
        attempts: u32,
    },

    /// Timeout, connection reset, or other transport failure
    #[error("network error: {0}")]
    NetworkError(String),

    /// Non-retryable 4xx (bad auth or malformed request)
    #[error("client error {status}: {body}")]
    ClientError {
        /// Status code
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },

    /// Response body did not match the expected shape
    #[error("parse error: {0}")]
    ParseError(String),
}

impl FetchError {
    /// Whether the caller may treat this as "no data for this partition"
    /// and continue with the next unit of work.
    pub fn is_partition_skippable(&self) -> bool {
        !matches!(self, FetchError::ClientError { .. })
    }
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Access to the two upstream endpoints the pipeline consumes.
#[async_trait]
pub trait ClearanceApi: Send + Sync {
    /// Fetch the complete store directory.
    ///
    /// Coordinates are already normalized into scalar fields; records missing
    /// required fields have been quarantined at the boundary.
    async fn fetch_all_stores(&self) -> FetchResult<Vec<Store>>;

    /// Fetch the clearance listings for one zip code.
    ///
    /// Returned groups carry `queried_zip_code = zip`. An empty vector means
    /// the zip code currently has no participating stores.
    async fn fetch_clearances(&self, zip: &str) -> FetchResult<Vec<StoreOffers>>;
}
