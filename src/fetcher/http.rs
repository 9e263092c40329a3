//! Salling Group HTTP client
//!
//! Unified client for both upstream endpoints with:
//! - Bearer-token auth supplied once at construction
//! - Retry with exponential backoff (429 / 5xx / network errors)
//! - Exact `Retry-After` honoring on 429 responses
//! - `Link` header pagination support

use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{HarvesterConfig, MAX_BACKOFF_MS};
use crate::fetcher::{FetchError, FetchResult};
use crate::metrics;

/// Compute the wait before the next attempt (0-indexed).
///
/// When the upstream sends an explicit `Retry-After` hint the wait is exactly
/// that many seconds; otherwise exponential backoff from `initial_backoff`,
/// doubling per attempt and capped at [`MAX_BACKOFF_MS`].
pub fn retry_wait(attempt: u32, retry_after_secs: Option<u64>, initial_backoff: Duration) -> Duration {
    if let Some(secs) = retry_after_secs {
        return Duration::from_secs(secs);
    }
    let millis = (initial_backoff.as_millis() as u64).saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(millis.min(MAX_BACKOFF_MS))
}

/// HTTP client for the Salling Group API.
pub struct SallingHttpClient {
    client: Client,
    token: String,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl SallingHttpClient {
    /// Build a client from the run configuration.
    pub fn new(config: &HarvesterConfig) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FetchError::NetworkError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            token: config.token.clone(),
            max_attempts: config.max_attempts,
            initial_backoff: config.initial_backoff,
        })
    }

    /// Execute a GET request and deserialize the response body.
    pub async fn get<T>(&self, url: &str, params: &[(&str, String)]) -> FetchResult<T>
    where
        T: DeserializeOwned,
    {
        self.get_page(url, params).await.map(|(body, _next)| body)
    }

    /// Execute a GET request, returning the body plus the `rel="next"`
    /// pagination link if the upstream sent one.
    ///
    /// Retries on 429 (honoring `Retry-After`), 5xx, and network errors up to
    /// the attempt cap; other 4xx responses fail immediately.
    pub async fn get_page<T>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> FetchResult<(T, Option<String>)>
    where
        T: DeserializeOwned,
    {
        debug!("GET {} with {} params", url, params.len());

        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                metrics::record_retry(url);
            }
            metrics::record_request(url);

            let response = match self
                .client
                .get(url)
                .bearer_auth(&self.token)
                .query(params)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(
                        "Network error on attempt {}/{}: {}",
                        attempt + 1,
                        self.max_attempts,
                        e
                    );
                    last_error = Some(FetchError::NetworkError(e.to_string()));
                    if attempt + 1 < self.max_attempts {
                        let wait = retry_wait(attempt, None, self.initial_backoff);
                        debug!("Retrying after {:?}", wait);
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                metrics::record_rate_limited(url);
                let retry_after = parse_retry_after(response.headers());
                warn!(
                    retry_after = ?retry_after,
                    "Rate limited (429) on attempt {}/{}",
                    attempt + 1,
                    self.max_attempts
                );
                last_error = Some(FetchError::RateLimited {
                    attempts: attempt + 1,
                });
                if attempt + 1 < self.max_attempts {
                    let wait = retry_wait(attempt, retry_after, self.initial_backoff);
                    debug!("Waiting {:?} before retry", wait);
                    tokio::time::sleep(wait).await;
                    continue;
                }
                break;
            }

            if status.is_server_error() {
                warn!(
                    "Server error {} on attempt {}/{}",
                    status,
                    attempt + 1,
                    self.max_attempts
                );
                last_error = Some(FetchError::ServerError {
                    status: status.as_u16(),
                    attempts: attempt + 1,
                });
                if attempt + 1 < self.max_attempts {
                    let wait = retry_wait(attempt, None, self.initial_backoff);
                    debug!("Retrying after {:?}", wait);
                    tokio::time::sleep(wait).await;
                    continue;
                }
                break;
            }

            // 4xx other than 429: bad auth or malformed request, never retried
            if status.is_client_error() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<unreadable body>".to_string());
                return Err(FetchError::ClientError {
                    status: status.as_u16(),
                    body,
                });
            }

            // Grab pagination link before the body consumes the response
            let next = parse_next_link(response.headers());

            return match response.json::<T>().await {
                Ok(body) => {
                    debug!("Request succeeded on attempt {}", attempt + 1);
                    Ok((body, next))
                }
                Err(e) => Err(FetchError::ParseError(format!(
                    "failed to deserialize response from {url}: {e}"
                ))),
            };
        }

        Err(last_error.unwrap_or_else(|| {
            FetchError::NetworkError("all attempts exhausted".to_string())
        }))
    }
}

/// Parse a `Retry-After` header carrying whole seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
}

/// Extract the `rel="next"` URL from a `Link` header, if present.
fn parse_next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(reqwest::header::LINK)?.to_str().ok()?;

    for part in link.split(',') {
        let mut sections = part.split(';');
        let url = sections.next()?.trim();
        let is_next = sections
            .any(|s| s.trim().eq_ignore_ascii_case("rel=\"next\"") || s.trim() == "rel=next");
        if is_next {
            return Some(url.trim_start_matches('<').trim_end_matches('>').to_string());
        }
    }
    None
}
