//! Rate limiting and retry logic for external API calls
//!
//! Every provider client owns a [`RateLimitedClient`] sized to the provider's
//! published limits. Catalog lookups are wrapped in [`retry_async`], which
//! only retries failures classified as transient by [`UpstreamError`].

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{Client, Method, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Non-success responses from an upstream API
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{service} rate limit exceeded (429)")]
    RateLimited { service: &'static str },

    #[error("{service} rejected the credentials (401)")]
    Unauthorized { service: &'static str },

    #[error("{service} resource not found (404)")]
    NotFound { service: &'static str },

    #[error("{service} request failed with status {status}")]
    Status { service: &'static str, status: u16 },
}

impl UpstreamError {
    /// Map a response status to an error, or `None` on success
    pub fn from_status(service: &'static str, status: reqwest::StatusCode) -> Option<Self> {
        if status.is_success() {
            return None;
        }
        Some(match status.as_u16() {
            429 => UpstreamError::RateLimited { service },
            401 => UpstreamError::Unauthorized { service },
            404 => UpstreamError::NotFound { service },
            other => UpstreamError::Status {
                service,
                status: other,
            },
        })
    }

    /// 429, 408 and 5xx are worth retrying; other statuses are final
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::RateLimited { .. } => true,
            UpstreamError::Status { status, .. } => *status == 408 || (500..600).contains(status),
            _ => false,
        }
    }
}

/// Whether an error from a provider call should be retried.
///
/// Transport errors (timeouts, connection resets) are retried; upstream
/// statuses follow [`UpstreamError::is_transient`]; anything else (such as a
/// JSON parse failure) is final.
pub fn is_retryable(err: &anyhow::Error) -> bool {
    if let Some(upstream) = err.downcast_ref::<UpstreamError>() {
        return upstream.is_transient();
    }
    err.chain()
        .any(|cause| cause.downcast_ref::<reqwest::Error>().is_some_and(|e| e.is_timeout() || e.is_connect()))
}

/// Configuration for rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    pub requests_per_second: u32,
    /// Burst capacity (allows short bursts above the rate)
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2,
            burst_size: 5,
        }
    }
}

/// A rate-limited HTTP client wrapper
pub struct RateLimitedClient {
    client: Client,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    name: &'static str,
}

impl RateLimitedClient {
    /// Create a new rate-limited client
    pub fn new(name: &'static str, config: RateLimitConfig) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));

        let client = Client::builder()
            .user_agent(concat!("traktdb/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| {
                warn!(client = name, error = %e, "Falling back to default HTTP client");
                Client::new()
            });

        Self {
            client,
            limiter: Arc::new(RateLimiter::direct(quota)),
            name,
        }
    }

    /// Create a client for TMDB API
    pub fn for_tmdb() -> Self {
        // TMDB allows ~40 requests per 10 seconds, so ~4/sec with burst of 10
        Self::new(
            "tmdb",
            RateLimitConfig {
                requests_per_second: 4,
                burst_size: 10,
            },
        )
    }

    /// Create a client for Trakt API
    pub fn for_trakt() -> Self {
        // Trakt allows 1000 GET calls per 5 minutes per user
        Self::new(
            "trakt",
            RateLimitConfig {
                requests_per_second: 3,
                burst_size: 10,
            },
        )
    }

    pub fn for_google_books() -> Self {
        Self::new(
            "google_books",
            RateLimitConfig {
                requests_per_second: 5,
                burst_size: 10,
            },
        )
    }

    /// Create a client for the iTunes Search API
    pub fn for_itunes() -> Self {
        // Apple documents roughly 20 calls per minute
        Self::new(
            "itunes",
            RateLimitConfig {
                requests_per_second: 1,
                burst_size: 5,
            },
        )
    }

    pub fn for_listen_notes() -> Self {
        Self::new(
            "listen_notes",
            RateLimitConfig {
                requests_per_second: 2,
                burst_size: 5,
            },
        )
    }

    /// Create a client for RSS feed fetching (more lenient)
    pub fn for_rss() -> Self {
        Self::new(
            "rss",
            RateLimitConfig {
                requests_per_second: 5,
                burst_size: 10,
            },
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for rate limit and make a GET request with headers and query parameters
    pub async fn get_with_headers_and_query<T: Serialize + ?Sized>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        query: &T,
    ) -> Result<Response> {
        self.wait_for_permit().await;
        debug!(client = %self.name, url = %url, "Making rate-limited GET request");

        let mut request = self.client.get(url);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }
        request
            .query(query)
            .send()
            .await
            .context("HTTP request failed")
    }

    /// Rate-limited GET that fails on non-success statuses and decodes JSON
    pub async fn get_json<R, Q>(&self, url: &str, headers: &[(&str, &str)], query: &Q) -> Result<R>
    where
        R: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let response = self.get_with_headers_and_query(url, headers, query).await?;

        if let Some(err) = UpstreamError::from_status(self.name, response.status()) {
            if matches!(err, UpstreamError::RateLimited { .. }) {
                warn!(client = %self.name, "Rate limit hit");
            }
            return Err(err.into());
        }

        response
            .json::<R>()
            .await
            .with_context(|| format!("Failed to parse {} response", self.name))
    }

    /// Rate-limited request with a JSON body
    pub async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, &str)],
        body: &B,
    ) -> Result<Response> {
        self.wait_for_permit().await;
        debug!(client = %self.name, method = %method, url = %url, "Making rate-limited request");

        let mut request = self.client.request(method, url);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }
        request
            .json(body)
            .send()
            .await
            .context("HTTP request failed")
    }

    /// Get a reference to the underlying client for custom requests
    /// (caller is responsible for calling wait_for_permit first)
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Wait for a rate limit permit
    pub async fn wait_for_permit(&self) {
        self.limiter.until_ready().await;
    }
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_interval: Duration,
    /// Maximum backoff duration
    pub max_interval: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create an ExponentialBackoff from this config
    pub fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        }
    }
}

/// Execute an async operation, retrying transient failures with backoff
pub async fn retry_async<T, Fut, F>(
    operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempts = 0;
    let mut backoff = config.to_backoff();

    loop {
        attempts += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) => {
                if attempts >= config.max_retries {
                    warn!(
                        operation = %operation_name,
                        attempts = attempts,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                match backoff.next_backoff() {
                    Some(duration) => {
                        warn!(
                            operation = %operation_name,
                            attempt = attempts,
                            error = %e,
                            retry_in_ms = duration.as_millis() as u64,
                            "Operation failed, retrying"
                        );
                        tokio::time::sleep(duration).await;
                    }
                    None => return Err(e),
                }
            }
        }
    }
}
