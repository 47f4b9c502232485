//! Outbound HTTP with per-attempt timeout and exponential-backoff retry.
//!
//! [`Transport`] is the network seam: [`ReqwestTransport`] in production,
//! a scripted double in tests. [`HttpClient`] layers a [`RetryPolicy`] on top.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::errors::FetchError;

const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// A fully-read response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    /// Epoch seconds from `x-ratelimit-reset`, when the server sent it.
    pub rate_limit_reset: Option<i64>,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            reason: "OK".to_string(),
            rate_limit_reset: None,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        serde_json::from_str(&self.body).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    fn into_error(self) -> FetchError {
        FetchError::Status {
            status: self.status,
            reason: self.reason,
            rate_limit_reset: self.rate_limit_reset,
        }
    }
}

/// Abstraction over a single GET for testability.
/// Real implementation: `ReqwestTransport`. Test double: `MockTransport`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one GET. Non-2xx statuses are returned as responses, not errors.
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, FetchError>;
}

/// `reqwest`-backed transport.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, FetchError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let resp = request.send().await?;
        let status = resp.status();
        let rate_limit_reset = resp
            .headers()
            .get(RATE_LIMIT_RESET_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok());
        let body = resp.text().await?;

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            rate_limit_reset,
            body,
        })
    }
}

/// Retry/backoff policy for [`HttpClient::fetch_with_retry`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Bound on a single attempt; exceeding it counts as a failed attempt.
    pub attempt_timeout: Duration,
    /// Decides whether a failed attempt is worth retrying.
    pub retryable: fn(&FetchError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(2000),
            attempt_timeout: Duration::from_secs(8),
            retryable: FetchError::is_transient,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt + 1`: `min(base * 2^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// GET client with default headers and a retry policy.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    headers: Vec<(String, String)>,
}

impl HttpClient {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch `url`, retrying transient failures with backoff.
    ///
    /// A non-retryable failure (any 4xx by default) is returned immediately.
    /// Once retries are exhausted the last error is returned.
    pub async fn fetch_with_retry(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let mut attempt = 0;
        loop {
            let err = match self.attempt(url).await {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };

            if attempt >= self.policy.max_retries || !(self.policy.retryable)(&err) {
                return Err(err);
            }

            let delay = self.policy.delay_for(attempt);
            tracing::debug!(
                url,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "request failed, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let timeout = self.policy.attempt_timeout;
        match tokio::time::timeout(timeout, self.transport.get(url, &self.headers)).await {
            Err(_) => Err(FetchError::Timeout(timeout)),
            Ok(Err(FetchError::Timeout(_))) => Err(FetchError::Timeout(timeout)),
            Ok(Err(err)) => Err(err),
            Ok(Ok(resp)) if resp.is_success() => Ok(resp),
            Ok(Ok(resp)) => Err(resp.into_error()),
        }
    }
}
