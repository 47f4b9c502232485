//! Typed error hierarchy for the issue pipeline.
//!
//! `FetchError` covers everything that can go wrong while talking to the
//! GitHub API. The pipeline converts it to a user-facing message at its
//! boundary via [`FetchError::user_message`], so callers never see it raw.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from a single outbound request (or the whole fetch cycle).
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("HTTP {status}: {reason}")]
    Status {
        status: u16,
        reason: String,
        /// Epoch seconds from the `x-ratelimit-reset` header, when present.
        rate_limit_reset: Option<i64>,
    },

    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("GitHub token not configured")]
    NotConfigured,
}

/// User-facing classification of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotConfigured,
    Authentication,
    RateLimited,
    Timeout,
    Other,
}

impl FetchError {
    /// HTTP status carried by this error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 4xx responses are terminal: retrying cannot change the answer.
    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(400..=499))
    }

    /// Default retry predicate: timeouts, network failures and non-4xx statuses.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Network(_) => true,
            FetchError::Status { .. } => !self.is_client_error(),
            FetchError::Decode { .. } | FetchError::InvalidUrl(_) | FetchError::NotConfigured => {
                false
            }
        }
    }

    /// Errors that invalidate every page of a cycle, not just the one that saw them.
    pub fn aborts_cycle(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Authentication | ErrorCategory::RateLimited
        )
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            FetchError::NotConfigured => ErrorCategory::NotConfigured,
            FetchError::Status { status: 401, .. } => ErrorCategory::Authentication,
            FetchError::Status { status: 403, .. } => ErrorCategory::RateLimited,
            FetchError::Timeout(_) => ErrorCategory::Timeout,
            _ => ErrorCategory::Other,
        }
    }

    /// Message shown to the user in place of (or next to) the issue list.
    pub fn user_message(&self) -> String {
        match self.category() {
            ErrorCategory::NotConfigured => {
                "GitHub token not configured. Set GITHUB_PAT or GITHUB_TOKEN in your environment."
                    .to_string()
            }
            ErrorCategory::Authentication => {
                "Authentication failed. Please check your GitHub token.".to_string()
            }
            ErrorCategory::RateLimited => match self.rate_limit_reset_at() {
                Some(at) => format!(
                    "Rate limit exceeded. Resets at {} UTC.",
                    at.format("%H:%M:%S")
                ),
                None => "Rate limit exceeded. Please try again in a few minutes.".to_string(),
            },
            ErrorCategory::Timeout => "Request timed out. Please try again.".to_string(),
            ErrorCategory::Other => self.to_string(),
        }
    }

    fn rate_limit_reset_at(&self) -> Option<DateTime<Utc>> {
        match self {
            FetchError::Status {
                rate_limit_reset: Some(epoch),
                ..
            } => DateTime::from_timestamp(*epoch, 0),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(Duration::ZERO)
        } else {
            FetchError::Network(err.to_string())
        }
    }
}
