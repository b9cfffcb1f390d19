//! Marketplace API error classification
//!
//! Converts transport failures and non-2xx responses into a typed error
//! so callers can decide between an immediate retry, a long rate-limit
//! backoff, or absorbing the failure into the next watch cycle.

use std::time::Duration;
use thiserror::Error;

/// Typed error for all marketplace API traffic
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// HTTP 403 — access denied; the backend expects a long pause
    #[error("403 access denied")]
    Forbidden,

    /// HTTP 429 — too many requests; the backend expects a longer pause
    #[error("429 rate limited")]
    RateLimited,

    /// Anti-bot challenge page instead of a JSON response
    #[error("challenge page received, not a JSON response")]
    Challenge,

    /// Network-level failure (timeout, DNS, connection reset)
    #[error("network error: {0}")]
    Network(String),

    /// Any other non-2xx response
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Response body did not have the expected shape
    #[error("malformed response: {0}")]
    Parse(String),

    /// Sign-in / challenge-signing failure. Fatal to the current
    /// re-authentication attempt; never retried internally.
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl ApiError {
    /// Classify a non-2xx response
    pub fn from_response(status: u16, body: &str) -> Self {
        match status {
            403 => ApiError::Forbidden,
            429 => ApiError::RateLimited,
            503 if looks_like_challenge(body) => ApiError::Challenge,
            _ => ApiError::Http {
                status,
                body: truncate(body, 300),
            },
        }
    }

    /// Classify a reqwest transport error
    pub fn from_network(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Network("request timed out".to_string())
        } else if err.is_connect() {
            ApiError::Network("connection failed".to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }

    /// Whether a short exponential-backoff retry is appropriate.
    /// Rate-limit responses are deliberately excluded: those get a single
    /// long global pause via [`ApiError::backoff`] instead.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Challenge)
    }

    /// Mandatory global pause before the next request, if any.
    pub fn backoff(&self) -> Option<Duration> {
        match self {
            ApiError::Forbidden => Some(Duration::from_secs(30)),
            ApiError::RateLimited => Some(Duration::from_secs(120)),
            _ => None,
        }
    }
}

fn looks_like_challenge(body: &str) -> bool {
    body.contains("cf-challenge") || body.contains("Just a moment")
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let end = s
            .char_indices()
            .take_while(|(i, _)| *i < max)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &s[..end])
    }
}
