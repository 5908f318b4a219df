//! Classified result of a single fetch attempt.
//!
//! A fetch never returns a Rust error. Every response or transport fault is
//! mapped onto a [`FetchOutcome`], and the retry loop decides what to do
//! with it.

use thiserror::Error;

use super::record::CatalogRecord;

/// Result of exactly one request for one entry.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// HTTP 200 with a decodable body.
    Success(CatalogRecord),
    /// HTTP 404. The entry does not exist; permanent and expected.
    NotFound,
    /// Rate limit, server error, timeout or transport fault. Worth retrying.
    Retryable(RetryReason),
    /// Any other status. Permanent and unexpected; never retried.
    Fatal(FatalReason),
}

impl FetchOutcome {
    /// Returns `true` when the retry loop must stop at this outcome.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Retryable(_))
    }
}

/// Why an attempt is worth repeating.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryReason {
    /// HTTP 429 or any 5xx.
    #[error("server/rate-limit (HTTP {status})")]
    ServerOrRateLimit {
        /// The status the server answered with.
        status: u16,
    },

    /// The request did not complete within the configured timeout.
    #[error("timeout")]
    Timeout,

    /// Connection, TLS, or body decoding fault.
    #[error("transport error: {detail}")]
    Transport {
        /// Description of the underlying fault.
        detail: String,
    },
}

impl RetryReason {
    /// Creates a transport reason.
    pub fn transport(detail: impl Into<String>) -> Self {
        Self::Transport {
            detail: detail.into(),
        }
    }
}

/// Why an attempt failed permanently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unexpected status {status}: {body}")]
pub struct FatalReason {
    /// The unexpected HTTP status.
    pub status: u16,
    /// Leading part of the response body.
    pub body: String,
}
