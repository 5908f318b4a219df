//! Per-ID retry loop.
//!
//! [`resolve_entry`] drives one ID through repeated fetch attempts until a
//! terminal outcome is reached or the attempt budget of the
//! [`BackoffPolicy`] is spent.
//!
//! # State machine
//!
//! ```text
//! START -> Success | NotFound | Fatal                      (1 attempt)
//! START -> Retryable -> ... -> Success | NotFound | Fatal | Exhausted
//! ```
//!
//! Only [`FetchOutcome::Retryable`] advances the [`RetrySession`]. The
//! three permanent outcomes end the loop at once, so "entry does not exist"
//! and "request is wrong" never cost a backoff sleep.

use std::fmt;
use std::time::Duration;

use tracing::{info, instrument, warn};

use super::backoff::BackoffPolicy;
use super::client::EntryFetcher;
use super::outcome::{FatalReason, FetchOutcome, RetryReason};
use super::record::{CatalogRecord, EntryId};

/// Ephemeral retry state for one ID. Never shared across IDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySession {
    attempt_count: u32,
    current_backoff: Duration,
}

impl RetrySession {
    /// Starts a session at attempt 0 with the policy's base delay.
    #[must_use]
    pub fn new(policy: &BackoffPolicy) -> Self {
        Self {
            attempt_count: 0,
            current_backoff: policy.next_delay(0),
        }
    }

    /// Retryable outcomes seen so far.
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Delay to sleep after the next retryable outcome.
    #[must_use]
    pub fn current_backoff(&self) -> Duration {
        self.current_backoff
    }

    /// Records one retryable outcome and moves to the next delay.
    pub fn advance(&mut self, policy: &BackoffPolicy) {
        self.attempt_count += 1;
        self.current_backoff = policy.next_delay(self.attempt_count);
    }

    /// Returns `true` once the attempt budget is spent.
    #[must_use]
    pub fn is_exhausted(&self, policy: &BackoffPolicy) -> bool {
        self.attempt_count >= policy.max_attempts()
    }
}

/// How an ID was finally resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminal {
    /// The entry was fetched; its record goes to the store.
    Saved(CatalogRecord),
    /// The entry does not exist.
    NotFound,
    /// The server answered with an unexpected status.
    Fatal(FatalReason),
    /// Every allowed attempt failed with a retryable outcome.
    Exhausted(RetryReason),
}

impl Terminal {
    /// Short label used in logs and the skip log.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Saved(_) => "saved",
            Self::NotFound => "not_found",
            Self::Fatal(_) => "fatal",
            Self::Exhausted(_) => "exhausted",
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saved(record) => write!(f, "saved {}", record.display_title()),
            Self::NotFound => f.write_str("not found"),
            Self::Fatal(reason) => write!(f, "fatal: {reason}"),
            Self::Exhausted(reason) => write!(f, "gave up: {reason}"),
        }
    }
}

/// Resolution of one ID together with what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryResolution {
    /// The ID that was resolved.
    pub id: EntryId,
    /// Terminal state reached.
    pub terminal: Terminal,
    /// Number of fetch calls made.
    pub fetch_calls: u32,
    /// Total time slept in backoff.
    pub backoff_total: Duration,
}

impl EntryResolution {
    /// Retries performed (fetch calls beyond the first).
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.fetch_calls.saturating_sub(1)
    }
}

/// Resolves one ID to a terminal state.
///
/// Algorithm:
/// 1. Fetch.
/// 2. Success, NotFound or Fatal: return immediately.
/// 3. Retryable: sleep the session's current backoff, advance the session,
///    and stop with [`Terminal::Exhausted`] once `max_attempts` retryable
///    outcomes have been seen; otherwise go back to 1.
#[instrument(level = "debug", skip(fetcher, policy), fields(max_attempts = policy.max_attempts()))]
pub async fn resolve_entry(
    fetcher: &dyn EntryFetcher,
    id: EntryId,
    policy: &BackoffPolicy,
) -> EntryResolution {
    let mut session = RetrySession::new(policy);
    let mut fetch_calls = 0u32;
    let mut backoff_total = Duration::ZERO;

    let terminal = loop {
        fetch_calls += 1;

        match fetcher.fetch(id).await {
            FetchOutcome::Success(record) => {
                info!(id, title = %record.display_title(), "saved entry");
                break Terminal::Saved(record);
            }
            FetchOutcome::NotFound => {
                info!(id, "entry not found, skipping");
                break Terminal::NotFound;
            }
            FetchOutcome::Fatal(reason) => {
                warn!(id, status = reason.status, body = %reason.body, "unexpected status, skipping");
                break Terminal::Fatal(reason);
            }
            FetchOutcome::Retryable(reason) => {
                let delay = session.current_backoff();
                warn!(
                    id,
                    attempt = session.attempt_count() + 1,
                    max_attempts = policy.max_attempts(),
                    delay_ms = delay.as_millis(),
                    %reason,
                    "retryable failure, backing off"
                );
                tokio::time::sleep(delay).await;
                backoff_total += delay;
                session.advance(policy);

                if session.is_exhausted(policy) {
                    warn!(
                        id,
                        attempts = session.attempt_count(),
                        %reason,
                        "retries exhausted, giving up on entry"
                    );
                    break Terminal::Exhausted(reason);
                }
            }
        }
    };

    EntryResolution {
        id,
        terminal,
        fetch_calls,
        backoff_total,
    }
}
