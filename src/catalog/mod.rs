//! Ingestion engine for the remote catalog.
//!
//! This module walks a numeric ID space against a rate-limited API and
//! persists every entry it finds.
//!
//! # Features
//!
//! - One authenticated GET per attempt, classified into a [`FetchOutcome`]
//! - Exponential backoff with a capped, configurable schedule
//! - "Not found" and "unexpected status" are never retried
//! - Fixed pacing between IDs on top of any backoff
//! - Append-only CSV store flushed after every row, with optional skip log
//! - Optional resume after the last persisted ID and bounded concurrency
//!
//! # Example
//!
//! ```no_run
//! use harvester_core::catalog::{CatalogClient, ClientSettings, FetchOutcome};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CatalogClient::new(ClientSettings::new("client-id"))?;
//! match client.fetch_entry(1).await {
//!     FetchOutcome::Success(record) => println!("{}", record.display_title()),
//!     other => println!("no record: {other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

mod backoff;
mod client;
pub mod constants;
mod error;
mod outcome;
mod record;
mod retry;
mod sink;
mod walker;

pub use backoff::{BackoffPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY};
pub use client::{CatalogClient, ClientSettings, EntryFetcher, StatusClass, classify_status};
pub use error::{ClientError, SinkError, WalkError};
pub use outcome::{FatalReason, FetchOutcome, RetryReason};
pub use record::{CatalogRecord, EntryId, Genre, Genres, STORE_HEADER};
pub use retry::{EntryResolution, RetrySession, Terminal, resolve_entry};
pub use sink::{CsvSink, ResultSink, SKIP_LOG_HEADER, SkipReason, StoreMode, last_persisted_id};
pub use walker::{
    CatalogWalker, DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY, WalkStats, WalkSummary,
};
