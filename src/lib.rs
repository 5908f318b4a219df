//! Harvester Core Library
//!
//! This library walks the numeric ID space of a public anime catalog API,
//! persists every entry it finds to a CSV store, and turns that store into
//! exploratory charts.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`catalog`] - Fetch client, backoff, per-ID retry loop, walker, CSV sink
//! - [`credentials`] - Client id loading
//! - [`analysis`] - Dataset cleaning and figure rendering

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod analysis;
pub mod catalog;
pub mod credentials;

// Re-export commonly used types
pub use analysis::{AnalysisError, Dataset, PlotKind, render_plot};
pub use catalog::{
    BackoffPolicy, CatalogClient, CatalogRecord, CatalogWalker, ClientSettings, CsvSink,
    EntryFetcher, EntryId, FetchOutcome, ResultSink, StoreMode, WalkStats, WalkSummary,
    last_persisted_id,
};
pub use credentials::{CredentialsError, load_client_id};
