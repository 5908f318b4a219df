//! Error types for the catalog module.
//!
//! Fetch failures are not errors (see [`super::FetchOutcome`]). The types here
//! cover the few things that can stop a run: a client that cannot be built,
//! a store that cannot be written, or an invalid walker configuration.

use std::path::PathBuf;

use thiserror::Error;

use super::walker::{MAX_CONCURRENCY, MIN_CONCURRENCY};

/// Errors raised while constructing a [`super::CatalogClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The base URL does not parse or cannot carry path segments.
    #[error("invalid catalog base URL: {url}")]
    InvalidBaseUrl {
        /// The rejected URL string.
        url: String,
    },

    /// The underlying HTTP client failed to build.
    #[error("failed to build HTTP client: {source}")]
    Build {
        /// The reqwest builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl ClientError {
    /// Creates an invalid base URL error.
    pub fn invalid_base_url(url: impl Into<String>) -> Self {
        Self::InvalidBaseUrl { url: url.into() }
    }
}

/// Errors raised by the durable store or the skip log.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Opening, flushing or reading a file failed.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file being accessed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The CSV layer rejected a row.
    #[error("CSV error on {path}: {source}")]
    Csv {
        /// The file being accessed.
        path: PathBuf,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },
}

impl SinkError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a CSV error.
    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}

/// Errors that abort a catalog walk.
#[derive(Debug, Error)]
pub enum WalkError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The sink could not persist a result.
    #[error("result sink failed: {0}")]
    Sink(#[from] SinkError),
}
