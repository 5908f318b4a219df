//! Analysis stage: cleans a catalog store and renders exploratory charts.
//!
//! - [`dataset`] - Load the store, coerce numbers and dates, parse genres
//! - [`plot`] - Build named figures and write them as standalone HTML

use std::path::PathBuf;

use thiserror::Error;

pub mod dataset;
pub mod plot;

pub use dataset::{AnimeRow, Dataset};
pub use plot::{Figure, PlotKind, build_figure, render_plot};

/// Errors raised by the analysis stage.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Reading the store or writing a chart failed.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file being accessed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The store is not valid CSV.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// The store file.
        path: PathBuf,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// The store header lacks a required column.
    #[error("{path} has no {column} column")]
    MissingColumn {
        /// The store file.
        path: PathBuf,
        /// The missing column name.
        column: &'static str,
    },
}

impl AnalysisError {
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

    /// Creates a missing column error.
    pub fn missing_column(path: impl Into<PathBuf>, column: &'static str) -> Self {
        Self::MissingColumn {
            path: path.into(),
            column,
        }
    }
}
