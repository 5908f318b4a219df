//! Client id loading.
//!
//! The API client id lives in a plaintext file holding a single line. The
//! value is trimmed and never logged.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

/// Default location of the client id file, relative to the working directory.
pub const DEFAULT_CLIENT_ID_FILE: &str = "auth";

/// Errors raised while loading the client id.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// The file could not be read.
    #[error("cannot read client id file {path}: {source}")]
    Unreadable {
        /// The credential file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file holds nothing but whitespace.
    #[error("client id file {path} is empty")]
    Empty {
        /// The credential file.
        path: PathBuf,
    },
}

/// Reads and trims the client id stored at `path`.
///
/// # Errors
///
/// Returns [`CredentialsError::Unreadable`] if the file cannot be read and
/// [`CredentialsError::Empty`] if it contains only whitespace.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_client_id(path: impl AsRef<Path>) -> Result<String, CredentialsError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| CredentialsError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let client_id = raw.trim();
    if client_id.is_empty() {
        return Err(CredentialsError::Empty {
            path: path.to_path_buf(),
        });
    }

    debug!(len = client_id.len(), "client id loaded");
    Ok(client_id.to_string())
}
