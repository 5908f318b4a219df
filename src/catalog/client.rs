//! HTTP client for single catalog entries.
//!
//! [`CatalogClient`] performs exactly one GET per call and maps whatever
//! happens onto a [`FetchOutcome`]. It never retries on its own; that is
//! the job of [`super::resolve_entry`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use super::constants::{
    BODY_PREVIEW_LEN, CLIENT_ID_HEADER, CONNECT_TIMEOUT, DEFAULT_BASE_URL, DEFAULT_FIELDS,
    DEFAULT_REQUEST_TIMEOUT,
};
use super::error::ClientError;
use super::outcome::{FatalReason, FetchOutcome, RetryReason};
use super::record::{CatalogRecord, EntryId};

/// User-Agent sent with every request.
const USER_AGENT: &str = concat!("harvester/", env!("CARGO_PKG_VERSION"));

/// Source of fetch outcomes for the retry loop.
///
/// Implemented by [`CatalogClient`] for real traffic and by scripted
/// fetchers in tests.
#[async_trait]
pub trait EntryFetcher: Send + Sync {
    /// Performs one attempt for `id` and classifies the result.
    async fn fetch(&self, id: EntryId) -> FetchOutcome;
}

/// Fixed request parameters for a [`CatalogClient`].
#[derive(Clone)]
pub struct ClientSettings {
    /// Collection endpoint; entries live at `{base_url}/{id}`.
    pub base_url: String,
    /// Comma-separated field list sent as `?fields=`.
    pub fields: String,
    /// Value of the client id header.
    pub client_id: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ClientSettings {
    /// Settings for the public anime endpoint with default fields and timeout.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            fields: DEFAULT_FIELDS.to_string(),
            client_id: client_id.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("base_url", &self.base_url)
            .field("fields", &self.fields)
            .field("client_id", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Classification of an HTTP status for the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 200: decode the body.
    Ok,
    /// 404: entry does not exist.
    NotFound,
    /// 429 or 5xx: retry with backoff.
    Retryable,
    /// Everything else: give up on this ID.
    Fatal,
}

/// Classifies an HTTP status code.
///
/// | Status | Class | Rationale |
/// |--------|-------|-----------|
/// | 200 | Ok | Entry payload follows |
/// | 404 | NotFound | ID has no entry |
/// | 429 | Retryable | Rate limited |
/// | 500-599 | Retryable | Server may recover |
/// | other | Fatal | Request itself is wrong (auth, bad field list, ...) |
#[must_use]
pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200 => StatusClass::Ok,
        404 => StatusClass::NotFound,
        429 | 500..=599 => StatusClass::Retryable,
        _ => StatusClass::Fatal,
    }
}

/// HTTP client for the remote catalog.
///
/// Created once per run and reused for every ID so connections are pooled.
#[derive(Clone)]
pub struct CatalogClient {
    client: Client,
    base_url: Url,
    fields: String,
    client_id: String,
    timeout: Duration,
}

impl fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogClient")
            .field("base_url", &self.base_url.as_str())
            .field("fields", &self.fields)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl CatalogClient {
    /// Builds a client from the given settings.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidBaseUrl`] if the base URL does not parse
    /// or cannot carry path segments, and [`ClientError::Build`] if the
    /// underlying HTTP client cannot be built.
    pub fn new(settings: ClientSettings) -> Result<Self, ClientError> {
        let base_url = Url::parse(&settings.base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ClientError::invalid_base_url(&settings.base_url))?;

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .gzip(true)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| ClientError::Build { source })?;

        Ok(Self {
            client,
            base_url,
            fields: settings.fields,
            client_id: settings.client_id,
            timeout: settings.timeout,
        })
    }

    /// URL of one entry: `{base}/{id}?fields={fields}`.
    #[must_use]
    pub fn entry_url(&self, id: EntryId) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&id.to_string());
        }
        url.set_query(Some(&format!("fields={}", self.fields)));
        url
    }

    /// Performs one request for `id` and classifies the response.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_entry(&self, id: EntryId) -> FetchOutcome {
        let url = self.entry_url(id);
        debug!(url = %url, "requesting entry");

        let response = match self
            .client
            .get(url)
            .header(CLIENT_ID_HEADER, &self.client_id)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => return FetchOutcome::Retryable(retry_reason(&error)),
        };

        let status = response.status().as_u16();
        match classify_status(status) {
            StatusClass::Ok => match response.json::<CatalogRecord>().await {
                Ok(record) => FetchOutcome::Success(record),
                Err(error) => FetchOutcome::Retryable(retry_reason(&error)),
            },
            StatusClass::NotFound => FetchOutcome::NotFound,
            StatusClass::Retryable => {
                FetchOutcome::Retryable(RetryReason::ServerOrRateLimit { status })
            }
            StatusClass::Fatal => {
                let body = response.text().await.unwrap_or_default();
                FetchOutcome::Fatal(FatalReason {
                    status,
                    body: body_preview(&body),
                })
            }
        }
    }
}

#[async_trait]
impl EntryFetcher for CatalogClient {
    async fn fetch(&self, id: EntryId) -> FetchOutcome {
        self.fetch_entry(id).await
    }
}

/// Maps a reqwest failure (send or body read) onto a retry reason.
fn retry_reason(error: &reqwest::Error) -> RetryReason {
    if error.is_timeout() {
        RetryReason::Timeout
    } else if error.is_decode() {
        RetryReason::transport(format!("invalid response body: {error}"))
    } else {
        RetryReason::transport(error.to_string())
    }
}

fn body_preview(body: &str) -> String {
    body.trim().chars().take(BODY_PREVIEW_LEN).collect()
}
