//! Constants for the catalog module (endpoint, timeouts, pacing, backoff).

use std::time::Duration;

/// Default catalog endpoint; entries live at `{base}/{id}`.
pub const DEFAULT_BASE_URL: &str = "https://api.myanimelist.net/v2/anime";

/// Default field list requested for every entry.
pub const DEFAULT_FIELDS: &str = "mean,num_list_users,genres,start_date";

/// Header carrying the client id.
pub const CLIENT_ID_HEADER: &str = "X-MAL-CLIENT-ID";

/// Default exclusive upper bound of the anime ID space.
pub const DEFAULT_ANIME_UPPER_BOUND: u64 = 62_000;

/// Default exclusive upper bound of the manga ID space.
pub const DEFAULT_MANGA_UPPER_BOUND: u64 = 180_000;

/// Default per-request timeout (10 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect timeout applied to the underlying client (10 seconds).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed pause after every ID, independent of backoff (500ms).
pub const DEFAULT_PACING_DELAY: Duration = Duration::from_millis(500);

/// Maximum number of body characters kept in a fatal outcome.
pub const BODY_PREVIEW_LEN: usize = 200;
