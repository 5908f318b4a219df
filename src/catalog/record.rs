//! Normalized catalog entry as returned by the remote API and persisted by the sink.

use serde::{Deserialize, Serialize};

/// Numeric identifier of a catalog entry.
pub type EntryId = u64;

/// Column names of the durable store, in row order.
pub const STORE_HEADER: [&str; 6] = ["ID", "TITLE", "SCORE", "MEMBERS", "GENRES", "START_DATE"];

/// One catalog entry.
///
/// Every field is optional because the upstream API may omit any of them.
/// Missing values stay `None` and are written as empty cells; they are never
/// replaced by a placeholder that could pass for real data.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct CatalogRecord {
    /// Entry id as reported by the API.
    pub id: Option<EntryId>,
    /// Display title.
    pub title: Option<String>,
    /// Mean user score (`mean` on the wire).
    #[serde(rename = "mean")]
    pub score: Option<f64>,
    /// Number of users listing the entry (`num_list_users` on the wire).
    #[serde(rename = "num_list_users")]
    pub member_count: Option<u64>,
    /// Genre list, or whatever the API sent when it is not a list of named objects.
    pub genres: Option<Genres>,
    /// Start date as sent by the API (`YYYY`, `YYYY-MM` or `YYYY-MM-DD`).
    pub start_date: Option<String>,
}

/// Genre payload of an entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Genres {
    /// Structured list of `{id, name}` objects.
    List(Vec<Genre>),
    /// Anything else, kept verbatim.
    Raw(serde_json::Value),
}

/// A single named genre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    /// Upstream genre id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Genre name.
    pub name: String,
}

impl CatalogRecord {
    /// Title for log lines, falling back to `<untitled>`.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("<untitled>")
    }

    /// Renders the record as one store row, aligned with [`STORE_HEADER`].
    #[must_use]
    pub fn to_row(&self) -> [String; 6] {
        [
            opt_to_cell(self.id),
            self.title.clone().unwrap_or_default(),
            opt_to_cell(self.score),
            opt_to_cell(self.member_count),
            self.genres.as_ref().map(Genres::to_cell).unwrap_or_default(),
            self.start_date.clone().unwrap_or_default(),
        ]
    }
}

impl Genres {
    /// Serializes the genres for a single CSV cell.
    ///
    /// Lists become compact JSON; raw strings pass through unchanged.
    #[must_use]
    pub fn to_cell(&self) -> String {
        match self {
            Self::List(list) => serde_json::to_string(list).unwrap_or_default(),
            Self::Raw(serde_json::Value::String(raw)) => raw.clone(),
            Self::Raw(serde_json::Value::Null) => String::new(),
            Self::Raw(other) => other.to_string(),
        }
    }

    /// Genre names, when the payload is a structured list.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::List(list) => list.iter().map(|genre| genre.name.as_str()).collect(),
            Self::Raw(_) => Vec::new(),
        }
    }
}

fn opt_to_cell<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
