//! Loading and cleaning the catalog store for analysis.

use std::fmt;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use super::AnalysisError;

/// Genre name used to split the isekai figures.
pub const ISEKAI_GENRE: &str = "Isekai";

const START_DATE_FORMAT: &str = "%Y-%m-%d";

/// One cleaned entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimeRow {
    /// Entry id, if the cell held an integer.
    pub id: Option<u64>,
    /// Title, if non-empty.
    pub title: Option<String>,
    /// Mean score; unparsable values are missing.
    pub score: Option<f64>,
    /// Member count; always finite and positive after cleaning.
    pub members: f64,
    /// Genre names.
    pub genres: Vec<String>,
    /// Start date; partial or invalid dates are missing.
    pub start_date: Option<NaiveDate>,
}

impl AnimeRow {
    /// `ln(members + 1)`.
    #[must_use]
    pub fn log_members(&self) -> f64 {
        (self.members + 1.0).ln()
    }

    /// Returns `true` if any genre name mentions isekai.
    #[must_use]
    pub fn is_isekai(&self) -> bool {
        self.genres.iter().any(|genre| genre.contains(ISEKAI_GENRE))
    }
}

/// Cleaned contents of a catalog store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    rows: Vec<AnimeRow>,
    dropped: usize,
}

impl Dataset {
    /// Loads and cleans the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if the file cannot be read as CSV or lacks
    /// one of the store columns.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| AnalysisError::io(path, e))?;
        let dataset = Self::from_reader(file, path)?;
        info!(
            rows = dataset.len(),
            dropped = dataset.dropped(),
            "dataset loaded"
        );
        Ok(dataset)
    }

    /// Loads and cleans CSV data from any reader; `source` is used in errors.
    ///
    /// # Errors
    ///
    /// Same as [`Dataset::load`].
    pub fn from_reader<R: Read>(reader: R, source: &Path) -> Result<Self, AnalysisError> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = reader
            .headers()
            .map_err(|e| AnalysisError::csv(source, e))?
            .clone();
        let columns = Columns::locate(&headers, source)?;

        let mut rows = Vec::new();
        let mut dropped = 0;
        for record in reader.records() {
            let record = record.map_err(|e| AnalysisError::csv(source, e))?;
            match columns.clean(&record) {
                Some(row) => rows.push(row),
                None => dropped += 1,
            }
        }

        debug!(kept = rows.len(), dropped, "cleaned rows");
        Ok(Self { rows, dropped })
    }

    /// Builds a dataset from already-clean rows.
    #[must_use]
    pub fn from_rows(rows: Vec<AnimeRow>) -> Self {
        Self { rows, dropped: 0 }
    }

    /// Cleaned rows.
    #[must_use]
    pub fn rows(&self) -> &[AnimeRow] {
        &self.rows
    }

    /// Number of cleaned rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if no row survived cleaning.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows removed for missing or non-positive member counts.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Printable preview of the first `n` rows.
    #[must_use]
    pub fn head(&self, n: usize) -> Head<'_> {
        Head {
            rows: &self.rows[..n.min(self.rows.len())],
        }
    }
}

/// Preview table returned by [`Dataset::head`].
#[derive(Debug)]
pub struct Head<'a> {
    rows: &'a [AnimeRow],
}

impl fmt::Display for Head<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>7}  {:<40}  {:>5}  {:>9}  {:<10}  GENRES",
            "ID", "TITLE", "SCORE", "MEMBERS", "START_DATE"
        )?;
        for row in self.rows {
            let title: String = row.title.as_deref().unwrap_or("").chars().take(40).collect();
            writeln!(
                f,
                "{:>7}  {:<40}  {:>5}  {:>9}  {:<10}  {}",
                row.id.map(|id| id.to_string()).unwrap_or_default(),
                title,
                row.score.map(|s| format!("{s:.2}")).unwrap_or_else(|| "NaN".to_string()),
                row.members,
                row.start_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "NaT".to_string()),
                row.genres.join(", ")
            )?;
        }
        Ok(())
    }
}

/// Column positions of the store fields.
struct Columns {
    id: usize,
    title: usize,
    score: usize,
    members: usize,
    genres: usize,
    start_date: usize,
}

impl Columns {
    fn locate(headers: &csv::StringRecord, source: &Path) -> Result<Self, AnalysisError> {
        let find = |name: &'static str| {
            headers
                .iter()
                .position(|header| header.trim() == name)
                .ok_or_else(|| AnalysisError::missing_column(source, name))
        };
        Ok(Self {
            id: find("ID")?,
            title: find("TITLE")?,
            score: find("SCORE")?,
            members: find("MEMBERS")?,
            genres: find("GENRES")?,
            start_date: find("START_DATE")?,
        })
    }

    /// Cleans one record; `None` when the member count is missing or not positive.
    fn clean(&self, record: &csv::StringRecord) -> Option<AnimeRow> {
        let cell = |index: usize| record.get(index).unwrap_or("");

        let members = parse_number(cell(self.members)).filter(|m| *m > 0.0)?;
        let title = cell(self.title);

        Some(AnimeRow {
            id: cell(self.id).trim().parse().ok(),
            title: (!title.is_empty()).then(|| title.to_string()),
            score: parse_number(cell(self.score)),
            members,
            genres: parse_genres(cell(self.genres)),
            start_date: parse_start_date(cell(self.start_date)),
        })
    }
}

/// Coerces a cell to a finite number; anything else is missing.
#[must_use]
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Parses a `YYYY-MM-DD` start date; partial or invalid dates are missing.
#[must_use]
pub fn parse_start_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), START_DATE_FORMAT).ok()
}

/// Extracts genre names from a GENRES cell.
///
/// Accepts the JSON written by the sink as well as single-quoted lists.
/// A bare value without brackets is taken as a single genre
/// name. Unparsable lists yield no genres.
#[must_use]
pub fn parse_genres(raw: &str) -> Vec<String> {
    let normalized = raw.replace('\'', "\"");
    let entry = normalized.trim();

    if entry.is_empty() || entry == "[]" || entry == "{}" {
        return Vec::new();
    }
    if !entry.starts_with('[') && !entry.ends_with(']') {
        return vec![entry.to_string()];
    }

    let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(entry)
    else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            serde_json::Value::Object(object) => object
                .get("name")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
            serde_json::Value::String(name) => Some(name.clone()),
            _ => None,
        })
        .collect()
}
