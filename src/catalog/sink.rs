//! Durable result sink.
//!
//! [`CsvSink`] appends one row per saved entry to the catalog store and
//! flushes after every row, so a run that is killed keeps everything
//! written so far. Rows arrive in ID order; the sink never reorders,
//! deduplicates, or rewrites them.
//!
//! Optionally, skipped IDs are written to a second CSV file with the reason
//! (`not_found`, `fatal`, `exhausted`, `aborted`), which lets downstream
//! consumers tell missing-by-design from missing-by-failure.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use super::error::SinkError;
use super::outcome::{FatalReason, RetryReason};
use super::record::{CatalogRecord, EntryId, STORE_HEADER};
use super::retry::Terminal;

/// Column names of the skip log.
pub const SKIP_LOG_HEADER: [&str; 3] = ["ID", "REASON", "DETAIL"];

/// Destination for resolved IDs.
pub trait ResultSink: Send {
    /// Persists a fetched record.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the record cannot be written durably.
    fn save(&mut self, record: &CatalogRecord) -> Result<(), SinkError>;

    /// Notes an ID that produced no record. The default does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the skip cannot be written.
    fn skip(&mut self, _id: EntryId, _reason: &SkipReason) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Why an ID produced no row in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The entry does not exist.
    NotFound,
    /// The server answered with an unexpected status.
    Fatal(FatalReason),
    /// Retries ran out.
    Exhausted(RetryReason),
    /// The resolution task died before reaching a terminal state.
    Aborted(String),
}

impl SkipReason {
    /// Builds the skip reason for a terminal state; `None` for saved entries.
    #[must_use]
    pub fn from_terminal(terminal: &Terminal) -> Option<Self> {
        match terminal {
            Terminal::Saved(_) => None,
            Terminal::NotFound => Some(Self::NotFound),
            Terminal::Fatal(reason) => Some(Self::Fatal(reason.clone())),
            Terminal::Exhausted(reason) => Some(Self::Exhausted(reason.clone())),
        }
    }

    /// Machine-readable reason column.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Fatal(_) => "fatal",
            Self::Exhausted(_) => "exhausted",
            Self::Aborted(_) => "aborted",
        }
    }

    /// Free-text detail column.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::NotFound => String::new(),
            Self::Fatal(reason) => reason.to_string(),
            Self::Exhausted(reason) => reason.to_string(),
            Self::Aborted(detail) => detail.clone(),
        }
    }
}

/// How an existing store file is treated when opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Start a fresh file, discarding previous content.
    Truncate,
    /// Keep existing rows and add new ones after them.
    Append,
}

/// CSV-backed sink writing the catalog store and an optional skip log.
#[derive(Debug)]
pub struct CsvSink {
    store: CsvFile,
    skip_log: Option<CsvFile>,
    rows_written: u64,
}

#[derive(Debug)]
struct CsvFile {
    writer: csv::Writer<File>,
    path: PathBuf,
}

impl CsvFile {
    fn open(path: &Path, mode: StoreMode, header: &[&str]) -> Result<Self, SinkError> {
        let mut file = match mode {
            StoreMode::Truncate => File::create(path),
            StoreMode::Append => OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(path),
        }
        .map_err(|e| SinkError::io(path, e))?;

        if mode == StoreMode::Append {
            let dropped = trim_torn_tail(&mut file).map_err(|e| SinkError::io(path, e))?;
            if dropped > 0 {
                warn!(
                    path = %path.display(),
                    bytes = dropped,
                    "dropped incomplete trailing row"
                );
            }
        }

        let is_empty = file.metadata().map_err(|e| SinkError::io(path, e))?.len() == 0;

        let mut csv_file = Self {
            writer: csv::Writer::from_writer(file),
            path: path.to_path_buf(),
        };
        if is_empty {
            debug!(path = %path.display(), "writing header");
            csv_file.write_row(header)?;
        }
        Ok(csv_file)
    }

    /// Writes one row and flushes it to the OS.
    fn write_row<I, T>(&mut self, row: I) -> Result<(), SinkError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer
            .write_record(row)
            .map_err(|e| SinkError::csv(&self.path, e))?;
        self.writer
            .flush()
            .map_err(|e| SinkError::io(&self.path, e))
    }
}

impl CsvSink {
    /// Opens the catalog store at `path`.
    ///
    /// The header row is written when the file is new, empty, or truncated.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the file cannot be opened or the header
    /// cannot be written.
    #[instrument(skip_all, fields(path = %path.as_ref().display(), ?mode))]
    pub fn create(path: impl AsRef<Path>, mode: StoreMode) -> Result<Self, SinkError> {
        let store = CsvFile::open(path.as_ref(), mode, &STORE_HEADER)?;
        info!("catalog store opened");
        Ok(Self {
            store,
            skip_log: None,
            rows_written: 0,
        })
    }

    /// Adds a skip log at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the skip log cannot be opened.
    pub fn with_skip_log(mut self, path: impl AsRef<Path>, mode: StoreMode) -> Result<Self, SinkError> {
        self.skip_log = Some(CsvFile::open(path.as_ref(), mode, &SKIP_LOG_HEADER)?);
        Ok(self)
    }

    /// Path of the catalog store.
    #[must_use]
    pub fn store_path(&self) -> &Path {
        &self.store.path
    }

    /// Data rows written by this sink (header excluded).
    #[must_use]
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

impl ResultSink for CsvSink {
    fn save(&mut self, record: &CatalogRecord) -> Result<(), SinkError> {
        self.store.write_row(record.to_row())?;
        self.rows_written += 1;
        Ok(())
    }

    fn skip(&mut self, id: EntryId, reason: &SkipReason) -> Result<(), SinkError> {
        let Some(skip_log) = self.skip_log.as_mut() else {
            return Ok(());
        };
        skip_log.write_row([id.to_string(), reason.label().to_string(), reason.detail()])
    }
}

/// Whether the last byte of `file` is a newline. Empty files count as
/// complete.
fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Cuts a partially written last row, keeping everything up to and
/// including the final newline. Returns the number of bytes removed.
#[allow(clippy::cast_possible_truncation)]
fn trim_torn_tail(file: &mut File) -> io::Result<u64> {
    const CHUNK: u64 = 4096;

    if ends_with_newline(file)? {
        return Ok(0);
    }

    let len = file.metadata()?.len();
    let mut keep = 0;
    let mut end = len;
    let mut buf = [0u8; CHUNK as usize];
    while end > 0 {
        let start = end.saturating_sub(CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(pos) = chunk.iter().rposition(|byte| *byte == b'\n') {
            keep = start + pos as u64 + 1;
            break;
        }
        end = start;
    }

    file.set_len(keep)?;
    file.seek(SeekFrom::End(0))?;
    Ok(len - keep)
}

/// Highest ID in the `ID` column of an existing CSV file, or `None` if the
/// file is missing or holds no parsable IDs.
///
/// Works on the catalog store and on the skip log. A last row without a
/// terminating newline was cut off mid-write and is ignored.
///
/// # Errors
///
/// Returns [`SinkError`] if the file exists but cannot be read as CSV.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn last_persisted_id(path: impl AsRef<Path>) -> Result<Option<EntryId>, SinkError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }

    let torn = {
        let mut file = File::open(path).map_err(|e| SinkError::io(path, e))?;
        !ends_with_newline(&mut file).map_err(|e| SinkError::io(path, e))?
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| SinkError::csv(path, e))?;

    let id_column = reader
        .headers()
        .map_err(|e| SinkError::csv(path, e))?
        .iter()
        .position(|name| name == STORE_HEADER[0]);
    let Some(id_column) = id_column else {
        return Ok(None);
    };

    // The newest row is held back until the next one proves it complete.
    let mut last: Option<EntryId> = None;
    let mut newest: Option<EntryId> = None;
    for row in reader.records() {
        let row = row.map_err(|e| SinkError::csv(path, e))?;
        last = last.max(newest);
        newest = row
            .get(id_column)
            .and_then(|cell| cell.trim().parse::<EntryId>().ok());
    }
    if torn {
        debug!(ignored = ?newest, "last row is incomplete");
    } else {
        last = last.max(newest);
    }

    debug!(?last, "scanned existing file");
    Ok(last)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn record(id: EntryId, title: &str) -> CatalogRecord {
        CatalogRecord {
            id: Some(id),
            title: Some(title.to_string()),
            score: Some(7.5),
            member_count: Some(1200),
            ..CatalogRecord::default()
        }
    }

    #[test]
    fn test_create_writes_header_only() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.csv");
        let sink = CsvSink::create(&path, StoreMode::Truncate).unwrap();

        assert_eq!(sink.rows_written(), 0);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "ID,TITLE,SCORE,MEMBERS,GENRES,START_DATE\n"
        );
    }

    #[test]
    fn test_save_is_flushed_before_sink_is_dropped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.csv");
        let mut sink = CsvSink::create(&path, StoreMode::Truncate).unwrap();

        sink.save(&record(3, "Trigun")).unwrap();

        // Sink still alive: the row must already be on disk.
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "ID,TITLE,SCORE,MEMBERS,GENRES,START_DATE\n3,Trigun,7.5,1200,,\n"
        );
        assert_eq!(sink.rows_written(), 1);
    }

    #[test]
    fn test_titles_with_commas_are_quoted() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.csv");
        let mut sink = CsvSink::create(&path, StoreMode::Truncate).unwrap();
        sink.save(&record(5, "Hello, World")).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[1], "Hello, World");
    }

    #[test]
    fn test_truncate_discards_previous_rows() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.csv");
        {
            let mut sink = CsvSink::create(&path, StoreMode::Truncate).unwrap();
            sink.save(&record(1, "Old")).unwrap();
        }
        let _sink = CsvSink::create(&path, StoreMode::Truncate).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "ID,TITLE,SCORE,MEMBERS,GENRES,START_DATE\n"
        );
    }

    #[test]
    fn test_append_keeps_rows_and_single_header() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.csv");
        {
            let mut sink = CsvSink::create(&path, StoreMode::Truncate).unwrap();
            sink.save(&record(1, "First")).unwrap();
        }
        {
            let mut sink = CsvSink::create(&path, StoreMode::Append).unwrap();
            sink.save(&record(2, "Second")).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("ID,TITLE").count(), 1);
        assert!(content.ends_with("1,First,7.5,1200,,\n2,Second,7.5,1200,,\n"));
    }

    #[test]
    fn test_append_to_missing_file_writes_header() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fresh.csv");
        let _sink = CsvSink::create(&path, StoreMode::Append).unwrap();
        assert!(
            std::fs::read_to_string(&path)
                .unwrap()
                .starts_with("ID,TITLE")
        );
    }

    #[test]
    fn test_skip_without_log_is_noop() {
        let temp = TempDir::new().unwrap();
        let mut sink = CsvSink::create(temp.path().join("store.csv"), StoreMode::Truncate).unwrap();
        sink.skip(9, &SkipReason::NotFound).unwrap();
        assert_eq!(sink.rows_written(), 0);
    }

    #[test]
    fn test_skip_log_records_reason_and_detail() {
        let temp = TempDir::new().unwrap();
        let skip_path = temp.path().join("skips.csv");
        let mut sink = CsvSink::create(temp.path().join("store.csv"), StoreMode::Truncate)
            .unwrap()
            .with_skip_log(&skip_path, StoreMode::Truncate)
            .unwrap();

        sink.skip(2, &SkipReason::NotFound).unwrap();
        sink.skip(
            4,
            &SkipReason::Exhausted(RetryReason::ServerOrRateLimit { status: 503 }),
        )
        .unwrap();

        let content = std::fs::read_to_string(&skip_path).unwrap();
        assert_eq!(
            content,
            "ID,REASON,DETAIL\n2,not_found,\n4,exhausted,server/rate-limit (HTTP 503)\n"
        );
    }

    #[test]
    fn test_create_in_missing_directory_fails_with_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing").join("store.csv");
        let error = CsvSink::create(&path, StoreMode::Truncate).unwrap_err();
        assert!(matches!(error, SinkError::Io { .. }));
        assert!(error.to_string().contains("store.csv"));
    }

    // ==================== Resume Scan Tests ====================

    #[test]
    fn test_last_persisted_id_missing_file_is_none() {
        let temp = TempDir::new().unwrap();
        assert_eq!(last_persisted_id(temp.path().join("nope.csv")).unwrap(), None);
    }

    #[test]
    fn test_last_persisted_id_header_only_is_none() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.csv");
        let _sink = CsvSink::create(&path, StoreMode::Truncate).unwrap();
        assert_eq!(last_persisted_id(&path).unwrap(), None);
    }

    #[test]
    fn test_last_persisted_id_returns_highest_id() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.csv");
        std::fs::write(
            &path,
            "ID,TITLE,SCORE,MEMBERS,GENRES,START_DATE\n1,A,,,,\n,NoId,,,,\n17,B,,,,\n5,C,,,,\n",
        )
        .unwrap();
        assert_eq!(last_persisted_id(&path).unwrap(), Some(17));
    }

    #[test]
    fn test_last_persisted_id_ignores_torn_last_row() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.csv");
        std::fs::write(&path, "ID,TITLE,SCORE,MEMBERS,GENRES,START_DATE\n1,A,,,,\n2,Trunc").unwrap();
        assert_eq!(last_persisted_id(&path).unwrap(), Some(1));
    }

    #[test]
    fn test_last_persisted_id_reads_skip_log() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("skips.csv");
        std::fs::write(&path, "ID,REASON,DETAIL\n4,not_found,\n6,fatal,HTTP 400\n").unwrap();
        assert_eq!(last_persisted_id(&path).unwrap(), Some(6));
    }

    #[test]
    fn test_append_drops_torn_row_and_keeps_store_valid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.csv");
        std::fs::write(&path, "ID,TITLE,SCORE,MEMBERS,GENRES,START_DATE\n1,A,,,,\n2,Trunc").unwrap();

        let start = last_persisted_id(&path).unwrap().unwrap() + 1;
        let mut sink = CsvSink::create(&path, StoreMode::Append).unwrap();
        sink.save(&record(start, "Second")).unwrap();
        sink.save(&record(start + 1, "Third")).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.headers().unwrap().len(), STORE_HEADER.len());
        let ids: Vec<String> = reader
            .records()
            .map(|row| row.unwrap()[0].to_string())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "ID,TITLE,SCORE,MEMBERS,GENRES,START_DATE\n1,A,,,,\n\
             2,Second,7.5,1200,,\n3,Third,7.5,1200,,\n"
        );
    }

    #[test]
    fn test_append_over_torn_header_rewrites_header() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.csv");
        std::fs::write(&path, "ID,TIT").unwrap();

        let mut sink = CsvSink::create(&path, StoreMode::Append).unwrap();
        sink.save(&record(1, "First")).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "ID,TITLE,SCORE,MEMBERS,GENRES,START_DATE\n1,First,7.5,1200,,\n"
        );
    }

    #[test]
    fn test_skip_reason_from_terminal() {
        assert_eq!(SkipReason::from_terminal(&Terminal::Saved(record(1, "x"))), None);
        assert_eq!(
            SkipReason::from_terminal(&Terminal::NotFound),
            Some(SkipReason::NotFound)
        );
        let reason = SkipReason::from_terminal(&Terminal::Exhausted(RetryReason::Timeout)).unwrap();
        assert_eq!(reason.label(), "exhausted");
        assert_eq!(reason.detail(), "timeout");
    }
}
