//! Catalog walker: iterates the ID space and streams results to a sink.
//!
//! The walker resolves every ID in a half-open range exactly once through
//! [`resolve_entry`], writes each terminal result to a [`ResultSink`] in ID
//! order, and waits a fixed pacing delay after every ID regardless of its
//! outcome. No per-ID failure ever stops the walk; only a sink error does.
//!
//! # Concurrency Model
//!
//! With the default concurrency of 1 the walk is strictly sequential: the
//! next ID is not requested until the previous one has been written and the
//! pacing delay has elapsed.
//!
//! With a higher concurrency, up to that many IDs are resolved by spawned
//! Tokio tasks at once. Results pass through an order-preserving buffer, so
//! the sink still sees them in ID order; an ID that finishes early simply
//! waits for its predecessors.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use harvester_core::catalog::{
//!     BackoffPolicy, CatalogClient, CatalogWalker, ClientSettings, CsvSink, StoreMode,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CatalogClient::new(ClientSettings::new("client-id"))?;
//! let walker = CatalogWalker::new(
//!     Arc::new(client),
//!     BackoffPolicy::default(),
//!     Duration::from_millis(500),
//!     1,
//! )?;
//! let mut sink = CsvSink::create("mal_anime_data.csv", StoreMode::Truncate)?;
//! let summary = walker.walk(1..62_000, &mut sink).await?;
//! println!("saved {} entries", summary.saved);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::ops::Range;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, instrument, warn};

use super::backoff::BackoffPolicy;
use super::client::EntryFetcher;
use super::error::WalkError;
use super::record::EntryId;
use super::retry::{EntryResolution, Terminal, resolve_entry};
use super::sink::{ResultSink, SkipReason};

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 16;

/// Default concurrency: one request in flight at a time.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Live counters for a walk.
///
/// Shared through `Arc` so a progress display can read them while the walk
/// is running.
#[derive(Debug, Default)]
pub struct WalkStats {
    saved: AtomicUsize,
    not_found: AtomicUsize,
    fatal: AtomicUsize,
    exhausted: AtomicUsize,
    aborted: AtomicUsize,
    retried: AtomicUsize,
}

impl WalkStats {
    /// Creates a tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// IDs that produced a stored record.
    #[must_use]
    pub fn saved(&self) -> usize {
        self.saved.load(Ordering::SeqCst)
    }

    /// IDs that reached any terminal state.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.snapshot().total()
    }

    /// Point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> WalkSummary {
        WalkSummary {
            saved: self.saved.load(Ordering::SeqCst),
            not_found: self.not_found.load(Ordering::SeqCst),
            fatal: self.fatal.load(Ordering::SeqCst),
            exhausted: self.exhausted.load(Ordering::SeqCst),
            aborted: self.aborted.load(Ordering::SeqCst),
            retried: self.retried.load(Ordering::SeqCst),
        }
    }

    fn record_terminal(&self, terminal: &Terminal) {
        let counter = match terminal {
            Terminal::Saved(_) => &self.saved,
            Terminal::NotFound => &self.not_found,
            Terminal::Fatal(_) => &self.fatal,
            Terminal::Exhausted(_) => &self.exhausted,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn record_aborted(&self) {
        self.aborted.fetch_add(1, Ordering::SeqCst);
    }

    fn add_retried(&self, retries: u32) {
        self.retried
            .fetch_add(usize::try_from(retries).unwrap_or(usize::MAX), Ordering::SeqCst);
    }
}

/// Final counts of a walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// IDs written to the store.
    pub saved: usize,
    /// IDs the API reported as missing.
    pub not_found: usize,
    /// IDs skipped after an unexpected status.
    pub fatal: usize,
    /// IDs given up after the attempt budget.
    pub exhausted: usize,
    /// IDs whose resolution task failed.
    pub aborted: usize,
    /// Retry attempts across all IDs.
    pub retried: usize,
}

impl WalkSummary {
    /// IDs that reached a terminal state.
    #[must_use]
    pub fn total(&self) -> usize {
        self.saved + self.not_found + self.fatal + self.exhausted + self.aborted
    }

    /// IDs that produced no row.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.total() - self.saved
    }
}

/// Spawned resolution that is cancelled if dropped before completion.
///
/// When a sink error ends the walk early, the buffered stream is dropped and
/// every in-flight request with it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Walks a range of catalog IDs.
pub struct CatalogWalker {
    fetcher: Arc<dyn EntryFetcher>,
    policy: BackoffPolicy,
    pacing: Duration,
    concurrency: usize,
    stats: Arc<WalkStats>,
}

impl fmt::Debug for CatalogWalker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogWalker")
            .field("policy", &self.policy)
            .field("pacing", &self.pacing)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl CatalogWalker {
    /// Creates a walker.
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Source of fetch outcomes, usually a [`super::CatalogClient`]
    /// * `policy` - Backoff schedule and attempt budget per ID
    /// * `pacing` - Pause after every ID, independent of backoff
    /// * `concurrency` - IDs resolved at once (1-16)
    ///
    /// # Errors
    ///
    /// Returns [`WalkError::InvalidConcurrency`] if `concurrency` is outside
    /// the valid range.
    #[instrument(level = "debug", skip(fetcher, policy))]
    pub fn new(
        fetcher: Arc<dyn EntryFetcher>,
        policy: BackoffPolicy,
        pacing: Duration,
        concurrency: usize,
    ) -> Result<Self, WalkError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(WalkError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            max_attempts = policy.max_attempts(),
            base_delay_ms = policy.base_delay().as_millis(),
            pacing_ms = pacing.as_millis(),
            "creating catalog walker"
        );

        Ok(Self {
            fetcher,
            policy,
            pacing,
            concurrency,
            stats: Arc::new(WalkStats::new()),
        })
    }

    /// Returns the configured concurrency.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Live counters, updated as results are written.
    #[must_use]
    pub fn stats(&self) -> Arc<WalkStats> {
        Arc::clone(&self.stats)
    }

    /// Resolves every ID in `ids` and writes the results to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`WalkError::Sink`] if the sink fails. Fetch failures never
    /// cause an error; they are counted and optionally written to the skip
    /// log.
    #[instrument(skip(self, sink), fields(start = ids.start, end = ids.end, concurrency = self.concurrency))]
    pub async fn walk(
        &self,
        ids: Range<EntryId>,
        sink: &mut dyn ResultSink,
    ) -> Result<WalkSummary, WalkError> {
        info!("starting catalog walk");

        let fetcher = Arc::clone(&self.fetcher);
        let policy = self.policy.clone();
        let mut resolutions = stream::iter(ids)
            .map(move |id| {
                let fetcher = Arc::clone(&fetcher);
                let policy = policy.clone();
                let handle = AbortOnDrop(tokio::spawn(async move {
                    resolve_entry(fetcher.as_ref(), id, &policy).await
                }));
                async move { (id, handle.await) }
            })
            .buffered(self.concurrency);

        while let Some((id, joined)) = resolutions.next().await {
            match joined {
                Ok(resolution) => self.persist(&resolution, sink)?,
                Err(error) => {
                    warn!(id, error = %error, "entry resolution task failed");
                    self.stats.record_aborted();
                    sink.skip(id, &SkipReason::Aborted(error.to_string()))?;
                }
            }

            if !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        let summary = self.stats.snapshot();
        info!(
            saved = summary.saved,
            not_found = summary.not_found,
            fatal = summary.fatal,
            exhausted = summary.exhausted,
            aborted = summary.aborted,
            retried = summary.retried,
            "catalog walk complete"
        );
        Ok(summary)
    }

    fn persist(
        &self,
        resolution: &EntryResolution,
        sink: &mut dyn ResultSink,
    ) -> Result<(), WalkError> {
        self.stats.add_retried(resolution.retries());

        if let Terminal::Saved(record) = &resolution.terminal {
            sink.save(record)?;
        } else if let Some(reason) = SkipReason::from_terminal(&resolution.terminal) {
            sink.skip(resolution.id, &reason)?;
        }
        self.stats.record_terminal(&resolution.terminal);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::catalog::error::SinkError;
    use crate::catalog::outcome::{FatalReason, FetchOutcome, RetryReason};
    use crate::catalog::record::CatalogRecord;

    /// Answers each ID with a fixed outcome after an optional per-ID delay.
    struct TableFetcher {
        outcomes: HashMap<EntryId, FetchOutcome>,
        delays: HashMap<EntryId, Duration>,
        panic_on: Option<EntryId>,
        calls: Mutex<Vec<EntryId>>,
        finished: Mutex<Vec<EntryId>>,
    }

    impl TableFetcher {
        fn new(outcomes: impl IntoIterator<Item = (EntryId, FetchOutcome)>) -> Self {
            Self {
                outcomes: outcomes.into_iter().collect(),
                delays: HashMap::new(),
                panic_on: None,
                calls: Mutex::new(Vec::new()),
                finished: Mutex::new(Vec::new()),
            }
        }

        fn panicking_on(mut self, id: EntryId) -> Self {
            self.panic_on = Some(id);
            self
        }

        fn finished(&self) -> Vec<EntryId> {
            self.finished.lock().unwrap().clone()
        }

        fn with_delays(mut self, delays: impl IntoIterator<Item = (EntryId, Duration)>) -> Self {
            self.delays = delays.into_iter().collect();
            self
        }

        fn calls(&self) -> Vec<EntryId> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EntryFetcher for TableFetcher {
        async fn fetch(&self, id: EntryId) -> FetchOutcome {
            self.calls.lock().unwrap().push(id);
            if let Some(delay) = self.delays.get(&id) {
                tokio::time::sleep(*delay).await;
            }
            assert_ne!(self.panic_on, Some(id), "fetcher blew up on {id}");
            self.finished.lock().unwrap().push(id);
            self.outcomes
                .get(&id)
                .cloned()
                .unwrap_or(FetchOutcome::NotFound)
        }
    }

    #[derive(Default)]
    struct MemorySink {
        saved: Vec<CatalogRecord>,
        skipped: Vec<(EntryId, &'static str)>,
        fail_on_save: bool,
    }

    impl ResultSink for MemorySink {
        fn save(&mut self, record: &CatalogRecord) -> Result<(), SinkError> {
            if self.fail_on_save {
                return Err(SinkError::io("memory", std::io::Error::other("disk full")));
            }
            self.saved.push(record.clone());
            Ok(())
        }

        fn skip(&mut self, id: EntryId, reason: &SkipReason) -> Result<(), SinkError> {
            self.skipped.push((id, reason.label()));
            Ok(())
        }
    }

    fn success(id: EntryId) -> FetchOutcome {
        FetchOutcome::Success(CatalogRecord {
            id: Some(id),
            title: Some(format!("Entry {id}")),
            ..CatalogRecord::default()
        })
    }

    fn fatal() -> FetchOutcome {
        FetchOutcome::Fatal(FatalReason {
            status: 400,
            body: "bad request".to_string(),
        })
    }

    fn walker(fetcher: TableFetcher, concurrency: usize) -> (CatalogWalker, Arc<TableFetcher>) {
        let fetcher = Arc::new(fetcher);
        let walker = CatalogWalker::new(
            Arc::clone(&fetcher) as Arc<dyn EntryFetcher>,
            BackoffPolicy::new(3, Duration::from_millis(100), None),
            Duration::from_millis(500),
            concurrency,
        )
        .unwrap();
        (walker, fetcher)
    }

    #[test]
    fn test_new_rejects_invalid_concurrency() {
        for value in [0, 17] {
            let result = CatalogWalker::new(
                Arc::new(TableFetcher::new([])),
                BackoffPolicy::default(),
                Duration::ZERO,
                value,
            );
            assert!(matches!(
                result,
                Err(WalkError::InvalidConcurrency { value: v }) if v == value
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_walk_writes_only_successes_in_id_order() {
        let (walker, fetcher) = walker(
            TableFetcher::new([
                (1, fatal()),
                (2, FetchOutcome::NotFound),
                (3, success(3)),
                (4, fatal()),
            ]),
            1,
        );
        let mut sink = MemorySink::default();

        let summary = walker.walk(1..5, &mut sink).await.unwrap();

        assert_eq!(sink.saved.len(), 1);
        assert_eq!(sink.saved[0].id, Some(3));
        assert_eq!(
            sink.skipped,
            vec![(1, "fatal"), (2, "not_found"), (4, "fatal")]
        );
        assert_eq!(fetcher.calls(), vec![1, 2, 3, 4]);
        assert_eq!(summary.saved, 1);
        assert_eq!(summary.fatal, 2);
        assert_eq!(summary.not_found, 1);
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.skipped(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_walk_attempts_each_id_exactly_once() {
        let (walker, fetcher) = walker(TableFetcher::new((1..20).map(|id| (id, success(id)))), 1);
        let mut sink = MemorySink::default();

        walker.walk(1..20, &mut sink).await.unwrap();

        assert_eq!(fetcher.calls(), (1..20).collect::<Vec<_>>());
        let ids: Vec<_> = sink.saved.iter().filter_map(|r| r.id).collect();
        assert_eq!(ids, (1..20).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_walk_paces_after_every_id() {
        let (walker, _) = walker(
            TableFetcher::new([(1, success(1)), (2, FetchOutcome::NotFound), (3, fatal())]),
            1,
        );
        let mut sink = MemorySink::default();

        let started = tokio::time::Instant::now();
        walker.walk(1..4, &mut sink).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_walk_continues_after_exhausted_id() {
        let retryable = FetchOutcome::Retryable(RetryReason::ServerOrRateLimit { status: 503 });
        let (walker, fetcher) = walker(TableFetcher::new([(1, retryable), (2, success(2))]), 1);
        let mut sink = MemorySink::default();

        let summary = walker.walk(1..3, &mut sink).await.unwrap();

        assert_eq!(summary.exhausted, 1);
        assert_eq!(summary.saved, 1);
        assert_eq!(summary.retried, 2);
        assert_eq!(fetcher.calls(), vec![1, 1, 1, 2]);
        assert_eq!(sink.skipped, vec![(1, "exhausted")]);
        assert_eq!(walker.stats().saved(), 1);
        assert_eq!(walker.stats().processed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_walk_preserves_id_order() {
        // Earlier IDs take longer, so they finish last.
        let fetcher = TableFetcher::new((1..9).map(|id| (id, success(id))))
            .with_delays((1..9).map(|id| (id, Duration::from_millis(1000 - id * 100))));
        let (walker, fetcher) = walker(fetcher, 4);
        let mut sink = MemorySink::default();

        let summary = walker.walk(1..9, &mut sink).await.unwrap();

        let ids: Vec<_> = sink.saved.iter().filter_map(|r| r.id).collect();
        assert_eq!(ids, (1..9).collect::<Vec<_>>());
        assert_eq!(summary.saved, 8);
        assert_eq!(fetcher.calls().len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure_aborts_walk() {
        let (walker, _) = walker(TableFetcher::new([(1, success(1))]), 1);
        let mut sink = MemorySink {
            fail_on_save: true,
            ..MemorySink::default()
        };

        let result = walker.walk(1..3, &mut sink).await;
        assert!(matches!(result, Err(WalkError::Sink(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicked_resolution_is_skipped_as_aborted() {
        let fetcher = TableFetcher::new([(1, success(1)), (2, success(2)), (3, success(3))])
            .panicking_on(2);
        let (walker, fetcher) = walker(fetcher, 1);
        let mut sink = MemorySink::default();

        let summary = walker.walk(1..4, &mut sink).await.unwrap();

        let ids: Vec<_> = sink.saved.iter().filter_map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(sink.skipped, vec![(2, "aborted")]);
        assert_eq!(summary.aborted, 1);
        assert_eq!(summary.saved, 2);
        assert_eq!(summary.total(), 3);
        assert_eq!(fetcher.calls(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure_cancels_in_flight_requests() {
        let fetcher = TableFetcher::new((1..5).map(|id| (id, success(id))))
            .with_delays((2..5).map(|id| (id, Duration::from_secs(1))));
        let (walker, fetcher) = walker(fetcher, 4);
        let mut sink = MemorySink {
            fail_on_save: true,
            ..MemorySink::default()
        };

        let result = walker.walk(1..5, &mut sink).await;
        assert!(matches!(result, Err(WalkError::Sink(_))));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fetcher.calls(), vec![1, 2, 3, 4]);
        assert_eq!(fetcher.finished(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_range_is_a_no_op() {
        let (walker, fetcher) = walker(TableFetcher::new([]), 1);
        let mut sink = MemorySink::default();

        let summary = walker.walk(5..5, &mut sink).await.unwrap();
        assert_eq!(summary, WalkSummary::default());
        assert!(fetcher.calls().is_empty());
    }
}
