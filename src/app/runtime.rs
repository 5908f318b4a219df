//! Command dispatch: wires config, credentials, client, walker, and sink together.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use harvester_core::catalog::constants::DEFAULT_MANGA_UPPER_BOUND;
use harvester_core::{
    CatalogClient, CatalogWalker, ClientSettings, CsvSink, Dataset, EntryId, PlotKind,
    StoreMode, WalkSummary, last_persisted_id, load_client_id, render_plot,
};
use tracing::{debug, info, warn};

use crate::app::config::{self, FileConfig, ScrapeSettings};
use crate::app::progress;
use crate::cli::{Args, Command, PlotArgs, ScrapeArgs, ScrapeTarget};

/// Runs the parsed command to completion.
pub(crate) async fn run(args: Args) -> Result<()> {
    let file_config = config::load_file_config(args.config.as_deref())?;

    match &args.command {
        Command::Scrape {
            target: ScrapeTarget::Anime(scrape),
        } => {
            run_scrape_anime(scrape, file_config.as_ref()).await?;
            Ok(())
        }
        Command::Scrape {
            target: ScrapeTarget::Manga,
        } => {
            info!(
                upper_bound = DEFAULT_MANGA_UPPER_BOUND,
                "manga ingestion is not implemented"
            );
            Ok(())
        }
        Command::Plot(plot) => run_plot(plot, file_config.as_ref()),
    }
}

async fn run_scrape_anime(args: &ScrapeArgs, file: Option<&FileConfig>) -> Result<WalkSummary> {
    let settings = config::resolve_scrape(args, file);
    debug!(?settings, "scrape settings resolved");

    let client_id = load_client_id(&settings.client_id_file)?;
    let client = CatalogClient::new(ClientSettings {
        base_url: settings.base_url.clone(),
        fields: settings.fields.clone(),
        client_id,
        timeout: settings.timeout,
    })
    .context("Failed to build catalog client")?;

    let (start, mode) = resume_point(&settings)?;
    if start >= settings.upper_bound {
        info!(
            start,
            upper_bound = settings.upper_bound,
            "nothing left to scrape"
        );
        return Ok(WalkSummary::default());
    }

    let mut sink = CsvSink::create(&settings.output, mode)?;
    if let Some(skip_log) = &settings.skip_log {
        sink = sink.with_skip_log(skip_log, mode)?;
    }

    let walker = CatalogWalker::new(
        Arc::new(client),
        settings.policy.clone(),
        settings.pacing,
        settings.concurrency,
    )?;

    info!(
        output = %settings.output.display(),
        start,
        upper_bound = settings.upper_bound,
        concurrency = walker.concurrency(),
        "walking catalog"
    );

    let (spinner, stop) = progress::spawn_progress_ui(
        settings.progress,
        walker.stats(),
        settings.upper_bound - start,
    );
    let result = walker.walk(start..settings.upper_bound, &mut sink).await;
    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = spinner
        && let Err(error) = handle.await
    {
        warn!(error = %error, "progress spinner task failed");
    }

    let summary = result?;
    info!(
        rows = sink.rows_written(),
        skipped = summary.skipped(),
        store = %sink.store_path().display(),
        "scrape complete"
    );
    Ok(summary)
}

/// First ID to fetch and how to open the store.
///
/// A resumed run continues after the highest ID found in the store or the
/// skip log, so no resolved ID is fetched or logged twice.
fn resume_point(settings: &ScrapeSettings) -> Result<(EntryId, StoreMode)> {
    if !settings.resume {
        return Ok((1, StoreMode::Truncate));
    }

    let saved = last_persisted_id(&settings.output)?;
    let skipped = match &settings.skip_log {
        Some(skip_log) => last_persisted_id(skip_log)?,
        None => None,
    };
    let last = saved.max(skipped);
    match last {
        Some(id) => info!(last_id = id, "resuming after last persisted entry"),
        None => info!("no persisted entries, starting from the first ID"),
    }
    Ok((last.map_or(1, |id| id.saturating_add(1)), StoreMode::Append))
}

fn run_plot(args: &PlotArgs, file: Option<&FileConfig>) -> Result<()> {
    let settings = config::resolve_plot(args, file);
    let dataset = Dataset::load(&settings.input)?;
    info!(
        rows = dataset.len(),
        dropped = dataset.dropped(),
        input = %settings.input.display(),
        "dataset loaded"
    );

    if args.kind == PlotKind::Test {
        println!("{}", dataset.head(5));
        return Ok(());
    }

    if let Some(path) = render_plot(args.kind, &dataset, &settings.output_dir)? {
        info!(path = %path.display(), "chart ready");
    }
    Ok(())
}
