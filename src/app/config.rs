//! Configuration loading: TOML file config, validation, and merge with CLI flags.
//!
//! Every setting resolves as CLI flag > config file > built-in default.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;

use harvester_core::catalog::constants::{
    DEFAULT_ANIME_UPPER_BOUND, DEFAULT_BASE_URL, DEFAULT_FIELDS, DEFAULT_PACING_DELAY,
    DEFAULT_REQUEST_TIMEOUT,
};
use harvester_core::catalog::{
    BackoffPolicy, DEFAULT_BASE_DELAY, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY, MAX_CONCURRENCY, MIN_CONCURRENCY,
};
use harvester_core::credentials::DEFAULT_CLIENT_ID_FILE;

use crate::cli::{PlotArgs, ScrapeArgs};

/// Config file picked up from the working directory when `--config` is absent.
pub(crate) const DEFAULT_CONFIG_FILE: &str = "harvester.toml";

pub(crate) const DEFAULT_OUTPUT: &str = "mal_anime_data.csv";
pub(crate) const DEFAULT_PLOT_INPUT: &str = "mal_anime_data_fixed.csv";
pub(crate) const DEFAULT_PLOT_OUTPUT_DIR: &str = "plots";

/// TOML-backed file configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileConfig {
    /// `[scrape]` table.
    #[serde(default)]
    pub(crate) scrape: ScrapeConfig,
    /// `[plot]` table.
    #[serde(default)]
    pub(crate) plot: PlotConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScrapeConfig {
    pub(crate) base_url: Option<String>,
    pub(crate) fields: Option<String>,
    pub(crate) client_id_file: Option<PathBuf>,
    pub(crate) output: Option<PathBuf>,
    pub(crate) skip_log: Option<PathBuf>,
    pub(crate) upper_bound: Option<u64>,
    pub(crate) timeout_secs: Option<u64>,
    pub(crate) pacing_ms: Option<u64>,
    pub(crate) base_delay_ms: Option<u64>,
    pub(crate) max_attempts: Option<u32>,
    pub(crate) max_delay_secs: Option<u64>,
    pub(crate) concurrency: Option<usize>,
    pub(crate) resume: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PlotConfig {
    pub(crate) input: Option<PathBuf>,
    pub(crate) output_dir: Option<PathBuf>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub(crate) fn validate(&self) -> Result<()> {
        let scrape = &self.scrape;

        if let Some(upper_bound) = scrape.upper_bound
            && upper_bound == 0
        {
            bail!("Invalid config value for `upper_bound`: 0. Expected range: 1..");
        }
        if let Some(concurrency) = scrape.concurrency
            && !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency)
        {
            bail!(
                "Invalid config value for `concurrency`: {concurrency}. Expected range: {MIN_CONCURRENCY}..={MAX_CONCURRENCY}"
            );
        }
        if let Some(max_attempts) = scrape.max_attempts
            && !(1..=100).contains(&max_attempts)
        {
            bail!("Invalid config value for `max_attempts`: {max_attempts}. Expected range: 1..=100");
        }
        validate_range("timeout_secs", scrape.timeout_secs, 1, 3600)?;
        validate_range("pacing_ms", scrape.pacing_ms, 0, 60_000)?;
        validate_range("base_delay_ms", scrape.base_delay_ms, 0, 600_000)?;
        validate_range("max_delay_secs", scrape.max_delay_secs, 1, 86_400)?;

        if let Some(fields) = &scrape.fields
            && fields.trim().is_empty()
        {
            bail!("Invalid config value for `fields`: must not be empty");
        }

        Ok(())
    }
}

fn validate_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

/// Loads the config file named by `--config`, or `./harvester.toml` if present.
///
/// An explicit path must exist; the implicit one is optional.
pub(crate) fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let implicit = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !implicit.exists() {
                debug!("no config file found");
                return Ok(None);
            }
            implicit
        }
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    let config = parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
    debug!(path = %path.display(), "config file loaded");
    Ok(Some(config))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

/// Fully resolved settings of one `scrape anime` run.
#[derive(Debug, Clone)]
pub(crate) struct ScrapeSettings {
    pub(crate) base_url: String,
    pub(crate) fields: String,
    pub(crate) client_id_file: PathBuf,
    pub(crate) output: PathBuf,
    pub(crate) skip_log: Option<PathBuf>,
    pub(crate) upper_bound: u64,
    pub(crate) timeout: Duration,
    pub(crate) pacing: Duration,
    pub(crate) policy: BackoffPolicy,
    pub(crate) concurrency: usize,
    pub(crate) resume: bool,
    pub(crate) progress: bool,
}

pub(crate) fn resolve_scrape(args: &ScrapeArgs, file: Option<&FileConfig>) -> ScrapeSettings {
    let config = file.map(|f| f.scrape.clone()).unwrap_or_default();

    let base_delay = config
        .base_delay_ms
        .map_or(DEFAULT_BASE_DELAY, Duration::from_millis);
    let max_delay = config
        .max_delay_secs
        .map_or(DEFAULT_MAX_DELAY, Duration::from_secs);
    let policy = BackoffPolicy::new(
        config.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
        base_delay,
        Some(max_delay),
    );

    ScrapeSettings {
        base_url: config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        fields: config.fields.unwrap_or_else(|| DEFAULT_FIELDS.to_string()),
        client_id_file: args
            .client_id_file
            .clone()
            .or(config.client_id_file)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CLIENT_ID_FILE)),
        output: args
            .output
            .clone()
            .or(config.output)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
        skip_log: args.skip_log.clone().or(config.skip_log),
        upper_bound: args
            .upper_bound
            .or(config.upper_bound)
            .unwrap_or(DEFAULT_ANIME_UPPER_BOUND),
        timeout: config
            .timeout_secs
            .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs),
        pacing: config
            .pacing_ms
            .map_or(DEFAULT_PACING_DELAY, Duration::from_millis),
        policy,
        concurrency: args
            .concurrency
            .map(usize::from)
            .or(config.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY),
        resume: args.resume || config.resume.unwrap_or(false),
        progress: args.progress,
    }
}

/// Fully resolved settings of one `plot` run.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlotSettings {
    pub(crate) input: PathBuf,
    pub(crate) output_dir: PathBuf,
}

pub(crate) fn resolve_plot(args: &PlotArgs, file: Option<&FileConfig>) -> PlotSettings {
    let config = file.map(|f| f.plot.clone()).unwrap_or_default();
    PlotSettings {
        input: args
            .input
            .clone()
            .or(config.input)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PLOT_INPUT)),
        output_dir: args
            .output_dir
            .clone()
            .or(config.output_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PLOT_OUTPUT_DIR)),
    }
}
