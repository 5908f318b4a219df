//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use harvester_core::PlotKind;

/// Scrape a public anime catalog and chart what it holds.
///
/// Harvester walks the catalog's numeric ID space, stores every entry it
/// finds in a CSV file, and renders exploratory charts from that file.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// TOML config file (defaults to ./harvester.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Walk the catalog ID space and persist every entry found
    Scrape {
        #[command(subcommand)]
        target: ScrapeTarget,
    },

    /// Render a chart from a cleaned store
    Plot(PlotArgs),
}

/// Catalogs that can be scraped.
#[derive(Subcommand, Debug)]
pub enum ScrapeTarget {
    /// Scrape anime entries
    Anime(ScrapeArgs),

    /// Scrape manga entries (not implemented)
    Manga,
}

/// Options of `scrape anime`. Unset options fall back to the config file,
/// then to built-in defaults.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ScrapeArgs {
    /// CSV store to write
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Exclusive upper bound of the ID range
    #[arg(short = 'u', long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub upper_bound: Option<u64>,

    /// File holding the API client id
    #[arg(long, value_name = "PATH")]
    pub client_id_file: Option<PathBuf>,

    /// Also record every skipped ID and its reason in this CSV file
    #[arg(long, value_name = "PATH")]
    pub skip_log: Option<PathBuf>,

    /// IDs resolved at once (1-16); rows are still written in ID order
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: Option<u8>,

    /// Continue after the highest ID already in the store
    #[arg(long)]
    pub resume: bool,

    /// Show a progress spinner
    #[arg(long)]
    pub progress: bool,
}

/// Options of `plot`.
#[derive(clap::Args, Debug, Clone)]
pub struct PlotArgs {
    /// Chart to render
    #[arg(value_enum)]
    pub kind: PlotKind,

    /// Cleaned CSV store to read
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Directory receiving the HTML chart
    #[arg(short = 'd', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}
