//! CLI argument definitions for hydrant.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fetch` | Fetch one dataset, or every core dataset |
//! | `status` | Show freshness and cache statistics |
//! | `cache` | Inspect or clear the local cache |
//! | `settings` | Show or change persisted settings |
//! | `countdown` | Run the reserve depletion countdown |

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use hydrant_core::EndpointKey;

/// Municipal water open-data client.
///
/// Fetches the authority's published datasets through a prioritised source
/// chain (snapshot feed, primary API, tabular datastore) with a local TTL
/// cache, and derives reserve and quality figures from them.
#[derive(Debug, Parser)]
#[command(name = "hydrant", author, version, about = "Water open-data client")]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Bypass the cache and refetch from the sources.
    #[arg(long, global = true, default_value_t = false)]
    pub refresh: bool,

    /// Route primary API calls through the public CORS relays.
    #[arg(long, global = true, default_value_t = false)]
    pub relay: bool,

    /// Cache file location. Falls back to HYDRANT_CACHE_FILE, then to a
    /// file in the system temp directory.
    #[arg(long, global = true)]
    pub cache_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON object output.
    Json,
    /// Terse line-oriented summary.
    Summary,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch one dataset, or every core dataset at once.
    Fetch(FetchArgs),
    /// Show the last update time and whether a refresh is due.
    Status,
    /// Inspect or clear the local cache.
    Cache(CacheArgs),
    /// Show or change persisted settings.
    Settings(SettingsArgs),
    /// Run the reserve depletion countdown for a few ticks.
    Countdown(CountdownArgs),
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Dataset to fetch, e.g. `dam-status` or `outages`. Omit with --all.
    #[arg(value_parser = clap::value_parser!(EndpointKey))]
    pub endpoint: Option<EndpointKey>,

    /// Fetch every core dataset concurrently.
    #[arg(long, default_value_t = false, conflicts_with = "endpoint")]
    pub all: bool,

    /// Year filter for the parameterised datasets.
    #[arg(long)]
    pub year: Option<i32>,
}

#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Entry count, size on disk and timestamps.
    Stats,
    /// Drop every cached dataset. Settings survive.
    Clear,
}

#[derive(Debug, Args)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Print the persisted settings.
    Show,
    /// Update one or more settings.
    Set(SettingsSetArgs),
}

#[derive(Debug, Args)]
pub struct SettingsSetArgs {
    /// Cache entry lifetime in hours. Must be at least 1.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub cache_hours: Option<u32>,

    /// UI theme name stored for the front ends.
    #[arg(long)]
    pub theme: Option<String>,

    /// Accent colour stored for the front ends.
    #[arg(long)]
    pub accent_color: Option<String>,
}

#[derive(Debug, Args)]
pub struct CountdownArgs {
    /// Current reserve volume.
    #[arg(long)]
    pub volume: f64,

    /// Daily consumption in the same unit as --volume.
    #[arg(long)]
    pub daily: f64,

    /// Number of one-second frames to print before stopping.
    #[arg(long, default_value_t = 5)]
    pub ticks: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_cache_hours_is_rejected_at_parse_time() {
        let zero = Cli::try_parse_from(["hydrant", "settings", "set", "--cache-hours", "0"]);
        assert!(zero.is_err(), "a zero TTL must not reach the settings store");

        let one = Cli::try_parse_from(["hydrant", "settings", "set", "--cache-hours", "1"]);
        assert!(one.is_ok());
    }
}
