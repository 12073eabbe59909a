//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Fetch JSON records by ID from a remote API.
///
/// Reads a JSON list of IDs, fetches each record concurrently with retry,
/// and writes the payloads to a timestamped JSON file. Unset options fall
/// back to the FETCH_ENDPOINT, N_WORKERS, N_ATTEMPTS, TIMEOUT, THROTTLE and
/// BACKOFF_FACTOR environment variables.
#[derive(Parser, Debug)]
#[command(name = "record-fetcher")]
#[command(author, version, about)]
pub struct Args {
    /// JSON file holding the IDs to fetch
    #[arg(long, value_name = "FILE")]
    pub ids: PathBuf,

    /// First index to fetch (inclusive)
    #[arg(long, default_value_t = 0)]
    pub start: usize,

    /// Index to stop before (exclusive, defaults to the end of the list)
    #[arg(long)]
    pub finish: Option<usize>,

    /// Endpoint URL; a `{id}` template for GET
    #[arg(short = 'e', long)]
    pub endpoint: Option<String>,

    /// HTTP method (GET or POST)
    #[arg(short = 'm', long)]
    pub method: Option<String>,

    /// Concurrent workers (1-100)
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub workers: Option<u8>,

    /// Attempts per request, including the first (1-20)
    #[arg(short = 'a', long, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_attempts: Option<u32>,

    /// Per-request timeout in seconds (1-3600)
    #[arg(short = 't', long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// Seconds each worker waits after a fetch
    #[arg(long)]
    pub throttle: Option<f64>,

    /// Base backoff between retries, in seconds
    #[arg(long)]
    pub backoff: Option<f64>,

    /// Label used in output and log file names
    #[arg(short = 'l', long, default_value = "records")]
    pub label: String,

    /// Directory for result files
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Directory for a per-run log file
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Fetch one ID at a time instead of dispatching to workers
    #[arg(long)]
    pub sequential: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
