//! CLI entry point for the record fetcher.

use std::pin::pin;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use futures_util::StreamExt;
use record_fetcher::fetch::{BatchReport, FetchSession, IndexRange};
use tracing::{debug, info, warn};

mod app_config;
mod cli;
mod logging;
mod output;

use app_config::{EnvConfig, RunConfig, load_ids};
use cli::Args;

/// Exit status when every ID of a non-empty batch failed.
const EXIT_TOTAL_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let config = RunConfig::resolve(&args, EnvConfig::from_env()?)?;

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let log_path = logging::init(
        logging::default_level(args.quiet, args.verbose),
        config.log_dir.as_deref(),
        &config.label,
    )?;

    debug!(?args, "CLI arguments parsed");
    if let Some(path) = &log_path {
        info!(path = %path.display(), "logging to file");
    }

    let ids = load_ids(&config.ids_path)?;
    let range = IndexRange::new(config.start, config.finish.unwrap_or(ids.len()));
    info!(
        total = ids.len(),
        selected = range.select(&ids).len(),
        endpoint = %config.endpoint.url,
        method = %config.endpoint.method,
        "loaded IDs"
    );

    let session = FetchSession::open(&config.endpoint, config.policy.clone(), config.throttle)
        .context("Failed to open fetch session")?;

    let report = if config.sequential {
        let mut outcomes = pin!(session.fetch_ranged(&ids, range.start, range.finish));
        let mut report = BatchReport::default();
        while let Some(outcome) = outcomes.next().await {
            report.record(outcome);
        }
        report
    } else {
        session
            .dispatch_ranged(&ids, range.start, range.finish, config.workers)?
            .collect_report()
            .await
    };
    session.close();

    let stem = output::file_stem(Local::now(), &config.label, range);
    let written = output::write_report(&config.output_dir, &stem, &report)?;

    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        total = report.total(),
        path = %written.payloads.display(),
        "fetch complete"
    );

    if report.is_total_failure() {
        warn!(failed = report.failed(), "every record in the batch failed");
        return Ok(ExitCode::from(EXIT_TOTAL_FAILURE));
    }

    Ok(ExitCode::SUCCESS)
}
