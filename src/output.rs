//! Result files for a batch run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use record_fetcher::fetch::{BatchReport, FailedRecord, FetchedRecord, IndexRange};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

/// Shared stem of a run's output files: `{timestamp}_{label}_{range}`.
pub fn file_stem(now: DateTime<Local>, label: &str, range: IndexRange) -> String {
    format!(
        "{}_{label}_{}",
        now.format("%Y-%m-%d+%H-%M-%S"),
        range.label()
    )
}

#[derive(Debug, Serialize)]
struct PayloadEntry<'a> {
    id: &'a str,
    payload: &'a Value,
}

impl<'a> From<&'a FetchedRecord> for PayloadEntry<'a> {
    fn from(record: &'a FetchedRecord) -> Self {
        Self {
            id: &record.id,
            payload: &record.payload,
        }
    }
}

#[derive(Debug, Serialize)]
struct FailureEntry<'a> {
    id: &'a str,
    kind: &'static str,
    reason: String,
}

impl<'a> From<&'a FailedRecord> for FailureEntry<'a> {
    fn from(record: &'a FailedRecord) -> Self {
        Self {
            id: &record.id,
            kind: record.reason.kind(),
            reason: record.reason.to_string(),
        }
    }
}

/// Files written for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFiles {
    pub payloads: PathBuf,
    pub failures: Option<PathBuf>,
}

/// Writes `[{id, payload}]` records, plus a `_failed` file when anything failed.
pub fn write_report(dir: &Path, stem: &str, report: &BatchReport) -> Result<WrittenFiles> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let payloads = dir.join(format!("{stem}.json"));
    let entries: Vec<PayloadEntry<'_>> = report.records.iter().map(PayloadEntry::from).collect();
    write_json(&payloads, &entries)?;
    info!(path = %payloads.display(), count = report.succeeded(), "wrote payloads");

    let failures = if report.failures.is_empty() {
        None
    } else {
        let path = dir.join(format!("{stem}_failed.json"));
        let entries: Vec<FailureEntry<'_>> = report.failures.iter().map(FailureEntry::from).collect();
        write_json(&path, &entries)?;
        info!(path = %path.display(), count = report.failed(), "wrote failed IDs");
        Some(path)
    };

    Ok(WrittenFiles { payloads, failures })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize results")?;
    fs::write(path, rendered).with_context(|| format!("Failed to write {}", path.display()))
}
