//! Run configuration: environment defaults merged with CLI overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use record_fetcher::fetch::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT_SECS, DEFAULT_WORKERS, EndpointConfig, RetryPolicy,
    Throttle,
};
use reqwest::Method;
use serde_json::Value;

use crate::cli::Args;

/// Throttle applied when neither THROTTLE nor `--throttle` is given.
const DEFAULT_THROTTLE_SECS: f64 = 1.0;

/// Values read from the process environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    /// `FETCH_ENDPOINT`
    pub endpoint: Option<String>,
    /// `FETCH_METHOD`
    pub method: Option<String>,
    /// `HEADERS`, parsed from a JSON object.
    pub headers: Vec<(String, String)>,
    /// `N_ATTEMPTS`
    pub max_attempts: Option<u32>,
    /// `TIMEOUT`
    pub timeout_secs: Option<u64>,
    /// `THROTTLE`
    pub throttle: Option<f64>,
    /// `BACKOFF_FACTOR`
    pub backoff: Option<f64>,
    /// `N_WORKERS`
    pub workers: Option<usize>,
    /// `LOGS_DIR`
    pub logs_dir: Option<PathBuf>,
    /// `OUTPUT_DIR`
    pub output_dir: Option<PathBuf>,
}

impl EnvConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads configuration through `lookup`; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let headers = match get("HEADERS") {
            Some(raw) => parse_headers(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            endpoint: get("FETCH_ENDPOINT"),
            method: get("FETCH_METHOD"),
            headers,
            max_attempts: parse_number(get("N_ATTEMPTS"), "N_ATTEMPTS")?,
            timeout_secs: parse_number(get("TIMEOUT"), "TIMEOUT")?,
            throttle: parse_number(get("THROTTLE"), "THROTTLE")?,
            backoff: parse_number(get("BACKOFF_FACTOR"), "BACKOFF_FACTOR")?,
            workers: parse_number(get("N_WORKERS"), "N_WORKERS")?,
            logs_dir: get("LOGS_DIR").map(PathBuf::from),
            output_dir: get("OUTPUT_DIR").map(PathBuf::from),
        })
    }
}

fn parse_number<T>(raw: Option<String>, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.map(|value| {
        value
            .parse::<T>()
            .with_context(|| format!("Invalid value for `{name}`: {value:?}"))
    })
    .transpose()
}

fn parse_headers(raw: &str) -> Result<Vec<(String, String)>> {
    let value: Value = serde_json::from_str(raw).context("`HEADERS` is not valid JSON")?;
    let Value::Object(map) = value else {
        bail!("`HEADERS` must be a JSON object of header name to value");
    };
    map.into_iter()
        .map(|(name, value)| match value {
            Value::String(text) => Ok((name, text)),
            other => bail!("Header `{name}` must have a string value, got {other}"),
        })
        .collect()
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub ids_path: PathBuf,
    pub start: usize,
    pub finish: Option<usize>,
    pub endpoint: EndpointConfig,
    pub policy: RetryPolicy,
    pub throttle: Throttle,
    pub workers: usize,
    pub sequential: bool,
    pub label: String,
    pub output_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl RunConfig {
    /// Merges CLI flags over environment values over defaults.
    pub fn resolve(args: &Args, env: EnvConfig) -> Result<Self> {
        let Some(url) = args.endpoint.clone().or(env.endpoint) else {
            bail!("No endpoint configured. Pass --endpoint or set FETCH_ENDPOINT");
        };

        let method_name = args
            .method
            .clone()
            .or(env.method)
            .unwrap_or_else(|| "GET".to_string());
        let method = parse_method(&method_name)?;

        let max_attempts = args
            .max_attempts
            .or(env.max_attempts)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        validate_range("N_ATTEMPTS", u64::from(max_attempts), 1, 20)?;

        let timeout_secs = args
            .timeout
            .or(env.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        validate_range("TIMEOUT", timeout_secs, 1, 3600)?;

        let workers = args
            .workers
            .map(usize::from)
            .or(env.workers)
            .unwrap_or(DEFAULT_WORKERS);
        validate_range("N_WORKERS", workers as u64, 1, 100)?;

        let throttle_secs = args
            .throttle
            .or(env.throttle)
            .unwrap_or(DEFAULT_THROTTLE_SECS);
        let throttle = Throttle::from_secs_f64(throttle_secs).context("Invalid `THROTTLE`")?;

        // Backoff follows the throttle unless set on its own.
        let backoff_secs = args.backoff.or(env.backoff).unwrap_or(throttle_secs);
        let Ok(backoff) = Duration::try_from_secs_f64(backoff_secs) else {
            bail!("Invalid config value for `BACKOFF_FACTOR`: {backoff_secs}. Expected seconds >= 0");
        };

        let policy = RetryPolicy::new(max_attempts, backoff).for_method(method.clone());
        let endpoint = EndpointConfig::new(url, method)
            .with_headers(env.headers)
            .with_timeout(Duration::from_secs(timeout_secs));

        Ok(Self {
            ids_path: args.ids.clone(),
            start: args.start,
            finish: args.finish,
            endpoint,
            policy,
            throttle,
            workers,
            sequential: args.sequential,
            label: args.label.clone(),
            output_dir: args
                .output_dir
                .clone()
                .or(env.output_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            log_dir: args.log_dir.clone().or(env.logs_dir),
        })
    }
}

fn parse_method(name: &str) -> Result<Method> {
    match name.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        _ => bail!("Invalid config value for `FETCH_METHOD`: {name}. Expected GET or POST"),
    }
}

fn validate_range(field: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if !(min..=max).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}");
    }
    Ok(())
}

/// Loads the ID list from a JSON file.
///
/// Accepts an array of strings, or an array of objects carrying an `"id"`
/// string or number (the shape of a previous run's output).
pub fn load_ids(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read ID file {}", path.display()))?;
    parse_ids(&raw).with_context(|| format!("Invalid ID file {}", path.display()))
}

fn parse_ids(raw: &str) -> Result<Vec<String>> {
    let value: Value = serde_json::from_str(raw).context("not valid JSON")?;
    let Value::Array(items) = value else {
        bail!("expected a JSON array of IDs");
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::String(id) => Ok(id),
            Value::Object(mut record) => match record.remove("id") {
                Some(Value::String(id)) => Ok(id),
                Some(Value::Number(id)) => Ok(id.to_string()),
                _ => bail!("entry {index} has no string or number `id` field"),
            },
            other => bail!("entry {index} is not an ID: {other}"),
        })
        .collect()
}
