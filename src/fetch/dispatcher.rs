//! Concurrent dispatcher for batches of record IDs.
//!
//! The [`Dispatcher`] fans a list of IDs out over a bounded worker pool and
//! streams [`FetchOutcome`]s back in completion order. Concurrency is bounded
//! by a semaphore, the same pattern the download engine used for files.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use record_fetcher::fetch::{
//!     Dispatcher, FetchOperation, RetryPolicy, TemplatedRead, Throttle, Transport,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Transport::new(&[], Duration::from_secs(30), RetryPolicy::default())?;
//! let strategy = Arc::new(TemplatedRead::new("https://api.example.com/records/{id}")?);
//! let operation = Arc::new(FetchOperation::new(transport, strategy));
//! let dispatcher = Dispatcher::new(operation, 10, Throttle::disabled())?;
//!
//! let ids = vec!["a".to_string(), "b".to_string()];
//! let report = dispatcher.dispatch(&ids).collect_report().await;
//! println!("fetched {}, failed {}", report.succeeded(), report.failed());
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::{FutureExt, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use super::constants::{MAX_WORKERS, MIN_WORKERS};
use super::operation::{FailureReason, FetchOperation, FetchOutcome, log_failure};
use super::throttle::Throttle;

/// Default worker count.
pub const DEFAULT_WORKERS: usize = 10;

/// Error type for dispatcher construction.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Worker count outside the supported range.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidWorkerCount {
        /// The rejected value.
        value: usize,
    },
}

/// Bounded worker pool running one [`FetchOperation`] per ID.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    operation: Arc<FetchOperation>,
    semaphore: Arc<Semaphore>,
    workers: usize,
    throttle: Throttle,
}

impl Dispatcher {
    /// Creates a dispatcher running at most `workers` fetches at once.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidWorkerCount`] if `workers` is outside 1-100.
    pub fn new(
        operation: Arc<FetchOperation>,
        workers: usize,
        throttle: Throttle,
    ) -> Result<Self, DispatchError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
            return Err(DispatchError::InvalidWorkerCount { value: workers });
        }

        debug!(
            workers,
            throttle_ms = throttle.delay().as_millis(),
            "creating dispatcher"
        );

        Ok(Self {
            operation,
            semaphore: Arc::new(Semaphore::new(workers)),
            workers,
            throttle,
        })
    }

    /// Returns the worker count.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Returns the per-worker throttle.
    #[must_use]
    pub fn throttle(&self) -> Throttle {
        self.throttle
    }

    /// Submits one fetch per ID and returns a stream of their outcomes.
    ///
    /// All tasks are spawned immediately; the semaphore decides how many run.
    /// Outcomes arrive in completion order, not input order. Must be called
    /// from within a Tokio runtime.
    #[instrument(skip(self, ids), fields(count = ids.len(), workers = self.workers))]
    pub fn dispatch(&self, ids: &[String]) -> FetchStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut handles = Vec::with_capacity(ids.len());

        info!("dispatching records");

        for id in ids {
            let id = id.clone();
            let sender = sender.clone();
            let operation = Arc::clone(&self.operation);
            let semaphore = Arc::clone(&self.semaphore);
            let throttle = self.throttle;

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    let reason = FailureReason::UnexpectedTask("worker pool closed".to_string());
                    log_failure(&id, &reason);
                    let _ = sender.send(FetchOutcome::Failure { id, reason });
                    return;
                };

                let outcome = match AssertUnwindSafe(operation.fetch(&id))
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        let reason = FailureReason::UnexpectedTask(message);
                        log_failure(&id, &reason);
                        FetchOutcome::Failure { id, reason }
                    }
                };

                // Pace this worker slot before releasing the permit.
                throttle.pause().await;

                // Receiver gone means the caller stopped listening.
                let _ = sender.send(outcome);
            }));
        }

        FetchStream { receiver, handles }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}

/// One-shot stream of outcomes from a [`Dispatcher::dispatch`] call.
///
/// Ends once every submitted task has reported. Dropping it early aborts the
/// tasks that are still running.
#[derive(Debug)]
pub struct FetchStream {
    receiver: mpsc::UnboundedReceiver<FetchOutcome>,
    handles: Vec<JoinHandle<()>>,
}

impl FetchStream {
    /// Waits for the next outcome; `None` once the batch is exhausted.
    pub async fn next(&mut self) -> Option<FetchOutcome> {
        self.receiver.recv().await
    }

    /// Adapts the stream to successful payloads only, dropping their IDs.
    pub fn payloads(self) -> impl Stream<Item = Value> {
        self.filter_map(|outcome| async move { outcome.into_payload() })
    }

    /// Drains the stream into a [`BatchReport`].
    pub async fn collect_report(mut self) -> BatchReport {
        let mut report = BatchReport::default();
        while let Some(outcome) = self.next().await {
            report.record(outcome);
        }
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "batch complete"
        );
        report
    }
}

impl Stream for FetchStream {
    type Item = FetchOutcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for FetchStream {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// A fetched record, keyed by its ID.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRecord {
    /// Record ID.
    pub id: String,
    /// Decoded response body.
    pub payload: Value,
}

/// A record that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRecord {
    /// Record ID.
    pub id: String,
    /// Why it failed.
    pub reason: FailureReason,
}

/// Collected results of one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Successful records with their IDs, in completion order.
    pub records: Vec<FetchedRecord>,
    /// Failed IDs with their reasons, in completion order.
    pub failures: Vec<FailedRecord>,
}

impl BatchReport {
    /// Looks up the payload fetched for `id`.
    #[must_use]
    pub fn payload_for(&self, id: &str) -> Option<&Value> {
        self.records
            .iter()
            .find(|record| record.id == id)
            .map(|record| &record.payload)
    }

    /// Adds one outcome to the report.
    pub fn record(&mut self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Success { id, payload } => {
                self.records.push(FetchedRecord { id, payload });
            }
            FetchOutcome::Failure { id, reason } => {
                self.failures.push(FailedRecord { id, reason });
            }
        }
    }

    /// Number of successful fetches.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.records.len()
    }

    /// Number of failed fetches.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Total number of outcomes.
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded() + self.failed()
    }

    /// True when a non-empty batch produced no payload at all.
    #[must_use]
    pub fn is_total_failure(&self) -> bool {
        self.total() > 0 && self.records.is_empty()
    }
}

impl FromIterator<FetchOutcome> for BatchReport {
    fn from_iter<I: IntoIterator<Item = FetchOutcome>>(iter: I) -> Self {
        let mut report = Self::default();
        for outcome in iter {
            report.record(outcome);
        }
        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::Method;
    use serde_json::json;

    use super::*;
    use crate::fetch::{
        FetchError, PreparedRequest, RequestStrategy, RetryPolicy, Transport, TransportResponse,
    };

    /// Succeeds for every ID except `fail-*`, panics on `panic`.
    #[derive(Debug)]
    struct ScriptedStrategy;

    #[async_trait]
    impl RequestStrategy for ScriptedStrategy {
        fn method(&self) -> Method {
            Method::GET
        }

        fn build_request(&self, id: &str) -> Result<PreparedRequest, FetchError> {
            Ok(PreparedRequest::get(format!("http://scripted/{id}")))
        }

        async fn submit(
            &self,
            _transport: &Transport,
            id: &str,
        ) -> Result<TransportResponse, FetchError> {
            if id == "panic" {
                panic!("strategy blew up on {id}");
            }
            if id.starts_with("fail-") {
                return Err(FetchError::http_status(format!("http://scripted/{id}"), 404));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(TransportResponse {
                status: 200,
                body: json!({ "ok": true, "id": id }),
                attempts: 1,
            })
        }
    }

    fn operation() -> Arc<FetchOperation> {
        let transport =
            Transport::new(&[], Duration::from_secs(1), RetryPolicy::default()).unwrap();
        Arc::new(FetchOperation::new(transport, Arc::new(ScriptedStrategy)))
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    // ==================== Construction Tests ====================

    #[test]
    fn test_dispatcher_rejects_zero_workers() {
        let result = Dispatcher::new(operation(), 0, Throttle::disabled());
        assert!(matches!(
            result,
            Err(DispatchError::InvalidWorkerCount { value: 0 })
        ));
    }

    #[test]
    fn test_dispatcher_rejects_too_many_workers() {
        let err = Dispatcher::new(operation(), 101, Throttle::disabled()).unwrap_err();
        assert!(err.to_string().contains("between 1 and 100"));
    }

    #[test]
    fn test_dispatcher_accepts_bounds() {
        assert_eq!(
            Dispatcher::new(operation(), 1, Throttle::disabled())
                .unwrap()
                .workers(),
            1
        );
        assert_eq!(
            Dispatcher::new(operation(), 100, Throttle::disabled())
                .unwrap()
                .workers(),
            100
        );
    }

    // ==================== Dispatch Tests ====================

    #[tokio::test]
    async fn test_dispatch_yields_every_payload() {
        let dispatcher = Dispatcher::new(operation(), 2, Throttle::disabled()).unwrap();
        let payloads: Vec<Value> = dispatcher
            .dispatch(&ids(&["a", "b", "c"]))
            .payloads()
            .collect()
            .await;

        let got: HashSet<String> = payloads.iter().map(ToString::to_string).collect();
        let expected: HashSet<String> = ["a", "b", "c"]
            .iter()
            .map(|id| json!({ "ok": true, "id": id }).to_string())
            .collect();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_dispatch_reports_failures_without_payloads() {
        let dispatcher = Dispatcher::new(operation(), 3, Throttle::disabled()).unwrap();
        let report = dispatcher
            .dispatch(&ids(&["a", "fail-1", "b", "fail-2"]))
            .collect_report()
            .await;

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 2);
        assert!(!report.is_total_failure());
        let failed: HashSet<&str> = report.failures.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(failed, HashSet::from(["fail-1", "fail-2"]));
    }

    #[tokio::test]
    async fn test_dispatch_isolates_panics() {
        let dispatcher = Dispatcher::new(operation(), 2, Throttle::disabled()).unwrap();
        let report = dispatcher
            .dispatch(&ids(&["a", "panic", "b"]))
            .collect_report()
            .await;

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.id, "panic");
        assert!(matches!(
            &failure.reason,
            FailureReason::UnexpectedTask(message) if message.contains("blew up")
        ));
    }

    #[tokio::test]
    async fn test_dispatch_empty_batch_ends_immediately() {
        let dispatcher = Dispatcher::new(operation(), 4, Throttle::disabled()).unwrap();
        let mut stream = dispatcher.dispatch(&[]);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_throttles_each_worker() {
        let throttle = Throttle::new(Duration::from_millis(20));
        let dispatcher = Dispatcher::new(operation(), 1, throttle).unwrap();
        let started = tokio::time::Instant::now();
        let report = dispatcher
            .dispatch(&ids(&["a", "b", "c"]))
            .collect_report()
            .await;
        assert_eq!(report.succeeded(), 3);
        // One worker, so the three pauses are serialized.
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    // ==================== BatchReport Tests ====================

    #[test]
    fn test_batch_report_total_failure() {
        let report: BatchReport = vec![FetchOutcome::Failure {
            id: "x".to_string(),
            reason: FailureReason::Timeout("slow".to_string()),
        }]
        .into_iter()
        .collect();
        assert!(report.is_total_failure());
        assert_eq!(report.total(), 1);
    }

    #[tokio::test]
    async fn test_collect_report_keys_payloads_by_id() {
        let dispatcher = Dispatcher::new(operation(), 3, Throttle::disabled()).unwrap();
        let report = dispatcher
            .dispatch(&ids(&["a", "b", "fail-1", "c"]))
            .collect_report()
            .await;

        assert_eq!(report.records.len(), 3);
        for record in &report.records {
            assert_eq!(record.payload, json!({ "ok": true, "id": record.id }));
        }
        assert_eq!(report.payload_for("b"), Some(&json!({ "ok": true, "id": "b" })));
        assert!(report.payload_for("fail-1").is_none());
    }

    #[test]
    fn test_batch_report_empty_is_not_total_failure() {
        assert!(!BatchReport::default().is_total_failure());
    }

    #[test]
    fn test_panic_message_extracts_strings() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "task panicked");
    }
}
