//! Stateful wiremock responders shared by the integration suites.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use wiremock::{Request, Respond, ResponseTemplate};

/// Fails with `status` for the first `failures` calls, then answers 200 with JSON.
pub struct FlakyResponder {
    calls: Arc<AtomicUsize>,
    failures: usize,
    status: u16,
}

impl FlakyResponder {
    pub fn new(calls: Arc<AtomicUsize>, failures: usize, status: u16) -> Self {
        Self {
            calls,
            failures,
            status,
        }
    }
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            ResponseTemplate::new(self.status).set_body_string("temporarily unavailable")
        } else {
            ResponseTemplate::new(200).set_body_json(json!({ "ok": true }))
        }
    }
}

/// Echoes the last path segment back as `{"ok": true, "id": <segment>}`.
pub struct EchoIdResponder;

impl Respond for EchoIdResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let id = request
            .url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string();
        ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "id": id }))
    }
}

/// Tracks peak concurrent requests.
///
/// wiremock's `Respond` is synchronous, so the overlap window is a blocking
/// sleep; the mock server runs on its own threads, not the test runtime.
pub struct ConcurrencyTrackingResponder {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    delay: Duration,
}

impl ConcurrencyTrackingResponder {
    pub fn new(current: Arc<AtomicUsize>, peak: Arc<AtomicUsize>, delay: Duration) -> Self {
        Self {
            current,
            peak,
            delay,
        }
    }
}

impl Respond for ConcurrencyTrackingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.current.fetch_sub(1, Ordering::SeqCst);
        ResponseTemplate::new(200).set_body_json(json!({ "ok": true }))
    }
}
