//! Skips mock-server tests where no localhost socket can be bound.

use std::net::TcpListener;

use wiremock::MockServer;

/// Set to `1` or `true` to fail instead of skipping.
const REQUIRE_SOCKETS_VAR: &str = "RECORD_FETCHER_REQUIRE_SOCKET_TESTS";

/// Starts a mock server, or returns `None` when sockets are unavailable.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return Some(MockServer::start().await);
    }

    let required = std::env::var(REQUIRE_SOCKETS_VAR)
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true"));
    assert!(
        !required,
        "cannot bind a localhost socket and {REQUIRE_SOCKETS_VAR} is set"
    );

    eprintln!("[socket-bound-test] cannot bind a localhost socket; skipping");
    None
}
