//! Shared helpers for socket-bound integration tests.

#![allow(dead_code)]

use std::net::TcpListener;
use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};
use wiremock::{MockServer, Respond, ResponseTemplate};

/// Path prefix the mock catalog is served under.
pub const CATALOG_PATH: &str = "/v2/anime";

#[must_use]
pub fn socket_tests_required() -> bool {
    std::env::var("HARVESTER_REQUIRE_SOCKET_TESTS")
        .ok()
        .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

#[track_caller]
#[must_use]
pub fn should_skip_socket_bound_test() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return false;
    }

    let location = Location::caller();
    let message = format!(
        "[socket-bound-test] cannot bind localhost socket at {}:{}; wiremock-based test cannot run here",
        location.file(),
        location.line()
    );
    if socket_tests_required() {
        panic!("{message}. Set HARVESTER_REQUIRE_SOCKET_TESTS=0 to allow skipping.");
    }

    eprintln!("{message}. Skipping test.");
    true
}

pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if should_skip_socket_bound_test() {
        None
    } else {
        Some(MockServer::start().await)
    }
}

/// Base URL of the mock catalog.
pub fn catalog_url(server: &MockServer) -> String {
    format!("{}{CATALOG_PATH}", server.uri())
}

/// Entry JSON as the catalog API returns it.
pub fn entry_json(id: u64, title: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "mean": 7.5,
        "num_list_users": 1200,
        "genres": [{"id": 1, "name": "Action"}],
        "start_date": "2001-04-01",
    })
}

/// Fails the first `fail_count` requests with `fail_status`, then answers
/// 200 with `body`.
pub struct FlakyResponder {
    request_count: Arc<AtomicUsize>,
    fail_count: usize,
    fail_status: u16,
    body: Value,
}

impl FlakyResponder {
    pub fn new(fail_count: usize, fail_status: u16, body: Value) -> (Self, Arc<AtomicUsize>) {
        let request_count = Arc::new(AtomicUsize::new(0));
        let responder = Self {
            request_count: Arc::clone(&request_count),
            fail_count,
            fail_status,
            body,
        };
        (responder, request_count)
    }
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let n = self.request_count.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_count {
            ResponseTemplate::new(self.fail_status).set_body_string("try again later")
        } else {
            ResponseTemplate::new(200).set_body_json(self.body.clone())
        }
    }
}
