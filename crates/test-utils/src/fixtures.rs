//! Mock query service endpoints.
//!
//! Each helper mounts a mock on a running [`MockServer`] speaking the query
//! protocol: `POST /_sql` with a JSON body, answered with either
//! `{"duration": ...}` or `{"error": {"message": ...}}`.

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path of the query endpoint.
pub const QUERY_PATH: &str = "/_sql";

/// Successful response body as returned by the query service.
pub fn duration_body(duration_ms: f64) -> Value {
    json!({
        "cols": ["1"],
        "rows": [[1]],
        "rowcount": 1,
        "duration": duration_ms,
    })
}

/// Error response body.
pub fn error_body(message: &str) -> Value {
    json!({
        "error": {
            "message": message,
            "code": 4000,
        }
    })
}

/// Start a query service answering every statement with `duration_ms`.
pub async fn query_service(duration_ms: f64) -> MockServer {
    let server = MockServer::start().await;
    mount_duration(&server, duration_ms).await;
    server
}

/// Answer every query with a fixed server-side duration.
pub async fn mount_duration(server: &MockServer, duration_ms: f64) {
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(duration_body(duration_ms)))
        .mount(server)
        .await;
}

/// Answer every query after a real delay, reporting `duration_ms`.
pub async fn mount_delayed(server: &MockServer, delay: Duration, duration_ms: f64) {
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(duration_body(duration_ms))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Fail the next `times` requests for `stmt` with `message`; takes precedence
/// over other mounted query mocks.
pub async fn mount_statement_error(server: &MockServer, stmt: &str, message: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .and(body_partial_json(json!({ "stmt": stmt })))
        .respond_with(ResponseTemplate::new(400).set_body_json(error_body(message)))
        .up_to_n_times(times)
        .with_priority(1)
        .mount(server)
        .await;
}

/// Answer every query with a raw body and status code.
pub async fn mount_raw(server: &MockServer, status: u16, body: &str) {
    Mock::given(method("POST"))
        .and(path(QUERY_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

/// Serve version information on the root path.
pub async fn mount_version(server: &MockServer, number: &str, build_hash: &str) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "status": 200,
            "version": {
                "number": number,
                "build_hash": build_hash,
            }
        })))
        .mount(server)
        .await;
}

/// JSON bodies of all query requests received so far.
pub async fn received_queries(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == QUERY_PATH)
        .filter_map(|r| serde_json::from_slice(&r.body).ok())
        .collect()
}
