//! Shared helpers: a mock TRS provider serving the TRS document

use std::time::Duration;

use trs_core::domain::EndpointDescriptor;
use trs_feed::HttpFeedReader;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Starts a mock provider whose TRS document lives at `/trs` and points
/// at `/trs/base` and `/trs/changes` (relative links).
pub async fn setup_trs_mock() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/trs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "base": "/trs/base",
            "changeLog": "/trs/changes"
        })))
        .mount(&server)
        .await;

    server
}

pub fn feed_uri(server: &MockServer) -> String {
    format!("{}/trs", server.uri())
}

pub fn anonymous_reader(server: &MockServer) -> HttpFeedReader {
    let endpoint = EndpointDescriptor::anonymous(&feed_uri(server)).unwrap();
    HttpFeedReader::new(endpoint, Duration::from_secs(5)).unwrap()
}

#[allow(dead_code)]
pub fn basic_auth_reader(server: &MockServer, user: &str, pass: &str) -> HttpFeedReader {
    let endpoint = EndpointDescriptor::basic_auth(&feed_uri(server), user, pass).unwrap();
    HttpFeedReader::new(endpoint, Duration::from_secs(5)).unwrap()
}
