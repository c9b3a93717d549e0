//! Status and body error mapping

use std::time::Duration;

use trs_core::domain::SequenceId;
use trs_core::ports::{FeedError, IFeedReader};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

async fn changes_error(response: ResponseTemplate) -> FeedError {
    let server = common::setup_trs_mock().await;
    Mock::given(method("GET"))
        .and(path("/trs/changes"))
        .respond_with(response)
        .mount(&server)
        .await;

    let reader = common::anonymous_reader(&server);
    reader
        .fetch_changes_page(Some(SequenceId::new(1)), None)
        .await
        .expect_err("request should fail")
}

#[tokio::test]
async fn test_unauthorized_maps_to_auth() {
    let err = changes_error(ResponseTemplate::new(401)).await;
    assert!(matches!(err, FeedError::Unauthorized(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let err = changes_error(ResponseTemplate::new(503).set_body_string("maintenance")).await;
    assert_eq!(
        err,
        FeedError::Server {
            status: 503,
            message: "maintenance".into()
        }
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_throttled_carries_retry_after() {
    let err =
        changes_error(ResponseTemplate::new(429).insert_header("Retry-After", "2")).await;
    assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
}

#[tokio::test]
async fn test_gone_is_cursor_expired() {
    let err = changes_error(ResponseTemplate::new(410)).await;
    assert!(matches!(err, FeedError::CursorExpired(_)));
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let err = changes_error(ResponseTemplate::new(200).set_body_string("<html/>")).await;
    assert!(matches!(err, FeedError::InvalidResponse(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = common::setup_trs_mock().await;
    Mock::given(method("GET"))
        .and(path("/trs/changes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"changes": []}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let endpoint =
        trs_core::domain::EndpointDescriptor::anonymous(&common::feed_uri(&server)).unwrap();
    let reader = trs_feed::HttpFeedReader::new(endpoint, Duration::from_millis(200)).unwrap();
    let err = reader.fetch_changes_page(None, None).await.unwrap_err();
    assert!(matches!(err, FeedError::Timeout(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    let endpoint = trs_core::domain::EndpointDescriptor::anonymous("http://127.0.0.1:1/trs").unwrap();
    let reader = trs_feed::HttpFeedReader::new(endpoint, Duration::from_secs(2)).unwrap();
    let err = reader.fetch_base_page(None).await.unwrap_err();
    assert!(err.is_transient(), "unexpected error: {err:?}");
}
