//! HTTP conversion backend against a mock service.

use std::time::Duration;

use pageplane::converter::{
    ConversionError, ConversionRequest, Converter, Engine, Format, HttpConverter,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn converter(server: &MockServer, timeout: Duration) -> HttpConverter {
    HttpConverter::new(format!("{}/", server.uri()), timeout).unwrap()
}

#[tokio::test]
async fn diagram_request_posts_base64_source_to_engine_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/convert/diagram"))
        .and(body_json(json!({
            "from": "mermaid",
            "to": "png",
            "source": "Z3JhcGggVEQ7IEEtLT5C"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\x89PNG".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let request = ConversionRequest::diagram("graph TD; A-->B", Format::Png).unwrap();
    assert_eq!(request.engine, Engine::Diagram);

    let bytes = converter(&server, Duration::from_secs(5)).convert(request).await.unwrap();
    assert_eq!(bytes, b"\x89PNG");
}

#[tokio::test]
async fn rejected_conversion_keeps_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/convert/diagram"))
        .respond_with(ResponseTemplate::new(422).set_body_string("Parse error on line 1"))
        .mount(&server)
        .await;

    let request = ConversionRequest::diagram("graph TD; A-->", Format::Svg).unwrap();
    let err = converter(&server, Duration::from_secs(5)).convert(request).await.unwrap_err();

    match err {
        ConversionError::Status { status, body } => {
            assert_eq!(status, 422);
            assert_eq!(body, "Parse error on line 1");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn empty_artifact_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/convert/document"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let request = ConversionRequest::document("# Title", Format::Markdown, Format::Html).unwrap();
    let err = converter(&server, Duration::from_secs(5)).convert(request).await.unwrap_err();
    assert!(matches!(err, ConversionError::Malformed(_)));
}

#[tokio::test]
async fn slow_service_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/convert/diagram"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let request = ConversionRequest::diagram("graph TD; A-->B", Format::Png).unwrap();
    let err = converter(&server, Duration::from_millis(100)).convert(request).await.unwrap_err();
    assert!(matches!(err, ConversionError::Timeout { engine: Engine::Diagram, .. }));
}
