//! Confluence REST client against a mock server.

use pageplane::confluence::{
    Attachment, ConfluenceClient, DocumentStore, NewPage, PageUpdate, StoreError,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zeroize::Zeroizing;

fn client(server: &MockServer) -> ConfluenceClient {
    ConfluenceClient::new(
        server.uri(),
        Some("bot@example.com".to_string()),
        Zeroizing::new("api-token".to_string()),
    )
    .unwrap()
}

fn content(id: &str, version: u64) -> serde_json::Value {
    json!({
        "id": id,
        "type": "page",
        "title": "Architecture",
        "space": { "key": "DOCS" },
        "version": { "number": version },
        "_links": { "webui": format!("/spaces/DOCS/pages/{}", id) }
    })
}

#[tokio::test]
async fn create_posts_storage_body_under_parent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/api/content"))
        .and(header_exists("authorization"))
        .and(body_partial_json(json!({
            "type": "page",
            "title": "Architecture",
            "space": { "key": "DOCS" },
            "ancestors": [{ "id": "42" }],
            "body": { "storage": { "value": "<p>hi</p>", "representation": "storage" } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(content("1001", 1)))
        .expect(1)
        .mount(&server)
        .await;

    let page = client(&server)
        .create_page(NewPage {
            space_key: "DOCS".to_string(),
            parent_id: Some("42".to_string()),
            title: "Architecture".to_string(),
            body: "<p>hi</p>".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(page.id, "1001");
    assert_eq!(page.version, 1);
    assert_eq!(page.space_key, "DOCS");
    assert_eq!(page.web_url, Some(format!("{}/spaces/DOCS/pages/1001", server.uri())));
}

#[tokio::test]
async fn update_sends_next_version_and_maps_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/rest/api/content/1001"))
        .and(body_partial_json(json!({ "version": { "number": 4 } })))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({ "message": "Version must be incremented" })),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .update_page(PageUpdate {
            page_id: "1001".to_string(),
            title: "Architecture".to_string(),
            body: "<p>new</p>".to_string(),
            expected_version: 3,
        })
        .await
        .unwrap_err();

    match err {
        StoreError::Conflict { page_id, message } => {
            assert_eq!(page_id, "1001");
            assert_eq!(message, "Version must be incremented");
        }
        other => panic!("expected conflict, got {:?}", other),
    }
}

#[tokio::test]
async fn missing_page_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/content/999"))
        .and(query_param("expand", "version,space"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client(&server).get_page("999").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(ref id) if id == "999"));
}

#[tokio::test]
async fn rejected_credentials_are_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/api/content/7"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = client(&server).delete_page("7").await.unwrap_err();
    assert!(matches!(err, StoreError::Unauthorized));
}

#[tokio::test]
async fn attachment_upload_bypasses_xsrf_check() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/rest/api/content/1001/child/attachment"))
        .and(header("X-Atlassian-Token", "no-check"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .upload_attachment(
            "1001",
            Attachment {
                filename: "architecture-diagram-1.png".to_string(),
                media_type: "image/png".to_string(),
                data: vec![0x89, b'P', b'N', b'G'],
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn server_errors_keep_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/space"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client(&server).list_spaces(10).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Status { status: 503, ref message } if message == "maintenance"
    ));
}

#[tokio::test]
async fn list_spaces_passes_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/space"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "key": "DOCS", "name": "Documentation" },
                { "key": "ENG", "name": "Engineering" }
            ]
        })))
        .mount(&server)
        .await;

    let spaces = client(&server).list_spaces(2).await.unwrap();
    let keys: Vec<&str> = spaces.iter().map(|s| s.key.as_str()).collect();
    assert_eq!(keys, vec!["DOCS", "ENG"]);
}
