//! Confluence REST client
//!
//! Talks to the v1 content API (`/rest/api/content`). Authenticates with
//! basic auth (username + API token) when a username is configured, otherwise
//! with the token as a bearer personal access token.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::{Attachment, DocumentStore, NewPage, PageUpdate, RemotePage, Space, StoreError};
use crate::config::ConfluenceConfig;
use crate::errors::{Error, Result};

/// Request timeout for Confluence calls
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct ContentResponse {
    id: String,
    title: String,
    space: Option<SpaceRef>,
    version: Option<VersionRef>,
    #[serde(rename = "_links")]
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct SpaceRef {
    key: String,
}

#[derive(Debug, Deserialize)]
struct VersionRef {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct Links {
    webui: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpaceList {
    results: Vec<Space>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: Option<String>,
}

/// Authenticated HTTP client for the Confluence REST API
#[derive(Clone)]
pub struct ConfluenceClient {
    client: Client,
    base_url: String,
    username: Option<String>,
    api_token: Zeroizing<String>,
}

impl std::fmt::Debug for ConfluenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfluenceClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl ConfluenceClient {
    pub fn new(
        base_url: impl Into<String>,
        username: Option<String>,
        api_token: Zeroizing<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("pageplane/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username,
            api_token,
        })
    }

    /// Build a client when the base URL and token are configured
    pub fn from_config(config: &ConfluenceConfig) -> Result<Option<Self>> {
        match (&config.base_url, &config.api_token) {
            (Some(base_url), Some(token)) => {
                Self::new(base_url.clone(), config.username.clone(), token.clone()).map(Some)
            }
            (None, None) => Ok(None),
            _ => Err(Error::config(
                "CONFLUENCE_BASE_URL and CONFLUENCE_API_TOKEN must be set together",
            )),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(user) => builder.basic_auth(user, Some(self.api_token.as_str())),
            None => builder.bearer_auth(self.api_token.as_str()),
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        self.request(self.client.get(url))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        self.request(self.client.post(url))
    }

    fn put(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("PUT {}", url);
        self.request(self.client.put(url))
    }

    fn delete(&self, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("DELETE {}", url);
        self.request(self.client.delete(url))
    }

    async fn send(&self, builder: RequestBuilder) -> std::result::Result<Response, StoreError> {
        builder.send().await.map_err(|e| StoreError::Request(e.to_string()))
    }

    /// Map non-2xx responses onto [`StoreError`]
    async fn check(
        &self,
        response: Response,
        page_id: Option<&str>,
    ) -> std::result::Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let raw = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&raw)
            .ok()
            .and_then(|e| e.message)
            .unwrap_or(raw);
        warn!(status = status.as_u16(), message = %message, "Confluence request failed");

        Err(match status {
            StatusCode::CONFLICT => StoreError::Conflict {
                page_id: page_id.unwrap_or_default().to_string(),
                message,
            },
            StatusCode::NOT_FOUND => {
                StoreError::NotFound(page_id.unwrap_or("unknown").to_string())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized,
            other => StoreError::Status { status: other.as_u16(), message },
        })
    }

    async fn json<T: DeserializeOwned>(response: Response) -> std::result::Result<T, StoreError> {
        response.json::<T>().await.map_err(|e| StoreError::Malformed(e.to_string()))
    }

    fn to_page(&self, content: ContentResponse, fallback_space: Option<&str>) -> RemotePage {
        RemotePage {
            web_url: content
                .links
                .and_then(|l| l.webui)
                .map(|webui| format!("{}{}", self.base_url, webui)),
            id: content.id,
            title: content.title,
            space_key: content
                .space
                .map(|s| s.key)
                .or_else(|| fallback_space.map(str::to_string))
                .unwrap_or_default(),
            version: content.version.map(|v| v.number).unwrap_or(1),
        }
    }
}

fn storage_body(body: &str) -> serde_json::Value {
    json!({ "storage": { "value": body, "representation": "storage" } })
}

#[async_trait]
impl DocumentStore for ConfluenceClient {
    async fn get_page(&self, page_id: &str) -> std::result::Result<RemotePage, StoreError> {
        let path = format!("/rest/api/content/{}?expand=version,space", page_id);
        let response = self.send(self.get(&path)).await?;
        let response = self.check(response, Some(page_id)).await?;
        let content: ContentResponse = Self::json(response).await?;
        Ok(self.to_page(content, None))
    }

    async fn create_page(&self, page: NewPage) -> std::result::Result<RemotePage, StoreError> {
        let mut body = json!({
            "type": "page",
            "title": page.title,
            "space": { "key": page.space_key },
            "body": storage_body(&page.body),
        });
        if let Some(parent) = &page.parent_id {
            body["ancestors"] = json!([{ "id": parent }]);
        }

        let response = self.send(self.post("/rest/api/content").json(&body)).await?;
        let response = self.check(response, None).await?;
        let content: ContentResponse = Self::json(response).await?;
        Ok(self.to_page(content, Some(&page.space_key)))
    }

    async fn update_page(&self, update: PageUpdate) -> std::result::Result<RemotePage, StoreError> {
        let body = json!({
            "id": update.page_id,
            "type": "page",
            "title": update.title,
            "body": storage_body(&update.body),
            "version": { "number": update.expected_version + 1 },
        });

        let path = format!("/rest/api/content/{}", update.page_id);
        let response = self.send(self.put(&path).json(&body)).await?;
        let response = self.check(response, Some(&update.page_id)).await?;
        let content: ContentResponse = Self::json(response).await?;
        Ok(self.to_page(content, None))
    }

    async fn delete_page(&self, page_id: &str) -> std::result::Result<(), StoreError> {
        let path = format!("/rest/api/content/{}", page_id);
        let response = self.send(self.delete(&path)).await?;
        self.check(response, Some(page_id)).await?;
        Ok(())
    }

    async fn upload_attachment(
        &self,
        page_id: &str,
        attachment: Attachment,
    ) -> std::result::Result<(), StoreError> {
        let part = multipart::Part::bytes(attachment.data)
            .file_name(attachment.filename.clone())
            .mime_str(&attachment.media_type)
            .map_err(|e| StoreError::Request(e.to_string()))?;
        let form = multipart::Form::new().part("file", part).text("minorEdit", "true");

        let path = format!("/rest/api/content/{}/child/attachment", page_id);
        let request = self.put(&path).header("X-Atlassian-Token", "no-check").multipart(form);
        let response = self.send(request).await?;
        self.check(response, Some(page_id)).await?;

        debug!(page_id = %page_id, filename = %attachment.filename, "Uploaded attachment");
        Ok(())
    }

    async fn list_spaces(&self, limit: usize) -> std::result::Result<Vec<Space>, StoreError> {
        let path = format!("/rest/api/space?limit={}", limit);
        let response = self.send(self.get(&path)).await?;
        let response = self.check(response, None).await?;
        let spaces: SpaceList = Self::json(response).await?;
        Ok(spaces.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_requires_url_and_token_together() {
        let empty = ConfluenceConfig::default();
        assert!(ConfluenceClient::from_config(&empty).unwrap().is_none());

        let partial = ConfluenceConfig {
            base_url: Some("https://example.atlassian.net/wiki".to_string()),
            ..Default::default()
        };
        assert!(matches!(ConfluenceClient::from_config(&partial), Err(Error::Config(_))));
    }

    #[test]
    fn base_url_is_normalized() {
        let client = ConfluenceClient::new(
            "https://example.atlassian.net/wiki/",
            None,
            Zeroizing::new("token".to_string()),
        )
        .unwrap();
        assert_eq!(client.base_url(), "https://example.atlassian.net/wiki");
        assert!(!format!("{:?}", client).contains("token\""));
    }
}
