//! Remote conversion service client.
//!
//! `POST {base_url}/convert/{engine}` with a JSON body
//! `{"from": .., "to": .., "source": <base64>}`; a 2xx response body is the
//! converted artifact.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::Serialize;
use tracing::{debug, warn};

use super::{ConversionError, ConversionRequest, Converter};

/// Longest error body echoed back into a [`ConversionError::Status`]
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
struct ConvertBody<'a> {
    from: &'a str,
    to: &'a str,
    source: String,
}

/// Converter backed by an HTTP conversion service
#[derive(Debug, Clone)]
pub struct HttpConverter {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpConverter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ConversionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pageplane/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConversionError::Request(e.to_string()))?;

        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), timeout })
    }
}

#[async_trait]
impl Converter for HttpConverter {
    async fn convert(&self, request: ConversionRequest) -> Result<Vec<u8>, ConversionError> {
        let url = format!("{}/convert/{}", self.base_url, request.engine);
        let body = ConvertBody {
            from: request.from.name(),
            to: request.to.name(),
            source: base64::engine::general_purpose::STANDARD.encode(&request.source),
        };

        debug!(url = %url, from = %request.from, to = %request.to, "Sending conversion request");

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                ConversionError::Timeout { engine: request.engine, after: self.timeout }
            } else {
                ConversionError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let cut =
                    (0..=MAX_ERROR_BODY).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
                text.truncate(cut);
            }
            warn!(url = %url, status = status.as_u16(), "Converter rejected request");
            return Err(ConversionError::Status { status: status.as_u16(), body: text });
        }

        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ConversionError::Timeout { engine: request.engine, after: self.timeout }
            } else {
                ConversionError::Malformed(e.to_string())
            }
        })?;

        if bytes.is_empty() {
            return Err(ConversionError::Malformed("empty response body".to_string()));
        }

        Ok(bytes.to_vec())
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}
