//! # Remote Document Store
//!
//! Pages live in Confluence. The publish workflow talks to it through the
//! [`DocumentStore`] trait; [`ConfluenceClient`] is the REST implementation.
//! Every page carries a version number used for optimistic concurrency: an
//! update names the version it was based on and the store rejects it with
//! [`StoreError::Conflict`] if the page has moved on.

pub mod client;
pub mod storage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::ConfluenceClient;

/// A page as reported by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePage {
    pub id: String,
    pub title: String,
    pub space_key: String,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
}

/// Page creation request
#[derive(Debug, Clone)]
pub struct NewPage {
    pub space_key: String,
    pub parent_id: Option<String>,
    pub title: String,
    /// Body in Confluence storage format
    pub body: String,
}

/// Page update request
#[derive(Debug, Clone)]
pub struct PageUpdate {
    pub page_id: String,
    pub title: String,
    pub body: String,
    /// Version the caller last observed; the store writes `expected_version + 1`
    pub expected_version: u64,
}

/// File attached to a page
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub key: String,
    pub name: String,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("version conflict on page '{page_id}': {message}")]
    Conflict { page_id: String, message: String },

    #[error("page '{0}' not found")]
    NotFound(String),

    #[error("document store rejected credentials")]
    Unauthorized,

    #[error("document store returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("document store request failed: {0}")]
    Request(String),

    #[error("unexpected document store response: {0}")]
    Malformed(String),
}

/// Remote wiki operations used by the publish workflow
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_page(&self, page_id: &str) -> Result<RemotePage, StoreError>;

    async fn create_page(&self, page: NewPage) -> Result<RemotePage, StoreError>;

    async fn update_page(&self, update: PageUpdate) -> Result<RemotePage, StoreError>;

    async fn delete_page(&self, page_id: &str) -> Result<(), StoreError>;

    /// Create or replace an attachment with the same filename
    async fn upload_attachment(
        &self,
        page_id: &str,
        attachment: Attachment,
    ) -> Result<(), StoreError>;

    async fn list_spaces(&self, limit: usize) -> Result<Vec<Space>, StoreError>;
}
