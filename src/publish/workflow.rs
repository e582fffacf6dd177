//! Page publish workflow
//!
//! Creates, updates and deletes pages, rendering Markdown (and its diagrams)
//! into storage format and keeping the path → page cache in step with every
//! successful remote write.
//!
//! Nothing here is transactional. A create that uploads diagrams runs as
//! create page → upload attachments → update body, and a failure part way
//! leaves whatever already happened in place.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::cache::{PageCache, PageMapping};
use super::target::{resolve_target, TargetDefaults, TargetOverrides};
use crate::confluence::{storage, Attachment, DocumentStore, NewPage, PageUpdate, RemotePage};
use crate::confluence::{Space, StoreError};
use crate::converter::{ConversionRequest, Converter, Format};
use crate::errors::{Error, Result};
use crate::observability::metrics;
use crate::pipeline::{base_name_for, DiagramArtifact, DiagramFailure, DiagramPipeline};

/// Publish a document, creating its page or updating the mapped one
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub source_path: Option<String>,
    pub title: String,
    /// Markdown body
    pub content: String,
    pub target: TargetOverrides,
    /// Version last observed; required when `source_path` is already mapped
    pub version: Option<u64>,
}

/// Update a known page
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub page_id: String,
    pub title: String,
    pub content: String,
    pub version: u64,
    pub source_path: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteRequest {
    pub page_id: Option<String>,
    pub source_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFailure {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub page_id: String,
    pub title: String,
    pub space_key: String,
    pub version: u64,
    /// True when the page did not exist before this call
    pub created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Attachments uploaded and linked from the body
    pub attachments: Vec<String>,
    pub failed_diagrams: Vec<DiagramFailure>,
    pub failed_uploads: Vec<UploadFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub page_id: String,
    /// False when the page was already gone remotely
    pub remote_deleted: bool,
    pub removed_mappings: Vec<String>,
}

struct RenderedBody {
    body: String,
    attachments: Vec<String>,
    failed_diagrams: Vec<DiagramFailure>,
    failed_uploads: Vec<UploadFailure>,
}

pub struct PublishWorkflow {
    store: Arc<dyn DocumentStore>,
    converter: Arc<dyn Converter>,
    pipeline: Arc<DiagramPipeline>,
    cache: Arc<PageCache>,
    defaults: TargetDefaults,
}

impl PublishWorkflow {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        converter: Arc<dyn Converter>,
        pipeline: Arc<DiagramPipeline>,
        cache: Arc<PageCache>,
        defaults: TargetDefaults,
    ) -> Self {
        Self { store, converter, pipeline, cache, defaults }
    }

    pub fn cache(&self) -> &Arc<PageCache> {
        &self.cache
    }

    pub fn defaults(&self) -> &TargetDefaults {
        &self.defaults
    }

    /// Publish `request.content`.
    ///
    /// A mapped `source_path` turns this into an update of the mapped page and
    /// requires `request.version`.
    #[instrument(
        skip(self, request),
        fields(source_path = ?request.source_path, title = %request.title)
    )]
    pub async fn publish(&self, request: PublishRequest) -> Result<PublishOutcome> {
        if request.title.trim().is_empty() {
            return Err(Error::validation("title must not be empty"));
        }

        let existing = match &request.source_path {
            Some(path) => self.cache.get(path).await,
            None => None,
        };

        match existing {
            Some(mapping) => {
                let version = request.version.ok_or_else(|| {
                    Error::validation(format!(
                        "'{}' is already published as page {} (version {}); \
                         pass the version you last observed to update it",
                        mapping.source_path, mapping.page_id, mapping.version
                    ))
                })?;
                let update = UpdateRequest {
                    page_id: mapping.page_id.clone(),
                    title: request.title,
                    content: request.content,
                    version,
                    source_path: Some(mapping.source_path.clone()),
                };
                let result = self.apply_update(update, Some(mapping)).await;
                metrics::record_publish("update", result.is_ok());
                result
            }
            None => {
                let result = self.create(request).await;
                metrics::record_publish("create", result.is_ok());
                result
            }
        }
    }

    /// Update `request.page_id` from version `request.version`.
    #[instrument(
        skip(self, request),
        fields(page_id = %request.page_id, version = request.version)
    )]
    pub async fn update(&self, request: UpdateRequest) -> Result<PublishOutcome> {
        if request.title.trim().is_empty() {
            return Err(Error::validation("title must not be empty"));
        }

        let mapping = match &request.source_path {
            Some(path) => self.cache.get(path).await,
            None => self.cache.find_by_page_id(&request.page_id).await,
        };
        let result = self.apply_update(request, mapping).await;
        metrics::record_publish("update", result.is_ok());
        result
    }

    /// Delete a page and forget every mapping that points at it.
    ///
    /// With only `source_path`, the page id comes from the cache. When both
    /// are given and the path is mapped to another page, nothing is deleted.
    #[instrument(
        skip(self, request),
        fields(page_id = ?request.page_id, source_path = ?request.source_path)
    )]
    pub async fn delete(&self, request: DeleteRequest) -> Result<DeleteOutcome> {
        let result = self.delete_inner(request).await;
        metrics::record_publish("delete", result.is_ok());
        result
    }

    pub async fn get_page(&self, page_id: &str) -> Result<RemotePage> {
        Ok(self.store.get_page(page_id).await?)
    }

    pub async fn list_spaces(&self, limit: usize) -> Result<Vec<Space>> {
        Ok(self.store.list_spaces(limit).await?)
    }

    async fn create(&self, request: PublishRequest) -> Result<PublishOutcome> {
        let source = request.source_path.as_deref().map(Path::new);
        let target = resolve_target(&request.target, source, &self.defaults).await?;

        let base_name = base_name_for(request.source_path.as_deref(), &request.title);
        let output = self.pipeline.process(&request.content, &base_name).await;

        // diagrams stay as code until their attachments exist
        let initial_body = self.render(&request.content, &HashSet::new()).await?;
        let page = self
            .store
            .create_page(NewPage {
                space_key: target.space_key.clone(),
                parent_id: target.parent_page_id.clone(),
                title: request.title.clone(),
                body: initial_body,
            })
            .await?;
        info!(page_id = %page.id, space_key = %page.space_key, "Created page");

        if let Some(path) = &request.source_path {
            self.remember(path, &page, &target.space_key).await?;
        }

        let mut outcome = PublishOutcome {
            page_id: page.id.clone(),
            title: page.title.clone(),
            space_key: non_empty_or(&page.space_key, &target.space_key),
            version: page.version,
            created: true,
            url: page.web_url.clone(),
            attachments: Vec::new(),
            failed_diagrams: output.failures.clone(),
            failed_uploads: Vec::new(),
        };

        if output.artifacts.is_empty() {
            return Ok(outcome);
        }

        let (uploaded, failed_uploads) = self.upload(&page.id, &output.artifacts).await;
        outcome.failed_uploads = failed_uploads;
        if uploaded.is_empty() {
            return Ok(outcome);
        }

        let linked = output.extracted.rewrite(|block| {
            block.filename().filter(|filename| uploaded.contains(*filename))
        });
        let body =
            self.render(&linked, &uploaded).await.map_err(|e| partially_published(&page.id, e))?;

        let updated = self
            .store
            .update_page(PageUpdate {
                page_id: page.id.clone(),
                title: request.title.clone(),
                body,
                expected_version: page.version,
            })
            .await
            .map_err(|e| partially_published(&page.id, e.into()))?;

        if let Some(path) = &request.source_path {
            self.remember(path, &updated, &outcome.space_key).await?;
        }

        outcome.version = updated.version;
        outcome.url = updated.web_url.or(outcome.url);
        outcome.attachments = sorted(uploaded);
        Ok(outcome)
    }

    async fn apply_update(
        &self,
        request: UpdateRequest,
        mapping: Option<PageMapping>,
    ) -> Result<PublishOutcome> {
        let base_name = base_name_for(request.source_path.as_deref(), &request.title);
        let rendered =
            self.render_with_diagrams(&request.page_id, &request.content, &base_name).await?;

        let updated = self
            .store
            .update_page(PageUpdate {
                page_id: request.page_id.clone(),
                title: request.title.clone(),
                body: rendered.body,
                expected_version: request.version,
            })
            .await?;
        info!(page_id = %updated.id, version = updated.version, "Updated page");

        let known_space = mapping.as_ref().map(|m| m.space_key.as_str()).unwrap_or_default();
        let space_key = non_empty_or(&updated.space_key, known_space);

        let source_path =
            request.source_path.clone().or_else(|| mapping.map(|m| m.source_path));
        if let Some(path) = &source_path {
            self.remember(path, &updated, &space_key).await?;
        }

        Ok(PublishOutcome {
            page_id: updated.id,
            title: updated.title,
            space_key,
            version: updated.version,
            created: false,
            url: updated.web_url,
            attachments: rendered.attachments,
            failed_diagrams: rendered.failed_diagrams,
            failed_uploads: rendered.failed_uploads,
        })
    }

    async fn delete_inner(&self, request: DeleteRequest) -> Result<DeleteOutcome> {
        let explicit_id = request.page_id.as_deref().map(str::trim).filter(|id| !id.is_empty());
        let mapped = match &request.source_path {
            Some(path) => self.cache.get(path).await,
            None => None,
        };

        let page_id = match (explicit_id, &mapped, &request.source_path) {
            (Some(id), Some(mapping), Some(path)) if mapping.page_id != id => {
                return Err(Error::validation(format!(
                    "'{}' is mapped to page {}, not page {}",
                    path, mapping.page_id, id
                )));
            }
            (Some(id), _, _) => id.to_string(),
            (None, Some(mapping), _) => mapping.page_id.clone(),
            (None, None, Some(path)) => {
                return Err(Error::not_found(format!("no page mapped to '{}'", path)));
            }
            (None, None, None) => {
                return Err(Error::validation("either pageId or sourcePath is required"));
            }
        };

        let remote_deleted = match self.store.delete_page(&page_id).await {
            Ok(()) => true,
            Err(StoreError::NotFound(_)) => {
                warn!(page_id = %page_id, "Page already absent remotely; clearing mapping");
                false
            }
            Err(e) => return Err(e.into()),
        };

        // every mapping to the deleted page goes, including the one for source_path
        let removed = self.cache.remove_by_page_id(&page_id).await?;
        info!(page_id = %page_id, removed_mappings = removed.len(), "Deleted page");

        Ok(DeleteOutcome {
            page_id,
            remote_deleted,
            removed_mappings: removed.into_iter().map(|m| m.source_path).collect(),
        })
    }

    /// Render diagrams, upload them to an existing page and build the body
    /// linking whichever attachments made it.
    async fn render_with_diagrams(
        &self,
        page_id: &str,
        content: &str,
        base_name: &str,
    ) -> Result<RenderedBody> {
        let output = self.pipeline.process(content, base_name).await;
        let (uploaded, failed_uploads) = self.upload(page_id, &output.artifacts).await;

        let linked = output.extracted.rewrite(|block| {
            block.filename().filter(|filename| uploaded.contains(*filename))
        });
        let body = self.render(&linked, &uploaded).await?;

        Ok(RenderedBody {
            body,
            attachments: sorted(uploaded),
            failed_diagrams: output.failures,
            failed_uploads,
        })
    }

    /// Upload artifacts one at a time; a failed upload does not stop the rest.
    async fn upload(
        &self,
        page_id: &str,
        artifacts: &[DiagramArtifact],
    ) -> (HashSet<String>, Vec<UploadFailure>) {
        let mut uploaded = HashSet::new();
        let mut failed = Vec::new();

        for artifact in artifacts {
            let attachment = Attachment {
                filename: artifact.filename.clone(),
                media_type: artifact.format.mime_type().to_string(),
                data: artifact.data.clone(),
            };
            match self.store.upload_attachment(page_id, attachment).await {
                Ok(()) => {
                    uploaded.insert(artifact.filename.clone());
                }
                Err(e) => {
                    warn!(
                        page_id = %page_id,
                        filename = %artifact.filename,
                        error = %e,
                        "Attachment upload failed"
                    );
                    failed.push(UploadFailure {
                        filename: artifact.filename.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        (uploaded, failed)
    }

    /// Markdown → HTML → storage format
    async fn render(&self, markdown: &str, attachments: &HashSet<String>) -> Result<String> {
        let request = ConversionRequest::document(markdown, Format::Markdown, Format::Html)?;
        let html = self.converter.convert(request).await?;
        let html = String::from_utf8(html).map_err(|e| {
            Error::internal(format!("document converter produced invalid UTF-8: {}", e))
        })?;
        Ok(storage::to_storage(&html, attachments))
    }

    async fn remember(&self, source_path: &str, page: &RemotePage, space_key: &str) -> Result<()> {
        self.cache
            .upsert(PageMapping {
                source_path: source_path.to_string(),
                page_id: page.id.clone(),
                space_key: non_empty_or(&page.space_key, space_key),
                title: page.title.clone(),
                version: page.version,
                last_updated: Utc::now(),
            })
            .await
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn sorted(names: HashSet<String>) -> Vec<String> {
    let mut names: Vec<String> = names.into_iter().collect();
    names.sort();
    names
}

/// The page exists but its diagrams could not be linked
fn partially_published(page_id: &str, error: Error) -> Error {
    match error {
        Error::Conflict { .. } => error,
        other => Error::Store(format!(
            "page '{}' was created but linking its diagrams failed: {}; \
             retry with update_page",
            page_id, other
        )),
    }
}
