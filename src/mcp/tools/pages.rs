//! MCP Tools for Confluence pages
//!
//! Thin adapters over [`PublishWorkflow`](crate::publish::PublishWorkflow):
//! argument handling here, semantics there.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use super::{read_text, ToolContext};
use crate::config::ProjectConfig;
use crate::errors::{Error, Result};
use crate::mcp::protocol::{Tool, ToolCallResult};
use crate::publish::{DeleteRequest, PublishRequest, TargetOverrides, UpdateRequest};

pub fn publish_page_tool() -> Tool {
    Tool::new(
        "publish_page",
        "Publish Markdown to Confluence. Mermaid diagrams are rendered and attached. The first \
         publish of a sourcePath creates a page and remembers it; later publishes of the same \
         path update that page and must pass the version last observed. Target space and \
         parent resolve from the arguments, then the project file, then server defaults.",
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "minLength": 1 },
                "content": {
                    "type": "string",
                    "description": "Markdown body. Read from sourcePath when omitted."
                },
                "sourcePath": {
                    "type": "string",
                    "description": "Local document this page is published from"
                },
                "spaceKey": { "type": "string" },
                "parentPageId": { "type": "string" },
                "projectDir": {
                    "type": "string",
                    "description": "Directory whose .pageplane.toml supplies target defaults"
                },
                "version": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Current page version, required when updating"
                }
            },
            "required": ["title"],
            "anyOf": [
                { "required": ["content"] },
                { "required": ["sourcePath"] }
            ]
        }),
    )
}

pub fn update_page_tool() -> Tool {
    Tool::new(
        "update_page",
        "Replace the body of an existing page. `version` is the version you last observed; \
         if the page has changed since, the update fails with a conflict and nothing is \
         overwritten.",
        json!({
            "type": "object",
            "properties": {
                "pageId": { "type": "string", "minLength": 1 },
                "title": { "type": "string", "minLength": 1 },
                "version": { "type": "integer", "minimum": 1 },
                "content": { "type": "string" },
                "sourcePath": { "type": "string" }
            },
            "required": ["pageId", "title", "version"],
            "anyOf": [
                { "required": ["content"] },
                { "required": ["sourcePath"] }
            ]
        }),
    )
}

pub fn delete_page_tool() -> Tool {
    Tool::new(
        "delete_page",
        "Delete a page by id or by the source path it was published from, and forget the \
         local mapping.",
        json!({
            "type": "object",
            "properties": {
                "pageId": { "type": "string", "minLength": 1 },
                "sourcePath": { "type": "string", "minLength": 1 }
            },
            "anyOf": [
                { "required": ["pageId"] },
                { "required": ["sourcePath"] }
            ]
        }),
    )
}

pub fn get_page_tool() -> Tool {
    Tool::new(
        "get_page",
        "Fetch a page's id, title, space and current version, by id or by source path.",
        json!({
            "type": "object",
            "properties": {
                "pageId": { "type": "string", "minLength": 1 },
                "sourcePath": { "type": "string", "minLength": 1 }
            },
            "anyOf": [
                { "required": ["pageId"] },
                { "required": ["sourcePath"] }
            ]
        }),
    )
}

pub fn list_spaces_tool() -> Tool {
    Tool::new(
        "list_spaces",
        "List Confluence spaces visible to the configured account.",
        json!({
            "type": "object",
            "properties": {
                "limit": { "type": "integer", "minimum": 1, "maximum": 250, "default": 25 }
            }
        }),
    )
}

pub fn list_mappings_tool() -> Tool {
    Tool::new(
        "list_mappings",
        "List the local documents this gateway has published and the pages they map to.",
        json!({ "type": "object", "properties": {} }),
    )
}

pub fn configure_project_tool() -> Tool {
    Tool::new(
        "configure_project",
        "Store the default space key and parent page for a project directory in \
         .pageplane.toml. Omitted fields keep their current value.",
        json!({
            "type": "object",
            "properties": {
                "spaceKey": { "type": "string" },
                "parentPageId": { "type": "string" },
                "projectDir": {
                    "type": "string",
                    "description": "Project directory (default: the server's project dir)"
                }
            },
            "anyOf": [
                { "required": ["spaceKey"] },
                { "required": ["parentPageId"] }
            ]
        }),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishPageArgs {
    pub title: String,
    pub content: Option<String>,
    pub source_path: Option<String>,
    pub space_key: Option<String>,
    pub parent_page_id: Option<String>,
    pub project_dir: Option<PathBuf>,
    pub version: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePageArgs {
    pub page_id: String,
    pub title: String,
    pub version: u64,
    pub content: Option<String>,
    pub source_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRefArgs {
    pub page_id: Option<String>,
    pub source_path: Option<String>,
}

fn default_limit() -> usize {
    25
}

#[derive(Debug, Deserialize)]
pub struct ListSpacesArgs {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureProjectArgs {
    pub space_key: Option<String>,
    pub parent_page_id: Option<String>,
    pub project_dir: Option<PathBuf>,
}

/// Inline content wins; otherwise the source file is read.
async fn resolve_content(content: Option<String>, source_path: Option<&str>) -> Result<String> {
    match (content, source_path) {
        (Some(content), _) => Ok(content),
        (None, Some(path)) => read_text(Path::new(path)).await,
        (None, None) => Err(Error::validation("either content or sourcePath is required")),
    }
}

#[instrument(skip(ctx, args), fields(title = %args.title), name = "mcp_execute_publish_page")]
pub async fn execute_publish_page(
    ctx: &ToolContext,
    args: PublishPageArgs,
) -> Result<ToolCallResult> {
    let publisher = ctx.publisher()?;
    let content = resolve_content(args.content, args.source_path.as_deref()).await?;

    let outcome = publisher
        .publish(PublishRequest {
            source_path: args.source_path,
            title: args.title,
            content,
            target: TargetOverrides {
                space_key: args.space_key,
                parent_page_id: args.parent_page_id,
                project_dir: args.project_dir,
            },
            version: args.version,
        })
        .await?;

    Ok(ToolCallResult::json(serde_json::to_value(&outcome)?))
}

#[instrument(skip(ctx, args), fields(page_id = %args.page_id), name = "mcp_execute_update_page")]
pub async fn execute_update_page(
    ctx: &ToolContext,
    args: UpdatePageArgs,
) -> Result<ToolCallResult> {
    let publisher = ctx.publisher()?;
    let content = resolve_content(args.content, args.source_path.as_deref()).await?;

    let outcome = publisher
        .update(UpdateRequest {
            page_id: args.page_id,
            title: args.title,
            content,
            version: args.version,
            source_path: args.source_path,
        })
        .await?;

    Ok(ToolCallResult::json(serde_json::to_value(&outcome)?))
}

#[instrument(skip(ctx, args), name = "mcp_execute_delete_page")]
pub async fn execute_delete_page(ctx: &ToolContext, args: PageRefArgs) -> Result<ToolCallResult> {
    let publisher = ctx.publisher()?;
    let outcome = publisher
        .delete(DeleteRequest { page_id: args.page_id, source_path: args.source_path })
        .await?;

    Ok(ToolCallResult::json(serde_json::to_value(&outcome)?))
}

#[instrument(skip(ctx, args), name = "mcp_execute_get_page")]
pub async fn execute_get_page(ctx: &ToolContext, args: PageRefArgs) -> Result<ToolCallResult> {
    let publisher = ctx.publisher()?;
    let cache = publisher.cache();

    let (page_id, mapping) = match (args.page_id, args.source_path) {
        (Some(id), _) => {
            let mapping = cache.find_by_page_id(&id).await;
            (id, mapping)
        }
        (None, Some(path)) => {
            let mapping = cache
                .get(&path)
                .await
                .ok_or_else(|| Error::not_found(format!("no page mapped to '{}'", path)))?;
            (mapping.page_id.clone(), Some(mapping))
        }
        (None, None) => return Err(Error::validation("either pageId or sourcePath is required")),
    };

    let page = publisher.get_page(&page_id).await?;
    Ok(ToolCallResult::json(json!({ "page": page, "mapping": mapping })))
}

pub async fn execute_list_spaces(
    ctx: &ToolContext,
    args: ListSpacesArgs,
) -> Result<ToolCallResult> {
    let spaces = ctx.publisher()?.list_spaces(args.limit).await?;
    Ok(ToolCallResult::json(json!({ "spaces": spaces, "count": spaces.len() })))
}

pub async fn execute_list_mappings(ctx: &ToolContext) -> Result<ToolCallResult> {
    let mappings = ctx.publisher()?.cache().list().await;
    Ok(ToolCallResult::json(json!({ "mappings": mappings, "count": mappings.len() })))
}

#[instrument(skip(ctx, args), name = "mcp_execute_configure_project")]
pub async fn execute_configure_project(
    ctx: &ToolContext,
    args: ConfigureProjectArgs,
) -> Result<ToolCallResult> {
    let dir = match args.project_dir.or_else(|| ctx.project_dir.clone()) {
        Some(dir) => dir,
        None => tokio::task::spawn_blocking(std::env::current_dir)
            .await
            .map_err(|e| Error::internal(format!("current directory lookup failed: {}", e)))?
            .map_err(|e| Error::io(e, "resolving the current directory"))?,
    };
    let is_dir = tokio::fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false);
    if !is_dir {
        return Err(Error::validation(format!("{} is not a directory", dir.display())));
    }

    let mut config = ProjectConfig::load(&dir).await?.unwrap_or_default();
    if let Some(space_key) = args.space_key {
        config.space_key = Some(space_key).filter(|s| !s.trim().is_empty());
    }
    if let Some(parent) = args.parent_page_id {
        config.parent_page_id = Some(parent).filter(|s| !s.trim().is_empty());
    }
    let path = config.save(&dir).await?;
    info!(path = %path.display(), "Saved project configuration");

    Ok(ToolCallResult::json(json!({
        "path": path,
        "spaceKey": config.space_key,
        "parentPageId": config.parent_page_id,
    })))
}
