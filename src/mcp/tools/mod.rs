//! MCP Tools
//!
//! Tool definitions and executors. Executors receive typed arguments that
//! already passed schema validation and return domain errors, which the
//! registry turns into `isError` tool results.

pub mod convert;
pub mod diagrams;
pub mod pages;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::converter::Converter;
use crate::errors::{Error, Result};
use crate::mcp::error::McpError;
use crate::mcp::protocol::{ContentBlock, Tool, ToolCallResult};
use crate::pipeline::DiagramPipeline;
use crate::publish::PublishWorkflow;

pub use convert::{convert_file_tool, convert_tool};
pub use diagrams::render_diagrams_tool;
pub use pages::{
    configure_project_tool, delete_page_tool, get_page_tool, list_mappings_tool,
    list_spaces_tool, publish_page_tool, update_page_tool,
};

/// Everything a tool executor may touch
#[derive(Clone)]
pub struct ToolContext {
    pub converter: Arc<dyn Converter>,
    pub pipeline: Arc<DiagramPipeline>,
    /// Absent when Confluence is not configured
    pub publisher: Option<Arc<PublishWorkflow>>,
    /// Default directory for `configure_project`
    pub project_dir: Option<PathBuf>,
}

impl ToolContext {
    pub fn publisher(&self) -> Result<&PublishWorkflow> {
        self.publisher.as_deref().ok_or_else(|| {
            Error::config(
                "Confluence is not configured: set CONFLUENCE_BASE_URL and CONFLUENCE_API_TOKEN",
            )
        })
    }
}

/// Every tool served by this gateway
pub fn all_tools() -> Vec<Tool> {
    vec![
        convert_tool(),
        convert_file_tool(),
        render_diagrams_tool(),
        publish_page_tool(),
        update_page_tool(),
        delete_page_tool(),
        get_page_tool(),
        list_spaces_tool(),
        list_mappings_tool(),
        configure_project_tool(),
    ]
}

/// Deserialize validated arguments into the executor's argument type
pub fn parse_args<T: DeserializeOwned>(args: Value) -> std::result::Result<T, McpError> {
    serde_json::from_value(args)
        .map_err(|e| McpError::InvalidParams(format!("Invalid tool arguments: {}", e)))
}

/// Tool result reporting a failure, optionally with whatever did succeed
pub fn error_result(error: &Error, partial: Option<Value>) -> ToolCallResult {
    let mut structured = json!({
        "error": { "kind": error.kind(), "message": error.to_string() }
    });
    if let Some(partial) = partial {
        structured["partial"] = partial;
    }

    ToolCallResult {
        content: vec![ContentBlock::text(error.to_string())],
        structured_content: Some(structured),
        is_error: Some(true),
    }
}

/// Read a UTF-8 text file
pub(crate) async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::io(e, format!("reading {}", path.display())))
}

pub(crate) async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| Error::io(e, format!("reading {}", path.display())))
}

/// Write a file, creating its parent directory
pub(crate) async fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(e, format!("creating {}", parent.display())))?;
    }
    tokio::fs::write(path, data)
        .await
        .map_err(|e| Error::io(e, format!("writing {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_are_unique() {
        let tools = all_tools();
        let mut names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), tools.len());
    }

    #[test]
    fn every_schema_is_an_object_schema() {
        for tool in all_tools() {
            assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
            assert!(jsonschema::validator_for(&tool.input_schema).is_ok(), "{}", tool.name);
        }
    }

    #[test]
    fn error_result_carries_kind_and_partial() {
        let error = Error::Conflict { page_id: "9".to_string(), message: "stale".to_string() };
        let result = error_result(&error, Some(json!({"rendered": 2})));

        assert_eq!(result.is_error, Some(true));
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["error"]["kind"], "conflict_error");
        assert_eq!(structured["partial"]["rendered"], 2);
    }
}
