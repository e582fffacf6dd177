//! MCP Tool Registry
//!
//! Single source of truth for the tools a session can call. Each tool's input
//! schema is compiled once; arguments are checked against it before they are
//! deserialized and handed to the executor.

use std::collections::HashMap;

use jsonschema::Validator;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::mcp::error::McpError;
use crate::mcp::protocol::{Tool, ToolCallResult};
use crate::mcp::tools::{self, convert, diagrams, pages, parse_args, ToolContext};

pub struct ToolRegistry {
    tools: Vec<Tool>,
    validators: HashMap<String, Validator>,
    context: ToolContext,
}

impl ToolRegistry {
    pub fn new(context: ToolContext) -> Result<Self> {
        let tools = tools::all_tools();
        let mut validators = HashMap::with_capacity(tools.len());
        for tool in &tools {
            let validator = jsonschema::validator_for(&tool.input_schema).map_err(|e| {
                Error::internal(format!("Invalid input schema for tool '{}': {}", tool.name, e))
            })?;
            validators.insert(tool.name.clone(), validator);
        }

        Ok(Self { tools, validators, context })
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    /// Check `args` against the tool's schema, listing every violation
    fn validate(&self, name: &str, args: &Value) -> std::result::Result<(), McpError> {
        let validator = self
            .validators
            .get(name)
            .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;

        let errors: Vec<String> = validator.iter_errors(args).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(McpError::InvalidParams(format!(
                "Invalid arguments for '{}': {}",
                name,
                errors.join("; ")
            )))
        }
    }

    /// Run a tool.
    ///
    /// Unknown tools and schema violations are protocol errors. Anything that
    /// goes wrong while the tool runs becomes an `isError` result.
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<Value>,
    ) -> std::result::Result<ToolCallResult, McpError> {
        let args = match arguments {
            Some(Value::Null) | None => json!({}),
            Some(args) => args,
        };
        self.validate(name, &args)?;
        debug!(tool_name = %name, "Executing tool call");

        let ctx = &self.context;
        let result = match name {
            "convert" => convert::execute_convert(ctx, parse_args(args)?).await,
            "convert_file" => convert::execute_convert_file(ctx, parse_args(args)?).await,
            "render_diagrams" => diagrams::execute_render_diagrams(ctx, parse_args(args)?).await,
            "publish_page" => pages::execute_publish_page(ctx, parse_args(args)?).await,
            "update_page" => pages::execute_update_page(ctx, parse_args(args)?).await,
            "delete_page" => pages::execute_delete_page(ctx, parse_args(args)?).await,
            "get_page" => pages::execute_get_page(ctx, parse_args(args)?).await,
            "list_spaces" => pages::execute_list_spaces(ctx, parse_args(args)?).await,
            "list_mappings" => pages::execute_list_mappings(ctx).await,
            "configure_project" => {
                pages::execute_configure_project(ctx, parse_args(args)?).await
            }
            other => return Err(McpError::ToolNotFound(other.to_string())),
        };

        Ok(result.unwrap_or_else(|e| {
            warn!(tool_name = %name, kind = e.kind(), error = %e, "Tool call failed");
            tools::error_result(&e, None)
        }))
    }
}
