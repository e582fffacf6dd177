//! MCP Tool for rendering the diagrams of a Markdown file

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use super::{error_result, read_text, write_file, ToolContext};
use crate::converter::{ConversionError, Engine, Format};
use crate::errors::{Error, Result};
use crate::mcp::protocol::{Tool, ToolCallResult};
use crate::pipeline::base_name_for;

pub fn render_diagrams_tool() -> Tool {
    Tool::new(
        "render_diagrams",
        "Render every ```mermaid block of a Markdown file to an image, write the images next \
         to a rewritten copy of the document that references them, and report blocks that \
         failed. Failed blocks stay as code in the output.",
        json!({
            "type": "object",
            "properties": {
                "inputPath": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Markdown file to process"
                },
                "outputDir": {
                    "type": "string",
                    "description": "Directory for images and the rewritten document \
                                    (default: the input's directory)"
                },
                "outputPath": {
                    "type": "string",
                    "description": "Rewritten document path \
                                    (default: <outputDir>/<name>.rendered.md)"
                },
                "format": {
                    "type": "string",
                    "enum": ["png", "svg", "pdf"],
                    "description": "Image format (default: configured diagram format)"
                }
            },
            "required": ["inputPath"]
        }),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderDiagramsArgs {
    pub input_path: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub format: Option<String>,
}

#[instrument(
    skip(ctx, args),
    fields(input = %args.input_path.display()),
    name = "mcp_execute_render_diagrams"
)]
pub async fn execute_render_diagrams(
    ctx: &ToolContext,
    args: RenderDiagramsArgs,
) -> Result<ToolCallResult> {
    let format = match &args.format {
        Some(name) => Format::from_name(name)
            .filter(Format::is_diagram_output)
            .ok_or_else(|| Error::validation(format!("'{}' is not a diagram format", name)))?,
        None => ctx.pipeline.format(),
    };

    let document = read_text(&args.input_path).await?;
    let base_name = base_name_for(args.input_path.to_str(), "document");
    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| args.input_path.parent().map(Path::to_path_buf))
        .unwrap_or_default();

    let output = if format == ctx.pipeline.format() {
        ctx.pipeline.process(&document, &base_name).await
    } else {
        ctx.pipeline.with_format(format).process(&document, &base_name).await
    };

    if output.block_count() > 0 && output.artifacts.is_empty() {
        let error = Error::Conversion(ConversionError::Failed {
            engine: Engine::Diagram,
            message: format!("all {} diagrams failed to render", output.block_count()),
        });
        return Ok(error_result(&error, Some(json!({ "failures": output.failures }))));
    }

    let mut written = Vec::with_capacity(output.artifacts.len());
    for artifact in &output.artifacts {
        let path = output_dir.join(&artifact.filename);
        write_file(&path, &artifact.data).await?;
        written.push(json!({
            "index": artifact.index,
            "path": path,
            "bytes": artifact.data.len(),
        }));
    }

    let output_path = args
        .output_path
        .unwrap_or_else(|| output_dir.join(format!("{}.rendered.md", base_name)));
    write_file(&output_path, output.rewritten_document.as_bytes()).await?;

    info!(
        diagrams = output.block_count(),
        rendered = output.artifacts.len(),
        failed = output.failures.len(),
        "Rendered diagrams"
    );

    Ok(ToolCallResult::json(json!({
        "outputPath": output_path,
        "diagrams": output.block_count(),
        "artifacts": written,
        "failures": output.failures,
    })))
}
