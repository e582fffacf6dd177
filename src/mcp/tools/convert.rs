//! MCP Tools for one-off conversions
//!
//! `convert` works on inline content, `convert_file` on files on the gateway host.

use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use super::{read_file, write_file, ToolContext};
use crate::converter::{ConversionRequest, Format};
use crate::errors::{Error, Result};
use crate::mcp::protocol::{ContentBlock, Tool, ToolCallResult};
use crate::observability::metrics;

pub fn convert_tool() -> Tool {
    Tool::new(
        "convert",
        "Convert inline content between formats. Mermaid source renders to png, svg or pdf; \
         images convert between raster formats; documents convert through pandoc. Provide \
         text in `source` or binary input in `sourceBase64`.",
        json!({
            "type": "object",
            "properties": {
                "source": {
                    "type": "string",
                    "description": "Input content as text (Mermaid, Markdown, HTML, ...)"
                },
                "sourceBase64": {
                    "type": "string",
                    "description": "Input content as base64, for binary inputs"
                },
                "from": {
                    "type": "string",
                    "description": "Input format name or extension (default: mermaid)",
                    "default": "mermaid"
                },
                "to": {
                    "type": "string",
                    "description": "Output format name or extension (default: png)",
                    "default": "png"
                }
            },
            "anyOf": [
                { "required": ["source"] },
                { "required": ["sourceBase64"] }
            ]
        }),
    )
}

pub fn convert_file_tool() -> Tool {
    Tool::new(
        "convert_file",
        "Convert a file on the gateway host and write the result to outputPath. Formats are \
         inferred from the file extensions unless given explicitly.",
        json!({
            "type": "object",
            "properties": {
                "inputPath": { "type": "string", "minLength": 1 },
                "outputPath": { "type": "string", "minLength": 1 },
                "from": { "type": "string", "description": "Override the input format" },
                "to": { "type": "string", "description": "Override the output format" }
            },
            "required": ["inputPath", "outputPath"]
        }),
    )
}

fn default_from() -> String {
    "mermaid".to_string()
}

fn default_to() -> String {
    "png".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertArgs {
    pub source: Option<String>,
    pub source_base64: Option<String>,
    #[serde(default = "default_from")]
    pub from: String,
    #[serde(default = "default_to")]
    pub to: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertFileArgs {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub from: Option<String>,
    pub to: Option<String>,
}

fn parse_format(name: &str) -> Result<Format> {
    Format::from_name(name).ok_or_else(|| Error::validation(format!("Unknown format '{}'", name)))
}

async fn run(ctx: &ToolContext, request: ConversionRequest) -> Result<Vec<u8>> {
    let engine = request.engine;
    let result = ctx.converter.convert(request).await;
    metrics::record_conversion(engine.as_str(), result.is_ok());
    Ok(result?)
}

#[instrument(
    skip(ctx, args),
    fields(from = %args.from, to = %args.to),
    name = "mcp_execute_convert"
)]
pub async fn execute_convert(ctx: &ToolContext, args: ConvertArgs) -> Result<ToolCallResult> {
    let from = parse_format(&args.from)?;
    let to = parse_format(&args.to)?;

    let source = match (args.source, args.source_base64) {
        (Some(text), _) => text.into_bytes(),
        (None, Some(encoded)) => BASE64
            .decode(encoded.trim())
            .map_err(|e| Error::validation(format!("sourceBase64 is not valid base64: {}", e)))?,
        (None, None) => return Err(Error::validation("either source or sourceBase64 is required")),
    };

    let output = run(ctx, ConversionRequest::new(from, to, source)?).await?;
    info!(bytes = output.len(), "Conversion finished");
    Ok(output_result(to, output))
}

#[instrument(
    skip(ctx, args),
    fields(input = %args.input_path.display(), output = %args.output_path.display()),
    name = "mcp_execute_convert_file"
)]
pub async fn execute_convert_file(
    ctx: &ToolContext,
    args: ConvertFileArgs,
) -> Result<ToolCallResult> {
    let from = match &args.from {
        Some(name) => parse_format(name)?,
        None => Format::from_path(&args.input_path).ok_or_else(|| {
            Error::validation(format!(
                "Cannot infer the format of {}; pass `from`",
                args.input_path.display()
            ))
        })?,
    };
    let to = match &args.to {
        Some(name) => parse_format(name)?,
        None => Format::from_path(&args.output_path).ok_or_else(|| {
            Error::validation(format!(
                "Cannot infer the format of {}; pass `to`",
                args.output_path.display()
            ))
        })?,
    };

    let source = read_file(&args.input_path).await?;
    let output = run(ctx, ConversionRequest::new(from, to, source)?).await?;
    write_file(&args.output_path, &output).await?;

    info!(bytes = output.len(), "Converted file");
    Ok(ToolCallResult::json(json!({
        "inputPath": args.input_path,
        "outputPath": args.output_path,
        "from": from.name(),
        "to": to.name(),
        "bytes": output.len(),
    })))
}

/// Text formats come back as text, images as image content, anything else as base64.
fn output_result(format: Format, output: Vec<u8>) -> ToolCallResult {
    let summary = json!({
        "format": format.name(),
        "mimeType": format.mime_type(),
        "bytes": output.len(),
    });

    if format.is_textual() {
        return ToolCallResult {
            content: vec![ContentBlock::text(String::from_utf8_lossy(&output))],
            structured_content: Some(summary),
            is_error: None,
        };
    }

    let encoded = BASE64.encode(&output);
    if format.is_image() {
        ToolCallResult::json(summary).with_content(ContentBlock::Image {
            data: encoded,
            mime_type: format.mime_type().to_string(),
        })
    } else {
        let mut payload = summary;
        payload["base64"] = json!(encoded);
        ToolCallResult::json(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn svg_output_is_text() {
        let result = output_result(Format::Svg, b"<svg/>".to_vec());
        assert_eq!(result.content, vec![ContentBlock::text("<svg/>")]);
        assert_eq!(result.structured_content.unwrap()["mimeType"], "image/svg+xml");
    }

    #[test]
    fn png_output_is_image_content() {
        let result = output_result(Format::Png, vec![0x89, b'P', b'N', b'G']);
        assert!(matches!(
            result.content.last(),
            Some(ContentBlock::Image { mime_type, .. }) if mime_type == "image/png"
        ));
    }

    #[test]
    fn pdf_output_is_base64() {
        let result = output_result(Format::Pdf, b"%PDF".to_vec());
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["base64"], BASE64.encode(b"%PDF"));
    }

    #[test]
    fn args_default_to_mermaid_png() {
        let args: ConvertArgs =
            serde_json::from_value(json!({"source": "graph TD; A-->B"})).unwrap();
        assert_eq!(args.from, "mermaid");
        assert_eq!(args.to, "png");
    }
}
