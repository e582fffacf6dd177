//! # Conversion Engines
//!
//! The gateway never renders anything itself. Diagrams, raster images and
//! documents are converted by an external engine behind the [`Converter`]
//! trait: either a remote conversion service ([`HttpConverter`]) or local
//! command-line tools ([`CliConverter`]).

pub mod cli;
pub mod http;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

pub use cli::CliConverter;
pub use http::HttpConverter;

/// Which engine family handles a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    /// Mermaid diagram renderer
    Diagram,
    /// Raster/vector image converter
    Image,
    /// Document converter (Markdown, HTML, office formats)
    Document,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Diagram => "diagram",
            Engine::Image => "image",
            Engine::Document => "document",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input and output formats understood by the engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Mermaid,
    Markdown,
    Html,
    Rst,
    Docx,
    Odt,
    Pdf,
    Png,
    Jpeg,
    Gif,
    Webp,
    Svg,
    Tiff,
    Bmp,
}

impl Format {
    pub const ALL: [Format; 14] = [
        Format::Mermaid,
        Format::Markdown,
        Format::Html,
        Format::Rst,
        Format::Docx,
        Format::Odt,
        Format::Pdf,
        Format::Png,
        Format::Jpeg,
        Format::Gif,
        Format::Webp,
        Format::Svg,
        Format::Tiff,
        Format::Bmp,
    ];

    /// Parse a format name or file extension, case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().trim_start_matches('.').to_ascii_lowercase();
        let format = match name.as_str() {
            "mermaid" | "mmd" => Format::Mermaid,
            "markdown" | "md" => Format::Markdown,
            "html" | "htm" => Format::Html,
            "rst" => Format::Rst,
            "docx" => Format::Docx,
            "odt" => Format::Odt,
            "pdf" => Format::Pdf,
            "png" => Format::Png,
            "jpeg" | "jpg" => Format::Jpeg,
            "gif" => Format::Gif,
            "webp" => Format::Webp,
            "svg" => Format::Svg,
            "tiff" | "tif" => Format::Tiff,
            "bmp" => Format::Bmp,
            _ => return None,
        };
        Some(format)
    }

    /// Infer the format of a file from its extension
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension().and_then(|ext| ext.to_str()).and_then(Self::from_name)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Format::Mermaid => "mmd",
            Format::Markdown => "md",
            Format::Html => "html",
            Format::Rst => "rst",
            Format::Docx => "docx",
            Format::Odt => "odt",
            Format::Pdf => "pdf",
            Format::Png => "png",
            Format::Jpeg => "jpg",
            Format::Gif => "gif",
            Format::Webp => "webp",
            Format::Svg => "svg",
            Format::Tiff => "tiff",
            Format::Bmp => "bmp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Mermaid => "text/vnd.mermaid",
            Format::Markdown => "text/markdown",
            Format::Html => "text/html",
            Format::Rst => "text/x-rst",
            Format::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Format::Odt => "application/vnd.oasis.opendocument.text",
            Format::Pdf => "application/pdf",
            Format::Png => "image/png",
            Format::Jpeg => "image/jpeg",
            Format::Gif => "image/gif",
            Format::Webp => "image/webp",
            Format::Svg => "image/svg+xml",
            Format::Tiff => "image/tiff",
            Format::Bmp => "image/bmp",
        }
    }

    /// Name used on the pandoc command line and in the HTTP converter contract
    pub fn name(&self) -> &'static str {
        match self {
            Format::Mermaid => "mermaid",
            Format::Markdown => "markdown",
            Format::Jpeg => "jpeg",
            Format::Tiff => "tiff",
            other => other.extension(),
        }
    }

    /// Whether the bytes of this format are UTF-8 text
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            Format::Mermaid | Format::Markdown | Format::Html | Format::Rst | Format::Svg
        )
    }

    pub fn is_image(&self) -> bool {
        matches!(
            self,
            Format::Png
                | Format::Jpeg
                | Format::Gif
                | Format::Webp
                | Format::Svg
                | Format::Tiff
                | Format::Bmp
        )
    }

    /// Formats the Mermaid renderer can produce
    pub fn is_diagram_output(&self) -> bool {
        matches!(self, Format::Png | Format::Svg | Format::Pdf)
    }

    pub fn is_document(&self) -> bool {
        matches!(
            self,
            Format::Markdown | Format::Html | Format::Rst | Format::Docx | Format::Odt | Format::Pdf
        )
    }

    /// Pick the engine that converts `self` into `to`
    pub fn engine_for(&self, to: Format) -> Option<Engine> {
        match self {
            Format::Mermaid if to.is_diagram_output() => Some(Engine::Diagram),
            from if from.is_image() && (to.is_image() || to == Format::Pdf) => Some(Engine::Image),
            from if from.is_document() && from != &Format::Pdf && to.is_document() => {
                Some(Engine::Document)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single conversion job
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub engine: Engine,
    pub from: Format,
    pub to: Format,
    pub source: Vec<u8>,
}

impl ConversionRequest {
    /// Build a request, resolving the engine from the format pair
    pub fn new(from: Format, to: Format, source: Vec<u8>) -> Result<Self, ConversionError> {
        let engine = from
            .engine_for(to)
            .ok_or(ConversionError::Unsupported { from, to })?;
        Ok(Self { engine, from, to, source })
    }

    pub fn diagram(source: &str, to: Format) -> Result<Self, ConversionError> {
        Self::new(Format::Mermaid, to, source.as_bytes().to_vec())
    }

    pub fn document(source: &str, from: Format, to: Format) -> Result<Self, ConversionError> {
        Self::new(from, to, source.as_bytes().to_vec())
    }
}

/// Conversion failures. None of them are retried.
#[derive(thiserror::Error, Debug)]
pub enum ConversionError {
    #[error("no engine converts {from} to {to}")]
    Unsupported { from: Format, to: Format },

    #[error("{engine} conversion timed out after {}s", .after.as_secs())]
    Timeout { engine: Engine, after: Duration },

    #[error("converter returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("converter returned a malformed response: {0}")]
    Malformed(String),

    #[error("failed to start {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("{engine} conversion failed: {message}")]
    Failed { engine: Engine, message: String },

    #[error("converter request failed: {0}")]
    Request(String),

    #[error("I/O error during conversion: {0}")]
    Io(#[from] std::io::Error),
}

/// External conversion engine
#[async_trait]
pub trait Converter: Send + Sync {
    /// Run one conversion, returning the produced bytes
    async fn convert(&self, request: ConversionRequest) -> Result<Vec<u8>, ConversionError>;

    /// Short label for logs and health output
    fn backend_name(&self) -> &'static str;
}
