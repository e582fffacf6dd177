//! # Diagram Pipeline
//!
//! Turns Markdown with embedded Mermaid blocks into Markdown that references
//! rendered images. Blocks are converted one at a time in document order; a
//! block that fails keeps its original source and never affects its
//! neighbours.

pub mod extract;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::converter::{ConversionError, ConversionRequest, Converter, Format};
use crate::observability::metrics;

pub use extract::{extract_blocks, BlockOutcome, DiagramBlock, ExtractedDocument};

/// A successfully rendered diagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramArtifact {
    pub index: usize,
    pub filename: String,
    pub format: Format,
    pub data: Vec<u8>,
}

/// A diagram that could not be rendered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagramFailure {
    pub index: usize,
    pub error: String,
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Document with rendered blocks replaced by image references
    pub rewritten_document: String,
    /// Only the blocks that rendered
    pub artifacts: Vec<DiagramArtifact>,
    pub failures: Vec<DiagramFailure>,
    /// Indexed blocks with their outcomes, for callers that relink a subset
    pub extracted: ExtractedDocument,
}

impl PipelineOutput {
    pub fn block_count(&self) -> usize {
        self.extracted.blocks.len()
    }
}

pub struct DiagramPipeline {
    converter: Arc<dyn Converter>,
    format: Format,
    timeout: Duration,
}

impl DiagramPipeline {
    pub fn new(converter: Arc<dyn Converter>, format: Format, timeout: Duration) -> Self {
        Self { converter, format, timeout }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Same converter and timeout, different output format
    pub fn with_format(&self, format: Format) -> Self {
        Self { converter: self.converter.clone(), format, timeout: self.timeout }
    }

    /// Extract, convert and rewrite every diagram in `document`.
    ///
    /// Artifact files are named `{base_name}-diagram-{n}.{ext}`.
    pub async fn process(&self, document: &str, base_name: &str) -> PipelineOutput {
        let mut extracted = ExtractedDocument::parse(document);
        if extracted.blocks.is_empty() {
            debug!(base_name = %base_name, "No diagrams found");
            return PipelineOutput {
                rewritten_document: document.to_string(),
                artifacts: Vec::new(),
                failures: Vec::new(),
                extracted,
            };
        }

        let mut artifacts = Vec::new();
        let mut failures = Vec::new();

        for block in extracted.blocks.iter_mut() {
            match self.render(&block.source).await {
                Ok(data) => {
                    let filename = artifact_filename(base_name, block.index, self.format);
                    debug!(index = block.index, filename = %filename, "Rendered diagram");
                    metrics::record_conversion("diagram", true);
                    artifacts.push(DiagramArtifact {
                        index: block.index,
                        filename: filename.clone(),
                        format: self.format,
                        data: data.clone(),
                    });
                    block.outcome = BlockOutcome::Rendered { filename, data };
                }
                Err(e) => {
                    warn!(index = block.index, error = %e, "Diagram conversion failed");
                    metrics::record_conversion("diagram", false);
                    failures.push(DiagramFailure { index: block.index, error: e.to_string() });
                    block.outcome = BlockOutcome::Failed { error: e.to_string() };
                }
            }
        }

        info!(
            base_name = %base_name,
            rendered = artifacts.len(),
            failed = failures.len(),
            "Diagram pipeline finished"
        );

        PipelineOutput {
            rewritten_document: extracted.rewrite_rendered(),
            artifacts,
            failures,
            extracted,
        }
    }

    async fn render(&self, source: &str) -> Result<Vec<u8>, ConversionError> {
        let request = ConversionRequest::diagram(source, self.format)?;
        match tokio::time::timeout(self.timeout, self.converter.convert(request)).await {
            Ok(result) => result,
            Err(_) => Err(ConversionError::Timeout {
                engine: crate::converter::Engine::Diagram,
                after: self.timeout,
            }),
        }
    }
}

pub fn artifact_filename(base_name: &str, index: usize, format: Format) -> String {
    format!("{}-diagram-{}.{}", base_name, index, format.extension())
}

/// Derive an artifact base name from a file path or, failing that, a title.
pub fn base_name_for(source_path: Option<&str>, title: &str) -> String {
    let stem = source_path
        .and_then(|p| std::path::Path::new(p).file_stem())
        .and_then(|s| s.to_str())
        .map(slugify)
        .filter(|s| !s.is_empty());

    stem.unwrap_or_else(|| {
        let slug = slugify(title);
        if slug.is_empty() {
            "document".to_string()
        } else {
            slug
        }
    })
}

fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}
