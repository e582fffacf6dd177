//! Fenced Mermaid block extraction.
//!
//! A block opens with a fence of three or more backticks or tildes (indented
//! at most three spaces) whose info string is `mermaid`, and closes with a
//! fence of the same character that is at least as long. Unterminated fences
//! are not blocks.

use std::ops::Range;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref OPENING_FENCE: Regex =
        Regex::new(r"^ {0,3}(?P<fence>`{3,}|~{3,})[ \t]*mermaid[ \t]*$").expect("valid regex");
    static ref CLOSING_FENCE: Regex =
        Regex::new(r"^ {0,3}(?P<fence>`{3,}|~{3,})[ \t]*$").expect("valid regex");
}

/// Outcome of converting one block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    Pending,
    Rendered { filename: String, data: Vec<u8> },
    Failed { error: String },
}

/// One diagram occurrence in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramBlock {
    /// 1-based ordinal in document order
    pub index: usize,
    /// Byte range of the whole fenced block, fences included
    pub span: Range<usize>,
    /// Diagram text between the fences
    pub source: String,
    pub outcome: BlockOutcome,
}

impl DiagramBlock {
    pub fn filename(&self) -> Option<&str> {
        match &self.outcome {
            BlockOutcome::Rendered { filename, .. } => Some(filename),
            _ => None,
        }
    }
}

/// A document together with the blocks found in it.
///
/// Produced once per pipeline run; conversion and rewrite both work off the
/// same `blocks` vector.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub source: String,
    pub blocks: Vec<DiagramBlock>,
}

impl ExtractedDocument {
    pub fn parse(document: &str) -> Self {
        Self { source: document.to_string(), blocks: extract_blocks(document) }
    }

    /// Rebuild the document. Blocks for which `link` returns a filename are
    /// replaced with an image reference; every other block is kept verbatim.
    pub fn rewrite<'a, F>(&'a self, link: F) -> String
    where
        F: Fn(&'a DiagramBlock) -> Option<&'a str>,
    {
        let mut output = String::with_capacity(self.source.len());
        let mut cursor = 0;

        for block in &self.blocks {
            let Some(filename) = link(block) else {
                continue;
            };
            output.push_str(&self.source[cursor..block.span.start]);
            output.push_str(&format!("![Diagram {}]({})", block.index, filename));
            cursor = block.span.end;
        }

        output.push_str(&self.source[cursor..]);
        output
    }

    /// Rewrite linking every rendered block
    pub fn rewrite_rendered(&self) -> String {
        self.rewrite(|block| block.filename())
    }
}

/// Scan `document` for fenced Mermaid blocks.
pub fn extract_blocks(document: &str) -> Vec<DiagramBlock> {
    let lines = split_lines(document);
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let (start, line) = lines[i];
        let Some(open) = OPENING_FENCE.captures(line).and_then(|c| c.name("fence")) else {
            i += 1;
            continue;
        };
        let fence = open.as_str();
        let fence_char = fence.as_bytes()[0];

        let closing = lines[i + 1..].iter().position(|(_, candidate)| {
            CLOSING_FENCE
                .captures(candidate)
                .and_then(|c| c.name("fence"))
                .map(|close| {
                    let close = close.as_str();
                    close.as_bytes()[0] == fence_char && close.len() >= fence.len()
                })
                .unwrap_or(false)
        });

        let Some(offset) = closing else {
            // unterminated: nothing after this line can close it either
            break;
        };
        let close_idx = i + 1 + offset;
        let (close_start, close_line) = lines[close_idx];

        let body_start = lines.get(i + 1).map(|(s, _)| *s).unwrap_or(close_start);
        let body = document[body_start..close_start].trim_end_matches(['\n', '\r']);

        blocks.push(DiagramBlock {
            index: blocks.len() + 1,
            span: start..close_start + close_line.len(),
            source: body.to_string(),
            outcome: BlockOutcome::Pending,
        });
        i = close_idx + 1;
    }

    blocks
}

/// Lines with their byte offsets, without terminators
fn split_lines(document: &str) -> Vec<(usize, &str)> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for raw in document.split_inclusive('\n') {
        let line = raw.trim_end_matches('\n').trim_end_matches('\r');
        lines.push((offset, line));
        offset += raw.len();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_backtick_and_tilde_blocks() {
        let doc = "# Title\n\n```mermaid\ngraph TD\n  A-->B\n```\n\n\
                   text\n\n~~~~ mermaid\nsequenceDiagram\n~~~~\n";
        let blocks = extract_blocks(doc);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].index, 1);
        assert_eq!(blocks[0].source, "graph TD\n  A-->B");
        assert_eq!(&doc[blocks[0].span.clone()], "```mermaid\ngraph TD\n  A-->B\n```");
        assert_eq!(blocks[1].index, 2);
        assert_eq!(blocks[1].source, "sequenceDiagram");
    }

    #[test]
    fn ignores_other_languages_and_unterminated_fences() {
        let doc = "```rust\nfn main() {}\n```\n\n```mermaid\ngraph LR\n";
        assert!(extract_blocks(doc).is_empty());
    }

    #[test]
    fn closing_fence_must_match_character_and_length() {
        let doc = "````mermaid\ngraph TD\n```\n~~~~\nstill inside\n````\n";
        let blocks = extract_blocks(doc);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].source, "graph TD\n```\n~~~~\nstill inside");
    }

    #[test]
    fn crlf_documents() {
        let doc = "intro\r\n```mermaid\r\ngraph TD\r\n```\r\nouter\r\n";
        let blocks = extract_blocks(doc);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].source, "graph TD");
        assert_eq!(&doc[blocks[0].span.clone()], "```mermaid\r\ngraph TD\r\n```");
    }

    #[test]
    fn identical_blocks_are_independent() {
        let doc = "```mermaid\ngraph TD\n```\n```mermaid\ngraph TD\n```\n";
        let blocks = extract_blocks(doc);
        assert_eq!(blocks.len(), 2);
        assert_ne!(blocks[0].span, blocks[1].span);
    }

    #[test]
    fn rewrite_links_selected_blocks_only() {
        let doc = "a\n```mermaid\none\n```\nb\n```mermaid\ntwo\n```\nc";
        let mut extracted = ExtractedDocument::parse(doc);
        extracted.blocks[1].outcome =
            BlockOutcome::Rendered { filename: "doc-diagram-2.png".to_string(), data: vec![1] };
        extracted.blocks[0].outcome = BlockOutcome::Failed { error: "boom".to_string() };

        assert_eq!(
            extracted.rewrite_rendered(),
            "a\n```mermaid\none\n```\nb\n![Diagram 2](doc-diagram-2.png)\nc"
        );
        assert_eq!(extracted.rewrite(|_| None), doc);
    }
}
