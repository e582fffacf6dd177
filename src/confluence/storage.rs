//! Confluence storage-format helpers
//!
//! The document engine produces HTML. Confluence accepts that as storage
//! format, except that images pointing at page attachments must be expressed
//! with the `ac:image` macro.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref IMG_TAG: Regex =
        Regex::new(r"<img\b[^>]*>").expect("IMG_TAG should be a valid regex pattern");
    static ref SRC_ATTR: Regex = Regex::new(r#"\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("SRC_ATTR should be a valid regex pattern");
    static ref ALT_ATTR: Regex = Regex::new(r#"\balt\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("ALT_ATTR should be a valid regex pattern");
}

fn attr<'a>(pattern: &Regex, tag: &'a str) -> Option<&'a str> {
    pattern.captures(tag).and_then(|c| c.get(1).or_else(|| c.get(2))).map(|m| m.as_str())
}

/// Convert rendered HTML into a storage-format body.
///
/// `<img>` tags whose `src` names one of `attachments` become attachment
/// image macros; every other tag is left alone.
pub fn to_storage(html: &str, attachments: &HashSet<String>) -> String {
    if attachments.is_empty() {
        return html.to_string();
    }

    IMG_TAG
        .replace_all(html, |caps: &Captures<'_>| {
            let tag = &caps[0];
            match attr(&SRC_ATTR, tag) {
                Some(src) if attachments.contains(src) => {
                    let alt = attr(&ALT_ATTR, tag)
                        .map(|alt| format!(" ac:alt=\"{}\"", alt))
                        .unwrap_or_default();
                    format!(
                        "<ac:image{}><ri:attachment ri:filename=\"{}\" /></ac:image>",
                        alt, src
                    )
                }
                _ => tag.to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploaded(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn uploaded_images_become_attachment_macros() {
        let html = r#"<p><img src="guide-diagram-1.png" alt="Diagram 1" /></p>"#;
        let out = to_storage(html, &uploaded(&["guide-diagram-1.png"]));
        assert_eq!(
            out,
            "<p><ac:image ac:alt=\"Diagram 1\">\
             <ri:attachment ri:filename=\"guide-diagram-1.png\" /></ac:image></p>"
        );
    }

    #[test]
    fn other_images_are_untouched() {
        let html = r#"<img src="https://example.com/logo.png"><img src='a.png'>"#;
        let out = to_storage(html, &uploaded(&["a.png"]));
        assert!(out.starts_with(r#"<img src="https://example.com/logo.png">"#));
        assert!(out.ends_with(r#"<ac:image><ri:attachment ri:filename="a.png" /></ac:image>"#));
    }

    #[test]
    fn no_attachments_is_identity() {
        let html = r#"<img src="a.png" alt="x">"#;
        assert_eq!(to_storage(html, &HashSet::new()), html);
    }
}
