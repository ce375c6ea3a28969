//! Turning note titles into file names.

use serde::{Deserialize, Serialize};

/// Characters not allowed in note file names.
pub const INVALID_CHARS: &[char] = &['*', '"', '\\', '/', '<', '>', ':', '|', '?', '#', '^', '[', ']'];

/// What to do with invalid characters in a title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidCharHandling {
    Remove,
    Replace(String),
}

impl Default for InvalidCharHandling {
    fn default() -> Self {
        Self::Replace("-".to_string())
    }
}

/// Sanitize `title` into a vault path without extension.
///
/// With `title_as_path`, `/` separates folders and each segment is sanitized
/// on its own. Empty segments are dropped; an empty result means the title
/// had nothing usable.
pub fn sanitize(title: &str, handling: &InvalidCharHandling, title_as_path: bool) -> String {
    if title_as_path {
        return title
            .split('/')
            .map(|segment| sanitize_segment(segment, handling))
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");
    }
    sanitize_segment(title, handling)
}

fn sanitize_segment(segment: &str, handling: &InvalidCharHandling) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        if INVALID_CHARS.contains(&c) || c.is_control() {
            if let InvalidCharHandling::Replace(with) = handling {
                out.push_str(with);
            }
        } else {
            out.push(c);
        }
    }
    // no leading dots, no trailing dots or spaces
    out.trim()
        .trim_start_matches('.')
        .trim_end_matches(['.', ' '])
        .to_string()
}
