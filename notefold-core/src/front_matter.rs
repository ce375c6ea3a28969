//! Front matter detection, parsing and rendering.

use serde_yaml::{Mapping, Value};

use crate::error::Result;
use crate::metadata::Pos;

const OPEN: &str = "---";
const CLOSE: [&str; 2] = ["---", "..."];

/// Detects a YAML front matter block at the top of a document.
///
/// The returned span runs from the opening marker through the line terminator
/// of the closing marker, so `pos.end` is where the body starts.
pub fn detect(text: &str) -> Option<Pos> {
    let mut lines = text.split_inclusive('\n');
    let first = lines.next()?;
    if normalize_line(first) != OPEN {
        return None;
    }

    let mut offset = first.len();
    for line in lines {
        offset += line.len();
        if CLOSE.iter().any(|marker| *marker == normalize_line(line)) {
            return Some(Pos::new(0, offset));
        }
    }

    None
}

/// Parse a block produced by [`detect`] (markers included) into a map.
///
/// An empty block yields an empty map; a block holding something other than a
/// map yields `None`.
pub fn parse_block(block: &str) -> Result<Option<Mapping>> {
    let mut lines: Vec<&str> = block.lines().collect();
    if lines.len() < 2 {
        return Ok(None);
    }
    lines.remove(0);
    lines.pop();

    let yaml = lines.join("\n");
    if yaml.trim().is_empty() {
        return Ok(Some(Mapping::new()));
    }

    match serde_yaml::from_str::<Value>(&yaml)? {
        Value::Mapping(map) => Ok(Some(map)),
        other => {
            log::debug!("front matter is not a map: {other:?}");
            Ok(None)
        }
    }
}

/// Separate a document into its front matter map and body.
///
/// A block that does not hold a map is not front matter; the whole text is
/// body then.
pub fn split(text: &str) -> Result<(Option<Mapping>, &str)> {
    let Some(pos) = detect(text) else {
        return Ok((None, text));
    };
    match parse_block(&text[pos.start..pos.end])? {
        Some(map) => Ok((Some(map), &text[pos.end..])),
        None => Ok((None, text)),
    }
}

/// Render a map as a front matter block; nothing for an absent or empty map.
pub fn render(map: Option<&Mapping>) -> Result<String> {
    match map {
        Some(map) if !map.is_empty() => {
            let yaml = serde_yaml::to_string(map)?;
            Ok(format!("{OPEN}\n{yaml}{OPEN}\n"))
        }
        _ => Ok(String::new()),
    }
}

fn normalize_line(line: &str) -> &str {
    line.trim_start_matches('\u{feff}').trim()
}
