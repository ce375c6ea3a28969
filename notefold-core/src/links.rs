//! Link scanning, formatting and text edits.
//!
//! Two link syntaxes are recognized: wikilinks (`[[path#sub|display]]`) and
//! Markdown links to local files (`[display](path.md#sub)`), either one
//! optionally prefixed with `!` to embed.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::metadata::{in_code, Pos};

static WIKILINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(!?)\[\[([^\[\]\n]+?)\]\]").unwrap());

static MDLINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(!?)\[([^\[\]\n]*)\]\((<[^<>\n]+>|[^()\s]+)\)").unwrap()
});

/// Syntax a link is written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkFormat {
    #[default]
    Wiki,
    Markdown,
}

/// One link occurrence in a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkEntry {
    /// The link exactly as written.
    pub raw: String,
    /// Link path without subpath, percent-decoded. Empty for same-file links.
    pub target: String,
    /// `#Heading` or `#^blockId`.
    pub subpath: Option<String>,
    /// Wikilink alias or Markdown link text.
    pub display: Option<String>,
    pub embed: bool,
    pub format: LinkFormat,
    pub position: Pos,
}

/// Scan all links outside `code`, in document order.
pub fn scan_links(text: &str, code: &[Pos]) -> Vec<LinkEntry> {
    let mut links: Vec<LinkEntry> = WIKILINK_RE
        .captures_iter(text)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            if in_code(whole.start(), code) {
                return None;
            }
            parse_wikilink(&cap[2]).map(|(target, subpath, display)| LinkEntry {
                raw: whole.as_str().to_string(),
                target,
                subpath,
                display,
                embed: !cap[1].is_empty(),
                format: LinkFormat::Wiki,
                position: Pos::new(whole.start(), whole.end()),
            })
        })
        .collect();

    let wiki_spans: Vec<Pos> = links.iter().map(|l| l.position).collect();
    links.extend(MDLINK_RE.captures_iter(text).filter_map(|cap| {
        let whole = cap.get(0)?;
        if in_code(whole.start(), code) || in_code(whole.start(), &wiki_spans) {
            return None;
        }
        let (target, subpath) = parse_markdown_target(&cap[3])?;
        Some(LinkEntry {
            raw: whole.as_str().to_string(),
            target,
            subpath,
            display: Some(cap[2].to_string()),
            embed: !cap[1].is_empty(),
            format: LinkFormat::Markdown,
            position: Pos::new(whole.start(), whole.end()),
        })
    }));

    links.sort_by_key(|l| l.position.start);
    links
}

fn parse_wikilink(content: &str) -> Option<(String, Option<String>, Option<String>)> {
    let (link, display) = match content.split_once('|') {
        // `\|` escapes the pipe inside tables
        Some((link, display)) => (link.trim_end_matches('\\'), Some(display.to_string())),
        None => (content, None),
    };
    let (target, subpath) = split_subpath(link);
    if target.is_empty() && subpath.is_none() {
        return None;
    }
    Some((target, subpath, display))
}

fn parse_markdown_target(raw: &str) -> Option<(String, Option<String>)> {
    let raw = raw.trim_start_matches('<').trim_end_matches('>');
    if raw.contains("://") || raw.starts_with("mailto:") {
        return None;
    }
    let decoded = urlencoding::decode(raw).map(|s| s.into_owned()).unwrap_or_else(|_| raw.to_string());
    let (target, subpath) = split_subpath(&decoded);
    if target.is_empty() && subpath.is_none() {
        return None;
    }
    Some((target, subpath))
}

fn split_subpath(link: &str) -> (String, Option<String>) {
    match link.find('#') {
        Some(idx) => {
            let sub = link[idx..].trim();
            let sub = (sub.len() > 1).then(|| sub.to_string());
            (link[..idx].trim().to_string(), sub)
        }
        None => (link.trim().to_string(), None),
    }
}

/// Comparison key for a subpath: last heading segment or `^blockId`,
/// lowercased; empty for whole-file links.
pub fn subpath_key(subpath: Option<&str>) -> String {
    let Some(sub) = subpath else {
        return String::new();
    };
    let sub = sub.trim().trim_start_matches('#');
    if sub.starts_with('^') {
        return sub.to_lowercase();
    }
    sub.rsplit('#').next().unwrap_or(sub).trim().to_lowercase()
}

/// Format a wikilink.
pub fn format_wikilink(name: &str, subpath: Option<&str>, display: Option<&str>, embed: bool) -> String {
    let mut out = String::new();
    if embed {
        out.push('!');
    }
    out.push_str("[[");
    out.push_str(name);
    out.push_str(subpath.unwrap_or_default());
    if let Some(display) = display {
        out.push('|');
        out.push_str(display);
    }
    out.push_str("]]");
    out
}

/// Format a Markdown link; `path` is encoded segment by segment.
pub fn format_markdown_link(path: &str, subpath: Option<&str>, display: &str, embed: bool) -> String {
    let encoded: Vec<String> = path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    let mut target = encoded.join("/");
    if let Some(sub) = subpath {
        let anchor = sub.trim_start_matches('#');
        target.push('#');
        target.push_str(&urlencoding::encode(anchor).replace("%5E", "^"));
    }
    format!("{}[{display}]({target})", if embed { "!" } else { "" })
}

/// A text edit: replace `remove_len` bytes at `offset` with `insert_text`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextEdit {
    /// Byte offset in source
    pub offset: usize,
    /// Number of bytes to remove
    pub remove_len: usize,
    /// Replacement text
    pub insert_text: String,
}

impl TextEdit {
    pub fn replace(pos: Pos, insert_text: impl Into<String>) -> Self {
        Self {
            offset: pos.start,
            remove_len: pos.len(),
            insert_text: insert_text.into(),
        }
    }

    fn end(&self) -> usize {
        self.offset + self.remove_len
    }
}

/// Apply edits to `text`. Edits that overlap an earlier-applied edit, or fall
/// outside the text, are skipped.
pub fn apply_edits(text: &str, mut edits: Vec<TextEdit>) -> String {
    edits.sort_by(|a, b| b.offset.cmp(&a.offset).then(b.remove_len.cmp(&a.remove_len)));

    let mut out = text.to_string();
    let mut floor = usize::MAX;
    for edit in edits {
        if edit.end() > floor || edit.end() > out.len() || !out.is_char_boundary(edit.offset) || !out.is_char_boundary(edit.end()) {
            log::debug!("skipping overlapping edit at {}", edit.offset);
            continue;
        }
        out.replace_range(edit.offset..edit.end(), &edit.insert_text);
        floor = edit.offset;
    }
    out
}
