//! Heading tree: a document's body split into nested heading sections.
//!
//! Parsing never copies structure between trees and merging always builds a
//! fresh tree, so any two trees can be compared by equality in tests.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ComposeError, Result};
use crate::front_matter;
use crate::metadata::{code_ranges, HeadingEntry};
use crate::toc;

/// Where incoming content lands relative to the existing content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertMode {
    #[default]
    Append,
    Prepend,
}

/// One section of a document.
///
/// `level` 0 is the document root. A node without `heading` is synthetic: the
/// root, or a bridge inserted where heading depth skips a level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadingNode {
    pub level: u8,
    pub heading: Option<String>,
    /// Heading line as written, without its line break.
    pub line: Option<String>,
    /// Body text up to the first child heading.
    pub text: String,
    pub children: Vec<HeadingNode>,
}

impl HeadingNode {
    /// Build a tree from `text` and its heading cache.
    ///
    /// Text before `content_start` (the front matter) is not part of the tree.
    /// Headings that do not fit the text, start before `content_start`, or
    /// overlap a previous heading are ignored.
    pub fn parse(text: &str, content_start: usize, headings: &[HeadingEntry]) -> Self {
        let mut content_start = content_start.min(text.len());
        while !text.is_char_boundary(content_start) {
            content_start -= 1;
        }

        let mut usable: Vec<&HeadingEntry> = Vec::with_capacity(headings.len());
        for heading in headings {
            let after_previous = usable
                .last()
                .map_or(content_start, |prev| prev.position.end);
            if heading.position.fits(text)
                && heading.position.start >= after_previous
                && (1..=6).contains(&heading.level)
            {
                usable.push(heading);
            }
        }

        build(text, 0, None, content_start, text.len(), &usable)
    }

    /// Parse a whole Markdown document, skipping its front matter.
    pub fn parse_markdown(text: &str) -> Self {
        let content_start = front_matter::split(text).map_or(0, |(_, body)| text.len() - body.len());
        let headings = toc::extract_headings(text, content_start, &code_ranges(text));
        Self::parse(text, content_start, &headings)
    }

    pub fn is_synthetic(&self) -> bool {
        self.heading.is_none()
    }

    /// Merge `other` into this tree, returning a new tree.
    ///
    /// Children match on heading text plus occurrence index among same-titled
    /// siblings. `Prepend` is the same merge with the roles swapped.
    pub fn merge(&self, other: &HeadingNode, mode: InsertMode) -> Result<HeadingNode> {
        match mode {
            InsertMode::Append => merge_nodes(self, other),
            InsertMode::Prepend => merge_nodes(other, self),
        }
    }

    /// Apply `f` to every body text, pre-order.
    ///
    /// A heading's body is passed without the line break that ends the
    /// heading line, so `f` cannot change the heading.
    pub fn map_text<F>(&self, f: &mut F) -> Result<HeadingNode>
    where
        F: FnMut(&str) -> Result<String>,
    {
        let text = self.map_body(f)?;
        let children = self
            .children
            .iter()
            .map(|child| child.map_text(f))
            .collect::<Result<Vec<_>>>()?;
        Ok(HeadingNode {
            level: self.level,
            heading: self.heading.clone(),
            line: self.line.clone(),
            text,
            children,
        })
    }

    fn map_body<F>(&self, f: &mut F) -> Result<String>
    where
        F: FnMut(&str) -> Result<String>,
    {
        if self.is_synthetic() {
            return f(&self.text);
        }
        let body = self
            .text
            .strip_prefix("\r\n")
            .or_else(|| self.text.strip_prefix('\n'))
            .unwrap_or(self.text.as_str());
        let eol = &self.text[..self.text.len() - body.len()];
        let mapped = f(body)?;
        if eol.is_empty() && !mapped.is_empty() && !mapped.starts_with('\n') {
            return Ok(format!("\n{mapped}"));
        }
        Ok(format!("{eol}{mapped}"))
    }

    /// Render the tree back to Markdown.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        if let Some(heading) = &self.heading {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            match &self.line {
                Some(line) => out.push_str(line),
                None => {
                    out.push_str(&"#".repeat(usize::from(self.level)));
                    if !heading.is_empty() {
                        out.push(' ');
                        out.push_str(heading);
                    }
                }
            }
        }
        out.push_str(&self.text);
        for child in &self.children {
            child.write_to(out);
        }
    }
}

fn build(
    text: &str,
    level: u8,
    entry: Option<&HeadingEntry>,
    body_start: usize,
    end: usize,
    headings: &[&HeadingEntry],
) -> HeadingNode {
    let body_end = headings.first().map_or(end, |h| h.position.start);
    let child_level = level + 1;

    let mut children = Vec::new();
    let mut i = 0;
    while i < headings.len() {
        let first = headings[i];
        let mut j = i + 1;
        while j < headings.len() && headings[j].level > child_level {
            j += 1;
        }
        let group_end = headings.get(j).map_or(end, |next| next.position.start);

        let child = if first.level == child_level {
            build(
                text,
                child_level,
                Some(first),
                first.position.end,
                group_end,
                &headings[i + 1..j],
            )
        } else {
            // depth skips a level: bridge it
            build(text, child_level, None, first.position.start, group_end, &headings[i..j])
        };
        children.push(child);
        i = j;
    }

    HeadingNode {
        level,
        heading: entry.map(|h| h.heading.clone()),
        line: entry.map(|h| text[h.position.start..h.position.end].to_string()),
        text: text[body_start..body_end].to_string(),
        children,
    }
}

fn merge_nodes(left: &HeadingNode, right: &HeadingNode) -> Result<HeadingNode> {
    if left.level != right.level || left.heading != right.heading {
        return Err(ComposeError::HeadingMismatch {
            left_level: left.level,
            left: left.heading.clone(),
            right_level: right.level,
            right: right.heading.clone(),
        });
    }

    let right_index: HashMap<(Option<&str>, usize), usize> = occurrence_keys(&right.children)
        .into_iter()
        .enumerate()
        .map(|(idx, key)| (key, idx))
        .collect();
    let mut matched = vec![false; right.children.len()];

    let mut children = Vec::with_capacity(left.children.len() + right.children.len());
    for (key, child) in occurrence_keys(&left.children).into_iter().zip(&left.children) {
        match right_index.get(&key) {
            Some(&idx) => {
                matched[idx] = true;
                children.push(merge_nodes(child, &right.children[idx])?);
            }
            None => children.push(child.clone()),
        }
    }
    children.extend(
        right
            .children
            .iter()
            .zip(matched)
            .filter(|(_, matched)| !matched)
            .map(|(child, _)| child.clone()),
    );

    Ok(HeadingNode {
        level: left.level,
        heading: left.heading.clone(),
        line: left.line.clone(),
        text: join_text(&left.text, &right.text),
        children,
    })
}

/// (heading, n) where n counts earlier siblings with the same heading.
fn occurrence_keys(nodes: &[HeadingNode]) -> Vec<(Option<&str>, usize)> {
    let mut seen: HashMap<Option<&str>, usize> = HashMap::new();
    nodes
        .iter()
        .map(|node| {
            let heading = node.heading.as_deref();
            let count = seen.entry(heading).or_insert(0);
            let key = (heading, *count);
            *count += 1;
            key
        })
        .collect()
}

/// Join two text blocks with exactly one newline between them.
pub fn join_text(existing: &str, incoming: &str) -> String {
    let left = existing.trim_end_matches(['\n', '\r']);
    let right = incoming.trim_start_matches(['\n', '\r']);
    match (left.is_empty(), right.is_empty()) {
        (false, false) => format!("{left}\n{right}"),
        (false, true) => existing.to_string(),
        (true, false) => incoming.to_string(),
        (true, true) => String::new(),
    }
}
