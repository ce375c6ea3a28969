//! Document metadata: headings, footnotes, blocks and links with byte positions.
//!
//! This is the shape of the metadata index the engine consumes. [`Metadata::parse`]
//! is the scanner the filesystem vault uses to build it.

use pulldown_cmark::{Event, Options, Parser, Tag};
use regex::Regex;
use serde_yaml::Mapping;
use std::sync::LazyLock;

use crate::footnotes::{self, FootnoteDef, FootnoteRef};
use crate::front_matter;
use crate::links::{self, LinkEntry};
use crate::toc;

/// Byte range `[start, end)` in a document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pos {
    pub start: usize,
    pub end: usize,
}

impl Pos {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Valid for slicing `text`.
    pub fn fits(&self, text: &str) -> bool {
        self.start <= self.end
            && self.end <= text.len()
            && text.is_char_boundary(self.start)
            && text.is_char_boundary(self.end)
    }
}

/// A heading as recorded by the metadata index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadingEntry {
    pub level: u8,
    pub heading: String,
    pub position: Pos,
}

/// A `^blockId` label and the line it marks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockEntry {
    pub id: String,
    pub position: Pos,
}

/// Everything the engine needs to know about one document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    pub headings: Vec<HeadingEntry>,
    pub footnote_refs: Vec<FootnoteRef>,
    pub footnotes: Vec<FootnoteDef>,
    pub blocks: Vec<BlockEntry>,
    pub links: Vec<LinkEntry>,
    pub frontmatter_position: Option<Pos>,
    pub frontmatter: Option<Mapping>,
}

static BLOCK_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)(?:^|\s)\^([A-Za-z0-9-]+)[ \t]*\r?$").unwrap());

impl Metadata {
    /// Scan a document.
    pub fn parse(text: &str) -> Self {
        // a block holding something other than a map is body text
        let block = front_matter::detect(text).map(|p| (p, front_matter::parse_block(&text[p.start..p.end])));
        let (frontmatter_position, frontmatter) = match block {
            Some((pos, Ok(Some(map)))) => (Some(pos), Some(map)),
            Some((pos, Err(e))) => {
                log::debug!("unreadable front matter: {e}");
                (Some(pos), None)
            }
            _ => (None, None),
        };
        let content_start = frontmatter_position.map_or(0, |p| p.end);
        let code = code_ranges(text);

        let (footnote_refs, footnotes) = footnotes::scan(text, content_start, &code);

        Self {
            headings: toc::extract_headings(text, content_start, &code),
            footnote_refs,
            footnotes,
            blocks: scan_blocks(text, content_start, &code),
            links: links::scan_links(text, &code),
            frontmatter_position,
            frontmatter,
        }
    }

    /// Drop entries whose positions no longer fit `text`.
    ///
    /// The index may lag behind a write that just happened; stale entries are
    /// treated as absent.
    pub fn retain_valid(&mut self, text: &str) {
        let before = self.entry_count();
        self.headings.retain(|h| h.position.fits(text));
        self.footnote_refs.retain(|f| f.position.fits(text));
        self.footnotes.retain(|f| f.position.fits(text));
        self.blocks.retain(|b| b.position.fits(text));
        self.links.retain(|l| l.position.fits(text));
        let dropped = before - self.entry_count();
        if dropped > 0 {
            log::warn!("dropped {dropped} stale metadata entries");
        }
    }

    fn entry_count(&self) -> usize {
        self.headings.len()
            + self.footnote_refs.len()
            + self.footnotes.len()
            + self.blocks.len()
            + self.links.len()
    }

    /// Every footnote id used in the document, references and definitions alike.
    pub fn footnote_ids(&self) -> impl Iterator<Item = &str> {
        self.footnote_refs
            .iter()
            .map(|f| f.id.as_str())
            .chain(self.footnotes.iter().map(|f| f.id.as_str()))
    }

    /// String values of the frontmatter `aliases` (or `alias`) key.
    pub fn aliases(&self) -> Vec<String> {
        let Some(fm) = &self.frontmatter else {
            return Vec::new();
        };
        ["aliases", "alias"]
            .iter()
            .filter_map(|key| fm.get(*key))
            .flat_map(|value| match value {
                serde_yaml::Value::Sequence(items) => items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
                serde_yaml::Value::String(s) => vec![s.clone()],
                _ => Vec::new(),
            })
            .collect()
    }
}

/// Byte ranges of fenced/indented code blocks and inline code spans.
pub fn code_ranges(text: &str) -> Vec<Pos> {
    let mut ranges = Vec::new();
    for (event, range) in Parser::new_ext(text, Options::empty()).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(_)) | Event::Code(_) => {
                ranges.push(Pos::new(range.start, range.end));
            }
            _ => {}
        }
    }
    ranges
}

pub(crate) fn in_code(offset: usize, code: &[Pos]) -> bool {
    code.iter().any(|c| c.start <= offset && offset < c.end)
}

fn scan_blocks(text: &str, content_start: usize, code: &[Pos]) -> Vec<BlockEntry> {
    BLOCK_ID_RE
        .captures_iter(text)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let id = cap.get(1)?;
            if id.start() < content_start || in_code(id.start(), code) {
                return None;
            }
            let line_start = text[..whole.start()].rfind('\n').map_or(0, |i| i + 1);
            let line_end = text[id.end()..]
                .find('\n')
                .map_or(text.len(), |i| id.end() + i);
            Some(BlockEntry {
                id: id.as_str().to_string(),
                position: Pos::new(line_start, line_end),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_entry_kinds() {
        let text = "---\ntitle: Note\naliases: [N]\n---\n# Top\nSee [[Other#Part|o]] and [^a].\nA line ^blk\n\n[^a]: the note\n";
        let meta = Metadata::parse(text);

        assert_eq!(meta.headings.len(), 1);
        assert_eq!(meta.headings[0].heading, "Top");
        assert_eq!(meta.footnote_refs.len(), 1);
        assert_eq!(meta.footnotes.len(), 1);
        assert_eq!(meta.blocks.len(), 1);
        assert_eq!(meta.blocks[0].id, "blk");
        assert_eq!(&text[meta.blocks[0].position.start..meta.blocks[0].position.end], "A line ^blk");
        assert_eq!(meta.links.len(), 1);
        assert_eq!(meta.aliases(), vec!["N".to_string()]);
        assert_eq!(meta.frontmatter_position, Some(Pos::new(0, 33)));
    }

    #[test]
    fn thematic_breaks_are_not_front_matter() {
        let text = "---\nA quoted aside\n---\n# Heading\n";
        let meta = Metadata::parse(text);
        assert!(meta.frontmatter_position.is_none());
        assert!(meta.frontmatter.is_none());
        assert_eq!(meta.headings.len(), 1);
    }

    #[test]
    fn code_ranges_cover_fences_and_spans() {
        let text = "text `[[a]]` more\n\n```\n[[b]]\n```\n";
        let ranges = code_ranges(text);
        assert_eq!(ranges.len(), 2);
        assert_eq!(&text[ranges[0].start..ranges[0].end], "`[[a]]`");
        assert!(text[ranges[1].start..ranges[1].end].contains("[[b]]"));
    }

    #[test]
    fn retain_valid_drops_stale_entries() {
        let mut meta = Metadata::parse("# A\n# B\n");
        meta.retain_valid("# A\n");
        assert_eq!(meta.headings.len(), 1);
    }

    #[test]
    fn block_ids_need_leading_space() {
        let meta = Metadata::parse("no^id here\nyes ^id\n");
        assert_eq!(meta.blocks.len(), 1);
        assert_eq!(meta.blocks[0].position, Pos::new(11, 18));
    }
}
