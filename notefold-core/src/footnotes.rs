//! Footnote scanning and id reconciliation.
//!
//! When text moves from one document to another, the footnotes it uses must
//! come along without colliding with ids the target already defines.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;

use crate::metadata::{code_ranges, in_code, Pos};
use crate::selection::Selection;

static FOOTNOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\^([^\]\s]+)\]").unwrap());

/// An inline footnote reference, `[^id]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FootnoteRef {
    pub id: String,
    pub position: Pos,
}

/// A footnote definition, `[^id]: text`, including indented continuation lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FootnoteDef {
    pub id: String,
    pub position: Pos,
}

/// A definition that was part of the moved text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MovedFootnote {
    /// Id in the source document.
    pub id: String,
    /// Definition text as it appeared in the source.
    pub raw: String,
}

/// Result of a reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub text: String,
    /// Source id to target id, only for ids that had to change.
    pub renames: BTreeMap<String, String>,
    pub moved: Vec<MovedFootnote>,
}

/// Find footnote references and definitions at or after `content_start`.
pub fn scan(text: &str, content_start: usize, code: &[Pos]) -> (Vec<FootnoteRef>, Vec<FootnoteDef>) {
    let mut refs = Vec::new();
    let mut defs = Vec::new();

    for cap in FOOTNOTE_RE.captures_iter(text) {
        let (Some(whole), Some(id)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        if whole.start() < content_start || in_code(whole.start(), code) {
            continue;
        }

        let line_start = text[..whole.start()].rfind('\n').map_or(0, |i| i + 1);
        let indent = &text[line_start..whole.start()];
        let is_definition = indent.len() <= 3
            && indent.chars().all(|c| c == ' ')
            && text[whole.end()..].starts_with(':');

        if is_definition {
            defs.push(FootnoteDef {
                id: id.as_str().to_string(),
                position: Pos::new(line_start, definition_end(text, whole.end())),
            });
        } else {
            refs.push(FootnoteRef {
                id: id.as_str().to_string(),
                position: Pos::new(whole.start(), whole.end()),
            });
        }
    }

    (refs, defs)
}

/// End of a definition: its own line plus following indented, non-blank lines.
fn definition_end(text: &str, from: usize) -> usize {
    let mut end = text[from..].find('\n').map_or(text.len(), |i| from + i);
    while end < text.len() {
        let next_start = end + 1;
        let next_end = text[next_start..]
            .find('\n')
            .map_or(text.len(), |i| next_start + i);
        let line = &text[next_start..next_end];
        if line.trim().is_empty() || !line.starts_with([' ', '\t']) {
            break;
        }
        end = next_end;
    }
    end
}

/// Reserves footnote ids in a target document.
#[derive(Debug, Default)]
pub struct FootnoteReconciler {
    taken: HashSet<String>,
    reserved: BTreeMap<String, String>,
}

impl FootnoteReconciler {
    /// Start from the ids the target document already uses.
    pub fn new<I, S>(existing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            taken: existing.into_iter().map(Into::into).collect(),
            reserved: BTreeMap::new(),
        }
    }

    /// Reserve a target id for `id`: unchanged if free, otherwise the first
    /// free `id-1`, `id-2`, ... Repeated calls for the same id agree.
    pub fn reserve(&mut self, id: &str) -> String {
        if let Some(target) = self.reserved.get(id) {
            return target.clone();
        }

        let target = if self.taken.contains(id) {
            (1..)
                .map(|n| format!("{id}-{n}"))
                .find(|candidate| !self.taken.contains(candidate))
                .unwrap_or_else(|| id.to_string())
        } else {
            id.to_string()
        };

        self.taken.insert(target.clone());
        self.reserved.insert(id.to_string(), target.clone());
        target
    }

    /// Extract the selected part of `source` with its footnotes made safe for the target.
    pub fn reconcile(
        mut self,
        source: &str,
        refs: &[FootnoteRef],
        defs: &[FootnoteDef],
        selection: &Selection,
    ) -> Reconciled {
        let mut to_copy = BTreeSet::new();
        for footnote in refs.iter().filter(|f| selection.contains(f.position)) {
            to_copy.insert(footnote.id.as_str());
            self.reserve(&footnote.id);
        }

        let mut moved = Vec::new();
        for def in defs.iter().filter(|d| selection.contains(d.position)) {
            self.reserve(&def.id);
            moved.push(MovedFootnote {
                id: def.id.clone(),
                raw: source[def.position.start..def.position.end].to_string(),
            });
        }

        let mut text = selection.extract(source);
        let mut appended = HashSet::new();
        for def in defs {
            if selection.contains(def.position)
                || !to_copy.contains(def.id.as_str())
                || !appended.insert(def.id.as_str())
            {
                continue;
            }
            log::debug!("copying footnote definition [^{}] along with its reference", def.id);
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&source[def.position.start..def.position.end]);
        }

        let text = rename_ids(&text, &self.reserved);
        let renames = self
            .reserved
            .into_iter()
            .filter(|(from, to)| from != to)
            .collect();

        Reconciled {
            text,
            renames,
            moved,
        }
    }
}

/// Rewrite `[^id]` occurrences outside code through `renames`.
pub fn rename_ids(text: &str, renames: &BTreeMap<String, String>) -> String {
    if renames.iter().all(|(from, to)| from == to) {
        return text.to_string();
    }

    let code = code_ranges(text);
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for cap in FOOTNOTE_RE.captures_iter(text) {
        let (Some(whole), Some(id)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let Some(target) = renames.get(id.as_str()) else {
            continue;
        };
        if in_code(whole.start(), &code) {
            continue;
        }
        out.push_str(&text[last..whole.start()]);
        out.push_str("[^");
        out.push_str(target);
        out.push(']');
        last = whole.end();
    }
    out.push_str(&text[last..]);
    out
}

/// Re-append moved definitions that `text` still references but no longer
/// defines. Returns the new text and how many definitions came back.
pub fn restore_definitions(text: &str, moved: &[MovedFootnote]) -> (String, usize) {
    let (refs, defs) = scan(text, 0, &code_ranges(text));
    let mut defined: HashSet<&str> = defs.iter().map(|d| d.id.as_str()).collect();

    let mut out = text.to_string();
    let mut restored = 0;
    for footnote in moved {
        if !refs.iter().any(|r| r.id == footnote.id) || !defined.insert(footnote.id.as_str()) {
            continue;
        }
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&footnote.raw);
        restored += 1;
    }
    (out, restored)
}
