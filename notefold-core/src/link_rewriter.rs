//! Keeping links intact when content moves between documents.
//!
//! Two passes: links inside the moved text are repointed so they still
//! resolve from the target, and links elsewhere in the vault that pointed at
//! the moved part of the source are repointed at the target.

use std::collections::BTreeSet;

use crate::compose::ComposeAction;
use crate::links::{apply_edits, scan_links, subpath_key, LinkEntry, TextEdit};
use crate::metadata::{code_ranges, Metadata};
use crate::notice::Notice;
use crate::selection::Selection;
use crate::vault::{self, Vault};

/// Subpaths of the source whose content moves to the target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovedSubpaths {
    whole_file: bool,
    keys: BTreeSet<String>,
}

impl MovedSubpaths {
    /// Headings and blocks inside `selection`, plus the whole file for a merge.
    pub fn collect(action: ComposeAction, meta: &Metadata, selection: &Selection) -> Self {
        let headings = meta
            .headings
            .iter()
            .filter(|h| selection.contains(h.position))
            .map(|h| h.heading.trim().to_lowercase());
        let blocks = meta
            .blocks
            .iter()
            .filter(|b| selection.contains(b.position))
            .map(|b| format!("^{}", b.id.to_lowercase()));

        Self {
            whole_file: action == ComposeAction::Merge,
            keys: headings.chain(blocks).collect(),
        }
    }

    /// True if a link with `subpath` points into the moved content.
    pub fn matches(&self, subpath: Option<&str>) -> bool {
        match subpath {
            None => self.whole_file,
            Some(_) => self.keys.contains(&subpath_key(subpath)),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len() + usize::from(self.whole_file)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counts and deferred work from a backlink repair pass.
#[derive(Debug, Clone, Default)]
pub struct BacklinkReport {
    pub files_updated: usize,
    pub links_updated: usize,
    pub failures: Vec<Notice>,
    /// Edits to the source itself, applied together with the selection
    /// replacement after a split. Offsets refer to the unmodified source.
    pub source_edits: Vec<TextEdit>,
}

/// Link rewriting for one merge or split from `source` to `target`.
pub struct LinkRewriter<'a, V: Vault + ?Sized> {
    vault: &'a V,
    source: &'a str,
    target: &'a str,
    action: ComposeAction,
    moved: &'a MovedSubpaths,
    selection: &'a Selection,
}

impl<'a, V: Vault + ?Sized> LinkRewriter<'a, V> {
    pub fn new(
        vault: &'a V,
        source: &'a str,
        target: &'a str,
        action: ComposeAction,
        moved: &'a MovedSubpaths,
        selection: &'a Selection,
    ) -> Self {
        Self {
            vault,
            source,
            target,
            action,
            moved,
            selection,
        }
    }

    /// Rewrite links in `text`, which is moving from the source to the
    /// target. Returns the new text and the number of links changed.
    pub fn rewrite_content(&self, text: &str) -> (String, usize) {
        let links = scan_links(text, &code_ranges(text));
        let edits: Vec<TextEdit> = links
            .iter()
            .filter_map(|link| {
                let new_text = self.relocated_link(link)?;
                Some(TextEdit::replace(link.position, new_text))
            })
            .collect();

        let count = edits.len();
        if count > 0 {
            log::debug!("rewrote {count} links in moved content");
        }
        (apply_edits(text, edits), count)
    }

    fn relocated_link(&self, link: &LinkEntry) -> Option<String> {
        let resolved = if link.target.is_empty() {
            self.source.to_string()
        } else {
            self.vault.resolve_link(&link.target, self.source)?
        };

        let points_at_source = resolved == self.source;
        let new_target = if points_at_source {
            let moves = self.action == ComposeAction::Merge
                || self.moved.matches(link.subpath.as_deref());
            if moves {
                self.target
            } else {
                self.source
            }
        } else {
            resolved.as_str()
        };

        // a same-file link whose anchor moved along stays a same-file link
        if link.target.is_empty() && new_target == self.target {
            return None;
        }
        self.vault.rewrite_link(link, self.target, new_target)
    }

    /// Repoint links across the vault that targeted the moved part of the
    /// source. Runs after the target already holds the new content.
    pub fn repair_backlinks(&self) -> BacklinkReport {
        let mut report = BacklinkReport::default();
        if self.moved.is_empty() {
            return report;
        }

        let backlinks = match self.vault.backlinks(self.source) {
            Ok(backlinks) => backlinks,
            Err(e) => {
                log::warn!("cannot list backlinks of {}: {e}", self.source);
                report
                    .failures
                    .push(Notice::error(format!("Could not list backlinks: {e}"), self.source));
                return report;
            }
        };

        for (file, entries) in &backlinks {
            let matching: Vec<&LinkEntry> = entries
                .iter()
                .filter(|e| self.moved.matches(e.subpath.as_deref()))
                .collect();
            if matching.is_empty() {
                continue;
            }

            if file == self.source {
                if self.action == ComposeAction::Merge {
                    log::debug!("skipping links inside merged source {file}");
                    continue;
                }
                let edits = self.source_edits(&matching);
                if !edits.is_empty() {
                    report.files_updated += 1;
                    report.links_updated += edits.len();
                    report.source_edits = edits;
                }
                continue;
            }

            match self.repair_file(file, &matching) {
                Ok(0) => {}
                Ok(n) => {
                    log::debug!("updated {n} links in {file}");
                    report.files_updated += 1;
                    report.links_updated += n;
                }
                Err(e) => {
                    log::warn!("failed to update links in {file}: {e}");
                    report
                        .failures
                        .push(Notice::warning(format!("Could not update links: {e}"), file.as_str()));
                }
            }
        }

        log::info!(
            "updated {} links in {} files",
            report.links_updated,
            report.files_updated
        );
        report
    }

    fn source_edits(&self, entries: &[&LinkEntry]) -> Vec<TextEdit> {
        entries
            .iter()
            .filter(|e| !self.selection.intersects(e.position))
            .filter_map(|e| {
                let text = self.retargeted(e, self.source)?;
                Some(TextEdit::replace(e.position, text))
            })
            .collect()
    }

    fn repair_file(&self, file: &str, entries: &[&LinkEntry]) -> crate::error::Result<usize> {
        let text = self.vault.read(file)?;
        let edits: Vec<TextEdit> = entries
            .iter()
            .filter(|e| {
                let present = text.get(e.position.start..e.position.end) == Some(e.raw.as_str());
                if !present {
                    log::debug!("stale link {} in {file}", e.raw);
                }
                present
            })
            .filter_map(|e| {
                let new_text = self.retargeted(e, file)?;
                Some(TextEdit::replace(e.position, new_text))
            })
            .collect();

        let count = edits.len();
        if count > 0 {
            self.vault.write(file, &apply_edits(&text, edits))?;
        }
        Ok(count)
    }

    /// Link text for `entry` pointing at the target, with display text equal
    /// to the old file name refreshed.
    fn retargeted(&self, entry: &LinkEntry, from: &str) -> Option<String> {
        let old_name = vault::stem(self.source);
        let refreshed = entry
            .display
            .as_deref()
            .filter(|d| d.trim().to_lowercase() == old_name.to_lowercase())
            .map(|_| vault::stem(self.target).to_string());

        match refreshed {
            Some(display) => {
                let entry = LinkEntry {
                    display: Some(display),
                    ..entry.clone()
                };
                self.vault.rewrite_link(&entry, from, self.target)
            }
            None => self.vault.rewrite_link(entry, from, self.target),
        }
    }
}
