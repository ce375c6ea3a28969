//! Merge and split: the two compose operations.
//!
//! An operation walks through [`Phase`]s in a fixed order. Everything up to
//! [`Phase::Writing`] only reads the vault, so a cancelled, rejected or
//! previewed operation leaves no trace.

use chrono::{Local, SecondsFormat, Utc};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::{Config, Replacement};
use crate::doc::Document;
use crate::error::{ComposeError, Result};
use crate::filename;
use crate::footnotes::{self, FootnoteReconciler, Reconciled};
use crate::front_matter;
use crate::frontmatter_merge::{merge_frontmatter, MergeContext};
use crate::heading_tree::{join_text, HeadingNode, InsertMode};
use crate::link_rewriter::{LinkRewriter, MovedSubpaths};
use crate::links::{apply_edits, TextEdit};
use crate::metadata::{code_ranges, Metadata};
use crate::notice::Notice;
use crate::path_filter::PathFilter;
use crate::selection::Selection;
use crate::template::{self, TemplateContext};
use crate::toc;
use crate::vault::{self, LinkSpec, Vault};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeAction {
    /// Move a whole document into another and delete it.
    Merge,
    /// Move part of a document into another, leaving a link behind.
    Split,
}

impl fmt::Display for ComposeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Merge => "merge",
            Self::Split => "split",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    SelectingTarget,
    ExtractingContent,
    Reconciling,
    Writing,
    FixingBacklinks,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SelectingTarget => "selecting target",
            Self::ExtractingContent => "extracting content",
            Self::Reconciling => "reconciling",
            Self::Writing => "writing",
            Self::FixingBacklinks => "fixing backlinks",
            Self::Done => "done",
        })
    }
}

/// How the user pointed at the target document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetChoice {
    /// An existing document.
    File { path: String },
    /// A configured bookmark name.
    Bookmark { name: String },
    /// Link text that may not resolve yet; created if it does not.
    UnresolvedLink { link: String },
    /// An alias of an existing document.
    Alias { alias: String, path: String },
    /// A new document with this title.
    NewFile { title: String },
}

/// A target document, existing or planned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub path: String,
    pub exists: bool,
    /// Text a planned document starts with.
    pub initial_text: String,
}

/// Supplies the target for an operation.
pub trait TargetPicker {
    /// `None` cancels the operation.
    fn pick(&mut self, action: ComposeAction, source: &str) -> Option<TargetChoice>;

    /// Final go-ahead once the target is known; `false` cancels.
    fn confirm(&mut self, _action: ComposeAction, _target: &ResolvedTarget) -> bool {
        true
    }
}

impl TargetPicker for Option<TargetChoice> {
    fn pick(&mut self, _action: ComposeAction, _source: &str) -> Option<TargetChoice> {
        self.take()
    }
}

/// What to run.
#[derive(Debug, Clone)]
pub struct ComposeRequest {
    pub action: ComposeAction,
    pub source: String,
    /// Ranges to split out; the whole document when absent. Ignored by merge.
    pub selection: Option<Selection>,
    /// Compute the result without writing anything.
    pub preview: bool,
}

impl ComposeRequest {
    pub fn merge(source: impl Into<String>) -> Self {
        Self {
            action: ComposeAction::Merge,
            source: source.into(),
            selection: None,
            preview: false,
        }
    }

    pub fn split(source: impl Into<String>, selection: Option<Selection>) -> Self {
        Self {
            action: ComposeAction::Split,
            source: source.into(),
            selection,
            preview: false,
        }
    }

    pub fn preview(mut self) -> Self {
        self.preview = true;
        self
    }
}

/// Summary of a completed operation.
#[derive(Debug, Clone)]
pub struct ComposeReport {
    pub action: ComposeAction,
    pub source: String,
    pub target: String,
    pub created_target: bool,
    pub phases: Vec<Phase>,
    pub links_rewritten: usize,
    /// Footnote ids renamed to avoid collisions in the target.
    pub footnotes_renamed: BTreeMap<String, String>,
    pub files_updated: usize,
    pub links_updated: usize,
    pub notices: Vec<Notice>,
}

/// The would-be result of an operation.
#[derive(Debug, Clone)]
pub struct Preview {
    pub target: String,
    pub creates_target: bool,
    pub text: String,
    pub frontmatter: Option<Mapping>,
    pub phases: Vec<Phase>,
}

#[derive(Debug, Clone)]
pub enum ComposeOutcome {
    Done(ComposeReport),
    Previewed(Preview),
    Cancelled,
    /// The target is excluded by policy; nothing was changed.
    Rejected { path: String, reason: String },
}

/// Runs compose operations against a vault.
pub struct Composer<'a, V: Vault + ?Sized> {
    vault: &'a V,
    config: &'a Config,
    filter: PathFilter,
}

/// Target text and front matter computed before anything is written.
struct Composed {
    text: String,
    frontmatter: Option<Mapping>,
    reconciled: Reconciled,
    links_rewritten: usize,
}

impl<'a, V: Vault + ?Sized> Composer<'a, V> {
    /// Fails on invalid filter rules or templates.
    pub fn new(vault: &'a V, config: &'a Config) -> Result<Self> {
        let filter = config.path_filter()?;
        template::validate(&config.compose.merge_template)?;
        template::validate(&config.compose.split_template)?;
        Ok(Self {
            vault,
            config,
            filter,
        })
    }

    /// Merge `source` into a picked target, then delete it.
    pub fn merge(&self, source: &str, picker: &mut dyn TargetPicker) -> Result<ComposeOutcome> {
        self.run(&ComposeRequest::merge(source), picker)
    }

    /// Move `selection` of `source` into a picked target.
    pub fn split(
        &self,
        source: &str,
        selection: Option<Selection>,
        picker: &mut dyn TargetPicker,
    ) -> Result<ComposeOutcome> {
        self.run(&ComposeRequest::split(source, selection), picker)
    }

    pub fn run(&self, request: &ComposeRequest, picker: &mut dyn TargetPicker) -> Result<ComposeOutcome> {
        let action = request.action;
        let mut phases = vec![Phase::SelectingTarget];
        log::debug!("{action} {}: selecting target", request.source);

        let source = Document::load(self.vault, &request.source)?;
        let Some(choice) = picker.pick(action, &source.path) else {
            log::debug!("{action} cancelled at target selection");
            return Ok(ComposeOutcome::Cancelled);
        };
        let target = self.resolve_target(&source, choice)?;
        if let Some(reason) = self.policy_rejection(&source.path, &target.path) {
            log::warn!("{action} into {} rejected: {reason}", target.path);
            return Ok(ComposeOutcome::Rejected {
                path: target.path,
                reason,
            });
        }
        if !picker.confirm(action, &target) {
            log::debug!("{action} into {} not confirmed", target.path);
            return Ok(ComposeOutcome::Cancelled);
        }

        phases.push(Phase::ExtractingContent);
        log::debug!("{action}: extracting content");
        let selection = match (action, &request.selection) {
            (ComposeAction::Split, Some(selection)) => selection.clamp(source.text.len()),
            _ => source.whole(),
        };
        if selection.is_empty() && action == ComposeAction::Split {
            return Err(ComposeError::Resolution("the selection is empty".into()));
        }
        if let Some(range) = selection.ranges().iter().find(|r| !r.fits(&source.text)) {
            return Err(ComposeError::Resolution(format!(
                "range {}..{} does not fall on character boundaries",
                range.start, range.end
            )));
        }
        let moved = MovedSubpaths::collect(action, &source.metadata, &selection);
        let rewriter = LinkRewriter::new(self.vault, &source.path, &target.path, action, &moved, &selection);

        phases.push(Phase::Reconciling);
        log::debug!("{action}: reconciling footnotes, links and front matter");
        let composed = self.compose(action, &source, &target, &selection, &rewriter)?;

        phases.push(Phase::Writing);
        if request.preview {
            return Ok(ComposeOutcome::Previewed(Preview {
                target: target.path,
                creates_target: !target.exists,
                text: composed.text,
                frontmatter: composed.frontmatter,
                phases,
            }));
        }
        log::debug!("{action}: writing {}", target.path);
        if target.exists {
            self.vault.write(&target.path, &composed.text)?;
        } else {
            let created = self.vault.create(
                vault::parent(&target.path),
                vault::file_name(&target.path),
                &composed.text,
            )?;
            log::info!("created {created}");
        }

        phases.push(Phase::FixingBacklinks);
        log::debug!("{action}: fixing backlinks");
        let backlinks = rewriter.repair_backlinks();

        phases.push(Phase::Done);
        let mut notices = backlinks.failures;
        match action {
            ComposeAction::Split => {
                let restored = self.rewrite_source(&source, &target.path, &selection, backlinks.source_edits, &composed.reconciled)?;
                if restored > 0 {
                    notices.push(Notice::info(
                        format!("Kept {restored} footnote definitions still referenced in the source"),
                        source.path.as_str(),
                    ));
                }
            }
            ComposeAction::Merge => {
                self.vault.delete(&source.path)?;
                log::debug!("deleted merged source {}", source.path);
            }
        }

        log::info!("{action} {} into {} done", source.path, target.path);
        Ok(ComposeOutcome::Done(ComposeReport {
            action,
            source: source.path,
            target: target.path,
            created_target: !target.exists,
            phases,
            links_rewritten: composed.links_rewritten,
            footnotes_renamed: composed.reconciled.renames.clone(),
            files_updated: backlinks.files_updated,
            links_updated: backlinks.links_updated,
            notices,
        }))
    }

    fn compose(
        &self,
        action: ComposeAction,
        source: &Document,
        target: &ResolvedTarget,
        selection: &Selection,
        rewriter: &LinkRewriter<'_, V>,
    ) -> Result<Composed> {
        let settings = &self.config.compose;
        let (target_text, target_meta) = if target.exists {
            let doc = Document::load(self.vault, &target.path)?;
            (doc.text, doc.metadata)
        } else {
            let meta = Metadata::parse(&target.initial_text);
            (target.initial_text.clone(), meta)
        };

        let reconciled = if settings.fix_footnotes {
            FootnoteReconciler::new(target_meta.footnote_ids()).reconcile(
                &source.text,
                &source.metadata.footnote_refs,
                &source.metadata.footnotes,
                selection,
            )
        } else {
            Reconciled {
                text: selection.extract(&source.text),
                ..Reconciled::default()
            }
        };
        for (from, to) in &reconciled.renames {
            log::debug!("footnote [^{from}] becomes [^{to}]");
        }

        let (incoming, links_rewritten) = rewriter.rewrite_content(&reconciled.text);

        // only text that starts with the source's own front matter carries any
        let carries_frontmatter = source
            .metadata
            .frontmatter_position
            .is_some_and(|pos| selection.contains(pos));
        let (incoming_fm, incoming_body) = if carries_frontmatter {
            front_matter::split(&incoming)?
        } else {
            (None, incoming.as_str())
        };
        let (target_fm, target_body) = front_matter::split(&target_text)?;
        let ctx = MergeContext {
            from_path: &source.path,
            merge_date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let frontmatter = merge_frontmatter(
            target_fm.as_ref(),
            incoming_fm.as_ref(),
            settings.frontmatter_strategy,
            &ctx,
        );

        let layout = match action {
            ComposeAction::Merge => settings.merge_template.as_str(),
            ComposeAction::Split => settings.split_template.as_str(),
        };
        let tctx = TemplateContext {
            content: incoming_body,
            from_path: &source.path,
            from_title: source.title(),
            new_path: &target.path,
            new_title: vault::stem(&target.path),
            now: Local::now(),
        };

        let body = if settings.heading_merge {
            let existing = parse_body(target_body);
            let incoming_tree = parse_body(incoming_body).map_text(&mut |text: &str| {
                if text.trim().is_empty() {
                    return Ok(text.to_string());
                }
                template::render(layout, &TemplateContext { content: text, ..tctx.clone() })
            })?;
            existing.merge(&incoming_tree, settings.insert_mode)?.serialize()
        } else {
            let content = template::render(layout, &tctx)?;
            match settings.insert_mode {
                InsertMode::Append => join_text(target_body, &content),
                InsertMode::Prepend => join_text(&content, target_body),
            }
        };

        let header = if frontmatter == target_fm {
            target_text[..target_text.len() - target_body.len()].to_string()
        } else {
            front_matter::render(frontmatter.as_ref())?
        };

        Ok(Composed {
            text: header + &body,
            frontmatter,
            reconciled,
            links_rewritten,
        })
    }

    /// Replace the split-out ranges in the source and apply deferred link
    /// fixes. Returns how many footnote definitions were put back.
    fn rewrite_source(
        &self,
        source: &Document,
        target: &str,
        selection: &Selection,
        link_edits: Vec<TextEdit>,
        reconciled: &Reconciled,
    ) -> Result<usize> {
        let settings = &self.config.compose;
        let replacement = match settings.replacement {
            Replacement::None => String::new(),
            mode => self.vault.generate_link(
                target,
                &source.path,
                &LinkSpec {
                    embed: mode == Replacement::Embed,
                    format: settings.link_format,
                    ..LinkSpec::default()
                },
            ),
        };

        let mut edits: Vec<TextEdit> = selection
            .ranges()
            .iter()
            .enumerate()
            .map(|(i, range)| {
                let insert = if i == 0 { replacement.clone() } else { String::new() };
                TextEdit::replace(*range, insert)
            })
            .collect();
        edits.extend(link_edits);

        let text = apply_edits(&source.text, edits);
        let (text, restored) = if settings.fix_footnotes {
            footnotes::restore_definitions(&text, &reconciled.moved)
        } else {
            (text, 0)
        };
        self.vault.write(&source.path, &text)?;
        Ok(restored)
    }

    /// Turn the user's choice into a concrete target path.
    pub fn resolve_target(&self, source: &Document, choice: TargetChoice) -> Result<ResolvedTarget> {
        let path = match choice {
            TargetChoice::File { path } => path,
            TargetChoice::Alias { alias, path } => {
                log::debug!("alias {alias} names {path}");
                path
            }
            TargetChoice::Bookmark { name } => self
                .config
                .bookmarks
                .get(&name)
                .cloned()
                .ok_or_else(|| ComposeError::Resolution(format!("bookmark {name:?} does not exist")))?,
            TargetChoice::UnresolvedLink { link } => {
                match self.vault.resolve_link(&link, &source.path) {
                    Some(path) => path,
                    None => return self.plan_new(source, &link),
                }
            }
            TargetChoice::NewFile { title } => return self.plan_new(source, &title),
        };

        if path == source.path {
            return Err(ComposeError::Resolution("target is the source document".into()));
        }
        if !self.vault.exists(&path) {
            return Err(ComposeError::Resolution(format!("{path} does not exist")));
        }
        Ok(ResolvedTarget {
            path,
            exists: true,
            initial_text: String::new(),
        })
    }

    /// Plan a new document titled `title` next to the source.
    fn plan_new(&self, source: &Document, title: &str) -> Result<ResolvedTarget> {
        let settings = &self.config.compose;
        let title = title.trim().trim_end_matches(".md");
        let name = filename::sanitize(title, &settings.invalid_chars, settings.title_as_path);
        if name.is_empty() {
            return Err(ComposeError::Resolution(format!(
                "{title:?} has no characters usable in a file name"
            )));
        }

        let path = vault::normalize(&vault::join(vault::parent(&source.path), &format!("{name}.md")));
        if path == source.path {
            return Err(ComposeError::Resolution("target is the source document".into()));
        }
        if self.vault.exists(&path) {
            return Err(ComposeError::Resolution(format!("{path} already exists")));
        }
        let folder = vault::parent(&path);
        if !settings.allow_unresolved_path && !self.vault.folder_exists(folder) {
            return Err(ComposeError::Resolution(format!("folder {folder:?} does not exist")));
        }

        // The intended title is the last path segment when titles are paths
        let intended = if settings.title_as_path {
            title.rsplit('/').next().unwrap_or(title).trim()
        } else {
            title
        };
        let mut frontmatter = Mapping::new();
        if vault::stem(&path) != intended {
            if settings.alias_on_rename {
                frontmatter.insert(
                    Value::from("aliases"),
                    Value::Sequence(vec![Value::from(intended)]),
                );
            }
            if settings.title_on_rename {
                frontmatter.insert(Value::from("title"), Value::from(intended));
            }
        }

        log::debug!("planning new document {path}");
        Ok(ResolvedTarget {
            path,
            exists: false,
            initial_text: front_matter::render(Some(&frontmatter))?,
        })
    }

    /// Why the target may not be used, if it may not.
    fn policy_rejection(&self, source: &str, target: &str) -> Option<String> {
        if let Some(reason) = self.filter.rejection(target) {
            return Some(reason);
        }
        if self.config.compose.only_current_folder && vault::parent(target) != vault::parent(source) {
            return Some(format!("{target} is outside the folder of {source}"));
        }
        None
    }
}

/// Heading tree of text that carries no front matter.
fn parse_body(text: &str) -> HeadingNode {
    let headings = toc::extract_headings(text, 0, &code_ranges(text));
    HeadingNode::parse(text, 0, &headings)
}
