//! notefold core - merge and split Markdown notes without breaking the vault
//!
//! This crate contains the composition engine, independent of any front end:
//! - Heading-tree parsing, merging and serialization
//! - Footnote reconciliation across documents
//! - Link rewriting and backlink repair
//! - Front matter merge strategies
//! - The merge/split orchestrator and its collaborator traits
//! - A filesystem vault and configuration management

pub mod compose;
pub mod config;
pub mod doc;
pub mod error;
pub mod filename;
pub mod footnotes;
pub mod front_matter;
pub mod frontmatter_merge;
pub mod heading_tree;
pub mod link_rewriter;
pub mod links;
pub mod metadata;
pub mod notice;
pub mod path_filter;
pub mod selection;
pub mod template;
pub mod toc;
pub mod vault;

// Re-export commonly used types
pub use compose::{
    ComposeAction, ComposeOutcome, ComposeReport, ComposeRequest, Composer, Phase, Preview,
    ResolvedTarget, TargetChoice, TargetPicker,
};
pub use config::{Config, Replacement};
pub use doc::Document;
pub use error::{ComposeError, Result};
pub use frontmatter_merge::FrontmatterStrategy;
pub use heading_tree::{HeadingNode, InsertMode};
pub use metadata::{Metadata, Pos};
pub use notice::{Notice, NoticeLevel};
pub use selection::{LineSelection, Selection};
pub use vault::{DocumentStore, FsVault, LinkIndex, Vault};
