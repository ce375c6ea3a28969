//! Document model with Rope-based line access

use ropey::Rope;

use crate::error::Result;
use crate::metadata::{Metadata, Pos};
use crate::selection::{LineSelection, Selection};
use crate::vault::{self, Vault};

/// A document loaded for the lifetime of one operation
#[derive(Clone, Debug)]
pub struct Document {
    pub path: String,
    pub text: String,
    pub rope: Rope,
    pub metadata: Metadata,
}

impl Document {
    /// Load a document and its metadata from the vault.
    ///
    /// Missing metadata is treated as an empty index; entries that no longer
    /// fit the text are dropped.
    pub fn load<V: Vault + ?Sized>(vault: &V, path: &str) -> Result<Self> {
        let text = vault.read(path)?;
        let mut metadata = vault.metadata(path).unwrap_or_else(|| {
            log::debug!("no metadata for {path}, treating as empty");
            Metadata::default()
        });
        metadata.retain_valid(&text);
        Ok(Self::with_metadata(path, text, metadata))
    }

    /// Build a document from text, scanning it for metadata.
    pub fn from_text(path: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let metadata = Metadata::parse(&text);
        Self::with_metadata(path, text, metadata)
    }

    fn with_metadata(path: impl Into<String>, text: String, metadata: Metadata) -> Self {
        let rope = Rope::from_str(&text);
        Self {
            path: path.into(),
            text,
            rope,
            metadata,
        }
    }

    /// File name without extension.
    pub fn title(&self) -> &str {
        vault::stem(&self.path)
    }

    /// Offset where the body starts, after any front matter.
    pub fn content_start(&self) -> usize {
        self.metadata.frontmatter_position.map_or(0, |p| p.end)
    }

    /// Get the number of lines in the document
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Byte span of a linewise selection (inclusive lines, clamped).
    pub fn line_span(&self, lines: LineSelection) -> Pos {
        lines.to_pos(&self.rope)
    }

    /// Selection covering the whole document.
    pub fn whole(&self) -> Selection {
        Selection::whole(self.text.len())
    }
}
