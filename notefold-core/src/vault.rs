//! Collaborator contracts the engine consumes, and a filesystem implementation.
//!
//! Paths are vault-relative with `/` separators (`notes/Idea.md`).

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{ComposeError, Result};
use crate::links::{format_markdown_link, format_wikilink, LinkEntry, LinkFormat};
use crate::metadata::Metadata;

const MD_EXT: &str = ".md";

/// Read/write access to document text.
pub trait DocumentStore {
    fn read(&self, path: &str) -> Result<String>;
    fn write(&self, path: &str, text: &str) -> Result<()>;
    fn delete(&self, path: &str) -> Result<()>;
    /// Create `parent/name` with `initial` text. Fails if it already exists.
    fn create(&self, parent: &str, name: &str, initial: &str) -> Result<String>;
    fn rename(&self, path: &str, new_path: &str) -> Result<()>;
    fn exists(&self, path: &str) -> bool;
    fn folder_exists(&self, path: &str) -> bool;
    /// All documents, sorted by path.
    fn documents(&self) -> Result<Vec<String>>;
}

/// How to render a generated link.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkSpec<'a> {
    pub subpath: Option<&'a str>,
    pub display: Option<&'a str>,
    pub embed: bool,
    pub format: LinkFormat,
}

/// Metadata, backlink and link-text services.
pub trait LinkIndex {
    /// Parsed metadata, or `None` when the index knows nothing about `path`.
    fn metadata(&self, path: &str) -> Option<Metadata>;

    /// Every link pointing at `path`, grouped by the file containing it.
    fn backlinks(&self, path: &str) -> Result<BTreeMap<String, Vec<LinkEntry>>>;

    /// Resolve a link path written in `from` to a vault path.
    fn resolve_link(&self, link: &str, from: &str) -> Option<String>;

    /// Link text pointing at `target`, to be placed in `from`.
    fn generate_link(&self, target: &str, from: &str, spec: &LinkSpec<'_>) -> String;

    /// New text for `entry` (found in `from`) once it should point at
    /// `new_target`. `None` when nothing changes.
    fn rewrite_link(&self, entry: &LinkEntry, from: &str, new_target: &str) -> Option<String> {
        let text = self.generate_link(
            new_target,
            from,
            &LinkSpec {
                subpath: entry.subpath.as_deref(),
                display: entry.display.as_deref(),
                embed: entry.embed,
                format: entry.format,
            },
        );
        (text != entry.raw).then_some(text)
    }
}

/// Everything the compose engine needs from its host.
pub trait Vault: DocumentStore + LinkIndex {}

impl<T: DocumentStore + LinkIndex + ?Sized> Vault for T {}

/// A vault backed by a directory of Markdown files.
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    /// Open a vault rooted at `root`, which must be an existing directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ComposeError::vault(
                root.display().to_string(),
                io::Error::new(io::ErrorKind::NotFound, "vault directory not found"),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Vault path for a filesystem path inside the vault.
    pub fn vault_path(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    fn abs(&self, path: &str) -> PathBuf {
        normalize(path)
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }

    fn resolve_in(&self, docs: &[String], link: &str, from: &str) -> Option<String> {
        if link.is_empty() {
            return Some(from.to_string());
        }

        let candidates: Vec<String> = if link.ends_with(MD_EXT) {
            vec![link.to_string()]
        } else {
            vec![format!("{link}{MD_EXT}"), link.to_string()]
        };

        for candidate in &candidates {
            let relative = normalize(&join(parent(from), candidate));
            if self.exists(&relative) {
                return Some(relative);
            }
            let absolute = normalize(candidate.trim_start_matches('/'));
            if self.exists(&absolute) {
                return Some(absolute);
            }
        }

        // Fall back to a suffix match on the file name, preferring the linking folder
        let wanted = candidates[0].trim_start_matches('/').to_lowercase();
        let from_dir = parent(from);
        docs.iter()
            .filter(|doc| {
                let lower = doc.to_lowercase();
                lower == wanted || lower.ends_with(&format!("/{wanted}"))
            })
            .min_by_key(|doc| (parent(doc) != from_dir, doc.len(), (*doc).clone()))
            .cloned()
    }
}

impl DocumentStore for FsVault {
    fn read(&self, path: &str) -> Result<String> {
        fs::read_to_string(self.abs(path)).map_err(|e| ComposeError::vault(path, e))
    }

    fn write(&self, path: &str, text: &str) -> Result<()> {
        fs::write(self.abs(path), text).map_err(|e| ComposeError::vault(path, e))
    }

    fn delete(&self, path: &str) -> Result<()> {
        fs::remove_file(self.abs(path)).map_err(|e| ComposeError::vault(path, e))
    }

    fn create(&self, parent: &str, name: &str, initial: &str) -> Result<String> {
        let path = normalize(&join(parent, name));
        let abs = self.abs(&path);
        if let Some(dir) = abs.parent() {
            fs::create_dir_all(dir).map_err(|e| ComposeError::vault(parent, e))?;
        }
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&abs)
            .map_err(|e| ComposeError::vault(path.as_str(), e))?;
        file.write_all(initial.as_bytes())
            .map_err(|e| ComposeError::vault(path.as_str(), e))?;
        log::debug!("created {path}");
        Ok(path)
    }

    fn rename(&self, path: &str, new_path: &str) -> Result<()> {
        let to = self.abs(new_path);
        if let Some(dir) = to.parent() {
            fs::create_dir_all(dir).map_err(|e| ComposeError::vault(new_path, e))?;
        }
        fs::rename(self.abs(path), to).map_err(|e| ComposeError::vault(path, e))
    }

    fn exists(&self, path: &str) -> bool {
        !path.is_empty() && self.abs(path).is_file()
    }

    fn folder_exists(&self, path: &str) -> bool {
        self.abs(path).is_dir()
    }

    fn documents(&self) -> Result<Vec<String>> {
        let mut docs = Vec::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
        for entry in walker {
            let entry = entry.map_err(|e| {
                ComposeError::vault(self.root.display().to_string(), io::Error::from(e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(path) = self.vault_path(entry.path()) {
                if path.ends_with(MD_EXT) {
                    docs.push(path);
                }
            }
        }
        docs.sort();
        Ok(docs)
    }
}

impl LinkIndex for FsVault {
    fn metadata(&self, path: &str) -> Option<Metadata> {
        match self.read(path) {
            Ok(text) => Some(Metadata::parse(&text)),
            Err(e) => {
                log::debug!("no metadata for {path}: {e}");
                None
            }
        }
    }

    fn backlinks(&self, path: &str) -> Result<BTreeMap<String, Vec<LinkEntry>>> {
        let docs = self.documents()?;
        let mut result = BTreeMap::new();
        for doc in &docs {
            let Some(meta) = self.metadata(doc) else {
                continue;
            };
            let hits: Vec<LinkEntry> = meta
                .links
                .into_iter()
                .filter(|link| self.resolve_in(&docs, &link.target, doc).as_deref() == Some(path))
                .collect();
            if !hits.is_empty() {
                result.insert(doc.clone(), hits);
            }
        }
        Ok(result)
    }

    fn resolve_link(&self, link: &str, from: &str) -> Option<String> {
        let docs = match self.documents() {
            Ok(docs) => docs,
            Err(e) => {
                log::warn!("cannot list vault documents: {e}");
                Vec::new()
            }
        };
        self.resolve_in(&docs, link, from)
    }

    fn generate_link(&self, target: &str, from: &str, spec: &LinkSpec<'_>) -> String {
        match spec.format {
            LinkFormat::Wiki => {
                let full = target.strip_suffix(MD_EXT).unwrap_or(target);
                let short = file_name(full);
                let unique = self
                    .documents()
                    .map(|docs| {
                        docs.iter()
                            .filter(|d| file_name(d).eq_ignore_ascii_case(file_name(target)))
                            .count()
                            <= 1
                    })
                    .unwrap_or(false);
                let name = if unique { short } else { full };
                format_wikilink(name, spec.subpath, spec.display, spec.embed)
            }
            LinkFormat::Markdown => {
                let path = relative(parent(from), target);
                let display = spec.display.unwrap_or_else(|| stem(target));
                format_markdown_link(&path, spec.subpath, display, spec.embed)
            }
        }
    }
}

/// Final path segment.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// File name without its `.md` extension.
pub fn stem(path: &str) -> &str {
    let name = file_name(path);
    name.strip_suffix(MD_EXT).unwrap_or(name)
}

/// Folder containing `path`; empty for the vault root.
pub fn parent(path: &str) -> &str {
    path.rfind('/').map_or("", |i| &path[..i])
}

pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

/// Resolve `.` and `..` segments. `..` above the root is dropped.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Path to `target` as seen from folder `from_dir`.
pub fn relative(from_dir: &str, target: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = vec![".."; from.len() - common];
    parts.extend_from_slice(&to[common..]);
    parts.join("/")
}
