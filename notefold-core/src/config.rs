//! Configuration management for notefold

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ComposeError;
use crate::filename::InvalidCharHandling;
use crate::frontmatter_merge::FrontmatterStrategy;
use crate::heading_tree::InsertMode;
use crate::links::LinkFormat;
use crate::notice::Notice;
use crate::path_filter::{PathFilter, PathRule};
use crate::template;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub compose: ComposeConfig,
    pub filters: FilterConfig,
    /// Bookmark name to vault path.
    pub bookmarks: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    pub fix_footnotes: bool,
    pub frontmatter_strategy: FrontmatterStrategy,
    pub heading_merge: bool,
    pub insert_mode: InsertMode,
    pub only_current_folder: bool,
    pub allow_unresolved_path: bool,
    pub replacement: Replacement,
    pub invalid_chars: InvalidCharHandling,
    pub title_as_path: bool,
    pub link_format: LinkFormat,
    pub merge_template: String,
    pub split_template: String,
    /// Keep the intended title as an alias when the file name had to change.
    pub alias_on_rename: bool,
    /// Keep the intended title in a `title` field when the file name had to change.
    pub title_on_rename: bool,
}

/// What replaces the extracted text in the source after a split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Replacement {
    Embed,
    #[default]
    Link,
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub include: Vec<PathRule>,
    pub exclude: Vec<PathRule>,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            fix_footnotes: true,
            frontmatter_strategy: FrontmatterStrategy::default(),
            heading_merge: false,
            insert_mode: InsertMode::default(),
            only_current_folder: false,
            allow_unresolved_path: true,
            replacement: Replacement::default(),
            invalid_chars: InvalidCharHandling::default(),
            title_as_path: true,
            link_format: LinkFormat::default(),
            merge_template: "{{content}}".to_string(),
            split_template: "{{content}}".to_string(),
            alias_on_rename: true,
            title_on_rename: false,
        }
    }
}

impl fmt::Display for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Embed => "embed",
            Self::Link => "link",
            Self::None => "none",
        })
    }
}

impl FromStr for Replacement {
    type Err = ComposeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "embed" => Ok(Self::Embed),
            "link" => Ok(Self::Link),
            "none" => Ok(Self::None),
            other => Err(ComposeError::InvalidConfig(format!("unknown replacement mode: {other}"))),
        }
    }
}

impl Config {
    /// Get the platform-specific config file path
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "notefold")
            .map(|proj_dirs| proj_dirs.config_dir().join("notefold.toml"))
    }

    /// Load configuration from the platform path, falling back to defaults if missing.
    /// Returns the config and notices describing where it came from.
    pub fn load() -> Result<(Self, Vec<Notice>)> {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                let config = Self::load_from(&path)?;
                let notice = Notice::info(format!("Loaded {}", path.display()), "config");
                return Ok((config, vec![notice]));
            }
        }

        let config = Self::default();
        config.validate()?;
        Ok((config, vec![Notice::info("Using default configuration", "config")]))
    }

    /// Load from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        // Check config file permissions (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = std::fs::metadata(path)
                .with_context(|| format!("Failed to stat config file: {}", path.display()))?;
            if metadata.permissions().mode() & 0o002 != 0 {
                anyhow::bail!(
                    "Config file {} is world-writable (insecure permissions)",
                    path.display()
                );
            }
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Check the values serde cannot: templates and filter regexes.
    pub fn validate(&self) -> Result<()> {
        template::validate(&self.compose.merge_template).context("merge_template")?;
        template::validate(&self.compose.split_template).context("split_template")?;
        self.path_filter()?;
        Ok(())
    }

    pub fn path_filter(&self) -> Result<PathFilter, ComposeError> {
        PathFilter::new(&self.filters.include, &self.filters.exclude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.compose.fix_footnotes);
        assert!(!config.compose.heading_merge);
        assert_eq!(config.compose.frontmatter_strategy, FrontmatterStrategy::MergePreferNew);
        assert_eq!(config.compose.insert_mode, InsertMode::Append);
        assert_eq!(config.compose.replacement, Replacement::Link);
        assert_eq!(config.compose.merge_template, "{{content}}");
        assert!(config.bookmarks.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_valid_toml() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        let toml_content = "[compose]\n\
fix_footnotes = false\n\
frontmatter_strategy = \"preserve-both\"\n\
heading_merge = true\n\
insert_mode = \"prepend\"\n\
replacement = \"embed\"\n\
invalid_chars = { replace = \"_\" }\n\
link_format = \"markdown\"\n\
split_template = \"> from [[{{fromTitle}}]]\\n{{content}}\"\n\
\n\
[filters]\n\
include = [{ prefix = \"notes/\" }]\n\
exclude = [{ regex = \"archive\" }]\n\
\n\
[bookmarks]\n\
inbox = \"notes/Inbox.md\"\n";

        file.write_all(toml_content.as_bytes())?;

        let config = Config::load_from(file.path())?;
        assert!(!config.compose.fix_footnotes);
        assert_eq!(config.compose.frontmatter_strategy, FrontmatterStrategy::PreserveBoth);
        assert!(config.compose.heading_merge);
        assert_eq!(config.compose.insert_mode, InsertMode::Prepend);
        assert_eq!(config.compose.replacement, Replacement::Embed);
        assert_eq!(config.compose.invalid_chars, InvalidCharHandling::Replace("_".into()));
        assert_eq!(config.compose.link_format, LinkFormat::Markdown);
        assert_eq!(config.filters.include, vec![PathRule::Prefix("notes/".into())]);
        assert_eq!(config.bookmarks.get("inbox").map(String::as_str), Some("notes/Inbox.md"));
        assert!(!config.path_filter()?.allows("notes/archive/x.md"));

        Ok(())
    }

    #[test]
    fn test_load_partial_toml() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"[compose]\nheading_merge = true\n")?;

        let config = Config::load_from(file.path())?;
        assert!(config.compose.heading_merge);
        assert!(config.compose.fix_footnotes);
        assert_eq!(config.compose.split_template, "{{content}}");

        Ok(())
    }

    #[test]
    fn unknown_strategy_fails_parsing() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"[compose]\nfrontmatter_strategy = \"merge-everything\"\n")?;
        assert!(Config::load_from(file.path()).is_err());
        Ok(())
    }

    #[test]
    fn unknown_template_token_fails_loading() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"[compose]\nmerge_template = \"{{weather}}\"\n")?;
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("weather"));
        Ok(())
    }

    #[test]
    fn invalid_filter_regex_fails_loading() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"[filters]\nexclude = [{ regex = \"(\" }]\n")?;
        assert!(Config::load_from(file.path()).is_err());
        Ok(())
    }

    #[test]
    fn test_load_invalid_toml_returns_error() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"invalid toml [[[syntax")?;

        let result = Config::load_from(file.path());
        assert!(result.is_err());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn world_writable_config_is_refused() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let file = NamedTempFile::new()?;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o666))?;
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("world-writable"));
        Ok(())
    }

    #[test]
    fn test_config_path_returns_some() {
        let path = Config::config_path();
        assert!(path.is_some());
        if let Some(p) = path {
            assert!(p.to_string_lossy().contains("notefold"));
            assert!(p.to_string_lossy().ends_with("notefold.toml"));
        }
    }

    #[test]
    fn replacement_parses() {
        assert_eq!("none".parse::<Replacement>().ok(), Some(Replacement::None));
        assert!("inline".parse::<Replacement>().is_err());
    }

    #[test]
    fn test_serialization_round_trip() -> Result<()> {
        let mut config = Config::default();
        config.compose.frontmatter_strategy = FrontmatterStrategy::KeepOriginal;
        config.bookmarks.insert("daily".into(), "journal/Today.md".into());

        let toml_str = toml::to_string(&config)?;
        assert!(toml_str.contains("keep-original"));

        let parsed: Config = toml::from_str(&toml_str)?;
        assert_eq!(parsed.compose.frontmatter_strategy, FrontmatterStrategy::KeepOriginal);
        assert_eq!(parsed.bookmarks.len(), 1);

        Ok(())
    }
}
