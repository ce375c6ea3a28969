//! Include/exclude rules for target paths.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ComposeError, Result};

/// One path rule: a plain prefix or a regular expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathRule {
    Prefix(String),
    Regex(String),
}

#[derive(Debug, Clone)]
enum CompiledRule {
    Prefix(String),
    Regex(Regex),
}

impl CompiledRule {
    fn compile(rule: &PathRule) -> Result<Self> {
        match rule {
            PathRule::Prefix(prefix) => Ok(Self::Prefix(prefix.clone())),
            PathRule::Regex(pattern) => Regex::new(pattern)
                .map(Self::Regex)
                .map_err(|e| ComposeError::InvalidConfig(format!("invalid path regex {pattern:?}: {e}"))),
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Self::Regex(re) => re.is_match(path),
        }
    }
}

/// Compiled include/exclude rules.
///
/// A path is allowed when it matches some include rule (or there are none)
/// and matches no exclude rule.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Vec<CompiledRule>,
    exclude: Vec<CompiledRule>,
}

impl PathFilter {
    pub fn new(include: &[PathRule], exclude: &[PathRule]) -> Result<Self> {
        Ok(Self {
            include: include.iter().map(CompiledRule::compile).collect::<Result<_>>()?,
            exclude: exclude.iter().map(CompiledRule::compile).collect::<Result<_>>()?,
        })
    }

    pub fn allows(&self, path: &str) -> bool {
        self.rejection(path).is_none()
    }

    /// Why `path` is not allowed, if it is not.
    pub fn rejection(&self, path: &str) -> Option<String> {
        if !self.include.is_empty() && !self.include.iter().any(|r| r.matches(path)) {
            return Some(format!("{path} is not covered by any include rule"));
        }
        if self.exclude.iter().any(|r| r.matches(path)) {
            return Some(format!("{path} is excluded"));
        }
        None
    }
}
