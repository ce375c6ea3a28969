//! User-facing notices collected while an operation runs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Notice severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    /// Informational notice
    Info,
    /// Something was skipped or degraded but the operation went on
    Warning,
    /// A step failed
    Error,
}

/// A message for the user about something that happened during an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Severity level of the notice
    pub level: NoticeLevel,
    /// Human-readable message
    pub message: String,
    /// Where it came from (e.g., "config", "backlinks", a vault path)
    pub source: String,
}

impl Notice {
    /// Create a new notice
    pub fn new(level: NoticeLevel, message: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            source: source.into(),
        }
    }

    /// Create a warning notice
    pub fn warning(message: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message, source)
    }

    /// Create an info notice
    pub fn info(message: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message, source)
    }

    /// Create an error notice
    pub fn error(message: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message, source)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        write!(f, "{level}: {} ({})", self.message, self.source)
    }
}
