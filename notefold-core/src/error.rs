//! Error types for the composition engine.

use thiserror::Error;

/// Errors raised by merge and split operations.
///
/// Policy refusals are not errors; they surface as
/// [`ComposeOutcome::Rejected`](crate::compose::ComposeOutcome::Rejected).
#[derive(Debug, Error)]
pub enum ComposeError {
    /// A settings value is unknown or malformed (strategy, replacement mode, filter regex).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A template refers to a token the engine does not know.
    #[error("Invalid template: unknown token {{{{{0}}}}}")]
    InvalidTemplate(String),

    /// No usable target document could be determined.
    #[error("Cannot resolve target: {0}")]
    Resolution(String),

    /// Two heading nodes with different level or text were asked to merge.
    #[error("Heading mismatch: cannot merge level {left_level} {left:?} with level {right_level} {right:?}")]
    HeadingMismatch {
        left_level: u8,
        left: Option<String>,
        right_level: u8,
        right: Option<String>,
    },

    /// A frontmatter block could not be parsed or rendered.
    #[error("Frontmatter error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The document store failed to read or write.
    #[error("Vault error on {path}: {source}")]
    Vault {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ComposeError {
    pub(crate) fn vault(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Vault {
            path: path.into(),
            source,
        }
    }

    /// True for errors caused by corrupted settings rather than user input.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig(_) | Self::InvalidTemplate(_))
    }
}

/// Convenience alias that pins the error type to [`ComposeError`].
pub type Result<T> = std::result::Result<T, ComposeError>;
