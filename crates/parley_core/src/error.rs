//! Typed errors raised while loading dialogue configuration.
//!
//! Everything here is a load-time failure: a bad condition or a malformed
//! document aborts startup instead of surfacing mid-conversation. Runtime
//! capability failures travel as `anyhow::Error` and are handled by the
//! engine that triggered them.

use std::path::PathBuf;
use thiserror::Error;

/// A condition expression could not be tokenized or parsed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyntaxError {
    #[error("unexpected character {found:?} at {position}")]
    UnexpectedChar { position: usize, found: char },

    #[error("unexpected token '{found}' at {position}")]
    UnexpectedToken { position: usize, found: String },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("missing closing parenthesis for '(' at {position}")]
    MissingClosingParen { position: usize },

    #[error("invalid number '{literal}' at {position}")]
    InvalidNumber { position: usize, literal: String },
}

/// Compiling a condition failed, either in the grammar or while a
/// capability port pre-computed leaf data (embeddings, paraphrases).
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("syntax error in condition \"{expr}\": {source}")]
    Syntax {
        expr: String,
        #[source]
        source: SyntaxError,
    },

    #[error("{capability} failed while compiling \"{expr}\": {message}")]
    Capability {
        expr: String,
        capability: &'static str,
        message: String,
    },
}

impl ConditionError {
    pub fn syntax(&self) -> Option<&SyntaxError> {
        match self {
            ConditionError::Syntax { source, .. } => Some(source),
            ConditionError::Capability { .. } => None,
        }
    }
}

/// A configuration document is missing, unreadable or structurally invalid.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported document extension '{extension}' for {}", path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid {what} document: {message}")]
    Schema { what: &'static str, message: String },

    #[error("in {location}: {source}")]
    Condition {
        location: String,
        #[source]
        source: ConditionError,
    },

    #[error("state machine declares no states")]
    NoStates,

    #[error("{location} refers to unknown state '{state}'")]
    UnknownState { location: String, state: String },
}

impl ConfigError {
    /// Wrap a condition compilation failure with the place it came from,
    /// e.g. `state 'greet' transition #1`.
    pub fn condition(location: impl Into<String>, source: ConditionError) -> Self {
        ConfigError::Condition {
            location: location.into(),
            source,
        }
    }

    pub fn schema(what: &'static str, err: impl std::fmt::Display) -> Self {
        ConfigError::Schema {
            what,
            message: err.to_string(),
        }
    }
}
