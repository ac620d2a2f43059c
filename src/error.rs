//! Engine error types

use thiserror::Error;

/// Errors raised by the interpolation engine and directive handlers
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed `${{ ... }}` usage or an invalid property name
    #[error("syntax error in [{input}] at position [{position}]")]
    Syntax { input: String, position: usize },

    /// A required property reference could not be resolved (strict mode)
    #[error("unresolved property [{0}]")]
    UnresolvedProperty(String),

    /// Resolution did not reach a fixed point within the pass limit
    #[error("cyclic property reference resolving [{0}]")]
    CyclicReference(String),

    /// A file's digest did not match the expected checksum
    #[error("invalid checksum for file [{file}] expected [{expected}] actual [{actual}]")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    /// A directive line did not match its argument grammar
    #[error("invalid syntax for {prefix} directive [{line}]")]
    InvalidDirective { prefix: &'static str, line: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Construct a syntax error for an offending span of `input`
    pub fn syntax(input: impl Into<String>, position: usize) -> Self {
        EngineError::Syntax {
            input: input.into(),
            position,
        }
    }
}
