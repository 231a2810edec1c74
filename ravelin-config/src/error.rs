//! Error types for the policy-language parser

use ravelin_core::DispatchError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Source position an error is attributed to, taken from the parser's
/// current-node cursor at the time the error was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePos {
    pub file: Arc<str>,
    pub line: u32,
}

impl SourcePos {
    pub fn new(file: Arc<str>, line: u32) -> Self {
        Self { file, line }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Parse error types
#[derive(Debug, Error)]
pub enum ConfError {
    /// Open/read failure on a policy file
    #[error("cannot open or read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The scanner rejected input at a location
    #[error("{pos}: syntax error: {message}")]
    Syntax { pos: SourcePos, message: String },

    /// Mismatched block close, dangling construct at end of input, empty
    /// directive name, or a parse-directive parameter-count violation
    #[error("{pos}: {message}")]
    Structural { pos: SourcePos, message: String },

    /// Token buffer or nesting budget exhausted
    #[error("{pos}: {message}")]
    Resource { pos: SourcePos, message: String },

    /// An include chain returned to an already-active include site
    #[error("{pos}: include cycle detected ({chain})")]
    IncludeCycle { pos: SourcePos, chain: String },
}

pub type ConfResult<T> = Result<T, ConfError>;

/// Tree-application error types
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The dispatcher rejected a directive or block
    #[error("{pos}: {source}")]
    Dispatch {
        pos: SourcePos,
        source: DispatchError,
    },
}
