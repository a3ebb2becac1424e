//! Error taxonomy shared by every hook.
//!
//! Per-file errors ([`FormatError`], [`MergeError`], [`TransformError`], I/O) are
//! collected by the driver into a [`crate::report::RunOutcome`]; a
//! [`ConfigurationError`] aborts a run before any file is touched.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::document::Format;

/// Position inside a file, as reported by the underlying reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            line: Some(line),
            column: Some(column),
        }
    }

    pub fn unknown() -> Self {
        Self::default()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, ":{line}:{column}"),
            (Some(line), None) => write!(f, ":{line}"),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("{}{location}: invalid {format}: {message}", path.display())]
    Parse {
        path: PathBuf,
        format: Format,
        location: Location,
        message: String,
    },
    #[error("{}: cannot write as {format}: {message}", path.display())]
    Unrepresentable {
        path: PathBuf,
        format: Format,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    #[error("anchor `{anchor}` not found under `{path}`")]
    AnchorNotFound { anchor: String, path: String },
    #[error("expected a mapping at `{path}`, found {found}")]
    NotAMapping { path: String, found: &'static str },
    #[error("desired element under `{path}` has no `{key}` identity field")]
    MissingIdentity { path: String, key: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error(transparent)]
    Merge(#[from] MergeError),
    /// The file breaks a convention that cannot be fixed automatically.
    #[error("{0}")]
    Violation(String),
    #[error("unexpected document structure: {0}")]
    Malformed(String),
}

/// Invalid flag combination or profile setting. Fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("configuration error: {0}")]
pub struct ConfigurationError(pub String);

/// Everything that can go wrong while processing a single file.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("{}: {source}", path.display())]
    Transform {
        path: PathBuf,
        #[source]
        source: TransformError,
    },
}
