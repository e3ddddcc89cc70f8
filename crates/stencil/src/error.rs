//! Error types for compiling, caching and rendering templates.
//!
//! Every compile-time variant names the template file and the source line
//! captured at parse time. Render-time data errors name the selector and the
//! template; they are never turned into empty output.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// The markup itself is malformed.
    #[error("{}:{line}: {message}", .file.display())]
    Parse {
        file: PathBuf,
        line: usize,
        message: String,
    },

    /// A namespaced element or inline tag has no registered handler.
    #[error("{}:{line}: unknown tag `{tag}`", .file.display())]
    UnknownTag {
        tag: String,
        file: PathBuf,
        line: usize,
    },

    /// A required attribute is missing from a tag.
    #[error("{}:{line}: <{tag}> requires attribute `{attribute}`", .file.display())]
    MissingAttribute {
        attribute: String,
        tag: String,
        file: PathBuf,
        line: usize,
    },

    /// An attribute is present but its value cannot be used.
    #[error("{}:{line}: <{tag}> attribute `{attribute}`: {reason}", .file.display())]
    InvalidAttribute {
        attribute: String,
        tag: String,
        reason: String,
        file: PathBuf,
        line: usize,
    },

    /// The first segment of a selector is not in the data pool.
    #[error("{}: `{key}` is not in the data pool (selector `{selector}`)", .template.display())]
    MissingDataKey {
        key: String,
        selector: String,
        template: PathBuf,
    },

    /// A later selector segment cannot be resolved against its value.
    #[error("{}: cannot resolve `{segment}` in `{selector}`: {reason}", .template.display())]
    SelectorResolution {
        selector: String,
        segment: String,
        reason: String,
        template: PathBuf,
    },

    /// Reading or writing cache storage failed.
    #[error("cache I/O on {}: {source}", .path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A cache artifact or registry exists but cannot be decoded.
    #[error("corrupt cache artifact {}: {reason}", .path.display())]
    CacheFormat { path: PathBuf, reason: String },

    /// The template path does not name an existing file.
    #[error("template not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    /// Reading a template source failed.
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Includes nest deeper than the configured limit.
    #[error("{}: includes nest deeper than {limit}", .template.display())]
    IncludeDepth { template: PathBuf, limit: usize },

    /// A tag's runtime hook failed.
    #[error("{}: <{tag}> failed: {message}", .template.display())]
    Runtime {
        tag: String,
        message: String,
        template: PathBuf,
    },

    /// Data handed to the engine has the wrong shape.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Invalid engine configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Source line for compile-time errors.
    pub fn line(&self) -> Option<usize> {
        match self {
            Error::Parse { line, .. }
            | Error::UnknownTag { line, .. }
            | Error::MissingAttribute { line, .. }
            | Error::InvalidAttribute { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// Whether the error was raised while compiling (as opposed to rendering
    /// or caching).
    pub fn is_compile_error(&self) -> bool {
        self.line().is_some()
    }

    pub(crate) fn cache_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::CacheIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn cache_format(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::CacheFormat {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
