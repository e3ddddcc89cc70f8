//! Error types for markup parsing and tree mutation.

use thiserror::Error;

/// Errors raised while tokenizing or building the node tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Something that starts like a namespaced tag but does not follow the tag grammar.
    #[error("line {line}: malformed tag `{snippet}`")]
    Malformed { line: usize, snippet: String },

    /// A namespaced element was opened and never closed.
    #[error("line {line}: <{tag}> is never closed")]
    Unclosed { tag: String, line: usize },

    /// The namespace prefix itself is not a valid identifier.
    #[error("invalid namespace prefix `{0}`")]
    InvalidNamespace(String),
}

impl ParseError {
    /// Source line the error points at, when there is one.
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::Malformed { line, .. } | ParseError::Unclosed { line, .. } => Some(*line),
            ParseError::InvalidNamespace(_) => None,
        }
    }
}

/// Errors raised by tree mutation primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    /// Only documents and non-self-closing elements own children.
    #[error("node {0} cannot own children")]
    NotAContainer(usize),

    /// The operation needs a node that is attached to a parent.
    #[error("node {0} has no parent")]
    Detached(usize),

    /// The document root cannot be moved, replaced or removed.
    #[error("the document root cannot be moved")]
    Root,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_line() {
        let err = ParseError::Unclosed {
            tag: "tpl:if".to_string(),
            line: 7,
        };
        assert_eq!(err.to_string(), "line 7: <tpl:if> is never closed");
        assert_eq!(err.line(), Some(7));
    }

    #[test]
    fn test_invalid_namespace_has_no_line() {
        let err = ParseError::InvalidNamespace("1x".into());
        assert_eq!(err.line(), None);
    }
}
