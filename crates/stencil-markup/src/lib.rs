//! Markup tokenizer and mutable node tree for the stencil template compiler.
//!
//! This crate turns template source into a [`Document`]: an arena of nodes
//! (document, element, text, comment, CDATA, doctype) that keeps the exact
//! source text of every node and the line it started on. Later passes rewrite
//! the tree in place through [`Document::replace`], [`Document::insert_before`]
//! and [`Document::remove`].
//!
//! # Example
//!
//! ```rust
//! use stencil_markup::{parse_namespaced, Node};
//!
//! let doc = parse_namespaced(r#"<p><tpl:var name="user.name"/></p>"#, "tpl").unwrap();
//! let root = doc.root();
//!
//! // Only `tpl:` tags are structural; the <p> wrapper is plain text.
//! let kinds: Vec<&str> = doc
//!     .children(root)
//!     .iter()
//!     .map(|&id| match doc.node(id) {
//!         Node::Text(_) => "text",
//!         Node::Element(_) => "element",
//!         _ => "other",
//!     })
//!     .collect();
//! assert_eq!(kinds, vec!["text", "element", "text"]);
//!
//! // Serializing an untouched tree reproduces the input byte for byte.
//! assert_eq!(doc.source_text(root), r#"<p><tpl:var name="user.name"/></p>"#);
//! ```
//!
//! # Tag Grammar
//!
//! - Attribute values must be double-quoted; bare names are allowed (`disabled`).
//! - `br`, `hr`, `img`, `input`, `link` and `meta` are self-closing without a
//!   trailing `/>`, as are any names passed in [`ParseOptions::self_closing`].
//! - A close tag with no matching open element is kept as text.
//! - With a namespace, a `<ns:` sequence the grammar rejects is a
//!   [`ParseError::Malformed`], and an unclosed `ns:` element is a
//!   [`ParseError::Unclosed`].
//!
//! No entity decoding happens anywhere.

mod error;
mod parser;
mod tokenizer;
mod tree;

pub use error::{ParseError, TreeError};
pub use parser::{parse, parse_namespaced, ParseOptions, Parser, VOID_ELEMENTS};
pub use tokenizer::{parse_attributes, Scanner, TagToken, Token, Tokenizer};
pub use tree::{Document, Element, Node, NodeId, OpenKind};
