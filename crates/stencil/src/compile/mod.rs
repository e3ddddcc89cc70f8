//! Template compilation.
//!
//! Compiling a template runs four steps over one [`Document`]:
//!
//! 1. **Parse** with the engine's namespace, so only `ns:` elements are
//!    structural and everything else is literal text.
//! 2. **Chain** each child list: an else-compatible element followed by
//!    `elseif` / `else` elements (whitespace between them is dropped) takes
//!    those continuations out of the tree and keeps them as its chain.
//! 3. **Dispatch** depth-first, children before parents. Each namespaced
//!    element is handed to its [`TagSpec`](crate::tags::TagSpec) and replaced
//!    by an embedded [`Instruction`].
//! 4. **Generate**: flatten the tree into a [`Program`], expanding inline tags
//!    in the literal leaves.

mod generate;
mod inline;

pub use inline::{InlineMatch, InlinePattern};

use std::collections::HashMap;
use std::path::Path;

use stencil_markup::{Document, Node, NodeId, ParseError, ParseOptions, Parser};

use crate::error::{Error, Result};
use crate::program::{Instruction, Program};
use crate::tags::{TagCall, TagRegistry, TagSpec};

/// Local names that continue an else-compatible tag.
pub const CONTINUATIONS: &[&str] = &["elseif", "else"];

/// Parser, inline matcher and tag registry for one namespace.
#[derive(Debug, Clone)]
pub struct Compiler {
    namespace: String,
    registry: TagRegistry,
    parser: Parser,
    inline: InlinePattern,
}

impl Compiler {
    pub fn new(namespace: &str, registry: TagRegistry) -> Result<Self> {
        let parser = build_parser(namespace, &registry)?;
        Ok(Self {
            namespace: namespace.to_string(),
            inline: InlinePattern::new(namespace)?,
            registry,
            parser,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    /// Adds or replaces a tag. The parser is rebuilt so a new self-closing
    /// tag is accepted without a closing tag.
    pub fn register(&mut self, spec: TagSpec) -> Result<Option<TagSpec>> {
        let previous = self.registry.register(spec);
        self.parser = build_parser(&self.namespace, &self.registry)?;
        Ok(previous)
    }

    /// Compiles `source`; `file` is used in diagnostics only.
    pub fn compile(&self, file: &Path, source: &str) -> Result<Program> {
        let doc = self
            .parser
            .parse::<Instruction>(source)
            .map_err(|e| parse_error(file, e))?;
        let mut ctx = CompileContext {
            compiler: self,
            file,
            doc,
            chains: HashMap::new(),
        };
        let root = ctx.doc.root();
        ctx.dispatch(root)?;
        ctx.body(root)
    }
}

fn build_parser(namespace: &str, registry: &TagRegistry) -> Result<Parser> {
    Parser::new(
        ParseOptions::new()
            .namespace(namespace)
            .self_closing(registry.self_closing_names()),
    )
    .map_err(|e| Error::Config(e.to_string()))
}

fn parse_error(file: &Path, err: ParseError) -> Error {
    let message = match &err {
        ParseError::Malformed { snippet, .. } => format!("malformed tag `{}`", snippet),
        ParseError::Unclosed { tag, .. } => format!("<{}> is never closed", tag),
        ParseError::InvalidNamespace(_) => err.to_string(),
    };
    Error::Parse {
        file: file.to_path_buf(),
        line: err.line().unwrap_or(1),
        message,
    }
}

/// State of one compilation, handed to tag handlers.
pub struct CompileContext<'c> {
    compiler: &'c Compiler,
    file: &'c Path,
    doc: Document<Instruction>,
    chains: HashMap<NodeId, Vec<NodeId>>,
}

impl<'c> CompileContext<'c> {
    /// The template being compiled.
    pub fn file(&self) -> &Path {
        self.file
    }

    pub fn namespace(&self) -> &str {
        &self.compiler.namespace
    }

    pub fn line(&self, id: NodeId) -> usize {
        self.doc.line(id)
    }

    /// The tag call for the element at `id`.
    pub fn tag_call(&self, id: NodeId) -> Result<TagCall> {
        let element = self.doc.element(id).ok_or_else(|| Error::Parse {
            file: self.file.to_path_buf(),
            line: self.doc.line(id),
            message: "expected an element".to_string(),
        })?;
        Ok(TagCall {
            name: element.qualified_name(),
            attributes: element.attributes.clone(),
            file: self.file.to_path_buf(),
            line: self.doc.line(id),
        })
    }

    /// Takes the `elseif` / `else` continuations chained to `id`.
    pub fn take_chain(&mut self, id: NodeId) -> Vec<NodeId> {
        self.chains.remove(&id).unwrap_or_default()
    }

    /// Whether the next sibling that is not blank text is a namespaced element
    /// with one of the given local names.
    pub fn is_followed_by(&self, id: NodeId, names: &[&str]) -> bool {
        let mut next = self.doc.next_sibling(id);
        while let Some(sibling) = next {
            if !self.doc.is_blank_text(sibling) {
                return self
                    .structural_name(sibling)
                    .is_some_and(|name| names.contains(&name));
            }
            next = self.doc.next_sibling(sibling);
        }
        false
    }

    /// Source text between the element's opening and closing tags.
    pub fn inner_source(&self, id: NodeId) -> String {
        self.doc.inner_source_text(id)
    }

    fn structural_name(&self, id: NodeId) -> Option<&str> {
        self.doc
            .element(id)
            .filter(|el| el.in_namespace(&self.compiler.namespace))
            .map(|el| el.name.as_str())
    }

    fn is_else_compatible(&self, id: NodeId) -> bool {
        self.structural_name(id)
            .and_then(|name| self.compiler.registry.get(name))
            .is_some_and(|spec| spec.else_compatible)
    }

    /// Compiles every namespaced element below `parent`.
    fn dispatch(&mut self, parent: NodeId) -> Result<()> {
        self.chain_continuations(parent);
        for child in self.doc.children(parent).to_vec() {
            if self.structural_name(child).is_some() {
                self.dispatch_element(child)?;
            } else if self.doc.element(child).is_some() {
                self.dispatch(child)?;
            }
        }
        Ok(())
    }

    fn dispatch_element(&mut self, id: NodeId) -> Result<()> {
        let call = self.tag_call(id)?;
        let spec = *self
            .compiler
            .registry
            .get(call.local_name())
            .ok_or_else(|| Error::UnknownTag {
                tag: call.name.clone(),
                file: call.file.clone(),
                line: call.line,
            })?;

        if !spec.raw_body {
            self.dispatch(id)?;
            let chain = self.chains.get(&id).cloned().unwrap_or_default();
            for continuation in chain {
                self.dispatch(continuation)?;
            }
        }

        let instruction = (spec.compile)(self, id, &call)?;
        let replacement = self.doc.create(Node::Embedded(instruction), call.line);
        self.doc
            .replace(id, replacement)
            .map_err(|e| call.error(e.to_string()))
    }

    /// Moves continuations out of `parent`'s child list into their head's
    /// chain.
    fn chain_continuations(&mut self, parent: NodeId) {
        let children = self.doc.children(parent).to_vec();
        let mut i = 0;
        while i < children.len() {
            let head = children[i];
            i += 1;
            if !self.is_else_compatible(head) || !self.is_followed_by(head, CONTINUATIONS) {
                continue;
            }

            let mut chain = Vec::new();
            let mut blanks = Vec::new();
            while i < children.len() {
                let next = children[i];
                if self.doc.is_blank_text(next) {
                    blanks.push(next);
                    i += 1;
                    continue;
                }
                let Some(name) = self.structural_name(next).filter(|n| CONTINUATIONS.contains(n))
                else {
                    break;
                };
                let is_else = name == "else";
                for blank in blanks.drain(..) {
                    self.doc.detach(blank);
                }
                self.doc.detach(next);
                chain.push(next);
                i += 1;
                if is_else {
                    break;
                }
            }
            // Blank text after the chain stays in place.
            i -= blanks.len();
            self.chains.insert(head, chain);
        }
    }
}
