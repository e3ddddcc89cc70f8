//! Tag descriptors and the tag registry.
//!
//! A tag is described by a [`TagSpec`]: a name, parser hints and plain
//! function pointers for its compile step, its optional inline form
//! (`{tpl:var name='x'}`) and its optional runtime hook for
//! [`Instruction::Raw`]. The first-party tags live in [`builtin`] and are
//! installed by [`TagRegistry::with_defaults`].

pub mod builtin;

use std::collections::HashMap;
use std::path::PathBuf;

use indexmap::IndexMap;
use stencil_markup::NodeId;

use crate::compile::CompileContext;
use crate::error::{Error, Result};
use crate::program::{Instruction, Program};
use crate::render::Renderer;
use crate::selector::{Condition, Selector};

/// Compiles an element (whose children are already compiled) into one
/// instruction.
pub type CompileFn = fn(&mut CompileContext<'_>, NodeId, &TagCall) -> Result<Instruction>;

/// Compiles the inline form of a tag.
pub type InlineFn = fn(&CompileContext<'_>, &TagCall) -> Result<Instruction>;

/// Executes an [`Instruction::Raw`] produced by the tag.
pub type RuntimeFn =
    fn(&mut Renderer<'_>, &IndexMap<String, String>, Option<&Program>) -> Result<String>;

/// Descriptor for one tag.
#[derive(Debug, Clone, Copy)]
pub struct TagSpec {
    /// Local name (`if` for `<tpl:if>`).
    pub name: &'static str,
    /// Parsed without a closing tag.
    pub self_closing: bool,
    /// May be followed by `elseif` / `else` continuations.
    pub else_compatible: bool,
    /// Children are left uncompiled; the handler reads the raw body source.
    pub raw_body: bool,
    pub compile: CompileFn,
    pub inline: Option<InlineFn>,
    pub runtime: Option<RuntimeFn>,
}

impl TagSpec {
    /// A block tag with only a compile step.
    pub const fn block(name: &'static str, compile: CompileFn) -> Self {
        Self {
            name,
            self_closing: false,
            else_compatible: false,
            raw_body: false,
            compile,
            inline: None,
            runtime: None,
        }
    }

    pub const fn self_closing(mut self) -> Self {
        self.self_closing = true;
        self
    }

    pub const fn else_compatible(mut self) -> Self {
        self.else_compatible = true;
        self
    }

    pub const fn raw_body(mut self) -> Self {
        self.raw_body = true;
        self
    }

    pub const fn with_inline(mut self, inline: InlineFn) -> Self {
        self.inline = Some(inline);
        self
    }

    pub const fn with_runtime(mut self, runtime: RuntimeFn) -> Self {
        self.runtime = Some(runtime);
        self
    }
}

/// A tag occurrence as seen by its handler: qualified name, attributes (or
/// inline arguments) and location.
#[derive(Debug, Clone)]
pub struct TagCall {
    pub name: String,
    pub attributes: IndexMap<String, String>,
    pub file: PathBuf,
    pub line: usize,
}

impl TagCall {
    /// The name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    /// An attribute that must be present.
    pub fn require(&self, attribute: &str) -> Result<&str> {
        self.attributes
            .get(attribute)
            .map(String::as_str)
            .ok_or_else(|| Error::MissingAttribute {
                attribute: attribute.to_string(),
                tag: self.name.clone(),
                file: self.file.clone(),
                line: self.line,
            })
    }

    pub fn optional(&self, attribute: &str) -> Option<&str> {
        self.attributes.get(attribute).map(String::as_str)
    }

    /// A required selector-valued attribute.
    pub fn selector(&self, attribute: &str) -> Result<Selector> {
        let src = self.require(attribute)?;
        Selector::parse(src).map_err(|e| self.invalid(attribute, e.to_string()))
    }

    /// A required condition-valued attribute.
    pub fn condition(&self, attribute: &str) -> Result<Condition> {
        let src = self.require(attribute)?;
        Condition::parse(src).map_err(|e| self.invalid(attribute, e.to_string()))
    }

    /// An [`Error::InvalidAttribute`] for this tag.
    pub fn invalid(&self, attribute: &str, reason: impl Into<String>) -> Error {
        Error::InvalidAttribute {
            attribute: attribute.to_string(),
            tag: self.name.clone(),
            reason: reason.into(),
            file: self.file.clone(),
            line: self.line,
        }
    }

    /// An [`Error::Parse`] at this tag's line.
    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            file: self.file.clone(),
            line: self.line,
            message: message.into(),
        }
    }
}

/// Tag specs by local name.
#[derive(Clone, Default)]
pub struct TagRegistry {
    tags: HashMap<&'static str, TagSpec>,
}

impl TagRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the first-party tags.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for spec in builtin::TAGS {
            registry.register(*spec);
        }
        registry
    }

    /// Adds a tag, returning the spec it replaced.
    pub fn register(&mut self, spec: TagSpec) -> Option<TagSpec> {
        self.tags.insert(spec.name, spec)
    }

    pub fn get(&self, name: &str) -> Option<&TagSpec> {
        self.tags.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// Names of tags the parser must treat as self-closing.
    pub fn self_closing_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tags
            .values()
            .filter(|spec| spec.self_closing)
            .map(|spec| spec.name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tags.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl std::fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("TagRegistry").field("tags", &names).finish()
    }
}
