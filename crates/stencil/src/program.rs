//! Render programs.
//!
//! A [`Program`] is the compiled, cacheable form of a template: a flat list of
//! [`Instruction`]s whose nested blocks are programs themselves. Programs are
//! plain data. They serialize to JSON for the cache and are interpreted by
//! [`Renderer`](crate::Renderer); nothing is ever generated as source text.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::selector::{Condition, Selector};

/// Output escaping for interpolated values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Escape {
    #[default]
    None,
    Html,
}

/// One step of a render program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    /// Verbatim output.
    Literal { text: String },

    /// Runs `then` when the condition holds, else `otherwise`. An `elseif` is
    /// an `If` as the only instruction of `otherwise`.
    If {
        condition: Condition,
        then: Program,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        otherwise: Option<Program>,
    },

    /// Runs `body` once per item (or per group of `group_size` items) with
    /// `binding` and `counter` in scope; runs `empty` when there is nothing to
    /// iterate.
    ForEach {
        collection: Selector,
        binding: String,
        counter: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group_size: Option<usize>,
        body: Program,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        empty: Option<Program>,
    },

    /// Resolves a selector and appends its text form.
    Interpolate {
        selector: Selector,
        #[serde(default)]
        escape: Escape,
    },

    /// Renders another template against the same pool. The path is resolved
    /// relative to the including template's directory.
    Include { path: String },

    /// A tag-specific instruction executed by the tag's runtime hook.
    Raw {
        tag: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        args: IndexMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Program>,
    },
}

impl Instruction {
    pub fn literal(text: impl Into<String>) -> Self {
        Instruction::Literal { text: text.into() }
    }
}

/// A sequence of instructions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an instruction, merging it into a trailing literal when both
    /// are literals. Empty literals are dropped.
    pub fn push(&mut self, instruction: Instruction) {
        if let Instruction::Literal { text } = &instruction {
            if text.is_empty() {
                return;
            }
            if let Some(Instruction::Literal { text: last }) = self.instructions.last_mut() {
                last.push_str(text);
                return;
            }
        }
        self.instructions.push(instruction);
    }

    pub fn push_literal(&mut self, text: &str) {
        self.push(Instruction::literal(text));
    }

    /// Appends every instruction of `other`.
    pub fn extend(&mut self, other: Program) {
        for instruction in other.instructions {
            self.push(instruction);
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The program's text when it consists of literals only.
    pub fn as_literal(&self) -> Option<&str> {
        match self.instructions.as_slice() {
            [] => Some(""),
            [Instruction::Literal { text }] => Some(text),
            _ => None,
        }
    }

    /// Paths of every `Include`, nested blocks included.
    pub fn includes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_includes(&mut out);
        out
    }

    fn collect_includes<'a>(&'a self, out: &mut Vec<&'a str>) {
        for instruction in &self.instructions {
            match instruction {
                Instruction::Include { path } => out.push(path),
                Instruction::If {
                    then, otherwise, ..
                } => {
                    then.collect_includes(out);
                    if let Some(p) = otherwise {
                        p.collect_includes(out);
                    }
                }
                Instruction::ForEach { body, empty, .. } => {
                    body.collect_includes(out);
                    if let Some(p) = empty {
                        p.collect_includes(out);
                    }
                }
                Instruction::Raw { body: Some(p), .. } => p.collect_includes(out),
                _ => {}
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl FromIterator<Instruction> for Program {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        let mut program = Program::new();
        for instruction in iter {
            program.push(instruction);
        }
        program
    }
}
