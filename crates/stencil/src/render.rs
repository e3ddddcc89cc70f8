//! Program execution.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::trace;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::program::{Escape, Instruction, Program};
use crate::resolve::{Resolver, Scope};
use crate::selector::Selector;
use crate::value::{DataPool, Value};

/// Escapes `& < > " '` for HTML text and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Runs programs against one data pool.
///
/// Tag runtime hooks receive the renderer to resolve selectors and render
/// nested bodies.
pub struct Renderer<'a> {
    engine: &'a Engine,
    scope: Scope<'a>,
    template: PathBuf,
    depth: usize,
}

impl<'a> Renderer<'a> {
    /// `template` is the file being rendered; includes resolve against its
    /// directory.
    pub fn new(engine: &'a Engine, pool: &'a DataPool, template: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            scope: Scope::new(pool),
            template: template.into(),
            depth: 0,
        }
    }

    /// The template currently being rendered.
    pub fn template(&self) -> &Path {
        &self.template
    }

    /// Resolves a selector in the current scope.
    pub fn resolve(&self, selector: &Selector) -> Result<Value> {
        Resolver::new(&self.engine.config().getter_prefixes).resolve(
            &self.scope,
            selector,
            &self.template,
        )
    }

    /// An [`Error::Runtime`] for `tag` in the current template.
    pub fn runtime_error(&self, tag: &str, message: impl Into<String>) -> Error {
        Error::Runtime {
            tag: tag.to_string(),
            message: message.into(),
            template: self.template.clone(),
        }
    }

    pub fn render_to_string(&mut self, program: &Program) -> Result<String> {
        let mut out = String::new();
        self.render(program, &mut out)?;
        Ok(out)
    }

    /// Appends the output of `program` to `out`.
    pub fn render(&mut self, program: &Program, out: &mut String) -> Result<()> {
        for instruction in program.instructions() {
            self.run(instruction, out)?;
        }
        Ok(())
    }

    fn run(&mut self, instruction: &Instruction, out: &mut String) -> Result<()> {
        match instruction {
            Instruction::Literal { text } => out.push_str(text),
            Instruction::If {
                condition,
                then,
                otherwise,
            } => {
                let resolver = Resolver::new(&self.engine.config().getter_prefixes);
                if resolver.test(&self.scope, condition, &self.template)? {
                    self.render(then, out)?;
                } else if let Some(otherwise) = otherwise {
                    self.render(otherwise, out)?;
                }
            }
            Instruction::ForEach {
                collection,
                binding,
                counter,
                group_size,
                body,
                empty,
            } => {
                let items = self.iterable(collection)?;
                if items.is_empty() {
                    if let Some(empty) = empty {
                        self.render(empty, out)?;
                    }
                    return Ok(());
                }
                let groups: Vec<Value> = match group_size {
                    Some(n) => items.chunks((*n).max(1)).map(|c| Value::Seq(c.to_vec())).collect(),
                    None => items,
                };
                for (index, item) in groups.into_iter().enumerate() {
                    self.scope.push(binding.as_str(), item);
                    self.scope.push(counter.as_str(), Value::from(index));
                    let result = self.render(body, out);
                    self.scope.pop();
                    self.scope.pop();
                    result?;
                }
            }
            Instruction::Interpolate { selector, escape } => {
                let value = self.resolve(selector)?;
                let text = value.to_text().ok_or_else(|| Error::SelectorResolution {
                    selector: selector.to_string(),
                    segment: selector.segments().last().map(|s| s.name.clone()).unwrap_or_default(),
                    reason: format!("a {} cannot be printed", value.kind()),
                    template: self.template.clone(),
                })?;
                match escape {
                    Escape::None => out.push_str(&text),
                    Escape::Html => out.push_str(&escape_html(&text)),
                }
            }
            Instruction::Include { path } => self.include(path, out)?,
            Instruction::Raw { tag, args, body } => {
                let hook = self
                    .engine
                    .tags()
                    .get(tag)
                    .and_then(|spec| spec.runtime)
                    .ok_or_else(|| self.runtime_error(tag, "no runtime hook is registered"))?;
                let text = hook(self, args, body.as_ref())?;
                out.push_str(&text);
            }
        }
        Ok(())
    }

    fn iterable(&self, collection: &Selector) -> Result<Vec<Value>> {
        match self.resolve(collection)? {
            Value::Null => Ok(Vec::new()),
            Value::Seq(items) => Ok(items),
            Value::Map(map) => Ok(map.into_values().collect()),
            other => Err(Error::SelectorResolution {
                selector: collection.to_string(),
                segment: collection
                    .segments()
                    .last()
                    .map(|s| s.name.clone())
                    .unwrap_or_default(),
                reason: format!("a {} cannot be iterated", other.kind()),
                template: self.template.clone(),
            }),
        }
    }

    fn include(&mut self, path: &str, out: &mut String) -> Result<()> {
        let limit = self.engine.config().max_include_depth;
        if self.depth >= limit {
            return Err(Error::IncludeDepth {
                template: self.template.clone(),
                limit,
            });
        }
        let target = self.engine.resolve_include(&self.template, path);
        trace!(from = %self.template.display(), include = %target.display(), "including template");
        let program: Arc<Program> = self.engine.compile_file(&target)?;

        let outer = std::mem::replace(&mut self.template, target);
        self.depth += 1;
        let result = self.render(&program, out);
        self.depth -= 1;
        self.template = outer;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }
}
