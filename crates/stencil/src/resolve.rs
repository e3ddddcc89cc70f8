//! Selector resolution against the data pool.
//!
//! Lookups go through a [`Scope`]: loop bindings pushed by the renderer are
//! searched newest first, then the caller's [`DataPool`]. A root key found in
//! neither is a [`Error::MissingDataKey`]; it never resolves to null.

use std::path::Path;

use crate::error::{Error, Result};
use crate::selector::{Arg, Condition, CmpOp, Operand, Segment, Selector};
use crate::value::{DataPool, Value};

/// The pool plus any block-scoped bindings.
#[derive(Debug)]
pub struct Scope<'a> {
    pool: &'a DataPool,
    bindings: Vec<(String, Value)>,
}

impl<'a> Scope<'a> {
    pub fn new(pool: &'a DataPool) -> Self {
        Self {
            pool,
            bindings: Vec::new(),
        }
    }

    /// Binds `name` until the matching [`pop`](Self::pop), shadowing any outer
    /// binding or pool entry with the same name.
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.push((name.into(), value));
    }

    /// Removes the most recent binding.
    pub fn pop(&mut self) {
        self.bindings.pop();
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
            .or_else(|| self.pool.get(name))
    }

    /// Number of active bindings.
    pub fn depth(&self) -> usize {
        self.bindings.len()
    }
}

/// Resolves selectors using the configured getter prefixes.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'c> {
    getter_prefixes: &'c [String],
}

impl<'c> Resolver<'c> {
    pub fn new(getter_prefixes: &'c [String]) -> Self {
        Self { getter_prefixes }
    }

    /// Resolves `selector` in `scope`. `template` names the template in
    /// diagnostics.
    pub fn resolve(&self, scope: &Scope<'_>, selector: &Selector, template: &Path) -> Result<Value> {
        let root = selector.root();
        let mut current = scope
            .get(root)
            .cloned()
            .ok_or_else(|| Error::MissingDataKey {
                key: root.to_string(),
                selector: selector.to_string(),
                template: template.to_path_buf(),
            })?;

        for segment in selector.segments().iter().skip(1) {
            current = self
                .step(scope, &current, segment, template)
                .map_err(|reason| match reason {
                    Step::Fail(reason) => Error::SelectorResolution {
                        selector: selector.to_string(),
                        segment: segment.name.clone(),
                        reason,
                        template: template.to_path_buf(),
                    },
                    Step::Nested(err) => err,
                })?;
        }
        Ok(current)
    }

    /// Evaluates a condition to a boolean.
    pub fn test(&self, scope: &Scope<'_>, condition: &Condition, template: &Path) -> Result<bool> {
        let left = self.operand(scope, &condition.left, template)?;
        let holds = match &condition.compare {
            None => left.is_truthy(),
            Some((op, right)) => {
                let right = self.operand(scope, right, template)?;
                let equal = left.loosely_equals(&right);
                match op {
                    CmpOp::Eq => equal,
                    CmpOp::Ne => !equal,
                }
            }
        };
        Ok(holds != condition.negate)
    }

    fn operand(&self, scope: &Scope<'_>, operand: &Operand, template: &Path) -> Result<Value> {
        match operand {
            Operand::Literal(s) => Ok(Value::String(s.clone())),
            Operand::Number(text) => Ok(match text.parse::<i64>() {
                Ok(n) => Value::Int(n),
                Err(_) => Value::Float(text.parse().unwrap_or(f64::NAN)),
            }),
            Operand::Selector(sel) => self.resolve(scope, sel, template),
        }
    }

    fn step(
        &self,
        scope: &Scope<'_>,
        current: &Value,
        segment: &Segment,
        template: &Path,
    ) -> std::result::Result<Value, Step> {
        match current {
            Value::Map(map) if segment.args.is_none() => map
                .get(&segment.name)
                .cloned()
                .ok_or_else(|| Step::Fail(format!("map has no key `{}`", segment.name))),
            Value::Seq(items) => {
                let index = segment.index().ok_or_else(|| {
                    Step::Fail(format!("`{}` is not a sequence index", segment.name))
                })?;
                items.get(index).cloned().ok_or_else(|| {
                    Step::Fail(format!(
                        "index {} out of range for a sequence of {}",
                        index,
                        items.len()
                    ))
                })
            }
            Value::Object(obj) => match &segment.args {
                None => {
                    if let Some(value) = obj.field(&segment.name) {
                        return Ok(value);
                    }
                    let capitalized = capitalize(&segment.name);
                    for prefix in self.getter_prefixes {
                        let method = format!("{}{}", prefix, capitalized);
                        if let Some(result) = obj.call(&method, &[]) {
                            return result.map_err(Step::Fail);
                        }
                    }
                    Err(Step::Fail(format!(
                        "{} has no field or getter `{}`",
                        obj.type_name(),
                        segment.name
                    )))
                }
                Some(args) => {
                    let args = args
                        .iter()
                        .map(|arg| match arg {
                            Arg::Literal(s) => Ok(Value::String(s.clone())),
                            Arg::Selector(sel) => self.resolve(scope, sel, template),
                        })
                        .collect::<Result<Vec<_>>>()
                        .map_err(Step::Nested)?;
                    match obj.call(&segment.name, &args) {
                        Some(result) => result.map_err(Step::Fail),
                        None => Err(Step::Fail(format!(
                            "{} has no method `{}`",
                            obj.type_name(),
                            segment.name
                        ))),
                    }
                }
            },
            other => Err(Step::Fail(format!(
                "cannot look up `{}` in a {}",
                segment.name,
                other.kind()
            ))),
        }
    }
}

enum Step {
    Fail(String),
    Nested(Error),
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
