//! Selector and condition syntax.
//!
//! A selector is a dotted path into the data pool:
//!
//! | Form | Meaning |
//! |------|---------|
//! | `user` | pool entry `user` |
//! | `user.address.city` | nested map keys, object fields or getters |
//! | `items.0` | sequence index |
//! | `user.greet('hi', other.name)` | method call with literal and selector arguments |
//!
//! Conditions (used by `if` / `elseif`) are a selector, optionally negated
//! with `!`, optionally compared with `==` / `!=` against a quoted literal, a
//! number or another selector.
//!
//! Attribute values may wrap either form in the legacy `${...}` or `{...}`
//! delimiters; [`strip_legacy`] removes them.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Syntax error in a selector or condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SyntaxError(String);

impl SyntaxError {
    fn at(src: &str, pos: usize, what: &str) -> Self {
        SyntaxError(format!("{} at offset {} in `{}`", what, pos, src))
    }
}

/// Removes legacy `${...}` / `{...}` wrappers from an attribute value.
pub fn strip_legacy(value: &str) -> &str {
    let trimmed = value.trim();
    let inner = trimmed
        .strip_prefix("${")
        .or_else(|| trimmed.strip_prefix('{'))
        .and_then(|rest| rest.strip_suffix('}'));
    match inner {
        Some(inner) if !inner.contains(['{', '}']) => inner.trim(),
        _ => trimmed,
    }
}

/// A parsed selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    source: String,
    segments: Vec<Segment>,
}

/// One step of a selector path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub name: String,
    /// `Some` when the segment was written as a call, even with no arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Arg>>,
}

impl Segment {
    /// Non-negative integer segments index sequences.
    pub fn index(&self) -> Option<usize> {
        if self.args.is_some() {
            return None;
        }
        self.name.parse().ok()
    }
}

/// A method-call argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arg {
    Literal(String),
    Selector(Selector),
}

impl Selector {
    /// Parses a selector, accepting legacy wrappers.
    pub fn parse(src: &str) -> Result<Self, SyntaxError> {
        let src = strip_legacy(src);
        let mut cursor = Cursor::new(src);
        let selector = cursor.selector()?;
        cursor.skip_ws();
        if !cursor.at_end() {
            return Err(SyntaxError::at(src, cursor.pos, "unexpected input"));
        }
        Ok(selector)
    }

    /// The pool key the selector starts from.
    pub fn root(&self) -> &str {
        self.segments.first().map_or("", |s| s.name.as_str())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The selector as written (without legacy wrappers).
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Comparison operators in conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
}

/// Either side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Literal(String),
    /// A numeric literal as written; compares numerically.
    Number(String),
    Selector(Selector),
}

/// A parsed condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub negate: bool,
    pub left: Operand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare: Option<(CmpOp, Operand)>,
}

impl Condition {
    pub fn parse(src: &str) -> Result<Self, SyntaxError> {
        let src = strip_legacy(src);
        let mut cursor = Cursor::new(src);
        cursor.skip_ws();
        let negate = cursor.eat('!');
        let left = cursor.operand()?;
        cursor.skip_ws();
        let compare = if cursor.eat_str("==") {
            Some((CmpOp::Eq, cursor.operand()?))
        } else if cursor.eat_str("!=") {
            Some((CmpOp::Ne, cursor.operand()?))
        } else {
            None
        };
        cursor.skip_ws();
        if !cursor.at_end() {
            return Err(SyntaxError::at(src, cursor.pos, "unexpected input"));
        }
        Ok(Self {
            negate,
            left,
            compare,
        })
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.src[self.pos..].starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek().filter(|c| c.is_whitespace()) {
            self.pos += c.len_utf8();
        }
    }

    fn is_name_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_' || c == '-'
    }

    fn selector(&mut self) -> Result<Selector, SyntaxError> {
        self.skip_ws();
        let start = self.pos;
        let root = self.segment()?;
        if root.args.is_some() {
            return Err(SyntaxError::at(self.src, start, "the first segment cannot be a call"));
        }
        let mut segments = vec![root];
        while self.eat('.') {
            segments.push(self.segment()?);
        }
        Ok(Selector {
            source: self.src[start..self.pos].to_string(),
            segments,
        })
    }

    fn segment(&mut self) -> Result<Segment, SyntaxError> {
        let start = self.pos;
        while self.peek().is_some_and(Self::is_name_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(SyntaxError::at(self.src, self.pos, "expected a name"));
        }
        let name = self.src[start..self.pos].to_string();
        let args = if self.eat('(') {
            Some(self.args()?)
        } else {
            None
        };
        Ok(Segment { name, args })
    }

    fn args(&mut self) -> Result<Vec<Arg>, SyntaxError> {
        let mut args = Vec::new();
        self.skip_ws();
        if self.eat(')') {
            return Ok(args);
        }
        loop {
            self.skip_ws();
            let arg = match self.peek() {
                Some('\'') | Some('"') => Arg::Literal(self.quoted()?),
                Some(c) if c.is_ascii_digit() || c == '-' => Arg::Literal(self.number()?),
                _ => Arg::Selector(self.selector()?),
            };
            args.push(arg);
            self.skip_ws();
            if self.eat(')') {
                return Ok(args);
            }
            if !self.eat(',') {
                return Err(SyntaxError::at(self.src, self.pos, "expected `,` or `)`"));
            }
        }
    }

    fn operand(&mut self) -> Result<Operand, SyntaxError> {
        self.skip_ws();
        if self.eat_str("${") || self.eat('{') {
            let selector = self.selector()?;
            self.skip_ws();
            if !self.eat('}') {
                return Err(SyntaxError::at(self.src, self.pos, "expected `}`"));
            }
            return Ok(Operand::Selector(selector));
        }
        match self.peek() {
            Some('\'') | Some('"') => Ok(Operand::Literal(self.quoted()?)),
            Some(c) if c.is_ascii_digit() || c == '-' => Ok(Operand::Number(self.number()?)),
            _ => Ok(Operand::Selector(self.selector()?)),
        }
    }

    fn quoted(&mut self) -> Result<String, SyntaxError> {
        let start = self.pos;
        let quote = self.peek().unwrap_or('\'');
        self.pos += 1;
        let body_start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                let body = self.src[body_start..self.pos].to_string();
                self.pos += 1;
                return Ok(body);
            }
            self.pos += c.len_utf8();
        }
        Err(SyntaxError::at(self.src, start, "unterminated string"))
    }

    fn number(&mut self) -> Result<String, SyntaxError> {
        let start = self.pos;
        self.eat('-');
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let text = &self.src[start..self.pos];
        if text.parse::<f64>().is_err() {
            return Err(SyntaxError::at(self.src, start, "invalid number"));
        }
        Ok(text.to_string())
    }
}
