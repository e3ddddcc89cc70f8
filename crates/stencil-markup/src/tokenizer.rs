//! Regex-driven tokenizer.
//!
//! A single alternation recognizes comments, CDATA sections, doctypes and
//! tags. Everything between two matches is emitted verbatim as text, so
//! concatenating the raw text of all tokens reproduces the input exactly.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ParseError;
use crate::tree::OpenKind;

/// Identifier grammar shared by namespaces and tag names.
const IDENT: &str = r"[A-Za-z_][A-Za-z0-9_-]*";

/// Tag-name grammar when no namespace restriction applies.
const ANY_NAME: &str = r"[A-Za-z][A-Za-z0-9_:-]*";

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:][A-Za-z0-9_:.-]*)(?:\s*=\s*"([^"]*)")?"#).expect("attribute regex")
});

static NAMESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^{}$", IDENT)).expect("namespace regex"));

fn build_pattern(name: &str) -> Result<Regex, regex::Error> {
    let pattern = format!(
        r#"(?s)(?P<comment><!--.*?-->)|(?P<cdata><!\[CDATA\[.*?\]\]>)|(?P<doctype>(?i:<!DOCTYPE)[^>]*>)|<(?P<close>/)?(?P<name>{name})(?P<attrs>(?:\s+[A-Za-z_:][A-Za-z0-9_:.-]*(?:\s*=\s*"[^"]*")?)*)\s*(?P<selfclose>/)?>"#
    );
    Regex::new(&pattern)
}

/// A tag token: opening, closing or self-closing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagToken<'a> {
    pub raw: &'a str,
    pub name: &'a str,
    pub attrs: &'a str,
    pub kind: OpenKind,
}

/// Token kinds produced by [`Tokenizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Text(&'a str),
    Comment(&'a str),
    CData(&'a str),
    DocType(&'a str),
    Tag(TagToken<'a>),
}

impl<'a> Token<'a> {
    /// The exact source text of the token.
    pub fn raw(&self) -> &'a str {
        match self {
            Token::Text(s) | Token::Comment(s) | Token::CData(s) | Token::DocType(s) => s,
            Token::Tag(tag) => tag.raw,
        }
    }
}

/// Compiled scanning pattern for one namespace setting.
#[derive(Debug, Clone)]
pub struct Scanner {
    pattern: Regex,
    namespace: Option<String>,
}

impl Scanner {
    /// Builds a scanner. With a namespace, only `prefix:identifier` tags are
    /// recognized and all other markup is text.
    pub fn new(namespace: Option<&str>) -> Result<Self, ParseError> {
        match namespace {
            None => Ok(Self {
                pattern: build_pattern(ANY_NAME)
                    .map_err(|_| ParseError::InvalidNamespace(String::new()))?,
                namespace: None,
            }),
            Some(ns) => {
                if !NAMESPACE.is_match(ns) {
                    return Err(ParseError::InvalidNamespace(ns.to_string()));
                }
                let name = format!("{}:{}", regex::escape(ns), IDENT);
                Ok(Self {
                    pattern: build_pattern(&name)
                        .map_err(|_| ParseError::InvalidNamespace(ns.to_string()))?,
                    namespace: Some(ns.to_string()),
                })
            }
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Tokenizes `input`, pairing every token with its 1-based start line.
    pub fn tokenize<'a>(&'a self, input: &'a str) -> Tokenizer<'a> {
        Tokenizer {
            scanner: self,
            input,
            pos: 0,
            line: 1,
            pending: None,
        }
    }
}

/// Iterator over `(line, token)` pairs.
pub struct Tokenizer<'a> {
    scanner: &'a Scanner,
    input: &'a str,
    pos: usize,
    line: usize,
    pending: Option<(usize, usize, Token<'a>)>,
}

impl<'a> Tokenizer<'a> {
    fn emit(&mut self, end: usize, token: Token<'a>) -> (usize, Token<'a>) {
        let line = self.line;
        self.line += self.input[self.pos..end].matches('\n').count();
        self.pos = end;
        (line, token)
    }

    fn classify(&self, caps: &regex::Captures<'a>) -> Token<'a> {
        if let Some(m) = caps.name("comment") {
            return Token::Comment(m.as_str());
        }
        if let Some(m) = caps.name("cdata") {
            return Token::CData(m.as_str());
        }
        if let Some(m) = caps.name("doctype") {
            return Token::DocType(m.as_str());
        }
        let kind = if caps.name("close").is_some() {
            OpenKind::Close
        } else if caps.name("selfclose").is_some() {
            OpenKind::SelfClosing
        } else {
            OpenKind::Open
        };
        Token::Tag(TagToken {
            raw: caps.get(0).map_or("", |m| m.as_str()),
            name: caps.name("name").map_or("", |m| m.as_str()),
            attrs: caps.name("attrs").map_or("", |m| m.as_str()),
            kind,
        })
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = (usize, Token<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((_, end, token)) = self.pending.take() {
            return Some(self.emit(end, token));
        }
        if self.pos >= self.input.len() {
            return None;
        }

        let rest = &self.input[self.pos..];
        match self.scanner.pattern.captures(rest) {
            Some(caps) => {
                let whole = caps.get(0)?;
                let start = self.pos + whole.start();
                let end = self.pos + whole.end();
                let token = self.classify(&caps);
                if start > self.pos {
                    // Text before the match goes first; the match waits.
                    self.pending = Some((start, end, token));
                    let text = &self.input[self.pos..start];
                    Some(self.emit(start, Token::Text(text)))
                } else {
                    Some(self.emit(end, token))
                }
            }
            None => {
                let end = self.input.len();
                Some(self.emit(end, Token::Text(rest)))
            }
        }
    }
}

/// Parses the attribute section of a tag into ordered name/value pairs.
/// Attributes without a value map to the empty string.
pub fn parse_attributes(src: &str) -> Vec<(String, String)> {
    ATTRIBUTE
        .captures_iter(src)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_string();
            let value = caps.get(2).map_or("", |m| m.as_str()).to_string();
            Some((name, value))
        })
        .collect()
}
