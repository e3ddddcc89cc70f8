//! Tree builder on top of the tokenizer.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::error::ParseError;
use crate::tokenizer::{parse_attributes, Scanner, TagToken, Token};
use crate::tree::{Document, Element, Node, NodeId, OpenKind};

/// HTML elements that never have content, with or without a trailing `/>`.
pub const VOID_ELEMENTS: &[&str] = &["br", "hr", "img", "input", "link", "meta"];

/// Parser configuration.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Restrict structural tags to `prefix:identifier`.
    pub namespace: Option<String>,
    /// Extra tag names treated as self-closing. With a namespace these are
    /// local names (`var` for `<tpl:var>`); without one, full tag names.
    pub self_closing: HashSet<String>,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn self_closing<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.self_closing.extend(names.into_iter().map(Into::into));
        self
    }
}

/// A reusable parser holding the compiled scanning pattern.
#[derive(Debug, Clone)]
pub struct Parser {
    scanner: Scanner,
    self_closing: HashSet<String>,
}

impl Parser {
    pub fn new(options: ParseOptions) -> Result<Self, ParseError> {
        Ok(Self {
            scanner: Scanner::new(options.namespace.as_deref())?,
            self_closing: options.self_closing,
        })
    }

    pub fn namespace(&self) -> Option<&str> {
        self.scanner.namespace()
    }

    /// Parses `input` into a fresh document.
    pub fn parse<E>(&self, input: &str) -> Result<Document<E>, ParseError> {
        let mut builder = Builder::new(self);
        for (line, token) in self.scanner.tokenize(input) {
            builder.push(line, token)?;
        }
        builder.finish()
    }

    fn is_self_closing(&self, tag: &TagToken<'_>, local_name: &str) -> bool {
        if tag.kind == OpenKind::SelfClosing {
            return true;
        }
        match self.scanner.namespace() {
            Some(_) => self.self_closing.contains(local_name),
            None => {
                let lower = tag.name.to_ascii_lowercase();
                VOID_ELEMENTS.contains(&lower.as_str()) || self.self_closing.contains(tag.name)
            }
        }
    }

    fn split_name<'n>(&self, name: &'n str) -> (Option<String>, &'n str) {
        match self.scanner.namespace() {
            Some(ns) => {
                let local = name
                    .strip_prefix(ns)
                    .and_then(|rest| rest.strip_prefix(':'))
                    .unwrap_or(name);
                (Some(ns.to_string()), local)
            }
            None => match name.split_once(':') {
                Some((ns, local)) => (Some(ns.to_string()), local),
                None => (None, name),
            },
        }
    }
}

struct Builder<'p, E> {
    parser: &'p Parser,
    doc: Document<E>,
    open: Vec<NodeId>,
}

impl<'p, E> Builder<'p, E> {
    fn new(parser: &'p Parser) -> Self {
        Self {
            parser,
            doc: Document::new(),
            open: Vec::new(),
        }
    }

    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or_else(|| self.doc.root())
    }

    fn push(&mut self, line: usize, token: Token<'_>) -> Result<(), ParseError> {
        match token {
            Token::Text(text) => {
                self.check_malformed(line, text)?;
                self.push_text(line, text);
            }
            Token::Comment(s) => self.push_leaf(line, Node::Comment(s.to_string())),
            Token::CData(s) => self.push_leaf(line, Node::CData(s.to_string())),
            Token::DocType(s) => self.push_leaf(line, Node::DocType(s.to_string())),
            Token::Tag(tag) if tag.kind == OpenKind::Close => self.close(line, &tag),
            Token::Tag(tag) => self.open_element(line, &tag),
        }
        Ok(())
    }

    /// With a namespace, any leftover `<ns:` in text means the tag grammar
    /// rejected something the author meant as a tag.
    fn check_malformed(&self, line: usize, text: &str) -> Result<(), ParseError> {
        let Some(ns) = self.parser.namespace() else {
            return Ok(());
        };
        let open = format!("<{}:", ns);
        let close = format!("</{}:", ns);
        let hit = [text.find(&open), text.find(&close)]
            .into_iter()
            .flatten()
            .min();
        if let Some(offset) = hit {
            let snippet: String = text[offset..]
                .chars()
                .take_while(|&c| c != '\n')
                .take(60)
                .collect();
            return Err(ParseError::Malformed {
                line: line + text[..offset].matches('\n').count(),
                snippet,
            });
        }
        Ok(())
    }

    fn push_text(&mut self, line: usize, text: &str) {
        let parent = self.current();
        if let Some(&last) = self.doc.children(parent).last() {
            if let Node::Text(existing) = self.doc.node_mut(last) {
                existing.push_str(text);
                return;
            }
        }
        self.push_leaf(line, Node::Text(text.to_string()));
    }

    fn push_leaf(&mut self, line: usize, node: Node<E>) {
        let parent = self.current();
        let id = self.doc.create(node, line);
        // The current node is always a container: only open elements are pushed.
        let _ = self.doc.append(parent, id);
    }

    fn open_element(&mut self, line: usize, tag: &TagToken<'_>) {
        let (namespace, local) = self.parser.split_name(tag.name);
        let self_closing = self.parser.is_self_closing(tag, local);
        let attributes: IndexMap<String, String> = parse_attributes(tag.attrs).into_iter().collect();
        let element = Element {
            namespace,
            name: local.to_string(),
            attributes,
            open_kind: if self_closing {
                OpenKind::SelfClosing
            } else {
                OpenKind::Open
            },
            raw_open: tag.raw.to_string(),
            raw_close: None,
        };
        let parent = self.current();
        let id = self.doc.create(Node::Element(element), line);
        let _ = self.doc.append(parent, id);
        if !self_closing {
            self.open.push(id);
        }
    }

    fn close(&mut self, line: usize, tag: &TagToken<'_>) {
        let depth = self.open.iter().rposition(|&id| {
            self.doc
                .element(id)
                .is_some_and(|el| el.qualified_name() == tag.name)
        });
        match depth {
            Some(depth) => {
                let target = self.open[depth];
                self.open.truncate(depth);
                if let Node::Element(el) = self.doc.node_mut(target) {
                    el.raw_close = Some(tag.raw.to_string());
                }
            }
            // Orphan close tag: keep it as literal text.
            None => self.push_text(line, tag.raw),
        }
    }

    fn finish(self) -> Result<Document<E>, ParseError> {
        if self.parser.namespace().is_some() {
            if let Some(&unclosed) = self.open.first() {
                let tag = self
                    .doc
                    .element(unclosed)
                    .map(Element::qualified_name)
                    .unwrap_or_default();
                return Err(ParseError::Unclosed {
                    tag,
                    line: self.doc.line(unclosed),
                });
            }
        }
        Ok(self.doc)
    }
}

/// Parses `input` with no namespace restriction.
pub fn parse(input: &str) -> Result<Document, ParseError> {
    Parser::new(ParseOptions::default())?.parse(input)
}

/// Parses `input`, treating only `namespace:` tags as structural.
pub fn parse_namespaced(input: &str, namespace: &str) -> Result<Document, ParseError> {
    Parser::new(ParseOptions::new().namespace(namespace))?.parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element_names(doc: &Document, id: NodeId) -> Vec<String> {
        doc.children(id)
            .iter()
            .filter_map(|&c| doc.element(c).map(Element::qualified_name))
            .collect()
    }

    // =========================================================================
    // Structure
    // =========================================================================

    #[test]
    fn test_nested_elements() {
        let doc = parse("<div><p>a</p><p>b</p></div>").unwrap();
        let div = doc.children(doc.root())[0];
        assert_eq!(element_names(&doc, div), vec!["p", "p"]);
    }

    #[test]
    fn test_void_elements_have_no_children() {
        let doc = parse("<p>a<br>b</p>").unwrap();
        let p = doc.children(doc.root())[0];
        assert_eq!(doc.children(p).len(), 3);
        let br = doc.children(p)[1];
        assert!(doc.element(br).unwrap().is_self_closing());
    }

    #[test]
    fn test_registered_self_closing_without_slash() {
        let parser =
            Parser::new(ParseOptions::new().namespace("tpl").self_closing(["var"])).unwrap();
        let doc: Document = parser
            .parse(r#"<tpl:var name="a">tail"#)
            .unwrap();
        let var = doc.children(doc.root())[0];
        let el = doc.element(var).unwrap();
        assert!(el.is_self_closing());
        assert_eq!(el.attr("name"), Some("a"));
        assert!(matches!(doc.node(doc.children(doc.root())[1]), Node::Text(t) if t == "tail"));
    }

    #[test]
    fn test_attributes_keep_order() {
        let doc = parse(r#"<a z="1" a="2" m="3"></a>"#).unwrap();
        let a = doc.element(doc.children(doc.root())[0]).unwrap();
        let keys: Vec<&str> = a.attributes.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_line_numbers() {
        let doc = parse_namespaced("a\n\n<tpl:if test=\"x\">\n</tpl:if>", "tpl").unwrap();
        let el = doc.children(doc.root())[1];
        assert_eq!(doc.line(el), 3);
    }

    // =========================================================================
    // Permissive handling
    // =========================================================================

    #[test]
    fn test_orphan_close_becomes_text() {
        let doc = parse("a</p>b").unwrap();
        assert_eq!(doc.children(doc.root()).len(), 1);
        assert!(matches!(doc.node(doc.children(doc.root())[0]), Node::Text(t) if t == "a</p>b"));
    }

    #[test]
    fn test_close_pops_intermediate_elements() {
        let doc = parse("<div><span>x</div>").unwrap();
        let div = doc.children(doc.root())[0];
        let span = doc.children(div)[0];
        assert_eq!(doc.element(div).unwrap().raw_close.as_deref(), Some("</div>"));
        assert_eq!(doc.element(span).unwrap().raw_close, None);
    }

    #[test]
    fn test_unclosed_plain_element_is_closed_implicitly() {
        let doc = parse("<div>x").unwrap();
        assert_eq!(doc.source_text(doc.root()), "<div>x");
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[test]
    fn test_unclosed_namespaced_element_is_an_error() {
        let err = parse_namespaced("\n<tpl:if test=\"a\">x", "tpl").unwrap_err();
        assert_eq!(
            err,
            ParseError::Unclosed {
                tag: "tpl:if".into(),
                line: 2
            }
        );
    }

    #[test]
    fn test_malformed_namespaced_tag() {
        let err = parse_namespaced("ok\n<tpl:if test=x>y</tpl:if>", "tpl").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { line: 2, .. }));
    }

    #[test]
    fn test_round_trip_with_namespace() {
        let src = "<!DOCTYPE html>\n<ul><tpl:foreach in=\"xs\" as=\"x\"><li/></tpl:foreach></ul><!-- c -->";
        let doc = parse_namespaced(src, "tpl").unwrap();
        assert_eq!(doc.source_text(doc.root()), src);
    }
}
