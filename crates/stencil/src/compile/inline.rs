//! The inline tag form: `{tpl:var name='user.name'}`.
//!
//! Inline tags are expanded in literal leaves only (text, comments and the
//! tag text of plain elements), after the structural pass has replaced every
//! namespaced element. Arguments are single-quoted so the form can sit inside
//! double-quoted HTML attribute values.

use std::ops::Range;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::compile::CompileContext;
use crate::error::{Error, Result};
use crate::program::Program;
use crate::tags::TagCall;

static ARGUMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z_][\w-]*)\s*=\s*'([^']*)'").expect("argument pattern is valid")
});

/// Matcher for inline tags of one namespace.
#[derive(Debug, Clone)]
pub struct InlinePattern {
    regex: Regex,
}

/// One inline tag occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineMatch<'t> {
    /// Byte range of the whole `{ns:name ...}` occurrence.
    pub range: Range<usize>,
    pub name: &'t str,
    pub args: IndexMap<String, String>,
}

impl InlinePattern {
    pub fn new(namespace: &str) -> Result<Self> {
        let pattern = format!(
            r"\{{{}:([A-Za-z_][\w-]*)((?:\s+[A-Za-z_][\w-]*\s*=\s*'[^']*')*)\s*\}}",
            regex::escape(namespace)
        );
        let regex = Regex::new(&pattern)
            .map_err(|e| Error::Config(format!("namespace `{}`: {}", namespace, e)))?;
        Ok(Self { regex })
    }

    /// Occurrences in `text`, left to right.
    pub fn find_all<'t>(&self, text: &'t str) -> Vec<InlineMatch<'t>> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = caps.get(1)?.as_str();
                let args = caps
                    .get(2)
                    .map(|m| {
                        ARGUMENT
                            .captures_iter(m.as_str())
                            .map(|a| (a[1].to_string(), a[2].to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                Some(InlineMatch {
                    range: whole.range(),
                    name,
                    args,
                })
            })
            .collect()
    }
}

impl CompileContext<'_> {
    /// Appends `text` to `program`, replacing inline tags with the
    /// instructions their handlers produce. `line` is where `text` starts.
    pub(crate) fn expand_inline(&self, text: &str, line: usize, program: &mut Program) -> Result<()> {
        let mut last = 0;
        for found in self.compiler.inline.find_all(text) {
            program.push_literal(&text[last..found.range.start]);
            let call = TagCall {
                name: format!("{}:{}", self.compiler.namespace, found.name),
                attributes: found.args,
                file: self.file.to_path_buf(),
                line: line + text[..found.range.start].matches('\n').count(),
            };
            let spec = self
                .compiler
                .registry
                .get(found.name)
                .ok_or_else(|| Error::UnknownTag {
                    tag: call.name.clone(),
                    file: call.file.clone(),
                    line: call.line,
                })?;
            let handler = spec
                .inline
                .ok_or_else(|| call.error(format!("<{}> has no inline form", call.name)))?;
            program.push(handler(self, &call)?);
            last = found.range.end;
        }
        program.push_literal(&text[last..]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_tags_and_arguments() {
        let pattern = InlinePattern::new("tpl").unwrap();
        let text = "<a href=\"{tpl:var name='link.url'}\">{tpl:var name='link.label' escape='html'}</a>";
        let found = pattern.find_all(text);

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "var");
        assert_eq!(found[0].args.get("name").map(String::as_str), Some("link.url"));
        assert_eq!(&text[found[0].range.clone()], "{tpl:var name='link.url'}");
        assert_eq!(found[1].args.len(), 2);
    }

    #[test]
    fn test_ignores_other_namespaces_and_plain_braces() {
        let pattern = InlinePattern::new("tpl").unwrap();
        assert!(pattern
            .find_all("{x:var name='a'} {a.b} ${c} function() { return 1; }")
            .is_empty());
    }

    #[test]
    fn test_namespace_is_escaped() {
        let pattern = InlinePattern::new("t.p").unwrap();
        assert_eq!(pattern.find_all("{t.p:var name='a'}").len(), 1);
        assert!(pattern.find_all("{tXp:var name='a'}").is_empty());
    }
}
