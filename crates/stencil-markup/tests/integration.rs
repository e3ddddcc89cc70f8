use proptest::prelude::*;
use stencil_markup::{parse, parse_namespaced, Document, Node, NodeId, ParseOptions, Parser};

fn count_elements(doc: &Document, id: NodeId) -> usize {
    doc.children(id)
        .iter()
        .map(|&c| match doc.node(c) {
            Node::Element(_) => 1 + count_elements(doc, c),
            _ => 0,
        })
        .sum()
}

#[test]
fn test_html_page_round_trip() {
    let page = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <link rel="stylesheet" href="/site.css">
  <script><![CDATA[ if (a < b) { go(); } ]]></script>
</head>
<body class="home">
  <!-- header -->
  <img src="/logo.png" alt="logo">
  <p>Hello &amp; welcome<br>friend</p>
</body>
</html>
"#;
    let doc = parse(page).unwrap();
    assert_eq!(doc.source_text(doc.root()), page);
    assert!(count_elements(&doc, doc.root()) >= 8);
}

#[test]
fn test_namespaced_tags_nest() {
    let src = r#"<tpl:if test="a"><tpl:foreach in="xs" as="x"><tpl:var name="x"/></tpl:foreach></tpl:if>"#;
    let doc = parse_namespaced(src, "tpl").unwrap();
    assert_eq!(count_elements(&doc, doc.root()), 3);
}

#[test]
fn test_replace_mid_walk_keeps_ids_valid() {
    let src = r#"<tpl:a x="1"/><tpl:b x="2"/><tpl:c x="3"/>"#;
    let parser = Parser::new(ParseOptions::new().namespace("tpl")).unwrap();
    let mut doc: Document<u32> = parser.parse(src).unwrap();
    let root = doc.root();
    let ids: Vec<NodeId> = doc.children(root).to_vec();

    for (n, &id) in ids.iter().enumerate() {
        let line = doc.line(id);
        let replacement = doc.create(Node::Embedded(n as u32), line);
        doc.replace(id, replacement).unwrap();
        // Later siblings collected before the walk are still attached.
        if let Some(&next) = ids.get(n + 1) {
            assert_eq!(doc.parent(next), Some(root));
        }
    }

    let payloads: Vec<u32> = doc
        .children(root)
        .iter()
        .filter_map(|&c| match doc.node(c) {
            Node::Embedded(n) => Some(*n),
            _ => None,
        })
        .collect();
    assert_eq!(payloads, vec![0, 1, 2]);
}

proptest! {
    /// Any input without the namespace prefix survives parsing byte for byte.
    #[test]
    fn namespaced_parse_preserves_plain_input(input in "[a-z<>/=\" \n!-]{0,80}") {
        prop_assume!(!input.contains("<tpl:") && !input.contains("</tpl:"));
        let doc = parse_namespaced(&input, "tpl").unwrap();
        prop_assert_eq!(doc.source_text(doc.root()), input);
    }

    /// Unrestricted parsing never loses or reorders bytes either.
    #[test]
    fn unrestricted_parse_round_trips(input in "(<[a-z]{1,3}( [a-z]=\"[a-z]*\")?/?>|</[a-z]{1,3}>|[a-z ]{1,5}|<!--[a-z]*-->)*") {
        let doc = parse(&input).unwrap();
        prop_assert_eq!(doc.source_text(doc.root()), input);
    }
}
