//! HTML text to [`HtmlDocument`] conversion.
//!
//! Parsing is delegated to the HTML5 parser in `scraper`; its node tree is
//! then folded into the element/text/tail model. Comments, doctypes and
//! processing instructions are dropped.

use ego_tree::{NodeId, NodeRef};
use scraper::{Html, Node};

use crate::error::{Error, Result};
use crate::model::{Element, HtmlDocument};

/// Parse an HTML document or body fragment.
///
/// Fragments are placed in a synthesized `<html><head></head><body>` skeleton.
/// Empty (or whitespace-only) input is rejected.
pub fn parse_html(input: &str) -> Result<HtmlDocument> {
    let input = input.trim_start_matches('\u{feff}');
    if input.trim().is_empty() {
        return Err(Error::HtmlParse("document is empty".to_string()));
    }

    let html = Html::parse_document(input);
    let root = html
        .tree
        .root()
        .children()
        .find(|n| matches!(n.value(), Node::Element(e) if e.name() == "html"))
        .ok_or_else(|| Error::HtmlParse("no root element".to_string()))?;

    let Node::Element(root_el) = root.value() else {
        return Err(Error::HtmlParse("no root element".to_string()));
    };

    let mut doc = HtmlDocument::with_root(convert_element(root_el));
    let doc_root = doc.root();
    copy_children(&mut doc, root, doc_root);

    log::debug!(
        "parsed HTML: {} elements",
        doc.descendants(doc.root()).len() + 1
    );
    Ok(doc)
}

fn convert_element(el: &scraper::node::Element) -> Element {
    let mut out = Element::new(el.name());
    for (name, value) in el.attrs() {
        out.attrs.push((name.to_string(), value.to_string()));
    }
    out
}

fn copy_children(doc: &mut HtmlDocument, src: NodeRef<'_, Node>, dst: NodeId) {
    for child in src.children() {
        match child.value() {
            Node::Element(el) => {
                let id = doc.create(convert_element(el));
                doc.append_child(dst, id);
                copy_children(doc, child, id);
            }
            Node::Text(text) => doc.push_text_end(dst, text),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fragment_gets_skeleton() {
        let doc = parse_html("<p>Climate change is a global issue.</p>").unwrap();
        assert_eq!(
            doc.serialize(),
            "<html><head></head><body><p>Climate change is a global issue.</p></body></html>"
        );
    }

    #[test]
    fn test_text_and_tail_slots() {
        let doc = parse_html("<div>a<span>b</span>c<!-- note -->d</div>").unwrap();
        let div = doc.find_first(doc.root(), "div").unwrap();
        let span = doc.find_first(div, "span").unwrap();
        assert_eq!(doc[div].text.as_deref(), Some("a"));
        assert_eq!(doc[span].text.as_deref(), Some("b"));
        assert_eq!(doc[span].tail.as_deref(), Some("cd"));
    }

    #[test]
    fn test_attribute_order_and_entities() {
        let doc = parse_html(r#"<a href="x?a=1&amp;b=2" class="k">A &amp; B</a>"#).unwrap();
        let a = doc.find_first(doc.root(), "a").unwrap();
        assert_eq!(doc[a].attrs[0].0, "href");
        assert_eq!(doc[a].attr("href"), Some("x?a=1&b=2"));
        assert_eq!(doc[a].text.as_deref(), Some("A & B"));
        assert_eq!(
            doc.serialize_node(a),
            r#"<a href="x?a=1&amp;b=2" class="k">A &amp; B</a>"#
        );
    }

    #[test]
    fn test_empty_input_is_error() {
        assert!(matches!(parse_html(""), Err(Error::HtmlParse(_))));
        assert!(matches!(parse_html("  \n "), Err(Error::HtmlParse(_))));
    }

    #[test]
    fn test_style_in_head() {
        let doc =
            parse_html("<html><head><style>.s0 {font-size: 9px}</style></head><body></body></html>")
                .unwrap();
        let head = doc.head().unwrap();
        let style = doc.find_first(head, "style").unwrap();
        assert_eq!(doc[style].text.as_deref(), Some(".s0 {font-size: 9px}"));
    }
}
