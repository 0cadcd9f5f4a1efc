//! HTML document tree.
//!
//! Every node is an [`Element`]; character data lives in the element's
//! `text` (before its first child) and `tail` (after its end tag) slots.
//! Node structure is kept in an [`ego_tree::Tree`] whose values index into
//! an element arena, so element data can be borrowed mutably without
//! holding a tree cursor.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::ops::{Index, IndexMut};

use ego_tree::{NodeId, Tree};

use super::element::{push_text, Element};
use crate::error::Result;

/// Elements serialized without an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose text is written without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &["style", "script"];

/// A mutable HTML document.
#[derive(Debug, Clone)]
pub struct HtmlDocument {
    tree: Tree<usize>,
    elements: Vec<Element>,
}

impl HtmlDocument {
    /// Create an empty `<html><head></head><body></body></html>` document.
    pub fn new() -> Self {
        let mut doc = Self::with_root(Element::new("html"));
        let root = doc.root();
        let head = doc.create(Element::new("head"));
        let body = doc.create(Element::new("body"));
        doc.append_child(root, head);
        doc.append_child(root, body);
        doc
    }

    /// Create a document whose root is `root`.
    pub fn with_root(root: Element) -> Self {
        Self {
            tree: Tree::new(0),
            elements: vec![root],
        }
    }

    /// Parse HTML text into a document.
    ///
    /// Fails with [`Error::HtmlParse`](crate::Error::HtmlParse) on empty input.
    pub fn parse(html: &str) -> Result<Self> {
        crate::parser::parse_html(html)
    }

    /// The root element.
    pub fn root(&self) -> NodeId {
        self.tree.root().id()
    }

    /// Get an element by id.
    pub fn get(&self, id: NodeId) -> Option<&Element> {
        let idx = *self.tree.get(id)?.value();
        self.elements.get(idx)
    }

    /// Get a mutable element by id.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        let idx = *self.tree.get(id)?.value();
        self.elements.get_mut(idx)
    }

    /// Tag name of an element.
    pub fn tag(&self, id: NodeId) -> &str {
        &self[id].tag
    }

    /// Parent element.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.tree.get(id)?.parent().map(|n| n.id())
    }

    /// Child elements in order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .get(id)
            .map(|n| n.children().map(|c| c.id()).collect())
            .unwrap_or_default()
    }

    /// First child element.
    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.tree.get(id)?.first_child().map(|n| n.id())
    }

    /// Last child element.
    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.tree.get(id)?.last_child().map(|n| n.id())
    }

    /// Next sibling element.
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.tree.get(id)?.next_sibling().map(|n| n.id())
    }

    /// Previous sibling element.
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.tree.get(id)?.prev_sibling().map(|n| n.id())
    }

    /// Following siblings, nearest first.
    pub fn following_siblings(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .get(id)
            .map(|n| n.next_siblings().map(|s| s.id()).collect())
            .unwrap_or_default()
    }

    /// Preceding siblings, nearest first.
    pub fn preceding_siblings(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .get(id)
            .map(|n| n.prev_siblings().map(|s| s.id()).collect())
            .unwrap_or_default()
    }

    /// Descendants of `id` in document order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .get(id)
            .map(|n| n.descendants().skip(1).map(|d| d.id()).collect())
            .unwrap_or_default()
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .get(id)
            .map(|n| n.ancestors().map(|a| a.id()).collect())
            .unwrap_or_default()
    }

    /// Whether `id` is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root() || self.ancestors(id).last() == Some(&self.root())
    }

    /// Whether any ancestor of `id` has the given tag.
    pub fn has_ancestor(&self, id: NodeId, tag: &str) -> bool {
        self.ancestors(id).into_iter().any(|a| self[a].is(tag))
    }

    /// All descendants of `id` with the given tag, in document order.
    pub fn find_all(&self, id: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|d| self[*d].is(tag))
            .collect()
    }

    /// First descendant of `id` with the given tag.
    pub fn find_first(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        self.tree
            .get(id)?
            .descendants()
            .skip(1)
            .find(|d| self.elements[*d.value()].is(tag))
            .map(|d| d.id())
    }

    /// Child elements of `id` with the given tag.
    pub fn child_elements(&self, id: NodeId, tag: &str) -> Vec<NodeId> {
        self.children(id)
            .into_iter()
            .filter(|c| self[*c].is(tag))
            .collect()
    }

    /// The `head` element, if the root has one.
    pub fn head(&self) -> Option<NodeId> {
        self.child_elements(self.root(), "head").into_iter().next()
    }

    /// The `body` element, if the root has one.
    pub fn body(&self) -> Option<NodeId> {
        self.child_elements(self.root(), "body").into_iter().next()
    }

    /// Map from node to its position in document order.
    pub fn order_index(&self) -> HashMap<NodeId, usize> {
        self.tree
            .root()
            .descendants()
            .enumerate()
            .map(|(i, n)| (n.id(), i))
            .collect()
    }

    /// Create a detached element.
    pub fn create(&mut self, element: Element) -> NodeId {
        let idx = self.elements.len();
        self.elements.push(element);
        self.tree.orphan(idx).id()
    }

    /// Append `child` as the last child of `parent`, detaching it first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if parent == child {
            return;
        }
        if let Some(mut node) = self.tree.get_mut(parent) {
            node.append_id(child);
        }
    }

    /// Insert `child` as the first child of `parent`, detaching it first.
    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        if parent == child {
            return;
        }
        if let Some(mut node) = self.tree.get_mut(parent) {
            node.prepend_id(child);
        }
    }

    /// Insert `new` immediately before `sibling`. No-op if `sibling` is detached.
    pub fn insert_before(&mut self, sibling: NodeId, new: NodeId) {
        if sibling == new || self.parent(sibling).is_none() {
            return;
        }
        if let Some(mut node) = self.tree.get_mut(sibling) {
            node.insert_id_before(new);
        }
    }

    /// Insert `new` immediately after `sibling`. No-op if `sibling` is detached.
    pub fn insert_after(&mut self, sibling: NodeId, new: NodeId) {
        if sibling == new || self.parent(sibling).is_none() {
            return;
        }
        if let Some(mut node) = self.tree.get_mut(sibling) {
            node.insert_id_after(new);
        }
    }

    /// Detach an element (and its tail) from the tree.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(mut node) = self.tree.get_mut(id) {
            node.detach();
        }
    }

    /// Remove an element, keeping its tail text in the parent sequence.
    pub fn remove(&mut self, id: NodeId) {
        if self.parent(id).is_none() {
            return;
        }
        let tail = self[id].tail.take();
        if let Some(tail) = tail {
            self.push_text_before(id, &tail);
        }
        self.detach(id);
    }

    /// Replace an element by its content: text, children and tail move into
    /// the parent at the element's position.
    pub fn unwrap(&mut self, id: NodeId) {
        if self.parent(id).is_none() {
            return;
        }
        let text = self[id].text.take();
        let tail = self[id].tail.take();
        if let Some(text) = text {
            self.push_text_before(id, &text);
        }
        for child in self.children(id) {
            self.insert_before(id, child);
        }
        if let Some(tail) = tail {
            self.push_text_before(id, &tail);
        }
        self.detach(id);
    }

    /// Append text to whatever slot precedes `id`: the previous sibling's
    /// tail, or the parent's text.
    pub fn push_text_before(&mut self, id: NodeId, text: &str) {
        if let Some(prev) = self.prev_sibling(id) {
            push_text(&mut self[prev].tail, text);
        } else if let Some(parent) = self.parent(id) {
            push_text(&mut self[parent].text, text);
        }
    }

    /// Append text at the end of an element's content.
    pub fn push_text_end(&mut self, id: NodeId, text: &str) {
        match self.last_child(id) {
            Some(last) => push_text(&mut self[last].tail, text),
            None => push_text(&mut self[id].text, text),
        }
    }

    /// Re-root the document under a new `tag` element unless the root already has that tag.
    pub fn wrap_root(&mut self, tag: &str) {
        if self[self.root()].is(tag) {
            return;
        }
        let idx = self.elements.len();
        self.elements.push(Element::new(tag));
        let mut tree = Tree::new(idx);
        let new_root = tree.root().id();
        copy_subtree(&self.tree, self.root(), &mut tree, new_root);
        self.tree = tree;
        let root = self.root();
        if let Some(old) = self.first_child(root) {
            self[old].tail = None;
        }
    }

    /// Concatenated text of an element and its descendants (without its own tail).
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        out.push_str(self[id].text_str());
        for child in self.children(id) {
            self.collect_text(child, out);
            out.push_str(self[child].tail_str());
        }
    }

    /// Direct text of an element: its text plus the tails of its children.
    pub fn own_text(&self, id: NodeId) -> String {
        let mut out = self[id].text_str().to_string();
        for child in self.children(id) {
            out.push_str(self[child].tail_str());
        }
        out
    }

    /// Serialize the whole document.
    pub fn serialize(&self) -> String {
        self.serialize_node(self.root())
    }

    /// Serialize one element (without its tail).
    pub fn serialize_node(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let el = &self[id];
        out.push('<');
        out.push_str(&el.tag);
        for (name, value) in &el.attrs {
            let _ = write!(out, " {}=\"{}\"", name, escape_attr(value));
        }
        out.push('>');
        if VOID_ELEMENTS.contains(&el.tag.as_str()) {
            return;
        }
        let raw = RAW_TEXT_ELEMENTS.contains(&el.tag.as_str());
        if let Some(text) = &el.text {
            if raw {
                out.push_str(text);
            } else {
                out.push_str(&escape_text(text));
            }
        }
        for child in self.children(id) {
            self.write_node(child, out);
            if let Some(tail) = &self[child].tail {
                out.push_str(&escape_text(tail));
            }
        }
        out.push_str("</");
        out.push_str(&el.tag);
        out.push('>');
    }
}

impl Default for HtmlDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<NodeId> for HtmlDocument {
    type Output = Element;

    fn index(&self, id: NodeId) -> &Element {
        match self.get(id) {
            Some(el) => el,
            None => panic!("node {:?} does not belong to this document", id),
        }
    }
}

impl IndexMut<NodeId> for HtmlDocument {
    fn index_mut(&mut self, id: NodeId) -> &mut Element {
        match self.tree.get(id).map(|n| *n.value()) {
            Some(idx) => &mut self.elements[idx],
            None => panic!("node {:?} does not belong to this document", id),
        }
    }
}

fn copy_subtree(src: &Tree<usize>, src_id: NodeId, dst: &mut Tree<usize>, dst_parent: NodeId) {
    let Some(node) = src.get(src_id) else {
        return;
    };
    let idx = *node.value();
    let new_id = match dst.get_mut(dst_parent) {
        Some(mut parent) => parent.append(idx).id(),
        None => return,
    };
    for child in node.children() {
        copy_subtree(src, child.id(), dst, new_id);
    }
}

/// Escape character data.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape an attribute value for double-quoted output.
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Collapse whitespace runs into single spaces and trim.
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (HtmlDocument, NodeId, NodeId, NodeId) {
        // <p>a<b>b</b>c<i>d</i>e</p>
        let mut doc = HtmlDocument::with_root(Element::new("p").with_text("a"));
        let root = doc.root();
        let b = doc.create(Element::new("b").with_text("b"));
        let i = doc.create(Element::new("i").with_text("d"));
        doc.append_child(root, b);
        doc.append_child(root, i);
        doc[b].tail = Some("c".into());
        doc[i].tail = Some("e".into());
        (doc, root, b, i)
    }

    #[test]
    fn test_serialize_text_and_tail() {
        let (doc, _, _, _) = sample();
        assert_eq!(doc.serialize(), "<p>a<b>b</b>c<i>d</i>e</p>");
        assert_eq!(doc.text_content(doc.root()), "abcde");
        assert_eq!(doc.own_text(doc.root()), "ace");
    }

    #[test]
    fn test_remove_keeps_tail() {
        let (mut doc, _, b, _) = sample();
        doc.remove(b);
        assert_eq!(doc.serialize(), "<p>ac<i>d</i>e</p>");
        assert!(!doc.is_attached(b));
    }

    #[test]
    fn test_unwrap_moves_content() {
        let (mut doc, _, _, i) = sample();
        doc.unwrap(i);
        assert_eq!(doc.serialize(), "<p>a<b>b</b>cde</p>");
    }

    #[test]
    fn test_unwrap_with_children() {
        let mut doc = HtmlDocument::parse("<div>x<span>y<b>z</b>w</span>v</div>").unwrap();
        let span = doc.find_first(doc.root(), "span").unwrap();
        doc.unwrap(span);
        let div = doc.find_first(doc.root(), "div").unwrap();
        assert_eq!(doc.serialize_node(div), "<div>xy<b>z</b>wv</div>");
    }

    #[test]
    fn test_escaping() {
        let mut doc = HtmlDocument::with_root(Element::new("p").with_text("a < b & c"));
        let root = doc.root();
        doc[root].set_attr("title", "say \"hi\" & go");
        assert_eq!(
            doc.serialize(),
            "<p title=\"say &quot;hi&quot; &amp; go\">a &lt; b &amp; c</p>"
        );
    }

    #[test]
    fn test_void_and_raw_elements() {
        let mut doc = HtmlDocument::new();
        let head = doc.head().unwrap();
        let meta = doc.create(Element::new("meta").with_attr("charset", "utf-8"));
        let style = doc.create(Element::new("style").with_text(".s0 > p { color: red }"));
        doc.append_child(head, meta);
        doc.append_child(head, style);
        assert_eq!(
            doc.serialize(),
            "<html><head><meta charset=\"utf-8\"><style>.s0 > p { color: red }</style></head><body></body></html>"
        );
    }

    #[test]
    fn test_wrap_root() {
        let (mut doc, _, _, _) = sample();
        doc.wrap_root("html");
        assert_eq!(doc.tag(doc.root()), "html");
        assert_eq!(doc.serialize(), "<html><p>a<b>b</b>c<i>d</i>e</p></html>");
        doc.wrap_root("html");
        assert_eq!(doc.children(doc.root()).len(), 1);
    }

    #[test]
    fn test_siblings_and_order() {
        let (doc, root, b, i) = sample();
        assert_eq!(doc.next_sibling(b), Some(i));
        assert_eq!(doc.prev_sibling(i), Some(b));
        assert_eq!(doc.following_siblings(b), vec![i]);
        let order = doc.order_index();
        assert!(order[&root] < order[&b]);
        assert!(order[&b] < order[&i]);
    }

    #[test]
    fn test_normalize_ws() {
        assert_eq!(normalize_ws("  a \n\t b  c "), "a b c");
        assert_eq!(normalize_ws(""), "");
    }
}
