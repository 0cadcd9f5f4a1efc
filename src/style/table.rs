//! The head style table.
//!
//! After extraction every text-affecting style lives in a head `<style>`
//! element holding one `.sN { ... }` rule, and body elements refer to it by
//! class. [`normalize`] then merges equivalent rules and [`abbreviate`]
//! optionally gives them readable names.

use std::collections::{BTreeMap, HashMap, HashSet};

use ego_tree::NodeId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::css::{CssStyle, StyleRule};
use super::font::{FontDescriptor, FontStyle, FontWeight};
use crate::model::{slug, ClassName, ClassRef, Element, HtmlDocument};
use crate::pipeline::PipelineContext;

static NUMBERED_CLASS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\.s(\d+)$").unwrap());

/// Class rules read from the head, in order.
#[derive(Debug, Clone, Default)]
pub struct StyleTable {
    rules: Vec<StyleRule>,
    index: HashMap<ClassRef, usize>,
}

impl StyleTable {
    /// Read every single-class rule from the head `<style>` elements.
    /// The first definition of a classref wins.
    pub fn from_document(doc: &HtmlDocument) -> Self {
        let mut table = Self::default();
        for (_, rules) in head_style_nodes(doc) {
            for rule in rules {
                table.insert(rule);
            }
        }
        table
    }

    fn insert(&mut self, rule: StyleRule) {
        if self.index.contains_key(&rule.classref) {
            return;
        }
        self.index.insert(rule.classref.clone(), self.rules.len());
        self.rules.push(rule);
    }

    /// Declarations for a classref.
    pub fn get(&self, classref: &ClassRef) -> Option<&CssStyle> {
        self.index.get(classref).map(|&i| &self.rules[i].style)
    }

    /// Whether a classref is defined.
    pub fn contains(&self, classref: &ClassRef) -> bool {
        self.index.contains_key(classref)
    }

    /// Rules in head order.
    pub fn rules(&self) -> &[StyleRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Effective declarations of an element: its class rules in class order,
    /// then its inline style.
    pub fn resolve(&self, element: &Element) -> CssStyle {
        let mut style = CssStyle::new();
        for class in element.classes() {
            if let Some(rule) = self.get(&class.to_ref()) {
                style.merge(rule);
            }
        }
        if let Some(inline) = element.attr("style") {
            style.merge(&CssStyle::parse_checked(inline).0);
        }
        style
    }

    /// Numeric property of an element, from its inline style first and then
    /// from its class rules.
    pub fn numeric(&self, element: &Element, property: &str) -> Option<f64> {
        if let Some(value) = element
            .attr("style")
            .and_then(|s| CssStyle::parse_checked(s).0.numeric(property))
        {
            return Some(value);
        }
        element
            .classes()
            .iter()
            .filter_map(|c| self.get(&c.to_ref()))
            .find_map(|style| style.numeric(property))
    }

    /// Font size of an element in pixels.
    pub fn font_size(&self, element: &Element) -> Option<f64> {
        self.numeric(element, "font-size")
    }
}

/// Head `<style>` elements with the class rules each one holds.
fn head_style_nodes(doc: &HtmlDocument) -> Vec<(NodeId, Vec<StyleRule>)> {
    let Some(head) = doc.head() else {
        return Vec::new();
    };
    doc.child_elements(head, "style")
        .into_iter()
        .map(|id| (id, StyleRule::parse_sheet(doc[id].text_str())))
        .collect()
}

/// Elements outside the head, in document order.
pub(crate) fn content_elements(doc: &HtmlDocument) -> Vec<NodeId> {
    if let Some(body) = doc.body() {
        let mut all = vec![body];
        all.extend(doc.descendants(body));
        return all;
    }
    let root = doc.root();
    let head = doc.head();
    let mut all = vec![root];
    all.extend(doc.descendants(root).into_iter().filter(|&id| {
        Some(id) != head && !head.is_some_and(|h| doc.ancestors(id).contains(&h))
    }));
    all
}

pub(crate) fn ensure_head(doc: &mut HtmlDocument) -> NodeId {
    if let Some(head) = doc.head() {
        return head;
    }
    let head = doc.create(Element::new("head"));
    let root = doc.root();
    doc.prepend_child(root, head);
    head
}

pub(crate) fn append_style_rule(doc: &mut HtmlDocument, head: NodeId, rule: &StyleRule) {
    let style = doc.create(Element::new("style").with_text(rule.to_css()));
    doc.append_child(head, style);
}

/// Move text-affecting inline declarations into head class rules.
///
/// Each distinct set of text declarations gets a new `.sN` classref,
/// numbered after the highest existing one. The font family is decomposed
/// as it is hoisted. Remaining declarations stay inline; an empty `style`
/// attribute is removed. Returns the number of rules created.
pub fn extract_styles_into_head(doc: &mut HtmlDocument, ctx: &mut PipelineContext) -> usize {
    let mut next = StyleTable::from_document(doc)
        .rules()
        .iter()
        .filter_map(|r| NUMBERED_CLASS.captures(r.classref.as_str()))
        .filter_map(|c| c[1].parse::<usize>().ok())
        .max()
        .map_or(0, |n| n + 1);

    let targets: Vec<NodeId> = content_elements(doc)
        .into_iter()
        .filter(|&id| doc[id].has_attr("style"))
        .collect();
    if targets.is_empty() {
        return 0;
    }

    let head = ensure_head(doc);
    let mut created: HashMap<String, ClassRef> = HashMap::new();
    for id in targets {
        let raw = doc[id].attr("style").unwrap_or_default().to_string();
        let (style, rejected) = CssStyle::parse_checked(&raw);
        for entry in rejected {
            ctx.warn(
                "styles",
                format!("malformed CSS declaration dropped: '{}'", entry),
            );
        }

        let (mut text, other) = style.split_text();
        if !text.is_empty() {
            FontDescriptor::apply_to(&mut text);
            let key = text.to_css();
            let classref = match created.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let classref = ClassName::new(format!("s{}", next)).to_ref();
                    next += 1;
                    append_style_rule(doc, head, &StyleRule::new(classref.clone(), text));
                    created.insert(key, classref.clone());
                    classref
                }
            };
            doc[id].add_class(classref.name().as_str());
        }

        if other.is_empty() {
            doc[id].remove_attr("style");
        } else {
            doc[id].set_attr("style", other.to_css());
        }
    }

    log::debug!("extracted {} style rules into head", created.len());
    created.len()
}

/// Outcome of [`normalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    pub styles_before: usize,
    pub styles_after: usize,
    /// Elements whose class list changed
    pub elements_rewritten: usize,
}

/// Decompose font families in every head rule, merge text-equivalent rules
/// into the lexicographically smallest classref, and point body classes at
/// the survivors.
pub fn normalize(doc: &mut HtmlDocument, _ctx: &mut PipelineContext) -> NormalizeReport {
    let nodes = head_style_nodes(doc);

    let mut rules: Vec<StyleRule> = Vec::new();
    let mut seen = HashSet::new();
    for (_, node_rules) in &nodes {
        for rule in node_rules {
            if seen.insert(rule.classref.clone()) {
                let mut rule = rule.clone();
                FontDescriptor::apply_to(&mut rule.style);
                rules.push(rule);
            }
        }
    }

    let mut groups: BTreeMap<Vec<(String, String)>, Vec<ClassRef>> = BTreeMap::new();
    for rule in &rules {
        groups
            .entry(rule.style.text_key())
            .or_default()
            .push(rule.classref.clone());
    }
    let mut canonical: HashMap<ClassRef, ClassRef> = HashMap::new();
    for members in groups.values() {
        let Some(smallest) = members.iter().min() else {
            continue;
        };
        for member in members {
            canonical.insert(member.clone(), smallest.clone());
        }
    }

    let renamed: HashMap<ClassName, ClassName> = canonical
        .iter()
        .filter(|(from, to)| from != to)
        .map(|(from, to)| (from.name(), to.name()))
        .collect();
    let elements_rewritten = rename_classes(doc, &renamed);

    let by_ref: HashMap<ClassRef, StyleRule> = rules
        .into_iter()
        .map(|r| (r.classref.clone(), r))
        .collect();
    let mut emitted = HashSet::new();
    for (node, node_rules) in nodes {
        if node_rules.is_empty() {
            continue;
        }
        let kept: Vec<String> = node_rules
            .iter()
            .filter(|r| canonical.get(&r.classref) == Some(&r.classref))
            .filter(|r| emitted.insert(r.classref.clone()))
            .filter_map(|r| by_ref.get(&r.classref).map(StyleRule::to_css))
            .collect();
        if kept.is_empty() {
            doc.remove(node);
        } else {
            doc[node].text = Some(kept.join("\n"));
        }
    }

    let report = NormalizeReport {
        styles_before: seen.len(),
        styles_after: emitted.len(),
        elements_rewritten,
    };
    log::debug!(
        "normalized styles: {} -> {} ({} elements rewritten)",
        report.styles_before,
        report.styles_after,
        report.elements_rewritten
    );
    report
}

/// Replace class tokens in content elements, dropping duplicates.
/// Returns the number of elements changed.
fn rename_classes(doc: &mut HtmlDocument, renamed: &HashMap<ClassName, ClassName>) -> usize {
    if renamed.is_empty() {
        return 0;
    }
    let mut changed = 0;
    for id in content_elements(doc) {
        let classes = doc[id].classes();
        if classes.is_empty() {
            continue;
        }
        let mut out: Vec<ClassName> = Vec::with_capacity(classes.len());
        for class in &classes {
            let class = renamed.get(class).unwrap_or(class);
            if !out.contains(class) {
                out.push(class.clone());
            }
        }
        if out != classes {
            doc[id].set_classes(&out);
            changed += 1;
        }
    }
    changed
}

/// Readable name for a rule: `family_size_weight_style`, e.g.
/// `timesnewromanpsmt_12_0_b_i`.
pub fn readable_name(style: &CssStyle) -> String {
    let family = style
        .get("font-family")
        .map(slug)
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| "font".to_string());
    let size = style
        .numeric("font-size")
        .map(|s| format!("{:.1}", s).replace('.', "_"))
        .unwrap_or_else(|| "x".to_string());
    let weight = match style.get("font-weight").and_then(FontWeight::parse) {
        Some(FontWeight::Bold) => "b",
        Some(FontWeight::Light) => "l",
        _ => "n",
    };
    let slant = match style.get("font-style").and_then(FontStyle::parse) {
        Some(FontStyle::Italic) => "i",
        _ => "n",
    };
    format!("{}_{}_{}_{}", family, size, weight, slant)
}

/// Rename every head rule to its readable name. Names that collide get
/// `_2`, `_3`, ... suffixes in head order. Returns the renaming.
pub fn abbreviate(doc: &mut HtmlDocument) -> HashMap<ClassRef, ClassRef> {
    let nodes = head_style_nodes(doc);
    let mut used: HashSet<String> = HashSet::new();
    let mut mapping: HashMap<ClassRef, ClassRef> = HashMap::new();

    for (node, rules) in &nodes {
        if rules.is_empty() {
            continue;
        }
        let mut texts = Vec::with_capacity(rules.len());
        for rule in rules {
            let target = match mapping.get(&rule.classref) {
                Some(existing) => existing.clone(),
                None => {
                    let base = readable_name(&rule.style);
                    let mut name = base.clone();
                    let mut n = 2;
                    while !used.insert(name.clone()) {
                        name = format!("{}_{}", base, n);
                        n += 1;
                    }
                    let target = ClassName::new(name).to_ref();
                    mapping.insert(rule.classref.clone(), target.clone());
                    target
                }
            };
            texts.push(StyleRule::new(target, rule.style.clone()).to_css());
        }
        doc[*node].text = Some(texts.join("\n"));
    }

    let renamed: HashMap<ClassName, ClassName> = mapping
        .iter()
        .map(|(from, to)| (from.name(), to.name()))
        .collect();
    rename_classes(doc, &renamed);
    mapping
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head_styles(doc: &HtmlDocument) -> Vec<String> {
        let head = doc.head().unwrap();
        doc.child_elements(head, "style")
            .into_iter()
            .map(|s| doc[s].text_str().to_string())
            .collect()
    }

    #[test]
    fn test_extract_bold_italic_family() {
        let mut doc = HtmlDocument::parse(
            r#"<span style="font-family: TimesNewRomanPS-BoldItalicMT; font-size: 11px">x</span>"#,
        )
        .unwrap();
        let mut ctx = PipelineContext::new();
        assert_eq!(extract_styles_into_head(&mut doc, &mut ctx), 1);
        assert_eq!(
            head_styles(&doc),
            vec![".s0 { font-family: TimesNewRomanPSMT; font-size: 11px; font-weight: bold; font-style: italic }"]
        );
        let span = doc.find_first(doc.root(), "span").unwrap();
        assert_eq!(doc[span].attr("class"), Some("s0"));
        assert!(!doc[span].has_attr("style"));
    }

    #[test]
    fn test_extract_keeps_positional_declarations() {
        let mut doc = HtmlDocument::parse(
            r#"<span class="x" style="top: 10px; font-size: 9px; left: 5px">a</span><span style="left: 1px">b</span>"#,
        )
        .unwrap();
        let mut ctx = PipelineContext::new();
        extract_styles_into_head(&mut doc, &mut ctx);
        let spans = doc.find_all(doc.root(), "span");
        assert_eq!(doc[spans[0]].attr("class"), Some("x s0"));
        assert_eq!(doc[spans[0]].attr("style"), Some("top: 10px; left: 5px"));
        assert_eq!(doc[spans[1]].attr("class"), None);
        assert_eq!(doc[spans[1]].attr("style"), Some("left: 1px"));
    }

    #[test]
    fn test_extract_numbers_after_existing() {
        let mut doc = HtmlDocument::parse(
            r#"<html><head><style>.s4 { font-size: 8px }</style></head>
            <body><span style="font-size: 10px">a</span><span style="font-size: 10px">b</span><span style="color: red">c</span></body></html>"#,
        )
        .unwrap();
        let mut ctx = PipelineContext::new();
        assert_eq!(extract_styles_into_head(&mut doc, &mut ctx), 2);
        let spans = doc.find_all(doc.root(), "span");
        assert_eq!(doc[spans[0]].attr("class"), Some("s5"));
        assert_eq!(doc[spans[1]].attr("class"), Some("s5"));
        assert_eq!(doc[spans[2]].attr("class"), Some("s6"));
    }

    #[test]
    fn test_extract_warns_on_malformed() {
        let mut doc =
            HtmlDocument::parse(r#"<span style="color; font-size: 9px">a</span>"#).unwrap();
        let mut ctx = PipelineContext::new();
        extract_styles_into_head(&mut doc, &mut ctx);
        assert_eq!(ctx.diagnostics().len(), 1);
        assert_eq!(head_styles(&doc), vec![".s0 { font-size: 9px }"]);
    }

    #[test]
    fn test_normalize_merges_equivalent() {
        let mut doc = HtmlDocument::parse(
            r#"<html><head>
            <style>.s2 { font-family: ABCDEF+Arial-BoldMT; font-size: 9px }</style>
            <style>.s10 { font-family: ArialMT; font-size: 9px; font-weight: bold }</style>
            <style>.s3 { font-family: ArialMT; font-size: 10px }</style>
            </head><body>
            <span class="s2">a</span><span class="s10 s2">b</span><span class="s3">c</span>
            </body></html>"#,
        )
        .unwrap();
        let mut ctx = PipelineContext::new();
        let report = normalize(&mut doc, &mut ctx);
        assert_eq!(report.styles_before, 3);
        assert_eq!(report.styles_after, 2);

        let table = StyleTable::from_document(&doc);
        assert!(table.contains(&ClassName::new("s10").to_ref()));
        assert!(!table.contains(&ClassName::new("s2").to_ref()));
        let spans = doc.find_all(doc.root(), "span");
        assert_eq!(doc[spans[0]].attr("class"), Some("s10"));
        assert_eq!(doc[spans[1]].attr("class"), Some("s10"));
        assert_eq!(doc[spans[2]].attr("class"), Some("s3"));
        assert_eq!(
            table.get(&ClassName::new("s10").to_ref()).unwrap().to_css(),
            "font-family: ArialMT; font-size: 9px; font-weight: bold; font-style: normal"
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut doc = HtmlDocument::parse(
            r#"<html><head><style>.s0 { font-size: 9px }</style><style>.s1 { font-size: 9px }</style></head>
            <body><span class="s1">a</span></body></html>"#,
        )
        .unwrap();
        let mut ctx = PipelineContext::new();
        normalize(&mut doc, &mut ctx);
        let once = doc.serialize();
        let report = normalize(&mut doc, &mut ctx);
        assert_eq!(doc.serialize(), once);
        assert_eq!(report.elements_rewritten, 0);
    }

    #[test]
    fn test_abbreviate_with_collisions() {
        let mut doc = HtmlDocument::parse(
            r#"<html><head>
            <style>.s0 { font-family: TimesNewRomanPSMT; font-size: 12px; font-weight: bold; font-style: italic }</style>
            <style>.s1 { font-family: TimesNewRomanPSMT; font-size: 12px; font-weight: bold; font-style: italic; color: red }</style>
            </head><body><span class="s0">a</span><span class="s1">b</span></body></html>"#,
        )
        .unwrap();
        let mapping = abbreviate(&mut doc);
        assert_eq!(
            mapping[&ClassName::new("s0").to_ref()].as_str(),
            ".timesnewromanpsmt_12_0_b_i"
        );
        assert_eq!(
            mapping[&ClassName::new("s1").to_ref()].as_str(),
            ".timesnewromanpsmt_12_0_b_i_2"
        );
        let spans = doc.find_all(doc.root(), "span");
        assert_eq!(doc[spans[1]].attr("class"), Some("timesnewromanpsmt_12_0_b_i_2"));
    }

    #[test]
    fn test_numeric_lookup_inline_then_class() {
        let doc = HtmlDocument::parse(
            r#"<html><head><style>.s0 { font-size: 9px }</style></head>
            <body><span class="s0" style="font-size: 14px">a</span><span class="s0">b</span><span>c</span></body></html>"#,
        )
        .unwrap();
        let table = StyleTable::from_document(&doc);
        let spans = doc.find_all(doc.root(), "span");
        assert_eq!(table.font_size(&doc[spans[0]]), Some(14.0));
        assert_eq!(table.font_size(&doc[spans[1]]), Some(9.0));
        assert_eq!(table.font_size(&doc[spans[2]]), None);
        assert_eq!(table.resolve(&doc[spans[0]]).get("font-size"), Some("14px"));
    }
}
