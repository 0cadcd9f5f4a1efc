//! HTML tidying for converted PDF output.
//!
//! [`tidy_document`] repairs the document skeleton, strips layout debris
//! (line breaks, empty wrappers, running headers, line numbers, oversized
//! banners), hoists styles into the head, joins split spans and collapses
//! nested wrapper divs. The document is mutated in place; [`tidy`] also
//! returns it serialized.

mod headers;

use std::collections::HashSet;

use ego_tree::NodeId;
use serde::Serialize;

pub use headers::{
    detect_pages, fit_line, remove_headers_and_footers, HeaderFooterOptions, LinearFit,
    PageGeometry,
};

use crate::error::Result;
use crate::model::{Element, HtmlDocument};
use crate::pipeline::PipelineContext;
use crate::style::{content_elements, extract_styles_into_head, normalize, StyleTable};

/// Tags that belong in the head.
const HEAD_TAGS: &[&str] = &["meta", "title", "script", "style", "link", "base"];

/// Options for [`tidy_document`].
#[derive(Debug, Clone)]
pub struct TidyOptions {
    /// Elements stripped from the body (their text is kept)
    pub remove_tags: Vec<String>,
    /// Remove spans and divs with no element children and blank text
    pub remove_empty: bool,
    /// Remove elements whose font size exceeds this many pixels
    pub large_font: Option<f64>,
    /// Remove positioned elements whose `left` is below this many pixels
    pub line_number_left: Option<f64>,
    /// Running header/footer removal
    pub header_footer: Option<HeaderFooterOptions>,
    /// Hoist text styles into head classes
    pub extract_styles: bool,
    /// Merge equivalent head styles
    pub normalize_styles: bool,
    /// Join adjacent spans with the same class
    pub coalesce_spans: bool,
    /// Collapse divs whose only content is another div
    pub collapse_divs: bool,
    /// Give every body element an `id`
    pub add_ids: bool,
}

impl Default for TidyOptions {
    fn default() -> Self {
        Self {
            remove_tags: vec!["br".to_string()],
            remove_empty: true,
            large_font: None,
            line_number_left: None,
            header_footer: None,
            extract_styles: true,
            normalize_styles: true,
            coalesce_spans: true,
            collapse_divs: true,
            add_ids: false,
        }
    }
}

impl TidyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for IPCC report conversions: large banners over 30px, line
    /// numbers left of 49px and 80px header/footer bands are removed, and
    /// every element gets an id.
    pub fn ipcc() -> Self {
        Self {
            large_font: Some(30.0),
            line_number_left: Some(49.0),
            header_footer: Some(HeaderFooterOptions::default()),
            add_ids: true,
            ..Self::default()
        }
    }

    pub fn with_remove_tags<S: AsRef<str>>(mut self, tags: &[S]) -> Self {
        self.remove_tags = tags.iter().map(|t| t.as_ref().to_string()).collect();
        self
    }

    pub fn with_remove_empty(mut self, enabled: bool) -> Self {
        self.remove_empty = enabled;
        self
    }

    pub fn with_large_font(mut self, threshold: f64) -> Self {
        self.large_font = Some(threshold);
        self
    }

    pub fn with_line_number_left(mut self, threshold: f64) -> Self {
        self.line_number_left = Some(threshold);
        self
    }

    pub fn with_header_footer(mut self, opts: HeaderFooterOptions) -> Self {
        self.header_footer = Some(opts);
        self
    }

    pub fn with_extract_styles(mut self, enabled: bool) -> Self {
        self.extract_styles = enabled;
        self
    }

    pub fn with_normalize_styles(mut self, enabled: bool) -> Self {
        self.normalize_styles = enabled;
        self
    }

    pub fn with_coalesce_spans(mut self, enabled: bool) -> Self {
        self.coalesce_spans = enabled;
        self
    }

    pub fn with_collapse_divs(mut self, enabled: bool) -> Self {
        self.collapse_divs = enabled;
        self
    }

    pub fn with_add_ids(mut self, enabled: bool) -> Self {
        self.add_ids = enabled;
        self
    }
}

/// Counts of what [`tidy_document`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TidyReport {
    pub tags_removed: usize,
    pub empty_removed: usize,
    pub large_font_removed: usize,
    pub line_numbers_removed: usize,
    pub header_footer_removed: usize,
    pub styles_extracted: usize,
    pub styles_merged: usize,
    pub spans_joined: usize,
    pub divs_collapsed: usize,
    pub ids_added: usize,
}

/// Tidy `doc` in place and return it serialized.
pub fn tidy(
    doc: &mut HtmlDocument,
    opts: &TidyOptions,
    ctx: &mut PipelineContext,
) -> Result<String> {
    tidy_document(doc, opts, ctx)?;
    Ok(doc.serialize())
}

/// Tidy `doc` in place.
///
/// Running this twice gives the same document as running it once.
pub fn tidy_document(
    doc: &mut HtmlDocument,
    opts: &TidyOptions,
    ctx: &mut PipelineContext,
) -> Result<TidyReport> {
    let mut report = TidyReport::default();

    ensure_skeleton(doc);
    for tag in &opts.remove_tags {
        report.tags_removed += strip_tags(doc, tag);
    }
    if let Some(threshold) = opts.large_font {
        report.large_font_removed = remove_where(doc, "font-size", |size| size > threshold);
    }
    if let Some(threshold) = opts.line_number_left {
        report.line_numbers_removed = remove_where(doc, "left", |left| left < threshold);
    }
    if let Some(hf) = &opts.header_footer {
        report.header_footer_removed = remove_headers_and_footers(doc, hf, ctx)?;
    }
    if opts.remove_empty {
        report.empty_removed = remove_empty_wrappers(doc);
    }
    if opts.extract_styles {
        report.styles_extracted = extract_styles_into_head(doc, ctx);
    }
    if opts.normalize_styles {
        let normalized = normalize(doc, ctx);
        report.styles_merged = normalized.styles_before - normalized.styles_after;
    }
    if opts.coalesce_spans {
        report.spans_joined = coalesce_spans(doc);
    }
    if opts.collapse_divs {
        report.divs_collapsed = collapse_single_child_divs(doc);
    }
    if opts.add_ids {
        report.ids_added = add_ids(doc, ctx);
    }

    log::debug!("tidy: {:?}", report);
    ctx.snapshot("tidy", doc)?;
    Ok(report)
}

/// Give the document an `html` root holding one `head` then one `body`,
/// with head-only elements in the head and a single leading
/// `<meta charset="utf-8">`.
pub fn ensure_skeleton(doc: &mut HtmlDocument) {
    doc.wrap_root("html");
    let root = doc.root();

    let heads = doc.child_elements(root, "head");
    let bodies = doc.child_elements(root, "body");
    let head = match heads.first() {
        Some(&h) => h,
        None => doc.create(Element::new("head")),
    };
    let body = match bodies.first() {
        Some(&b) => b,
        None => doc.create(Element::new("body")),
    };

    // extra heads and bodies are merged into the first ones
    for &extra in heads.iter().skip(1) {
        move_children(doc, extra, head);
        doc.remove(extra);
    }
    for &extra in bodies.iter().skip(1) {
        move_children(doc, extra, body);
        doc.remove(extra);
    }

    let mut before_body = Vec::new();
    let mut seen_body = false;
    for child in doc.children(root) {
        if child == head {
            continue;
        }
        if child == body {
            seen_body = true;
            continue;
        }
        if HEAD_TAGS.contains(&doc.tag(child)) {
            doc.append_child(head, child);
        } else if seen_body {
            doc.append_child(body, child);
        } else {
            before_body.push(child);
        }
    }
    for child in before_body.into_iter().rev() {
        doc.prepend_child(body, child);
    }
    if let Some(text) = doc[root].text.take().filter(|t| !t.trim().is_empty()) {
        let existing = doc[body].text.take().unwrap_or_default();
        doc[body].text = Some(text + &existing);
    }

    let strays: Vec<NodeId> = doc
        .children(head)
        .into_iter()
        .filter(|&c| !HEAD_TAGS.contains(&doc.tag(c)))
        .collect();
    for child in strays.into_iter().rev() {
        doc.prepend_child(body, child);
    }
    for id in doc.descendants(body) {
        if matches!(doc.tag(id), "meta" | "link" | "style" | "title") {
            doc.remove(id);
            doc.append_child(head, id);
        }
    }

    doc.prepend_child(root, head);
    doc.insert_after(head, body);
    doc[head].tail = None;
    doc[body].tail = None;

    for meta in doc.child_elements(head, "meta") {
        if doc[meta].has_attr("charset") {
            doc.remove(meta);
        }
    }
    let charset = doc.create(Element::new("meta").with_attr("charset", "utf-8"));
    doc.prepend_child(head, charset);
}

fn move_children(doc: &mut HtmlDocument, from: NodeId, to: NodeId) {
    if let Some(text) = doc[from].text.take() {
        doc.push_text_end(to, &text);
    }
    for child in doc.children(from) {
        doc.append_child(to, child);
    }
}

/// Replace every body element with the given tag by its content.
pub fn strip_tags(doc: &mut HtmlDocument, tag: &str) -> usize {
    let targets: Vec<NodeId> = content_elements(doc)
        .into_iter()
        .filter(|&id| doc[id].is(tag) && doc.parent(id).is_some())
        .collect();
    for &id in &targets {
        doc.unwrap(id);
    }
    targets.len()
}

/// Remove body elements whose numeric `property` satisfies `pred`.
fn remove_where(doc: &mut HtmlDocument, property: &str, pred: impl Fn(f64) -> bool) -> usize {
    let styles = StyleTable::from_document(doc);
    let body = doc.body();
    let doomed: Vec<NodeId> = content_elements(doc)
        .into_iter()
        .filter(|&id| Some(id) != body)
        .filter(|&id| styles.numeric(&doc[id], property).is_some_and(&pred))
        .collect();

    let mut removed = 0;
    for id in doomed {
        if doc.is_attached(id) {
            doc.remove(id);
            removed += 1;
        }
    }
    if removed > 0 {
        log::debug!("removed {} elements by {}", removed, property);
    }
    removed
}

/// Unwrap spans and divs that have no element children and only blank
/// text. Elements carrying an `id` are kept as link targets.
pub fn remove_empty_wrappers(doc: &mut HtmlDocument) -> usize {
    let mut removed = 0;
    // innermost first, so emptied parents are caught in the same sweep
    for id in content_elements(doc).into_iter().rev() {
        let el = &doc[id];
        if !(el.is("span") || el.is("div")) || el.has_attr("id") {
            continue;
        }
        if doc.first_child(id).is_none()
            && el.text_str().trim().is_empty()
            && doc.parent(id).is_some()
        {
            doc.unwrap(id);
            removed += 1;
        }
    }
    removed
}

/// Join adjacent sibling spans that carry the same class attribute.
///
/// The spans must hold only text and be separated by nothing but
/// whitespace. A single space is inserted at the join unless one of the
/// joined edges is already whitespace.
pub fn coalesce_spans(doc: &mut HtmlDocument) -> usize {
    let mut joined = 0;
    for span in content_elements(doc) {
        if !doc.is_attached(span) || !is_plain_span(doc, span) {
            continue;
        }
        while let Some(next) = doc.next_sibling(span) {
            if !is_plain_span(doc, next)
                || doc[span].attr("class") != doc[next].attr("class")
                || !doc[span].tail_str().trim().is_empty()
            {
                break;
            }
            // the gap is whitespace only and never adds a second space
            doc[span].tail = None;
            let left = doc[span].text.take().unwrap_or_default();
            let right = doc[next].text.take().unwrap_or_default();
            let needs_space = !left.is_empty()
                && !right.is_empty()
                && !left.ends_with(char::is_whitespace)
                && !right.starts_with(char::is_whitespace);
            let sep = if needs_space { " " } else { "" };
            doc[span].text = Some(format!("{}{}{}", left, sep, right));
            doc[span].tail = doc[next].tail.take();
            doc.detach(next);
            joined += 1;
        }
    }
    joined
}

fn is_plain_span(doc: &HtmlDocument, id: NodeId) -> bool {
    doc[id].is("span") && doc[id].has_attr("class") && doc.first_child(id).is_none()
}

/// Replace divs whose only content is a single child div by that child,
/// repeating until nothing changes.
pub fn collapse_single_child_divs(doc: &mut HtmlDocument) -> usize {
    let mut collapsed = 0;
    loop {
        let mut changed = false;
        for id in content_elements(doc) {
            if !doc[id].is("div") || doc.parent(id).is_none() {
                continue;
            }
            let children = doc.children(id);
            let [only] = children.as_slice() else {
                continue;
            };
            if doc[*only].is("div")
                && doc[id].text_str().trim().is_empty()
                && doc[*only].tail_str().trim().is_empty()
            {
                doc.unwrap(id);
                collapsed += 1;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    collapsed
}

/// Give every body element without one an `id` of the form `id{n}`,
/// skipping values already in use.
pub fn add_ids(doc: &mut HtmlDocument, ctx: &mut PipelineContext) -> usize {
    let elements = content_elements(doc);
    let mut used: HashSet<String> = doc
        .descendants(doc.root())
        .into_iter()
        .filter_map(|id| doc[id].attr("id").map(str::to_string))
        .collect();

    let mut added = 0;
    for id in elements {
        if doc[id].has_attr("id") {
            continue;
        }
        let value = loop {
            let candidate = ctx.next_id("id");
            if !used.contains(&candidate) {
                break candidate;
            }
        };
        used.insert(value.clone());
        doc[id].set_attr("id", value);
        added += 1;
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::normalize_ws;

    fn run(html: &str, opts: &TidyOptions) -> (HtmlDocument, TidyReport) {
        let mut doc = HtmlDocument::parse(html).unwrap();
        let report = tidy_document(&mut doc, opts, &mut PipelineContext::new()).unwrap();
        (doc, report)
    }

    #[test]
    fn test_skeleton_has_single_charset_first() {
        let (doc, _) = run(
            r#"<html><head><meta charset="latin1"><title>T</title></head><body><p>x</p></body></html>"#,
            &TidyOptions::new(),
        );
        let head = doc.head().unwrap();
        let children = doc.children(head);
        assert_eq!(doc[children[0]].attr("charset"), Some("utf-8"));
        assert_eq!(doc.child_elements(head, "meta").len(), 1);
        assert_eq!(doc.child_elements(head, "title").len(), 1);
    }

    #[test]
    fn test_skeleton_moves_body_styles_to_head() {
        let (doc, _) = run(
            "<body><style>.x { color: red }</style><p>text</p></body>",
            &TidyOptions::new().with_extract_styles(false).with_normalize_styles(false),
        );
        let head = doc.head().unwrap();
        assert_eq!(doc.child_elements(head, "style").len(), 1);
        assert!(doc.find_first(doc.body().unwrap(), "style").is_none());
    }

    #[test]
    fn test_strip_br_keeps_text() {
        let (doc, report) = run("<p>one<br>two</p>", &TidyOptions::new());
        assert_eq!(report.tags_removed, 1);
        let body = doc.body().unwrap();
        assert_eq!(doc.text_content(body), "onetwo");
    }

    #[test]
    fn test_empty_wrappers_removed_keeping_tail() {
        let (doc, report) = run(
            "<div><span> </span>kept<div></div> tail</div>",
            &TidyOptions::new().with_collapse_divs(false),
        );
        assert_eq!(report.empty_removed, 2);
        let body = doc.body().unwrap();
        assert_eq!(normalize_ws(&doc.text_content(body)), "kept tail");
    }

    #[test]
    fn test_large_font_and_line_numbers() {
        let (doc, report) = run(
            r#"<body>
            <div style="font-size: 40px">BANNER</div>
            <div style="left: 20px; top: 300px">17</div>
            <div style="left: 90px; font-size: 10px">prose</div>
            </body>"#,
            &TidyOptions::new().with_large_font(30.0).with_line_number_left(49.0),
        );
        assert_eq!(report.large_font_removed, 1);
        assert_eq!(report.line_numbers_removed, 1);
        assert_eq!(normalize_ws(&doc.text_content(doc.body().unwrap())), "prose");
    }

    #[test]
    fn test_coalesce_same_class_spans() {
        let (doc, report) = run(
            r#"<div><span style="font-size: 9px">Climate</span><span style="font-size: 9px">change</span> <span style="font-size: 9px">is</span><span style="font-size: 12px">real</span></div>"#,
            &TidyOptions::new(),
        );
        assert_eq!(report.spans_joined, 2);
        let body = doc.body().unwrap();
        let spans = doc.find_all(body, "span");
        assert_eq!(spans.len(), 2);
        assert_eq!(doc[spans[0]].text_str(), "Climate change is");
        assert_eq!(doc[spans[1]].text_str(), "real");
    }

    #[test]
    fn test_coalesce_respects_existing_whitespace() {
        let (doc, _) = run(
            r#"<div><span class="a">one </span><span class="a">two</span></div>"#,
            &TidyOptions::new(),
        );
        let span = doc.find_first(doc.body().unwrap(), "span").unwrap();
        assert_eq!(doc[span].text_str(), "one two");
    }

    #[test]
    fn test_coalesce_whitespace_gap_single_space() {
        let (doc, report) = run(
            r#"<div><span class="a">word </span> <span class="a">next</span> <span class="a"> last</span></div>"#,
            &TidyOptions::new(),
        );
        assert_eq!(report.spans_joined, 2);
        let span = doc.find_first(doc.body().unwrap(), "span").unwrap();
        assert_eq!(doc[span].text_str(), "word next last");
    }

    #[test]
    fn test_collapse_nested_divs() {
        let (doc, report) = run(
            r#"<div class="outer"><div class="mid"><div class="inner"><span>x</span></div></div></div>"#,
            &TidyOptions::new(),
        );
        assert_eq!(report.divs_collapsed, 2);
        let body = doc.body().unwrap();
        let divs = doc.find_all(body, "div");
        assert_eq!(divs.len(), 1);
        assert_eq!(doc[divs[0]].attr("class"), Some("inner"));
    }

    #[test]
    fn test_collapse_keeps_divs_with_text() {
        let (doc, report) = run(
            "<div>label<div><span>x</span></div></div>",
            &TidyOptions::new(),
        );
        assert_eq!(report.divs_collapsed, 0);
        assert_eq!(doc.find_all(doc.body().unwrap(), "div").len(), 2);
    }

    #[test]
    fn test_add_ids_skips_existing() {
        let (doc, report) = run(
            r#"<p id="id1">a</p><p>b</p><p>c</p>"#,
            &TidyOptions::new().with_add_ids(true),
        );
        let body = doc.body().unwrap();
        let ps = doc.find_all(body, "p");
        // body, second and third paragraph
        assert_eq!(report.ids_added, 3);
        assert_eq!(doc[body].attr("id"), Some("id0"));
        assert_eq!(doc[ps[0]].attr("id"), Some("id1"));
        assert_eq!(doc[ps[1]].attr("id"), Some("id2"));
        assert_eq!(doc[ps[2]].attr("id"), Some("id3"));
    }

    #[test]
    fn test_tidy_is_idempotent() {
        let input = r#"<body>
            <div style="top: 10px"><a name="1">Page 1</a></div>
            <div style="top: 500px; left: 72px"><span style="font-family: Arial-BoldMT; font-size: 11px">Section</span><span style="font-family: Arial-BoldMT; font-size: 11px">1</span></div>
            <div style="top: 600px; left: 30px">12</div>
            <div style="top: 1010px"><a name="2">Page 2</a></div>
            <div><div style="top: 1500px"><span style="font-size: 9px">body<br>text</span></div></div>
            </body>"#;
        let opts = TidyOptions::ipcc();
        let mut doc = HtmlDocument::parse(input).unwrap();
        let mut ctx = PipelineContext::new();
        let once = tidy(&mut doc, &opts, &mut ctx).unwrap();

        let mut again = HtmlDocument::parse(&once).unwrap();
        let twice = tidy(&mut again, &opts, &mut ctx).unwrap();
        assert_eq!(normalize_ws(&once), normalize_ws(&twice));
        assert!(once.contains("Section 1"));
        assert!(!once.contains(">12<"));
    }
}
