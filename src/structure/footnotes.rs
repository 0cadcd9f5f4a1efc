//! Footnote extraction from small-font numbered spans.

use ego_tree::NodeId;

use crate::model::{normalize_ws, Element, Footnote, HtmlDocument};
use crate::pipeline::PipelineContext;
use crate::style::StyleTable;

/// Class the IPCC rule set gives micro-font footnote numbers.
pub const IPCC_FOOTNOTE_CLASS: &str = "footnote";

/// Footnote recognition settings.
#[derive(Debug, Clone)]
pub struct FootnoteOptions {
    /// Class of the small-font spans holding footnote numbers
    pub marker_class: String,
    /// Classes of the spans making up a footnote body
    pub text_classes: Vec<String>,
    /// Largest accepted jump between successive footnote numbers
    pub max_gap: u32,
    /// Spans at or below this font size also count as body spans
    pub max_font_size: Option<f64>,
}

impl FootnoteOptions {
    /// Footnotes numbered in `marker_class` spans whose bodies use the
    /// same class.
    pub fn new(marker_class: impl Into<String>) -> Self {
        let marker_class = marker_class.into();
        Self {
            text_classes: vec![marker_class.clone()],
            marker_class,
            max_gap: 4,
            max_font_size: None,
        }
    }

    /// Numbers marked `footnote` by the IPCC rules, with bodies in any
    /// font of at most 7px.
    pub fn ipcc() -> Self {
        Self::new(IPCC_FOOTNOTE_CLASS).with_max_font_size(7.0)
    }

    pub fn with_text_classes<S: AsRef<str>>(mut self, classes: &[S]) -> Self {
        self.text_classes = classes.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    pub fn with_max_gap(mut self, max_gap: u32) -> Self {
        self.max_gap = max_gap;
        self
    }

    pub fn with_max_font_size(mut self, size: f64) -> Self {
        self.max_font_size = Some(size);
        self
    }

    fn is_body(&self, doc: &HtmlDocument, styles: &StyleTable, id: NodeId) -> bool {
        if self.text_classes.iter().any(|c| doc[id].has_class(c)) {
            return true;
        }
        self.max_font_size.is_some_and(|max| {
            doc[id].is("span") && styles.font_size(&doc[id]).is_some_and(|size| size <= max)
        })
    }

    /// Footnote number held by a marker span, if it is one.
    fn number(&self, doc: &HtmlDocument, id: NodeId) -> Option<u32> {
        if !doc[id].is("span") || !doc[id].has_class(&self.marker_class) {
            return None;
        }
        doc.text_content(id).trim().parse().ok()
    }

    /// Whether `n` may follow the footnote numbered `previous`.
    fn accepts(&self, previous: Option<u32>, n: u32) -> bool {
        match previous {
            None => n == 1,
            Some(prev) => n > prev && n - prev <= self.max_gap,
        }
    }
}

/// Move numbered footnotes out of the body into `<ul class="footnotes">`
/// in the back matter, one `<li class="footnote" id="footnote_N">` each
/// holding the number span and its body spans.
///
/// A marker is accepted when its number is 1 for the first footnote, or
/// exceeds the previous one by at most `max_gap`, and its next sibling is
/// a body span. Body spans are consumed while they follow each other with
/// only whitespace between them, stopping at the next acceptable marker.
pub fn extract_footnotes(
    doc: &mut HtmlDocument,
    opts: &FootnoteOptions,
    ctx: &mut PipelineContext,
) -> Vec<Footnote> {
    let Some(body) = doc.body() else {
        return Vec::new();
    };
    let back = super::find_back_matter(doc);
    let existing = back.and_then(|b| footnote_list(doc, b));
    let mut previous = existing.and_then(|list| last_number(doc, list));
    let styles = StyleTable::from_document(doc);

    let candidates: Vec<NodeId> = doc
        .descendants(body)
        .into_iter()
        .filter(|&id| !back.is_some_and(|b| id == b || doc.ancestors(id).contains(&b)))
        .filter(|&id| opts.number(doc, id).is_some())
        .collect();

    let mut groups: Vec<(u32, NodeId, Vec<NodeId>)> = Vec::new();
    for marker in candidates {
        let Some(n) = opts.number(doc, marker) else {
            continue;
        };
        if groups.iter().any(|(_, _, parts)| parts.contains(&marker)) {
            continue;
        }
        if !opts.accepts(previous, n) {
            if previous.is_some_and(|p| n > p) {
                ctx.warn(
                    "footnotes",
                    format!(
                        "footnote {} skipped: gap after {} exceeds {}",
                        n,
                        previous.unwrap_or(0),
                        opts.max_gap
                    ),
                );
            }
            continue;
        }

        let mut parts = Vec::new();
        let mut current = marker;
        while let Some(next) = doc.next_sibling(current) {
            if !doc[current].tail_str().trim().is_empty() || !opts.is_body(doc, &styles, next) {
                break;
            }
            if opts.number(doc, next).is_some_and(|m| opts.accepts(Some(n), m)) {
                break;
            }
            parts.push(next);
            current = next;
        }
        if parts.is_empty() {
            continue;
        }
        previous = Some(n);
        groups.push((n, marker, parts));
    }
    if groups.is_empty() {
        return Vec::new();
    }

    let back = super::back_matter(doc);
    let list = match footnote_list(doc, back) {
        Some(list) => list,
        None => {
            let list = doc.create(Element::new("ul").with_attr("class", "footnotes"));
            doc.append_child(back, list);
            list
        }
    };

    let mut footnotes = Vec::with_capacity(groups.len());
    for (n, marker, parts) in groups {
        let item = doc.create(
            Element::new("li")
                .with_attr("class", "footnote")
                .with_attr("id", format!("footnote_{}", n)),
        );
        doc.append_child(list, item);

        let marker_text = normalize_ws(&doc.text_content(marker));
        let body_text = normalize_ws(
            &parts
                .iter()
                .map(|&p| doc.text_content(p))
                .collect::<Vec<_>>()
                .join(" "),
        );
        for id in std::iter::once(marker).chain(parts) {
            doc.remove(id);
            doc.append_child(item, id);
        }
        footnotes.push(Footnote {
            number: n,
            marker: marker_text,
            body: body_text,
        });
    }

    log::debug!("extracted {} footnotes", footnotes.len());
    footnotes
}

fn footnote_list(doc: &HtmlDocument, back: NodeId) -> Option<NodeId> {
    doc.child_elements(back, "ul")
        .into_iter()
        .find(|&ul| doc[ul].has_class("footnotes"))
}

fn last_number(doc: &HtmlDocument, list: NodeId) -> Option<u32> {
    doc.child_elements(list, "li")
        .into_iter()
        .filter_map(|li| doc[li].attr("id")?.strip_prefix("footnote_")?.parse().ok())
        .max()
}
