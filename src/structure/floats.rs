//! Figure, table and box extraction from START/END text markers.

use std::collections::HashSet;

use ego_tree::NodeId;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{normalize_ws, Element, Float, FloatKind, HtmlDocument};
use crate::pipeline::PipelineContext;

/// `[START FIGURE 3.1 HERE]`, `END TABLE 2.4`, `[START CROSS-CHAPTER BOX 1 HERE]`
pub static FLOAT_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\[?\s*(?P<action>START|END)\s+(?P<object>FIGURE|TABLE|(?:[A-Z][A-Z-]*\s+)?BOX)\s+(?P<id>[A-Za-z0-9][A-Za-z0-9.\-]*)\s*(?:HERE)?\s*\]?$",
    )
    .unwrap()
});

/// Whether a marker opens or closes a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerAction {
    Start,
    End,
}

/// A parsed float marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloatMarker {
    pub action: MarkerAction,
    pub kind: FloatKind,
    pub object: String,
    pub id: String,
    pub text: String,
}

impl FloatMarker {
    /// Parse marker text; surrounding whitespace is ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let text = normalize_ws(text);
        let caps = FLOAT_MARKER.captures(&text)?;
        let object = caps["object"].to_string();
        Some(Self {
            action: if &caps["action"] == "START" {
                MarkerAction::Start
            } else {
                MarkerAction::End
            },
            kind: FloatKind::from_marker(&object)?,
            object,
            id: caps["id"].to_string(),
            text: text.clone(),
        })
    }

    /// Key pairing a START with its END.
    fn key(&self) -> (String, String) {
        (self.object.clone(), self.id.clone())
    }
}

/// Marker elements outside `skip`, in document order. Only elements without
/// element children are considered.
fn find_markers(
    doc: &HtmlDocument,
    root: NodeId,
    skip: Option<NodeId>,
) -> Vec<(NodeId, FloatMarker)> {
    doc.descendants(root)
        .into_iter()
        .filter(|&id| doc.first_child(id).is_none())
        .filter(|&id| !skip.is_some_and(|s| id == s || doc.ancestors(id).contains(&s)))
        .filter_map(|id| FloatMarker::parse(doc[id].text_str()).map(|m| (id, m)))
        .collect()
}

/// Maximal elements strictly between `start` and `end` (or the end of
/// `root`), in document order.
fn elements_between(
    doc: &HtmlDocument,
    root: NodeId,
    start: NodeId,
    end: Option<NodeId>,
    skip: Option<NodeId>,
) -> Vec<NodeId> {
    let end_ancestors: HashSet<NodeId> = end
        .map(|e| doc.ancestors(e).into_iter().collect())
        .unwrap_or_default();
    let start_subtree: HashSet<NodeId> = doc.descendants(start).into_iter().collect();

    let mut picked: Vec<NodeId> = Vec::new();
    let mut picked_set: HashSet<NodeId> = HashSet::new();
    let mut after_start = false;
    for id in doc.descendants(root) {
        if id == start {
            after_start = true;
            continue;
        }
        if !after_start || start_subtree.contains(&id) {
            continue;
        }
        if Some(id) == end {
            break;
        }
        if end_ancestors.contains(&id) || Some(id) == skip {
            continue;
        }
        let ancestors = doc.ancestors(id);
        if skip.is_some_and(|s| ancestors.contains(&s)) {
            continue;
        }
        if ancestors.iter().any(|a| picked_set.contains(a)) {
            continue;
        }
        picked_set.insert(id);
        picked.push(id);
    }
    picked
}

/// Remove a marker, then any span or div ancestors it leaves empty.
fn remove_marker(doc: &mut HtmlDocument, marker: NodeId, stop: NodeId) {
    let mut current = doc.parent(marker);
    doc.remove(marker);
    while let Some(id) = current {
        if id == stop || !(doc[id].is("div") || doc[id].is("span")) {
            break;
        }
        if doc.first_child(id).is_some() || !doc[id].text_str().trim().is_empty() {
            break;
        }
        current = doc.parent(id);
        doc.remove(id);
    }
}

/// Move the content between one START/END pair into a float div appended
/// to `back`.
fn lift(
    doc: &mut HtmlDocument,
    body: NodeId,
    back: NodeId,
    start: (NodeId, &FloatMarker),
    end: Option<(NodeId, &FloatMarker)>,
) -> Float {
    let (start_id, start_marker) = start;
    let contents = elements_between(doc, body, start_id, end.map(|(e, _)| e), Some(back));

    let float = Float {
        kind: start_marker.kind,
        object: start_marker.object.clone(),
        id: start_marker.id.clone(),
        start_anchor: start_marker.text.clone(),
        end_anchor: end.map(|(_, m)| m.text.clone()).unwrap_or_default(),
        contents: contents.len(),
        unmatched: end.is_none(),
    };
    let container = doc.create(
        Element::new("div")
            .with_attr("class", "float")
            .with_attr("id", float.element_id())
            .with_attr("title", float.title()),
    );
    doc.append_child(back, container);

    if let Some(text) = doc[start_id].tail.take() {
        if !text.trim().is_empty() {
            doc[container].text = Some(text);
        }
    }
    for id in contents {
        doc.append_child(container, id);
    }
    remove_marker(doc, start_id, body);
    if let Some((end_id, _)) = end {
        remove_marker(doc, end_id, body);
    }
    float
}

/// Pair START/END markers in the body and move each float's content into
/// the back matter.
///
/// Markers nest: an END closes the innermost open START with the same
/// object and id; starts left open above it are crossed and, like starts
/// never closed, run to the end of the document unless an earlier float
/// already carried them into the back matter. Unpaired END markers are
/// left in place. Every irregular marker is reported through `ctx` and
/// returned in the unmatched list.
pub fn extract_floats(
    doc: &mut HtmlDocument,
    ctx: &mut PipelineContext,
) -> (Vec<Float>, Vec<String>) {
    let Some(body) = doc.body() else {
        return (Vec::new(), Vec::new());
    };
    let existing_back = super::find_back_matter(doc);
    let markers = find_markers(doc, body, existing_back);
    if markers.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let mut pairs: Vec<(usize, usize)> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut unclosed: Vec<usize> = Vec::new();
    let mut unmatched = Vec::new();
    for (i, (_, marker)) in markers.iter().enumerate() {
        match marker.action {
            MarkerAction::Start => open.push(i),
            MarkerAction::End => {
                let key = marker.key();
                let Some(pos) = open.iter().rposition(|&s| markers[s].1.key() == key) else {
                    ctx.warn("floats", format!("END marker without START: '{}'", marker.text));
                    unmatched.push(marker.text.clone());
                    continue;
                };
                for crossed in open.drain(pos + 1..) {
                    ctx.warn(
                        "floats",
                        format!(
                            "marker '{}' crossed by '{}'; closing at end of document",
                            markers[crossed].1.text, marker.text
                        ),
                    );
                    unmatched.push(markers[crossed].1.text.clone());
                    unclosed.push(crossed);
                }
                if let Some(start) = open.pop() {
                    pairs.push((start, i));
                }
            }
        }
    }
    for start in open.into_iter().rev() {
        ctx.warn(
            "floats",
            format!(
                "START marker without END: '{}'; closing at end of document",
                markers[start].1.text
            ),
        );
        unmatched.push(markers[start].1.text.clone());
        unclosed.push(start);
    }

    let back = super::back_matter(doc);
    let mut floats = Vec::new();
    for (start, end) in pairs {
        let (start_id, start_marker) = &markers[start];
        let (end_id, end_marker) = &markers[end];
        floats.push(lift(
            doc,
            body,
            back,
            (*start_id, start_marker),
            Some((*end_id, end_marker)),
        ));
    }
    // starts already carried into another float stay there as content
    for start in unclosed {
        let (start_id, start_marker) = &markers[start];
        if !doc.ancestors(*start_id).contains(&back) {
            floats.push(lift(doc, body, back, (*start_id, start_marker), None));
        }
    }

    log::debug!(
        "extracted {} floats ({} irregular markers)",
        floats.len(),
        unmatched.len()
    );
    (floats, unmatched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_markers() {
        let m = FloatMarker::parse(" [START FIGURE 3.1 HERE] ").unwrap();
        assert_eq!(m.action, MarkerAction::Start);
        assert_eq!(m.kind, FloatKind::Figure);
        assert_eq!(m.id, "3.1");

        let m = FloatMarker::parse("END TABLE SPM.2").unwrap();
        assert_eq!(m.action, MarkerAction::End);
        assert_eq!(m.id, "SPM.2");

        let m = FloatMarker::parse("[START CROSS-CHAPTER BOX 1 HERE]").unwrap();
        assert_eq!(m.kind, FloatKind::Box);
        assert_eq!(m.object, "CROSS-CHAPTER BOX");

        assert!(FloatMarker::parse("START here with words").is_none());
        assert!(FloatMarker::parse("see FIGURE 3.1").is_none());
    }

    #[test]
    fn test_float_moved_to_back_matter() {
        let mut doc = HtmlDocument::parse(
            r#"<body><div><span>Before.</span></div><div><span>[START FIGURE 3.1 HERE]</span></div><div><span>Figure content</span></div><div><span>[END FIGURE 3.1 HERE]</span></div><div><span>After.</span></div></body>"#,
        )
        .unwrap();
        let mut ctx = PipelineContext::new();
        let (floats, unmatched) = extract_floats(&mut doc, &mut ctx);

        assert_eq!(floats.len(), 1);
        assert!(unmatched.is_empty());
        assert_eq!(floats[0].element_id(), "FIGURE3.1");
        assert!(!floats[0].unmatched);

        let html = doc.serialize();
        assert!(html.contains(r#"<div class="float" id="FIGURE3.1" title="FIGURE 3.1"><div><span>Figure content</span></div></div>"#));
        assert!(!html.contains("START FIGURE"));
        assert!(!html.contains("END FIGURE"));
        let body = doc.body().unwrap();
        let children = doc.children(body);
        assert_eq!(children.len(), 3);
        assert_eq!(doc.text_content(children[1]), "After.");
    }

    #[test]
    fn test_unclosed_start_runs_to_end() {
        let mut doc = HtmlDocument::parse(
            r#"<body><p>Prose.</p><p>[START TABLE 2.1 HERE]</p><p>row one</p><p>row two</p></body>"#,
        )
        .unwrap();
        let mut ctx = PipelineContext::new();
        let (floats, unmatched) = extract_floats(&mut doc, &mut ctx);
        assert_eq!(floats.len(), 1);
        assert!(floats[0].unmatched);
        assert_eq!(floats[0].contents, 2);
        assert_eq!(unmatched, vec!["[START TABLE 2.1 HERE]"]);
        assert_eq!(ctx.diagnostics().len(), 1);
    }

    #[test]
    fn test_crossed_markers_logged() {
        let mut doc = HtmlDocument::parse(
            r#"<body><p>[START FIGURE 1 HERE]</p><p>a</p><p>[START TABLE 1 HERE]</p><p>b</p><p>[END FIGURE 1 HERE]</p><p>c</p><p>[END TABLE 1 HERE]</p></body>"#,
        )
        .unwrap();
        let mut ctx = PipelineContext::new();
        let (floats, unmatched) = extract_floats(&mut doc, &mut ctx);
        assert_eq!(floats.len(), 1);
        assert_eq!(floats[0].object, "FIGURE");
        // TABLE 1 was crossed, and its END then has nothing to close
        assert!(unmatched.contains(&"[START TABLE 1 HERE]".to_string()));
        assert!(unmatched.contains(&"[END TABLE 1 HERE]".to_string()));
    }

    #[test]
    fn test_no_markers_is_noop() {
        let mut doc = HtmlDocument::parse("<body><p>nothing</p></body>").unwrap();
        let before = doc.serialize();
        let (floats, _) = extract_floats(&mut doc, &mut PipelineContext::new());
        assert!(floats.is_empty());
        assert_eq!(doc.serialize(), before);
    }
}
