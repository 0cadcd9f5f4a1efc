//! In-text citation and reference list recognition.
//!
//! Bracketed author-date citations such as `(Gattuso et al. 2018; Lave
//! 1991)` are split into [`Biblioref`]s and optionally turned into anchors
//! pointing at the reference list. DOIs written as `doi:...` become
//! `https://doi.org/...` links.

use std::collections::HashSet;

use ego_tree::NodeId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::Result;
use crate::model::{
    normalize_ws, push_text, slug, Biblioref, Element, HtmlDocument, Locator, Reference,
};
use crate::pipeline::PipelineContext;

/// A bracket whose body starts like an author and ends with a year.
pub static BRACKET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\((?P<body>(?:[A-Z]|de|d')[^()]*?(?:20|19)\d\d[a-z,]*)\)").unwrap()
});

/// First author, the rest, and the date of one citation.
pub static AUTHOR_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<first>(?:(?:de|d'|el )\s*)?[A-Z][^\s]+)(?P<others>.+?)(?P<date>20\d\d[a-z]*)")
        .unwrap()
});

/// A `doi:` string in running text, terminated by a full stop.
pub static DOI: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s(?P<doi>doi:[^\s]*)\.").unwrap());

static REF_AUTHOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?P<first>(?:(?:de|d'|el)\s+)?[A-Z][^\s,.]+)").unwrap());

static REF_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?P<date>(?:19|20)\d\d[a-z]?)\b").unwrap());

const DOI_ORG: &str = "https://doi.org/";

/// Options for [`recognize_bibliography`].
#[derive(Debug, Clone)]
pub struct BiblioOptions {
    /// Elements scanned for citations, relative to the body
    pub target: String,
    /// Reference list entries, relative to the body
    pub references: Option<String>,
    /// Replace citations by anchors
    pub link_citations: bool,
    /// Turn `doi:` strings into links
    pub link_dois: bool,
}

impl Default for BiblioOptions {
    fn default() -> Self {
        Self {
            target: ".//span".to_string(),
            references: None,
            link_citations: true,
            link_dois: true,
        }
    }
}

impl BiblioOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_references(mut self, entries: impl Into<String>) -> Self {
        self.references = Some(entries.into());
        self
    }

    pub fn with_link_citations(mut self, enabled: bool) -> Self {
        self.link_citations = enabled;
        self
    }

    pub fn with_link_dois(mut self, enabled: bool) -> Self {
        self.link_dois = enabled;
        self
    }
}

/// What [`recognize_bibliography`] found.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BiblioReport {
    pub bibliorefs: Vec<Biblioref>,
    pub references: Vec<Reference>,
    pub doi_links: usize,
}

impl BiblioReport {
    /// Citations that point at an entry of the reference list.
    pub fn resolved(&self) -> usize {
        let ids: HashSet<String> = self.references.iter().map(|r| format!("#{}", r.id)).collect();
        self.bibliorefs
            .iter()
            .filter(|b| b.href.as_ref().is_some_and(|h| ids.contains(h)))
            .count()
    }
}

/// Split a bracket body on `;` into citations. Chunks without an
/// author-date shape are dropped.
pub fn parse_biblioref_body(body: &str) -> Vec<Biblioref> {
    body.split(';').filter_map(parse_biblioref).collect()
}

fn parse_biblioref(chunk: &str) -> Option<Biblioref> {
    let raw = normalize_ws(chunk);
    let caps = AUTHOR_DATE.captures(&raw)?;
    Some(Biblioref {
        first_author: caps["first"].to_string(),
        others: caps["others"].to_string(),
        date: caps["date"].to_string(),
        raw: raw.clone(),
        href: None,
    })
}

/// Every citation in a piece of text.
pub fn find_bibliorefs(text: &str) -> Vec<Biblioref> {
    BRACKET
        .captures_iter(text)
        .flat_map(|caps| parse_biblioref_body(&caps["body"]))
        .collect()
}

/// Read the reference list entries selected by `entries`. Entries without
/// a recognizable first author and year are skipped. Entries without an
/// `id` get `ref_<author>_<year>`.
pub fn extract_references(doc: &mut HtmlDocument, entries: &Locator) -> Vec<Reference> {
    let scope = doc.body().unwrap_or_else(|| doc.root());
    let mut references = Vec::new();
    for entry in entries.select(doc, scope) {
        let text = normalize_ws(&doc.text_content(entry));
        let Some(first) = REF_AUTHOR.captures(&text).map(|c| c["first"].to_string()) else {
            log::debug!("reference without author: {:.40}", text);
            continue;
        };
        let Some(date) = REF_DATE.captures(&text).map(|c| c["date"].to_string()) else {
            log::debug!("reference without year: {:.40}", text);
            continue;
        };
        let doi = DOI
            .captures(&format!(" {}", text))
            .map(|c| c["doi"].trim_start_matches("doi:").to_string());
        let id = match doc[entry].attr("id") {
            Some(id) => id.to_string(),
            None => {
                let id = format!("ref_{}_{}", slug(&first), date);
                doc[entry].set_attr("id", id.clone());
                id
            }
        };
        references.push(Reference {
            id,
            first_author: first,
            date,
            doi,
            text,
        });
    }
    references
}

enum Segment {
    Text(String),
    Link {
        text: String,
        href: String,
        class: &'static str,
    },
}

/// A run of text in the tree: the leading text of an element or the tail
/// following it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    Text(NodeId),
    Tail(NodeId),
}

impl Slot {
    fn get(self, doc: &HtmlDocument) -> &str {
        match self {
            Slot::Text(id) => doc[id].text_str(),
            Slot::Tail(id) => doc[id].tail_str(),
        }
    }

    fn get_mut(self, doc: &mut HtmlDocument) -> &mut Option<String> {
        match self {
            Slot::Text(id) => &mut doc[id].text,
            Slot::Tail(id) => &mut doc[id].tail,
        }
    }
}

/// Text slots of `id` and its descendants in document order. Text inside
/// links, styles and scripts is left out; the tail of a link is kept.
fn text_slots(doc: &HtmlDocument, id: NodeId) -> Vec<Slot> {
    let mut slots = Vec::new();
    if !doc.has_ancestor(id, "a") {
        collect_slots(doc, id, &mut slots);
    }
    slots
}

fn collect_slots(doc: &HtmlDocument, id: NodeId, slots: &mut Vec<Slot>) {
    if doc[id].is("a") || doc[id].is("style") || doc[id].is("script") {
        return;
    }
    slots.push(Slot::Text(id));
    for child in doc.children(id) {
        collect_slots(doc, child, slots);
        slots.push(Slot::Tail(child));
    }
}

/// Replace the text of `slot` by text and anchors. Anchors go where the
/// text was; each following fragment becomes the tail of the anchor
/// before it.
fn rewrite(doc: &mut HtmlDocument, slot: Slot, segments: Vec<Segment>) {
    *slot.get_mut(doc) = None;
    let mut last: Option<NodeId> = None;
    for segment in segments {
        match segment {
            Segment::Text(text) => match last {
                Some(a) => push_text(&mut doc[a].tail, &text),
                None => push_text(slot.get_mut(doc), &text),
            },
            Segment::Link { text, href, class } => {
                let a = doc.create(
                    Element::new("a")
                        .with_attr("class", class)
                        .with_attr("href", href)
                        .with_text(text),
                );
                match (last, slot) {
                    (Some(prev), _) => doc.insert_after(prev, a),
                    (None, Slot::Tail(id)) => doc.insert_after(id, a),
                    (None, Slot::Text(id)) => match doc.first_child(id) {
                        Some(first) => doc.insert_before(first, a),
                        None => doc.append_child(id, a),
                    },
                }
                last = Some(a);
            }
        }
    }
}

/// Link target of a `doi:` string.
pub fn doi_href(doi: &str) -> String {
    if let Some(url) = doi.strip_prefix("doi:https://").or_else(|| doi.strip_prefix("doi:http://")) {
        return format!("https://{}", url);
    }
    format!("{}{}", DOI_ORG, doi.trim_start_matches("doi:"))
}

/// Turn `doi:` strings in the text under `scope` into links. Text inside
/// existing links is left alone.
pub fn link_dois(doc: &mut HtmlDocument, scope: NodeId) -> usize {
    let slots: Vec<Slot> = text_slots(doc, scope)
        .into_iter()
        .filter(|slot| DOI.is_match(slot.get(doc)))
        .collect();
    let mut links = 0;
    for slot in slots {
        let text = slot.get(doc).to_string();
        let mut segments = Vec::new();
        let mut cursor = 0;
        for caps in DOI.captures_iter(&text) {
            let Some(m) = caps.name("doi") else { continue };
            let (start, end) = (m.start(), m.end());
            segments.push(Segment::Text(text[cursor..start].to_string()));
            segments.push(Segment::Link {
                text: text[start..end].to_string(),
                href: doi_href(&text[start..end]),
                class: "doi",
            });
            cursor = end;
            links += 1;
        }
        segments.push(Segment::Text(text[cursor..].to_string()));
        rewrite(doc, slot, segments);
    }
    links
}

/// Find citations in the text of the target elements, read the reference
/// list and link both.
///
/// Citations link to the first matching reference, or to
/// `#ref_<author>_<year>` when none matches. Elements inside reference
/// entries are not scanned for citations.
pub fn recognize_bibliography(
    doc: &mut HtmlDocument,
    opts: &BiblioOptions,
    ctx: &mut PipelineContext,
) -> Result<BiblioReport> {
    let target = Locator::parse(&opts.target)?;
    let entries = opts.references.as_deref().map(Locator::parse).transpose()?;
    let scope = doc.body().unwrap_or_else(|| doc.root());

    let mut report = BiblioReport::default();
    let mut in_references = HashSet::new();
    if let Some(entries) = &entries {
        report.references = extract_references(doc, entries);
        for entry in entries.select(doc, scope) {
            in_references.insert(entry);
            in_references.extend(doc.descendants(entry));
        }
        if report.references.is_empty() {
            ctx.warn("biblio", format!("no reference entries matched {}", entries));
        }
    }

    let mut seen = HashSet::new();
    let mut slots = Vec::new();
    for id in target.select(doc, scope) {
        if in_references.contains(&id) {
            continue;
        }
        for slot in text_slots(doc, id) {
            if seen.insert(slot) && BRACKET.is_match(slot.get(doc)) {
                slots.push(slot);
            }
        }
    }

    for slot in slots {
        let text = slot.get(doc).to_string();
        let mut segments = Vec::new();
        let mut cursor = 0;
        for caps in BRACKET.captures_iter(&text) {
            let Some(body) = caps.name("body") else { continue };
            let mut offset = body.start();
            for chunk in body.as_str().split(';') {
                let chunk_end = offset + chunk.len();
                if let Some(mut bref) = parse_biblioref(chunk) {
                    let href = report
                        .references
                        .iter()
                        .find(|r| r.matches(&bref))
                        .map(|r| format!("#{}", r.id))
                        .unwrap_or_else(|| format!("#{}", bref.anchor_id()));
                    if opts.link_citations {
                        let lead = chunk.len() - chunk.trim_start().len();
                        let trail = chunk.trim_end().len();
                        segments.push(Segment::Text(text[cursor..offset + lead].to_string()));
                        segments.push(Segment::Link {
                            text: text[offset + lead..offset + trail].to_string(),
                            href: href.clone(),
                            class: "biblioref",
                        });
                        cursor = offset + trail;
                    }
                    bref.href = Some(href);
                    report.bibliorefs.push(bref);
                }
                // skip the ';'
                offset = chunk_end + 1;
            }
        }
        if opts.link_citations && cursor > 0 {
            segments.push(Segment::Text(text[cursor..].to_string()));
            rewrite(doc, slot, segments);
        }
    }

    if opts.link_dois {
        report.doi_links = link_dois(doc, scope);
    }

    log::debug!(
        "bibliography: {} citations ({} resolved), {} references, {} DOI links",
        report.bibliorefs.len(),
        report.resolved(),
        report.references.len(),
        report.doi_links
    );
    ctx.snapshot("biblio", doc)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_body() {
        let refs = parse_biblioref_body("Gattuso  et  al.  2018;  Bindoff  et  al.  2019");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].first_author, "Gattuso");
        assert_eq!(refs[0].others, " et al. ");
        assert_eq!(refs[0].date, "2018");
        assert_eq!(refs[1].raw, "Bindoff et al. 2019");
    }

    #[test]
    fn test_name_prefixes_and_suffixes() {
        let refs = find_bibliorefs("as shown (de Coninck et al. 2018; IPBES 2019b) before");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].first_author, "de Coninck");
        assert_eq!(refs[1].first_author, "IPBES");
        assert_eq!(refs[1].date, "2019b");
    }

    #[test]
    fn test_brackets_without_citation_ignored() {
        assert!(find_bibliorefs("values (see Table 2) and (2019)").is_empty());
    }

    #[test]
    fn test_doi_href() {
        assert_eq!(doi_href("doi:10.1000/xyz"), "https://doi.org/10.1000/xyz");
        assert_eq!(
            doi_href("doi:https://doi.org/10.1/a"),
            "https://doi.org/10.1/a"
        );
    }

    const CHAPTER: &str = r#"<body>
        <div><span>Warming is unequivocal (Smith et al. 2019; Lave 2021).</span></div>
        <div class="refs">
          <div class="ref"><span>Smith, J., A. Jones, 2019: Ocean heat. Nature. doi:10.1000/abc.</span></div>
        </div>
        </body>"#;

    #[test]
    fn test_link_citations_to_references() {
        let mut doc = HtmlDocument::parse(CHAPTER).unwrap();
        let before = normalize_ws(&doc.text_content(doc.root()));
        let opts = BiblioOptions::new().with_references(".//div[@class='ref']");
        let report = recognize_bibliography(&mut doc, &opts, &mut PipelineContext::new()).unwrap();

        assert_eq!(report.references.len(), 1);
        let reference = &report.references[0];
        assert_eq!(reference.id, "ref_smith_2019");
        assert_eq!(reference.doi.as_deref(), Some("10.1000/abc"));
        assert_eq!(report.bibliorefs.len(), 2);
        assert_eq!(report.resolved(), 1);
        assert_eq!(report.doi_links, 1);

        let html = doc.serialize();
        assert!(html.contains(
            r##"(<a class="biblioref" href="#ref_smith_2019">Smith et al. 2019</a>; <a class="biblioref" href="#ref_lave_2021">Lave 2021</a>)."##
        ));
        assert!(html.contains(r#"<div class="ref" id="ref_smith_2019">"#));
        assert!(html.contains(
            r#"<a class="doi" href="https://doi.org/10.1000/abc">doi:10.1000/abc</a>."#
        ));
        assert_eq!(normalize_ws(&doc.text_content(doc.root())), before);
    }

    #[test]
    fn test_report_only() {
        let mut doc = HtmlDocument::parse(CHAPTER).unwrap();
        let before = doc.serialize();
        let opts = BiblioOptions::new()
            .with_link_citations(false)
            .with_link_dois(false);
        let report = recognize_bibliography(&mut doc, &opts, &mut PipelineContext::new()).unwrap();
        assert_eq!(report.bibliorefs.len(), 2);
        assert_eq!(report.bibliorefs[1].href.as_deref(), Some("#ref_lave_2021"));
        assert_eq!(doc.serialize(), before);
    }

    #[test]
    fn test_existing_links_untouched() {
        let mut doc =
            HtmlDocument::parse(r#"<p><a href="x">(Smith 2019)</a> doi:10.1/z.</p>"#).unwrap();
        let opts = BiblioOptions::new().with_target(".//a");
        let report = recognize_bibliography(&mut doc, &opts, &mut PipelineContext::new()).unwrap();
        assert!(report.bibliorefs.is_empty());
        assert_eq!(report.doi_links, 1);
        assert!(doc.serialize().contains(
            r#"<p><a href="x">(Smith 2019)</a> <a class="doi" href="https://doi.org/10.1/z">doi:10.1/z</a>.</p>"#
        ));
    }

    #[test]
    fn test_mixed_content_is_scanned() {
        let mut doc = HtmlDocument::parse(
            r#"<body><p>Warming is <i>very likely</i> (Smith 2019).</p>
            <div class="ref"><span>Smith, J., 2019: Ocean heat. <i>Nature</i> doi:10.1000/abc.</span></div></body>"#,
        )
        .unwrap();
        let before = normalize_ws(&doc.text_content(doc.root()));
        let opts = BiblioOptions::new()
            .with_target(".//p")
            .with_references(".//div[@class='ref']");
        let report = recognize_bibliography(&mut doc, &opts, &mut PipelineContext::new()).unwrap();

        assert_eq!(report.bibliorefs.len(), 1);
        assert_eq!(report.resolved(), 1);
        assert_eq!(report.doi_links, 1);
        let html = doc.serialize();
        assert!(html.contains(
            r##"<i>very likely</i> (<a class="biblioref" href="#ref_smith_2019">Smith 2019</a>).</p>"##
        ));
        assert!(html.contains(
            r#"<i>Nature</i> <a class="doi" href="https://doi.org/10.1000/abc">doi:10.1000/abc</a>.</span>"#
        ));
        assert_eq!(normalize_ws(&doc.text_content(doc.root())), before);
    }
}
