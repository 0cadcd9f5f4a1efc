//! Phrase annotation in HTML.
//!
//! Matches of a term list are wrapped in `<a class="annotation">` anchors by
//! splitting text and tail slots in place, so the document's text is
//! unchanged and no anchor ends up inside another.

use ego_tree::NodeId;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{Element, HtmlDocument, TermEntry, TermList};
use crate::pipeline::PipelineContext;

/// Elements whose text is never annotated.
const SKIP_TAGS: &[&str] = &["a", "script", "style", "head", "title"];

/// Options for [`annotate`].
#[derive(Debug, Clone)]
pub struct AnnotateOptions {
    /// Prefix for generated hrefs; `#slug` becomes `<url_base>#slug`
    pub url_base: Option<String>,
    /// Link to each term's own target instead of its slug
    pub use_term_href: bool,
    /// Class given to inserted anchors
    pub class_name: String,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self {
            url_base: None,
            use_term_href: false,
            class_name: "annotation".to_string(),
        }
    }
}

impl AnnotateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url_base(mut self, url_base: impl Into<String>) -> Self {
        self.url_base = Some(url_base.into());
        self
    }

    pub fn with_term_href(mut self, enabled: bool) -> Self {
        self.use_term_href = enabled;
        self
    }

    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    /// Link target for a term.
    pub fn href_for(&self, entry: &TermEntry) -> String {
        if self.use_term_href && !entry.target_href.is_empty() {
            return entry.target_href.clone();
        }
        match &self.url_base {
            Some(base) => format!("{}#{}", base, entry.slug()),
            None => format!("#{}", entry.slug()),
        }
    }
}

/// One phrase match in a string, as byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhraseMatch {
    pub start: usize,
    pub end: usize,
    /// Index into [`PhraseMatcher::entries`]
    pub term: usize,
}

/// Compiled term list: one case-insensitive, word-bounded regex per
/// phrase, longest phrase first.
#[derive(Debug, Clone)]
pub struct PhraseMatcher {
    phrases: Vec<(TermEntry, Regex)>,
    skipped: Vec<String>,
}

impl PhraseMatcher {
    /// Compile every phrase. Phrases that fail to compile are skipped with
    /// a warning.
    pub fn new(terms: &TermList, ctx: &mut PipelineContext) -> Self {
        let mut phrases = Vec::with_capacity(terms.len());
        let mut skipped = Vec::new();
        for entry in terms.by_length() {
            match phrase_regex(&entry.phrase) {
                Ok(regex) => phrases.push((entry.clone(), regex)),
                Err(e) => {
                    ctx.warn(
                        "annotate",
                        format!("phrase '{}' skipped: {}", entry.phrase, e),
                    );
                    skipped.push(entry.phrase.clone());
                }
            }
        }
        Self { phrases, skipped }
    }

    /// Compiled entries, longest phrase first.
    pub fn entries(&self) -> impl Iterator<Item = &TermEntry> {
        self.phrases.iter().map(|(e, _)| e)
    }

    /// Entry by match index.
    pub fn entry(&self, term: usize) -> &TermEntry {
        &self.phrases[term].0
    }

    /// Phrases that could not be compiled.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Non-overlapping matches in `text`, in position order.
    ///
    /// Among overlapping candidates the longer phrase wins, then the
    /// earlier start.
    pub fn find(&self, text: &str) -> Vec<PhraseMatch> {
        let mut candidates: Vec<(usize, PhraseMatch)> = Vec::new();
        for (term, (entry, regex)) in self.phrases.iter().enumerate() {
            let len = entry.phrase.chars().count();
            candidates.extend(regex.find_iter(text).map(|m| {
                (
                    len,
                    PhraseMatch {
                        start: m.start(),
                        end: m.end(),
                        term,
                    },
                )
            }));
        }
        candidates.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then(a.1.start.cmp(&b.1.start))
                .then(a.1.term.cmp(&b.1.term))
        });

        let mut chosen: Vec<PhraseMatch> = Vec::new();
        for (_, m) in candidates {
            if chosen.iter().all(|c| m.end <= c.start || m.start >= c.end) {
                chosen.push(m);
            }
        }
        chosen.sort_by_key(|m| m.start);
        chosen
    }
}

/// Regex for a phrase: escaped, internal whitespace flexible, word
/// boundaries at edges that are word characters.
fn phrase_regex(phrase: &str) -> Result<Regex> {
    let body = phrase
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    if body.is_empty() {
        return Err(Error::Terms("empty phrase".to_string()));
    }
    let starts_word = phrase.chars().next().is_some_and(is_word_char);
    let ends_word = phrase.chars().last().is_some_and(is_word_char);
    let pattern = format!(
        "{}{}{}",
        if starts_word { r"\b" } else { "" },
        body,
        if ends_word { r"\b" } else { "" }
    );
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::regex(pattern, e))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Hits for one phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhraseHits {
    pub phrase: String,
    pub href: String,
    pub count: usize,
}

/// Outcome of an annotation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnnotationReport {
    /// Per-phrase counts in matcher order (longest phrase first)
    pub hits: Vec<PhraseHits>,
    /// Phrases that could not be compiled
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

impl AnnotationReport {
    fn for_matcher(matcher: &PhraseMatcher, opts: &AnnotateOptions) -> Self {
        Self {
            hits: matcher
                .entries()
                .map(|e| PhraseHits {
                    phrase: e.phrase.clone(),
                    href: opts.href_for(e),
                    count: 0,
                })
                .collect(),
            skipped: matcher.skipped().to_vec(),
        }
    }

    /// Total number of anchors inserted.
    pub fn total(&self) -> usize {
        self.hits.iter().map(|h| h.count).sum()
    }

    /// Phrases with at least one hit, most frequent first.
    pub fn by_count(&self) -> Vec<&PhraseHits> {
        let mut hits: Vec<&PhraseHits> = self.hits.iter().filter(|h| h.count > 0).collect();
        hits.sort_by(|a, b| b.count.cmp(&a.count).then(a.phrase.cmp(&b.phrase)));
        hits
    }
}

/// Wrap every occurrence of the terms in the document body in an anchor.
pub fn annotate(
    doc: &mut HtmlDocument,
    terms: &TermList,
    opts: &AnnotateOptions,
    ctx: &mut PipelineContext,
) -> AnnotationReport {
    let matcher = PhraseMatcher::new(terms, ctx);
    annotate_with(doc, &matcher, opts)
}

/// [`annotate`] with a precompiled matcher.
pub fn annotate_with(
    doc: &mut HtmlDocument,
    matcher: &PhraseMatcher,
    opts: &AnnotateOptions,
) -> AnnotationReport {
    let mut report = AnnotationReport::for_matcher(matcher, opts);
    if matcher.is_empty() {
        return report;
    }
    let start = doc.body().unwrap_or_else(|| doc.root());
    if !is_skipped(doc, start) && !doc.has_ancestor(start, "a") {
        let mut annotator = Annotator {
            matcher,
            opts,
            report: &mut report,
        };
        annotator.element(doc, start);
    }
    log::debug!(
        "annotated {} occurrences of {} phrases",
        report.total(),
        report.hits.iter().filter(|h| h.count > 0).count()
    );
    report
}

fn is_skipped(doc: &HtmlDocument, id: NodeId) -> bool {
    SKIP_TAGS.contains(&doc.tag(id))
}

struct Annotator<'a> {
    matcher: &'a PhraseMatcher,
    opts: &'a AnnotateOptions,
    report: &'a mut AnnotationReport,
}

impl Annotator<'_> {
    fn element(&mut self, doc: &mut HtmlDocument, id: NodeId) {
        let children = doc.children(id);

        if let Some(text) = doc[id].text.take() {
            let (head, anchors) = self.split(doc, &text);
            doc[id].text = (!head.is_empty()).then_some(head);
            for anchor in anchors {
                match children.first() {
                    Some(&first) => doc.insert_before(first, anchor),
                    None => doc.append_child(id, anchor),
                }
            }
        }

        for child in children {
            if !is_skipped(doc, child) {
                self.element(doc, child);
            }
            if let Some(tail) = doc[child].tail.take() {
                let (head, anchors) = self.split(doc, &tail);
                doc[child].tail = (!head.is_empty()).then_some(head);
                let mut last = child;
                for anchor in anchors {
                    doc.insert_after(last, anchor);
                    last = anchor;
                }
            }
        }
    }

    /// Split `text` into its leading fragment and detached anchors whose
    /// tails carry the following fragments.
    fn split(&mut self, doc: &mut HtmlDocument, text: &str) -> (String, Vec<NodeId>) {
        let matches = self.matcher.find(text);
        if matches.is_empty() {
            return (text.to_string(), Vec::new());
        }

        let head = text[..matches[0].start].to_string();
        let mut anchors = Vec::with_capacity(matches.len());
        for (i, m) in matches.iter().enumerate() {
            let entry = self.matcher.entry(m.term);
            let href = self.opts.href_for(entry);
            let mut anchor = Element::new("a")
                .with_attr("class", self.opts.class_name.as_str())
                .with_attr("href", href);
            if let Some(tooltip) = &entry.tooltip {
                anchor = anchor.with_attr("title", tooltip.as_str());
            }
            anchor = anchor.with_text(&text[m.start..m.end]);
            let next = matches.get(i + 1).map_or(text.len(), |n| n.start);
            let tail = &text[m.end..next];
            if !tail.is_empty() {
                anchor.tail = Some(tail.to_string());
            }
            anchors.push(doc.create(anchor));
            self.report.hits[m.term].count += 1;
        }
        (head, anchors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::normalize_ws;

    fn annotate_str(html: &str, phrases: &[&str]) -> (HtmlDocument, AnnotationReport) {
        let mut doc = HtmlDocument::parse(html).unwrap();
        let terms = TermList::from_phrases(phrases);
        let report = annotate(
            &mut doc,
            &terms,
            &AnnotateOptions::default(),
            &mut PipelineContext::new(),
        );
        (doc, report)
    }

    fn body_html(doc: &HtmlDocument) -> String {
        let body = doc.body().unwrap();
        doc.children(body)
            .into_iter()
            .map(|c| doc.serialize_node(c))
            .collect()
    }

    #[test]
    fn test_single_phrase_preserves_case() {
        let (doc, report) = annotate_str(
            "<p>Climate change is a global issue.</p>",
            &["climate change"],
        );
        assert_eq!(
            body_html(&doc),
            r##"<p><a class="annotation" href="#climate_change">Climate change</a> is a global issue.</p>"##
        );
        assert_eq!(report.total(), 1);
    }

    #[test]
    fn test_existing_anchor_untouched() {
        let html = r#"<p>This is a <a href="http://x">climate change</a> example.</p>"#;
        let (doc, report) = annotate_str(html, &["climate change"]);
        assert_eq!(body_html(&doc), html);
        assert_eq!(report.total(), 0);
    }

    #[test]
    fn test_longer_phrase_wins() {
        let (doc, _) = annotate_str("<p>climate change now</p>", &["climate", "climate change"]);
        let anchors = doc.find_all(doc.root(), "a");
        assert_eq!(anchors.len(), 1);
        assert_eq!(doc[anchors[0]].text_str(), "climate change");
    }

    #[test]
    fn test_word_boundaries() {
        let (doc, _) = annotate_str("<p>IPCCs and IPCC-led and xIPCC</p>", &["IPCC"]);
        let anchors = doc.find_all(doc.root(), "a");
        assert_eq!(anchors.len(), 1);
        assert_eq!(doc[anchors[0]].tail_str(), "-led and xIPCC");
    }

    #[test]
    fn test_tail_and_nested_text() {
        let html = "<div>global warming <b>IPCC</b> and climate change</div>";
        let (doc, report) = annotate_str(html, &["IPCC", "climate change", "global warming"]);
        assert_eq!(report.total(), 3);
        let body = doc.body().unwrap();
        assert_eq!(
            normalize_ws(&doc.text_content(body)),
            "global warming IPCC and climate change"
        );
        let b = doc.find_first(body, "b").unwrap();
        assert_eq!(doc.children(b).len(), 1);
        let div = doc.find_first(body, "div").unwrap();
        // leading anchor, <b>, trailing anchor
        assert_eq!(doc.children(div).len(), 3);
    }

    #[test]
    fn test_url_base_and_tooltip() {
        let mut doc = HtmlDocument::parse("<p>methane rises</p>").unwrap();
        let mut terms = TermList::new();
        terms.push(TermEntry::from_phrase("methane").with_tooltip("CH4"));
        annotate(
            &mut doc,
            &terms,
            &AnnotateOptions::new().with_url_base("https://example.org/glossary"),
            &mut PipelineContext::new(),
        );
        assert!(doc.serialize().contains(
            r#"<a class="annotation" href="https://example.org/glossary#methane" title="CH4">methane</a>"#
        ));
    }

    #[test]
    fn test_term_href_option() {
        let mut terms = TermList::new();
        terms.push(TermEntry::new("ozone", "https://en.wikipedia.org/wiki/Ozone"));
        let opts = AnnotateOptions::new().with_term_href(true);
        assert_eq!(
            opts.href_for(&terms.entries()[0]),
            "https://en.wikipedia.org/wiki/Ozone"
        );
    }

    #[test]
    fn test_phrase_with_punctuation_edges() {
        let (doc, _) = annotate_str("<p>emissions (CO2) fell</p>", &["(CO2)"]);
        let anchors = doc.find_all(doc.root(), "a");
        assert_eq!(anchors.len(), 1);
        assert_eq!(doc[anchors[0]].text_str(), "(CO2)");
    }

    #[test]
    fn test_report_by_count() {
        let (_, report) = annotate_str(
            "<p>sea level and sea level and ice</p>",
            &["ice", "sea level", "ocean"],
        );
        let ranked = report.by_count();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].phrase, "sea level");
        assert_eq!(ranked[0].count, 2);
    }
}
