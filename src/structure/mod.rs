//! Document structure recognition.
//!
//! Floats and footnotes are lifted into a single back-matter container at
//! the end of the body, then numbered section titles nest the remaining
//! body blocks. All passes mutate the document and leave it unchanged when
//! run again.

mod floats;
mod footnotes;
mod sections;

use ego_tree::NodeId;

pub use floats::{extract_floats, FloatMarker, MarkerAction, FLOAT_MARKER};
pub use footnotes::{extract_footnotes, FootnoteOptions, IPCC_FOOTNOTE_CLASS};
pub use sections::{build_sections, SectionPattern, SectionTable, TitleMatch};

use crate::error::Result;
use crate::model::{Element, HtmlDocument, StructureReport};
use crate::pipeline::PipelineContext;

/// Class of the back-matter container.
pub const BACK_CLASS: &str = "back";

/// Options for [`extract_structure`].
#[derive(Debug, Clone)]
pub struct StructureOptions {
    /// Section title patterns; sections are not built when unset
    pub sections: Option<SectionTable>,
    /// Lift START/END delimited floats
    pub floats: bool,
    /// Footnote recognition; skipped when unset
    pub footnotes: Option<FootnoteOptions>,
}

impl Default for StructureOptions {
    fn default() -> Self {
        Self {
            sections: Some(SectionTable::ipcc()),
            floats: true,
            footnotes: None,
        }
    }
}

impl StructureOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// IPCC section numbering with floats, and footnotes whose numbers
    /// the IPCC rule set has classed `footnote`.
    pub fn ipcc() -> Self {
        Self::default().with_footnotes(FootnoteOptions::ipcc())
    }

    pub fn with_sections(mut self, table: SectionTable) -> Self {
        self.sections = Some(table);
        self
    }

    pub fn without_sections(mut self) -> Self {
        self.sections = None;
        self
    }

    pub fn with_floats(mut self, enabled: bool) -> Self {
        self.floats = enabled;
        self
    }

    pub fn with_footnotes(mut self, opts: FootnoteOptions) -> Self {
        self.footnotes = Some(opts);
        self
    }
}

/// The body's back-matter container, if there is one.
pub fn find_back_matter(doc: &HtmlDocument) -> Option<NodeId> {
    let body = doc.body()?;
    doc.child_elements(body, "div")
        .into_iter()
        .find(|&d| doc[d].has_class(BACK_CLASS))
}

/// The back-matter container, created at the end of the body on demand.
pub fn back_matter(doc: &mut HtmlDocument) -> NodeId {
    if let Some(back) = find_back_matter(doc) {
        return back;
    }
    let parent = doc.body().unwrap_or_else(|| doc.root());
    let back = doc.create(
        Element::new("div")
            .with_attr("class", BACK_CLASS)
            .with_attr("title", "back matter"),
    );
    doc.append_child(parent, back);
    back
}

/// Run float, footnote and section recognition in that order.
pub fn extract_structure(
    doc: &mut HtmlDocument,
    opts: &StructureOptions,
    ctx: &mut PipelineContext,
) -> Result<StructureReport> {
    let mut report = StructureReport::default();

    if opts.floats {
        let (floats, unmatched) = extract_floats(doc, ctx);
        report.floats = floats;
        report.unmatched_markers = unmatched;
    }
    if let Some(footnote_opts) = &opts.footnotes {
        report.footnotes = extract_footnotes(doc, footnote_opts, ctx);
    }
    if let Some(table) = &opts.sections {
        report.sections = build_sections(doc, table, ctx);
    }
    // keep the back matter last
    if let (Some(body), Some(back)) = (doc.body(), find_back_matter(doc)) {
        doc.append_child(body, back);
    }

    log::debug!(
        "structure: {} top-level sections, {} floats, {} footnotes",
        report.sections.len(),
        report.floats.len(),
        report.footnotes.len()
    );
    ctx.snapshot("structure", doc)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_back_matter_created_once() {
        let mut doc = HtmlDocument::parse("<p>x</p>").unwrap();
        let first = back_matter(&mut doc);
        let second = back_matter(&mut doc);
        assert_eq!(first, second);
        assert!(doc
            .serialize()
            .contains(r#"<div class="back" title="back matter"></div>"#));
    }

    #[test]
    fn test_structure_is_idempotent() {
        let html = r#"<body>
            <div><span>Section 2: Land</span></div>
            <div><span>Soils matter.</span></div>
            <div><span>[START FIGURE 2.1 HERE]</span></div>
            <div><span>A map</span></div>
            <div><span>[END FIGURE 2.1 HERE]</span></div>
            <div><span>2.1 Forests</span></div>
            <div><span class="body">Trees</span><span class="tiny">1</span><span class="tiny">A note.</span></div>
            </body>"#;
        let opts = StructureOptions::ipcc().with_footnotes(FootnoteOptions::new("tiny"));
        let mut doc = HtmlDocument::parse(html).unwrap();
        let mut ctx = PipelineContext::new();
        let report = extract_structure(&mut doc, &opts, &mut ctx).unwrap();
        assert_eq!(report.floats.len(), 1);
        assert_eq!(report.footnotes.len(), 1);
        assert_eq!(report.sections.len(), 1);
        assert_eq!(report.sections[0].count(), 2);

        let once = doc.serialize();
        let again = extract_structure(&mut doc, &opts, &mut ctx).unwrap();
        assert_eq!(doc.serialize(), once);
        assert!(again.floats.is_empty());
        assert_eq!(again.sections[0].count(), 2);

        let body = doc.body().unwrap();
        let last = doc.last_child(body).unwrap();
        assert!(doc[last].has_class("back"));
    }
}
