//! Records produced by structure and citation recognition.
//!
//! These describe what a pass found; the document tree itself is the
//! authority for content. Records reference nodes by their `id` attribute
//! or by extracted text so they stay valid after serialization.

use serde::{Deserialize, Serialize};

/// A numbered document division.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// 1-based nesting level
    pub level: usize,
    /// Section number, e.g. "4.3" or "A.1.2"
    pub id: String,
    /// Title text after the number
    pub title: String,
    /// Nested sections and block summaries, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SectionNode>,
    /// Number of source spans that made up the title
    #[serde(default)]
    pub source_spans: usize,
}

impl Section {
    /// Create a section without children.
    pub fn new(level: usize, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            level,
            id: id.into(),
            title: title.into(),
            children: Vec::new(),
            source_spans: 1,
        }
    }

    /// Direct child sections.
    pub fn subsections(&self) -> impl Iterator<Item = &Section> {
        self.children.iter().filter_map(|c| match c {
            SectionNode::Section(s) => Some(s),
            SectionNode::Block { .. } => None,
        })
    }

    /// Count of this section and all nested sections.
    pub fn count(&self) -> usize {
        1 + self.subsections().map(Section::count).sum::<usize>()
    }
}

/// A child of a section: a nested section or a content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SectionNode {
    /// Nested section
    Section(Section),
    /// Non-title block (tag and a text preview)
    Block { tag: String, preview: String },
}

/// Kind of float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloatKind {
    Figure,
    Table,
    Box,
}

impl FloatKind {
    /// Classify a marker object word ("FIGURE", "TABLE", "CROSS-CHAPTER BOX").
    pub fn from_marker(object: &str) -> Option<Self> {
        let object = object.trim().to_ascii_uppercase();
        if object.ends_with("BOX") {
            Some(FloatKind::Box)
        } else if object == "FIGURE" {
            Some(FloatKind::Figure)
        } else if object == "TABLE" {
            Some(FloatKind::Table)
        } else {
            None
        }
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FloatKind::Figure => "figure",
            FloatKind::Table => "table",
            FloatKind::Box => "box",
        }
    }
}

/// A figure, table or box lifted out of the section flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Float {
    pub kind: FloatKind,
    /// Marker object as written, e.g. "FIGURE" or "CROSS-CHAPTER BOX"
    pub object: String,
    /// Float number, e.g. "3.1"
    pub id: String,
    /// Text of the START marker
    pub start_anchor: String,
    /// Text of the END marker (empty if force-closed)
    pub end_anchor: String,
    /// Number of top-level elements moved into the float
    pub contents: usize,
    /// Whether the END marker was missing
    #[serde(default)]
    pub unmatched: bool,
}

impl Float {
    /// Element id used for the float container, e.g. "FIGURE3.1".
    pub fn element_id(&self) -> String {
        format!("{}{}", self.object.replace(' ', ""), self.id)
    }

    /// Human-readable title, e.g. "FIGURE 3.1".
    pub fn title(&self) -> String {
        format!("{} {}", self.object, self.id)
    }
}

/// A numbered footnote moved to back matter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footnote {
    pub number: u32,
    /// Text of the marker element
    pub marker: String,
    /// Text of the consumed body elements
    pub body: String,
}

/// An in-text author-date citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Biblioref {
    /// The chunk as written, e.g. "Smith et al. 2019a"
    pub raw: String,
    pub first_author: String,
    pub others: String,
    pub date: String,
    /// Link target, if one was assigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl Biblioref {
    /// Fallback anchor id, `ref_<slug(first author)>_<date>`.
    pub fn anchor_id(&self) -> String {
        format!("ref_{}_{}", super::slug(&self.first_author), self.date)
    }
}

/// An entry of a reference list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Element id of the entry
    pub id: String,
    pub first_author: String,
    /// Year with optional letter suffix, e.g. "2019a"
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    /// Full entry text
    pub text: String,
}

impl Reference {
    /// Whether an in-text citation points at this entry.
    pub fn matches(&self, biblioref: &Biblioref) -> bool {
        self.date == biblioref.date
            && self
                .first_author
                .to_lowercase()
                .starts_with(&biblioref.first_author.trim_end_matches(',').to_lowercase())
    }
}

/// Everything structure recognition found in one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureReport {
    pub sections: Vec<Section>,
    pub floats: Vec<Float>,
    pub footnotes: Vec<Footnote>,
    /// Marker texts that could not be paired
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmatched_markers: Vec<String>,
}
