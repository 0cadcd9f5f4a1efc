//! Numbered section recognition and nesting.

use std::fs;
use std::path::Path;

use ego_tree::NodeId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{compile_regex, Error, Result};
use crate::model::{normalize_ws, Element, HtmlDocument, Section, SectionNode};
use crate::pipeline::PipelineContext;

static CONTAINER_CLASS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^section(\d+)$").unwrap());

const PREVIEW_CHARS: usize = 60;

/// One row of a section table as written in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPattern {
    pub class_name: String,
    pub pattern: String,
}

impl SectionPattern {
    pub fn new(class_name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            pattern: pattern.into(),
        }
    }
}

/// Ordered section title patterns; the position in the table is the level.
///
/// Every pattern must have an `id` named group; a `title` group is optional
/// and defaults to the text after the match of `id`.
#[derive(Debug, Clone)]
pub struct SectionTable {
    levels: Vec<(SectionPattern, Regex)>,
}

/// A section title found in some text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleMatch {
    pub level: usize,
    pub class_name: String,
    pub id: String,
    pub title: String,
}

impl SectionTable {
    /// Compile a table. Fails on a bad pattern or a pattern without `id`.
    pub fn new(patterns: Vec<SectionPattern>) -> Result<Self> {
        let mut levels = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let regex = compile_regex(&pattern.pattern)?;
            if !regex.capture_names().flatten().any(|n| n == "id") {
                return Err(Error::MissingNamedGroup {
                    pattern: pattern.pattern,
                    group: "id".to_string(),
                });
            }
            levels.push((pattern, regex));
        }
        Ok(Self { levels })
    }

    /// Chapter sections, two-part and three-part numbered subsections.
    pub fn ipcc() -> Self {
        let patterns = [
            ("section", r"^Section\s+(?P<id>\d+):\s+(?P<title>.*)"),
            ("sub_section", r"^(?P<id>\d+\.\d+)\s+(?P<title>.*)"),
            ("sub_sub_section", r"^(?P<id>\d+\.\d+\.\d+)\s+(?P<title>.*)"),
        ];
        let levels = patterns
            .iter()
            .map(|(name, pattern)| {
                (
                    SectionPattern::new(*name, *pattern),
                    Regex::new(pattern).unwrap(),
                )
            })
            .collect();
        Self { levels }
    }

    /// Read a table from `[{"class_name": ..., "pattern": ...}]`.
    pub fn from_json(json: &str) -> Result<Self> {
        let patterns: Vec<SectionPattern> = serde_json::from_str(json)?;
        Self::new(patterns)
    }

    /// Read a JSON table from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::MissingFile(path.to_path_buf()));
        }
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Patterns in level order.
    pub fn patterns(&self) -> impl Iterator<Item = &SectionPattern> {
        self.levels.iter().map(|(p, _)| p)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Match `text` against each level in order.
    pub fn match_title(&self, text: &str) -> Option<TitleMatch> {
        let text = normalize_ws(text);
        self.levels
            .iter()
            .enumerate()
            .find_map(|(i, (pattern, regex))| {
                let caps = regex.captures(&text)?;
                let id = caps.name("id")?;
                let title = caps
                    .name("title")
                    .map(|t| t.as_str())
                    .unwrap_or_else(|| &text[id.end()..]);
                Some(TitleMatch {
                    level: i + 1,
                    class_name: pattern.class_name.clone(),
                    id: id.as_str().to_string(),
                    title: title.trim().to_string(),
                })
            })
    }
}

/// Text a title div is matched on: its first span, or the whole div.
fn title_text(doc: &HtmlDocument, div: NodeId) -> String {
    match doc.find_first(div, "span") {
        Some(span) => doc.text_content(span),
        None => doc.text_content(div),
    }
}

fn preview(doc: &HtmlDocument, id: NodeId) -> SectionNode {
    let text = normalize_ws(&doc.text_content(id));
    SectionNode::Block {
        tag: doc.tag(id).to_string(),
        preview: text.chars().take(PREVIEW_CHARS).collect(),
    }
}

/// Level of an existing section container.
fn container_level(el: &Element) -> Option<usize> {
    el.classes()
        .iter()
        .find_map(|c| CONTAINER_CLASS.captures(c.as_str())?[1].parse().ok())
}

/// Section record for a container built by an earlier run.
fn read_container(
    doc: &HtmlDocument,
    table: &SectionTable,
    container: NodeId,
    level: usize,
) -> Section {
    let title_class = format!("section{}_title", level);
    let children = doc.children(container);
    let title_div = children
        .first()
        .copied()
        .filter(|&first| doc[first].has_class(&title_class));

    let mut section = match title_div {
        Some(div) => {
            let text = title_text(doc, div);
            let title = table
                .match_title(&text)
                .map(|m| m.title)
                .unwrap_or_else(|| normalize_ws(&text));
            let mut section = Section::new(level, doc[div].attr("id").unwrap_or_default(), title);
            section.source_spans = doc.find_all(div, "span").len().max(1);
            section
        }
        None => Section::new(level, "", ""),
    };
    for child in children.into_iter().skip(usize::from(title_div.is_some())) {
        match container_level(&doc[child]) {
            Some(sub) => section
                .children
                .push(SectionNode::Section(read_container(doc, table, child, sub))),
            None => section.children.push(preview(doc, child)),
        }
    }
    section
}

struct Open {
    container: NodeId,
    section: Section,
}

fn close(stack: &mut Vec<Open>, done: &mut Vec<Section>) {
    if let Some(open) = stack.pop() {
        match stack.last_mut() {
            Some(parent) => parent
                .section
                .children
                .push(SectionNode::Section(open.section)),
            None => done.push(open.section),
        }
    }
}

/// Mark section title divs among the body's children and nest the
/// following blocks into `<div class="sectionN">` containers.
///
/// Body children that already are containers, and the back matter, are
/// left in place, so a second run finds nothing new. Returns the section
/// tree in document order.
pub fn build_sections(
    doc: &mut HtmlDocument,
    table: &SectionTable,
    ctx: &mut PipelineContext,
) -> Vec<Section> {
    let Some(body) = doc.body() else {
        return Vec::new();
    };

    let mut done = Vec::new();
    let mut stack: Vec<Open> = Vec::new();
    for child in doc.children(body) {
        if doc[child].has_class(super::BACK_CLASS) {
            continue;
        }
        if let Some(level) = container_level(&doc[child]) {
            while !stack.is_empty() {
                close(&mut stack, &mut done);
            }
            done.push(read_container(doc, table, child, level));
            continue;
        }

        let title = if doc[child].is("div") {
            table.match_title(&title_text(doc, child))
        } else {
            None
        };
        let Some(title) = title else {
            if let Some(open) = stack.last_mut() {
                open.section.children.push(preview(doc, child));
                doc.append_child(open.container, child);
            }
            continue;
        };

        while stack.last().is_some_and(|o| o.section.level >= title.level) {
            close(&mut stack, &mut done);
        }

        let el = &mut doc[child];
        el.add_class(&format!("section{}_title", title.level));
        el.set_attr("title", title.id.clone());
        el.set_attr("id", title.id.clone());

        let container = doc.create(
            Element::new("div")
                .with_attr("class", format!("section{} {}", title.level, title.class_name)),
        );
        match stack.last() {
            Some(parent) => doc.append_child(parent.container, container),
            None => doc.insert_before(child, container),
        }
        let tail = doc[child].tail.take();
        doc.append_child(container, child);
        if let Some(tail) = tail {
            doc[container].tail = Some(tail);
        }

        let mut section = Section::new(title.level, &title.id, &title.title);
        section.source_spans = doc.find_all(child, "span").len().max(1);
        log::debug!(
            "section {} '{}' at level {} ({})",
            title.id,
            title.title,
            title.level,
            title.class_name
        );
        stack.push(Open { container, section });
    }
    while !stack.is_empty() {
        close(&mut stack, &mut done);
    }

    let count: usize = done.iter().map(Section::count).sum();
    if count == 0 && !table.is_empty() {
        ctx.warn("sections", "no section titles recognized");
    }
    done
}
