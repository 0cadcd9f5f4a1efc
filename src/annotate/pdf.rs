//! Phrase annotation in PDF.
//!
//! Each phrase occurrence inside a text span gets a URI link annotation
//! over its approximate bounding box and a thin underline drawn on the
//! page. A summary page listing hit counts is appended.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document as LopdfDocument, Object, ObjectId, Stream, StringFormat};
use serde::Serialize;

use super::phrase::{AnnotateOptions, PhraseHits, PhraseMatcher};
use crate::error::Result;
use crate::model::TermList;
use crate::parser::{extract_page_spans, load_pdf};
use crate::pipeline::PipelineContext;

/// Lines listed on the summary page before the rest is elided.
const SUMMARY_LINES: usize = 44;

/// Options for [`annotate_pdf`].
#[derive(Debug, Clone)]
pub struct PdfAnnotateOptions {
    /// Link target rules shared with the HTML annotator
    pub links: AnnotateOptions,
    /// Underline colour as RGB components in 0..=1
    pub underline_color: [f32; 3],
    /// Underline thickness in points
    pub underline_width: f32,
    /// Append a page listing phrase hit counts
    pub summary_page: bool,
}

impl Default for PdfAnnotateOptions {
    fn default() -> Self {
        Self {
            links: AnnotateOptions::default().with_term_href(true),
            underline_color: [0.0, 0.0, 1.0],
            underline_width: 1.0,
            summary_page: true,
        }
    }
}

impl PdfAnnotateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_links(mut self, links: AnnotateOptions) -> Self {
        self.links = links;
        self
    }

    pub fn with_underline_color(mut self, rgb: [f32; 3]) -> Self {
        self.underline_color = rgb;
        self
    }

    pub fn with_underline_width(mut self, width: f32) -> Self {
        self.underline_width = width;
        self
    }

    pub fn with_summary_page(mut self, enabled: bool) -> Self {
        self.summary_page = enabled;
        self
    }
}

/// One link placed on a page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PdfLink {
    pub page: u32,
    pub phrase: String,
    pub text: String,
    pub href: String,
    /// `[x0, y0, x1, y1]` in default user space
    pub rect: [f32; 4],
}

/// Outcome of [`annotate_pdf`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PdfAnnotationReport {
    pub pages: usize,
    pub links: Vec<PdfLink>,
    pub hits: Vec<PhraseHits>,
}

impl PdfAnnotationReport {
    /// Phrases with at least one hit, most frequent first.
    pub fn by_count(&self) -> Vec<&PhraseHits> {
        let mut hits: Vec<&PhraseHits> = self.hits.iter().filter(|h| h.count > 0).collect();
        hits.sort_by(|a, b| b.count.cmp(&a.count).then(a.phrase.cmp(&b.phrase)));
        hits
    }
}

/// Annotate `in_pdf` with links for every term occurrence and write the
/// result to `out_pdf`.
///
/// The output is written to a temporary sibling and renamed into place,
/// so a failed run leaves no `out_pdf` behind.
pub fn annotate_pdf(
    in_pdf: impl AsRef<Path>,
    terms: &TermList,
    out_pdf: impl AsRef<Path>,
    opts: &PdfAnnotateOptions,
    ctx: &mut PipelineContext,
) -> Result<PdfAnnotationReport> {
    let mut doc = load_pdf(in_pdf)?;
    let matcher = PhraseMatcher::new(terms, ctx);
    let report = annotate_pdf_document(&mut doc, &matcher, opts)?;

    let out_pdf = out_pdf.as_ref();
    let partial = partial_path(out_pdf);
    if let Some(parent) = partial.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let written = save(&mut doc, &partial).and_then(|_| Ok(fs::rename(&partial, out_pdf)?));
    if let Err(e) = written {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }

    log::debug!(
        "annotated PDF {}: {} links on {} pages",
        out_pdf.display(),
        report.links.len(),
        report.pages
    );
    Ok(report)
}

fn partial_path(out: &Path) -> PathBuf {
    let name = out
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.pdf".to_string());
    out.with_file_name(format!(".{}.partial", name))
}

fn save(doc: &mut LopdfDocument, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    doc.save_to(&mut writer)?;
    Ok(())
}

/// Annotate an in-memory document.
pub fn annotate_pdf_document(
    doc: &mut LopdfDocument,
    matcher: &PhraseMatcher,
    opts: &PdfAnnotateOptions,
) -> Result<PdfAnnotationReport> {
    let mut report = PdfAnnotationReport {
        pages: 0,
        links: Vec::new(),
        hits: matcher
            .entries()
            .map(|e| PhraseHits {
                phrase: e.phrase.clone(),
                href: opts.links.href_for(e),
                count: 0,
            })
            .collect(),
    };

    let pages = doc.get_pages();
    report.pages = pages.len();
    for (page_num, page_id) in pages {
        let spans = extract_page_spans(doc, page_id)?;
        let mut page_links = Vec::new();
        for span in &spans {
            for m in matcher.find(&span.text) {
                let start = span.text[..m.start].chars().count();
                let end = start + span.text[m.start..m.end].chars().count();
                let entry = matcher.entry(m.term);
                report.hits[m.term].count += 1;
                page_links.push((
                    PdfLink {
                        page: page_num,
                        phrase: entry.phrase.clone(),
                        text: span.text[m.start..m.end].to_string(),
                        href: opts.links.href_for(entry),
                        rect: span.char_range_bbox(start, end),
                    },
                    entry.tooltip.clone(),
                ));
            }
        }
        if page_links.is_empty() {
            continue;
        }

        let mut annots = Vec::with_capacity(page_links.len());
        let mut underlines = Vec::with_capacity(page_links.len() * 3 + 2);
        let [r, g, b] = opts.underline_color;
        underlines.push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
        for (link, tooltip) in &page_links {
            annots.push(doc.add_object(link_annotation(link, tooltip.as_deref())));
            let [x0, y0, x1, _] = link.rect;
            underlines.push(Operation::new(
                "re",
                vec![x0.into(), y0.into(), (x1 - x0).into(), opts.underline_width.into()],
            ));
        }
        underlines.push(Operation::new("f", vec![]));
        add_annotations(doc, page_id, annots)?;
        let ops = Content {
            operations: underlines,
        }
        .encode()?;
        append_isolated_content(doc, page_id, ops)?;
        report
            .links
            .extend(page_links.into_iter().map(|(link, _)| link));
    }

    if opts.summary_page {
        let lines = summary_lines(&report);
        add_summary_page(doc, &lines)?;
    }
    Ok(report)
}

fn link_annotation(link: &PdfLink, tooltip: Option<&str>) -> Object {
    let mut annot = dictionary! {
        "Type" => "Annot",
        "Subtype" => "Link",
        "Rect" => link.rect.iter().map(|&v| Object::from(v)).collect::<Vec<_>>(),
        "Border" => vec![0.into(), 0.into(), 0.into()],
        "A" => dictionary! {
            "S" => "URI",
            "URI" => uri_string(&link.href),
        },
    };
    if let Some(tooltip) = tooltip {
        annot.set("Contents", text_string(tooltip));
    }
    Object::Dictionary(annot)
}

/// A PDF text string. ASCII is written as is, anything else as UTF-16BE
/// behind a byte order mark.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    bytes.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// URI action targets are 7-bit ASCII; other bytes of the UTF-8 form and
/// spaces are percent-encoded.
fn uri_string(uri: &str) -> Object {
    let mut encoded = String::with_capacity(uri.len());
    for byte in uri.bytes() {
        if byte.is_ascii_graphic() {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    Object::string_literal(encoded)
}

/// Append annotation references to a page's `/Annots`, which may be
/// missing, inline or indirect.
fn add_annotations(
    doc: &mut LopdfDocument,
    page_id: ObjectId,
    annots: Vec<ObjectId>,
) -> Result<()> {
    let refs: Vec<Object> = annots.into_iter().map(Object::Reference).collect();
    let existing = doc.get_dictionary(page_id)?.get(b"Annots").ok().cloned();
    match existing {
        Some(Object::Reference(id)) => {
            if let Ok(Object::Array(arr)) = doc.get_object_mut(id) {
                arr.extend(refs);
                return Ok(());
            }
            doc.get_dictionary_mut(page_id)?.set("Annots", refs);
        }
        Some(Object::Array(mut arr)) => {
            arr.extend(refs);
            doc.get_dictionary_mut(page_id)?.set("Annots", arr);
        }
        _ => doc.get_dictionary_mut(page_id)?.set("Annots", refs),
    }
    Ok(())
}

/// Bracket the page's existing content in `q`/`Q` and append `ops` after
/// it, so state left over by the page cannot affect them.
fn append_isolated_content(doc: &mut LopdfDocument, page_id: ObjectId, ops: Vec<u8>) -> Result<()> {
    let existing: Vec<Object> = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(arr)) => arr.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(arr)) => arr.clone(),
        _ => Vec::new(),
    };

    let open = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let mut closing = b"\nQ\nq\n".to_vec();
    closing.extend(ops);
    closing.extend_from_slice(b"\nQ\n");
    let close = doc.add_object(Stream::new(dictionary! {}, closing));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open));
    contents.extend(existing);
    contents.push(Object::Reference(close));
    doc.get_dictionary_mut(page_id)?.set("Contents", contents);
    Ok(())
}

fn summary_lines(report: &PdfAnnotationReport) -> Vec<String> {
    let ranked = report.by_count();
    let mut lines = vec![format!(
        "Phrase annotations: {} links on {} pages",
        report.links.len(),
        report.pages
    )];
    lines.extend(
        ranked
            .iter()
            .take(SUMMARY_LINES)
            .map(|h| format!("{}  {}", h.count, h.phrase)),
    );
    if ranked.len() > SUMMARY_LINES {
        lines.push(format!("... {} more phrases", ranked.len() - SUMMARY_LINES));
    }
    lines
}

/// Text shown with the standard Helvetica encoding; other characters
/// become `?`.
fn latin_text(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c as u8 } else { b'?' })
        .collect()
}

/// Append a page listing `lines` in Helvetica, sized like the first page.
fn add_summary_page(doc: &mut LopdfDocument, lines: &[String]) -> Result<()> {
    let pages_id = doc
        .catalog()?
        .get(b"Pages")
        .and_then(Object::as_reference)?;
    let media_box = doc
        .get_pages()
        .values()
        .next()
        .and_then(|&first| doc.get_dictionary(first).ok())
        .and_then(|page| page.get(b"MediaBox").ok().cloned())
        .unwrap_or_else(|| vec![0.into(), 0.into(), 612.into(), 792.into()].into());
    let top = match &media_box {
        Object::Array(arr) => arr.get(3).and_then(|v| v.as_float().ok()).unwrap_or(792.0),
        _ => 792.0,
    };

    let mut ops = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 11.into()]),
        Operation::new("TL", vec![15.into()]),
        Operation::new("Td", vec![72.into(), (top - 72.0).into()]),
    ];
    for line in lines {
        ops.push(Operation::new("Tj", vec![Object::string_literal(latin_text(line))]));
        ops.push(Operation::new("T*", vec![]));
    }
    ops.push(Operation::new("ET", vec![]));
    let content = Content { operations: ops }.encode()?;

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => media_box,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        },
    });

    let pages = doc.get_dictionary_mut(pages_id)?;
    let mut kids = pages
        .get(b"Kids")
        .and_then(Object::as_array)
        .cloned()
        .unwrap_or_default();
    kids.push(Object::Reference(page_id));
    let count = pages.get(b"Count").and_then(Object::as_i64).unwrap_or(0) + 1;
    pages.set("Kids", kids);
    pages.set("Count", count);
    Ok(())
}
