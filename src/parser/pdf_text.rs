//! Positioned text extraction from PDF pages.
//!
//! Every text-showing operator becomes one [`PdfSpan`] carrying its decoded
//! text and an approximate bounding box in default user space. Widths come
//! from the font's `/Widths` table when it has one; otherwise each glyph is
//! taken as half the font size wide.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId};

use crate::error::{Error, Result};

/// Fallback glyph width as a fraction of the font size.
const DEFAULT_GLYPH_WIDTH: f32 = 0.5;

/// TJ adjustment (thousandths of an em) treated as a word space.
const TJ_SPACE_THRESHOLD: f32 = 200.0;

/// A run of text with its bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfSpan {
    /// Decoded text
    pub text: String,
    /// Left edge
    pub x0: f32,
    /// Bottom edge (approximate descender)
    pub y0: f32,
    /// Right edge
    pub x1: f32,
    /// Top edge (approximate ascender)
    pub y1: f32,
    /// Effective font size in points
    pub font_size: f32,
    /// Base font name, e.g. "Helvetica-Bold"
    pub font_name: String,
}

impl PdfSpan {
    /// Horizontal extent.
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    /// Number of characters in the text.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Bounding box of the characters `[start, end)`, apportioning the span
    /// width uniformly across its characters.
    pub fn char_range_bbox(&self, start: usize, end: usize) -> [f32; 4] {
        let n = self.char_count().max(1) as f32;
        let width = self.width();
        [
            self.x0 + (start as f32 / n) * width,
            self.y0,
            self.x0 + (end as f32 / n) * width,
            self.y1,
        ]
    }
}

/// Glyph metrics for one font resource.
#[derive(Debug, Clone)]
struct FontMetrics {
    base_font: String,
    first_char: i64,
    widths: Vec<f32>,
    two_byte: bool,
    has_encoding: bool,
}

impl FontMetrics {
    fn from_dict(font: &Dictionary, doc: &LopdfDocument) -> Self {
        let base_font = font
            .get(b"BaseFont")
            .ok()
            .and_then(|o| o.as_name().ok())
            .map(|n| String::from_utf8_lossy(n).to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let two_byte = font
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|n| n == b"Type0")
            .unwrap_or(false);
        let first_char = font
            .get(b"FirstChar")
            .and_then(Object::as_i64)
            .unwrap_or(0);
        let widths = font
            .get_deref(b"Widths", doc)
            .and_then(Object::as_array)
            .map(|arr| arr.iter().map(|w| w.as_float().unwrap_or(0.0)).collect())
            .unwrap_or_default();
        Self {
            base_font,
            first_char,
            widths,
            two_byte,
            has_encoding: font.has(b"Encoding") || font.has(b"ToUnicode"),
        }
    }

    /// Advance of a string in text space units, per unit font size.
    fn advance(&self, bytes: &[u8], decoded: &str, state: &TextState) -> f32 {
        if self.two_byte || self.widths.is_empty() {
            let n = decoded.chars().count() as f32;
            let spaces = decoded.chars().filter(|&c| c == ' ').count() as f32;
            return n * (DEFAULT_GLYPH_WIDTH * state.size + state.char_spacing)
                + spaces * state.word_spacing;
        }
        bytes
            .iter()
            .map(|&b| {
                let glyph = usize::try_from(b as i64 - self.first_char)
                    .ok()
                    .and_then(|i| self.widths.get(i))
                    .map(|w| w / 1000.0 * state.size)
                    .unwrap_or(DEFAULT_GLYPH_WIDTH * state.size);
                let word = if b == b' ' { state.word_spacing } else { 0.0 };
                glyph + state.char_spacing + word
            })
            .sum()
    }
}

/// Text state parameters that affect glyph advance.
#[derive(Debug, Clone)]
struct TextState {
    size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
        }
    }
}

/// Text matrix and line matrix.
#[derive(Debug, Clone)]
struct TextMatrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32, // X translation
    f: f32, // Y translation
    line_e: f32,
    line_f: f32,
    leading: f32,
}

impl Default for TextMatrix {
    fn default() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
            line_e: 0.0,
            line_f: 0.0,
            leading: 12.0,
        }
    }
}

impl TextMatrix {
    fn set(&mut self, a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) {
        self.a = a;
        self.b = b;
        self.c = c;
        self.d = d;
        self.e = e;
        self.f = f;
        self.line_e = e;
        self.line_f = f;
    }

    fn translate(&mut self, tx: f32, ty: f32) {
        self.line_e += tx * self.a + ty * self.c;
        self.line_f += tx * self.b + ty * self.d;
        self.e = self.line_e;
        self.f = self.line_f;
    }

    fn next_line(&mut self) {
        self.translate(0.0, -self.leading);
    }

    fn advance(&mut self, tx: f32) {
        self.e += tx * self.a;
        self.f += tx * self.b;
    }

    fn get_position(&self) -> (f32, f32) {
        (self.e, self.f)
    }

    fn get_scale(&self) -> f32 {
        (self.a * self.a + self.c * self.c).sqrt()
    }
}

/// Current transformation matrix `[a b c d e f]`.
type Ctm = [f32; 6];

const IDENTITY: Ctm = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

fn concat(m: &Ctm, ctm: &Ctm) -> Ctm {
    [
        m[0] * ctm[0] + m[1] * ctm[2],
        m[0] * ctm[1] + m[1] * ctm[3],
        m[2] * ctm[0] + m[3] * ctm[2],
        m[2] * ctm[1] + m[3] * ctm[3],
        m[4] * ctm[0] + m[5] * ctm[2] + ctm[4],
        m[4] * ctm[1] + m[5] * ctm[3] + ctm[5],
    ]
}

fn transform(ctm: &Ctm, x: f32, y: f32) -> (f32, f32) {
    (
        x * ctm[0] + y * ctm[2] + ctm[4],
        x * ctm[1] + y * ctm[3] + ctm[5],
    )
}

/// Load a PDF from disk.
///
/// Fails with [`Error::MissingFile`] when the file does not exist.
pub fn load_pdf<P: AsRef<Path>>(path: P) -> Result<LopdfDocument> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::MissingFile(path.to_path_buf()));
    }
    Ok(LopdfDocument::load(path)?)
}

/// Extract spans from every page, keyed by 1-based page number.
pub fn extract_spans(doc: &LopdfDocument) -> Result<BTreeMap<u32, Vec<PdfSpan>>> {
    let mut pages = BTreeMap::new();
    for (page_num, page_id) in doc.get_pages() {
        pages.insert(page_num, extract_page_spans(doc, page_id)?);
    }
    Ok(pages)
}

/// Extract spans from one page.
pub fn extract_page_spans(doc: &LopdfDocument, page_id: ObjectId) -> Result<Vec<PdfSpan>> {
    let lopdf_fonts = doc
        .get_page_fonts(page_id)
        .map_err(|e| Error::PdfParse(e.to_string()))?;

    let mut fonts = HashMap::new();
    for (name, font) in &lopdf_fonts {
        fonts.insert(name.clone(), FontMetrics::from_dict(font, doc));
    }

    let content = page_content(doc, page_id)?;
    if content.is_empty() {
        return Ok(Vec::new());
    }
    parse_content_stream(doc, &content, &fonts, &lopdf_fonts)
}

/// Concatenated, decompressed content streams of a page.
pub(crate) fn page_content(doc: &LopdfDocument, page_id: ObjectId) -> Result<Vec<u8>> {
    let page_dict = doc
        .get_dictionary(page_id)
        .map_err(|e| Error::PdfParse(e.to_string()))?;

    let Ok(contents) = page_dict.get(b"Contents") else {
        return Ok(Vec::new());
    };

    let stream_data = |id: ObjectId| -> Option<Vec<u8>> {
        match doc.get_object(id) {
            Ok(Object::Stream(s)) => Some(
                s.decompressed_content()
                    .unwrap_or_else(|_| s.content.clone()),
            ),
            _ => None,
        }
    };

    match contents {
        Object::Reference(r) => match doc.get_object(*r) {
            Ok(Object::Array(arr)) => Ok(concat_streams(arr, stream_data)),
            _ => stream_data(*r)
                .ok_or_else(|| Error::PdfParse("Invalid content stream".to_string())),
        },
        Object::Array(arr) => Ok(concat_streams(arr, stream_data)),
        _ => Err(Error::PdfParse("Invalid content stream".to_string())),
    }
}

fn concat_streams(arr: &[Object], stream_data: impl Fn(ObjectId) -> Option<Vec<u8>>) -> Vec<u8> {
    let mut content = Vec::new();
    for obj in arr {
        if let Object::Reference(r) = obj {
            if let Some(data) = stream_data(*r) {
                content.extend_from_slice(&data);
                content.push(b' ');
            }
        }
    }
    content
}

fn parse_content_stream(
    doc: &LopdfDocument,
    content: &[u8],
    fonts: &HashMap<Vec<u8>, FontMetrics>,
    lopdf_fonts: &BTreeMap<Vec<u8>, &Dictionary>,
) -> Result<Vec<PdfSpan>> {
    let content =
        lopdf::content::Content::decode(content).map_err(|e| Error::PdfParse(e.to_string()))?;

    let unknown = FontMetrics {
        base_font: "Unknown".to_string(),
        first_char: 0,
        widths: Vec::new(),
        two_byte: false,
        has_encoding: false,
    };

    let mut spans = Vec::new();
    let mut current_font_name: Vec<u8> = Vec::new();
    let mut state = TextState::default();
    let mut text_matrix = TextMatrix::default();
    let mut ctm = IDENTITY;
    let mut ctm_stack: Vec<Ctm> = Vec::new();
    let mut in_text_block = false;

    for op in content.operations {
        let num = |i: usize, default: f32| {
            op.operands
                .get(i)
                .and_then(get_number)
                .unwrap_or(default)
        };
        match op.operator.as_str() {
            "q" => ctm_stack.push(ctm),
            "Q" => ctm = ctm_stack.pop().unwrap_or(IDENTITY),
            "cm" if op.operands.len() >= 6 => {
                let m = [
                    num(0, 1.0),
                    num(1, 0.0),
                    num(2, 0.0),
                    num(3, 1.0),
                    num(4, 0.0),
                    num(5, 0.0),
                ];
                ctm = concat(&m, &ctm);
            }
            "BT" => {
                in_text_block = true;
                let leading = text_matrix.leading;
                text_matrix = TextMatrix {
                    leading,
                    ..TextMatrix::default()
                };
            }
            "ET" => in_text_block = false,
            "Tf" if op.operands.len() >= 2 => {
                if let Object::Name(font_name) = &op.operands[0] {
                    current_font_name = font_name.clone();
                }
                state.size = num(1, 12.0);
            }
            "Tc" => state.char_spacing = num(0, 0.0),
            "Tw" => state.word_spacing = num(0, 0.0),
            "Tz" => state.horizontal_scale = num(0, 100.0) / 100.0,
            "TL" => text_matrix.leading = num(0, 0.0),
            "Td" | "TD" if op.operands.len() >= 2 => {
                let tx = num(0, 0.0);
                let ty = num(1, 0.0);
                if op.operator == "TD" {
                    text_matrix.leading = -ty;
                }
                text_matrix.translate(tx, ty);
            }
            "Tm" if op.operands.len() >= 6 => {
                text_matrix.set(
                    num(0, 1.0),
                    num(1, 0.0),
                    num(2, 0.0),
                    num(3, 1.0),
                    num(4, 0.0),
                    num(5, 0.0),
                );
            }
            "T*" => text_matrix.next_line(),
            "Tj" | "TJ" | "'" | "\"" if in_text_block => {
                if op.operator == "'" || op.operator == "\"" {
                    text_matrix.next_line();
                }
                if op.operator == "\"" {
                    state.word_spacing = num(0, state.word_spacing);
                    state.char_spacing = num(1, state.char_spacing);
                }
                let metrics = fonts.get(&current_font_name).unwrap_or(&unknown);
                let encoding = if metrics.has_encoding {
                    lopdf_fonts
                        .get(&current_font_name)
                        .and_then(|f| f.get_font_encoding(doc).ok())
                } else {
                    None
                };
                let decode = |bytes: &[u8]| match &encoding {
                    Some(enc) => LopdfDocument::decode_text(enc, bytes).unwrap_or_default(),
                    None => decode_text_simple(bytes),
                };

                let (start_x, start_y) = text_matrix.get_position();
                let mut text = String::new();
                let mut advance = 0.0;
                let operand_idx = if op.operator == "\"" { 2 } else { 0 };
                match op.operands.get(operand_idx) {
                    Some(Object::String(bytes, _)) => {
                        let decoded = decode(bytes.as_slice());
                        advance += metrics.advance(bytes, &decoded, &state);
                        text.push_str(&decoded);
                    }
                    Some(Object::Array(arr)) => {
                        for item in arr {
                            match item {
                                Object::String(bytes, _) => {
                                    let decoded = decode(bytes.as_slice());
                                    advance += metrics.advance(bytes, &decoded, &state);
                                    text.push_str(&decoded);
                                }
                                Object::Integer(_) | Object::Real(_) => {
                                    let adjustment = -get_number(item).unwrap_or(0.0);
                                    advance += adjustment / 1000.0 * state.size;
                                    if adjustment > TJ_SPACE_THRESHOLD && needs_space(&text) {
                                        text.push(' ');
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                }

                let advance = advance * state.horizontal_scale;
                text_matrix.advance(advance);
                if text.trim().is_empty() {
                    continue;
                }

                let scale = text_matrix.get_scale();
                let size = state.size * scale;
                let (x0, y0) = transform(&ctm, start_x, start_y - 0.2 * size);
                let (x1, y1) = transform(&ctm, start_x + advance * scale, start_y + 0.8 * size);
                let ctm_scale = (ctm[0] * ctm[0] + ctm[2] * ctm[2]).sqrt();
                spans.push(PdfSpan {
                    text,
                    x0: x0.min(x1),
                    y0: y0.min(y1),
                    x1: x0.max(x1),
                    y1: y0.max(y1),
                    font_size: size * ctm_scale,
                    font_name: metrics.base_font.clone(),
                });
            }
            _ => {}
        }
    }

    Ok(spans)
}

fn needs_space(text: &str) -> bool {
    match text.chars().last() {
        Some(c) => c != ' ' && c != '\u{00A0}' && !is_spaceless_script_char(c),
        None => false,
    }
}

/// Helper to extract number from PDF object.
fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Check if character is from a script that doesn't use word spaces.
fn is_spaceless_script_char(c: char) -> bool {
    let code = c as u32;

    // CJK Unified Ideographs and Extension A
    (0x4E00..=0x9FFF).contains(&code)
    || (0x3400..=0x4DBF).contains(&code)
    // Extensions B-F
    || (0x20000..=0x2EBEF).contains(&code)
    // Hiragana, Katakana
    || (0x3040..=0x30FF).contains(&code)
    // CJK Symbols and Punctuation
    || (0x3000..=0x303F).contains(&code)
}

/// Simple text decoding fallback when no encoding is available.
fn decode_text_simple(bytes: &[u8]) -> String {
    // UTF-16BE with BOM
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16(&utf16).unwrap_or_default();
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    // Latin-1
    bytes.iter().map(|&b| b as char).collect()
}

/// Build a one-page PDF with a Helvetica `/F1` resource and the given content.
#[cfg(test)]
pub(crate) fn sample_pdf(content: &str) -> LopdfDocument {
    use lopdf::{dictionary, Stream};

    let mut doc = LopdfDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.as_bytes().to_vec()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_page_spans(doc: &LopdfDocument) -> Vec<PdfSpan> {
        let page_id = *doc.get_pages().get(&1).unwrap();
        extract_page_spans(doc, page_id).unwrap()
    }

    #[test]
    fn test_tj_span_with_fallback_widths() {
        let doc = sample_pdf("BT /F1 12 Tf 72 700 Td (Climate change matters) Tj ET");
        let spans = first_page_spans(&doc);
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.text, "Climate change matters");
        assert_eq!(span.font_name, "Helvetica");
        assert!((span.x0 - 72.0).abs() < 1e-3);
        assert!((span.width() - 22.0 * 6.0).abs() < 1e-3);
        assert!((span.y0 - (700.0 - 2.4)).abs() < 1e-3);
        assert!((span.y1 - (700.0 + 9.6)).abs() < 1e-3);
    }

    #[test]
    fn test_char_range_bbox_is_uniform() {
        let doc = sample_pdf("BT /F1 12 Tf 72 700 Td (Climate change matters) Tj ET");
        let span = &first_page_spans(&doc)[0];
        let bbox = span.char_range_bbox(0, 14);
        assert!((bbox[0] - 72.0).abs() < 1e-3);
        assert!((bbox[2] - 156.0).abs() < 1e-3);
    }

    #[test]
    fn test_consecutive_tj_advance() {
        let doc = sample_pdf("BT /F1 10 Tf 100 500 Td (ab) Tj (cd) Tj ET");
        let spans = first_page_spans(&doc);
        assert_eq!(spans.len(), 2);
        assert!((spans[1].x0 - 110.0).abs() < 1e-3);
    }

    #[test]
    fn test_tj_array_spacing_and_adjustment() {
        let doc = sample_pdf("BT /F1 10 Tf 0 0 Td [(sea) -300 (level)] TJ ET");
        let spans = first_page_spans(&doc);
        assert_eq!(spans[0].text, "sea level");
        // 8 glyphs at 5pt plus a 3pt adjustment
        assert!((spans[0].width() - 43.0).abs() < 1e-3);
    }

    #[test]
    fn test_widths_table_and_ctm() {
        let mut doc = sample_pdf("q 2 0 0 2 10 20 cm BT /F1 10 Tf 0 0 Td (AB) Tj ET Q");
        let font_id = doc
            .objects
            .iter()
            .find(|(_, o)| {
                o.as_dict()
                    .map(|d| d.has(b"BaseFont"))
                    .unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .unwrap();
        let font = doc.get_dictionary_mut(font_id).unwrap();
        font.set("FirstChar", 65);
        font.set("Widths", vec![Object::Integer(600), Object::Integer(400)]);

        let span = &first_page_spans(&doc)[0];
        assert!((span.x0 - 10.0).abs() < 1e-3);
        // (6 + 4) text units, doubled by the CTM
        assert!((span.x1 - 30.0).abs() < 1e-3);
        assert!((span.font_size - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_page_without_contents() {
        let mut doc = sample_pdf("");
        let page_id = *doc.get_pages().get(&1).unwrap();
        doc.get_dictionary_mut(page_id).unwrap().remove(b"Contents");
        assert!(extract_page_spans(&doc, page_id).unwrap().is_empty());
    }

    #[test]
    fn test_extract_spans_all_pages() {
        let doc = sample_pdf("BT /F1 12 Tf 72 700 Td (x) Tj ET");
        let pages = extract_spans(&doc).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[&1].len(), 1);
    }

    #[test]
    fn test_decode_text_simple() {
        assert_eq!(decode_text_simple(b"abc"), "abc");
        assert_eq!(decode_text_simple(&[0xFE, 0xFF, 0x00, 0x41]), "A");
        assert_eq!(decode_text_simple(&[0xE9]), "é");
    }
}
