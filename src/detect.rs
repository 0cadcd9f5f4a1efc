//! Input format detection: PDF by magic bytes, HTML by markup sniffing.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Detected input format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputFormat {
    /// PDF with its header version (e.g. "1.7")
    Pdf { version: String },
    /// HTML, typically produced by a PDF-to-HTML converter
    Html,
}

impl InputFormat {
    /// Lowercase extension used for outputs of this format.
    pub fn extension(&self) -> &'static str {
        match self {
            InputFormat::Pdf { .. } => "pdf",
            InputFormat::Html => "html",
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, InputFormat::Pdf { .. })
    }
}

impl std::fmt::Display for InputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputFormat::Pdf { version } => write!(f, "PDF {}", version),
            InputFormat::Html => write!(f, "HTML"),
        }
    }
}

const PDF_MAGIC: &[u8] = b"%PDF-";
const VERSION_LEN: usize = 3;
/// Bytes read from the head of a file when sniffing.
const SNIFF_LEN: usize = 1024;
const HTML_MARKERS: &[&str] = &["<!doctype html", "<html", "<head", "<body", "<div", "<span", "<p"];

/// Detect the format of the file at `path`.
///
/// Fails with [`Error::MissingFile`] when the file does not exist.
///
/// # Example
/// ```no_run
/// use dasc::detect::detect_format_from_path;
///
/// let format = detect_format_from_path("chapter1.html").unwrap();
/// println!("{}", format);
/// ```
pub fn detect_format_from_path<P: AsRef<Path>>(path: P) -> Result<InputFormat> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::MissingFile(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    BufReader::new(file)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)?;
    detect_format_from_bytes(&head)
}

/// Detect the format of a byte buffer from its leading bytes.
pub fn detect_format_from_bytes(data: &[u8]) -> Result<InputFormat> {
    if data.starts_with(PDF_MAGIC) {
        let version = data
            .get(PDF_MAGIC.len()..PDF_MAGIC.len() + VERSION_LEN)
            .ok_or(Error::UnknownFormat)?;
        let version = String::from_utf8_lossy(version).to_string();
        if !is_valid_version(&version) {
            return Err(Error::UnsupportedVersion(version));
        }
        return Ok(InputFormat::Pdf { version });
    }

    let head = String::from_utf8_lossy(&data[..data.len().min(SNIFF_LEN)]).to_lowercase();
    let head = head.trim_start_matches('\u{feff}').trim_start();
    if head.starts_with('<') && HTML_MARKERS.iter().any(|m| head.contains(m)) {
        return Ok(InputFormat::Html);
    }
    Err(Error::UnknownFormat)
}

fn is_valid_version(version: &str) -> bool {
    let bytes = version.as_bytes();
    bytes.len() == 3 && bytes[0].is_ascii_digit() && bytes[1] == b'.' && bytes[2].is_ascii_digit()
}

/// Check if a file is a PDF.
pub fn is_pdf<P: AsRef<Path>>(path: P) -> bool {
    matches!(detect_format_from_path(path), Ok(InputFormat::Pdf { .. }))
}

/// Check if a file looks like HTML.
pub fn is_html<P: AsRef<Path>>(path: P) -> bool {
    matches!(detect_format_from_path(path), Ok(InputFormat::Html))
}
