//! Error types for dasc library.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dasc operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while structuring or annotating documents.
///
/// Recoverable conditions (malformed CSS declarations, a poor header/footer
/// fit, unmatched float markers) are not errors; they are logged and recorded
/// in the [`PipelineContext`](crate::pipeline::PipelineContext) diagnostics.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A required input file does not exist.
    #[error("Missing required file: {}", .0.display())]
    MissingFile(PathBuf),

    /// The input is neither PDF nor HTML.
    #[error("Unknown file format: not a PDF or HTML document")]
    UnknownFormat,

    /// The PDF version is not supported.
    #[error("Unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    /// The HTML input could not be turned into a document tree.
    #[error("HTML parsing error: {0}")]
    HtmlParse(String),

    /// Error reading or writing PDF structure.
    #[error("PDF parsing error: {0}")]
    PdfParse(String),

    /// A regular expression failed to compile.
    #[error("Invalid regex '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A regular expression lacks a named group the recognizer depends on.
    #[error("Regex '{pattern}' has no named group '{group}'")]
    MissingNamedGroup { pattern: String, group: String },

    /// A locator (path expression) could not be parsed.
    #[error("Invalid locator '{expr}': {message}")]
    Locator { expr: String, message: String },

    /// A term list is malformed.
    #[error("Term list error: {0}")]
    Terms(String),

    /// JSON configuration or data could not be read.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a [`Error::Regex`] for a pattern that failed to compile.
    pub fn regex(pattern: impl Into<String>, source: regex::Error) -> Self {
        Error::Regex {
            pattern: pattern.into(),
            source,
        }
    }

    /// Build a [`Error::Locator`] for a malformed path expression.
    pub fn locator(expr: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Locator {
            expr: expr.into(),
            message: message.into(),
        }
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            _ => Error::PdfParse(err.to_string()),
        }
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Terms(err.to_string())
    }
}

/// Compile a regex, attaching the offending pattern to the error.
pub(crate) fn compile_regex(pattern: &str) -> Result<regex::Regex> {
    regex::Regex::new(pattern).map_err(|e| Error::regex(pattern, e))
}
