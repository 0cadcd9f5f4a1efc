//! Document converters providing a plugin architecture for input formats.
//!
//! A converter takes one input document (HTML or PDF), runs the configured
//! passes over it and returns the rewritten bytes with a JSON report.
//! Converters are dispatched by file extension through the
//! [`ConverterRegistry`].
//!
//! # Example
//!
//! ```no_run
//! use dasc::convert::{ConvertOptions, ConverterRegistry};
//! use dasc::pipeline::PipelineOptions;
//! use std::path::Path;
//!
//! fn main() -> dasc::Result<()> {
//!     let registry = ConverterRegistry::with_defaults();
//!     let options = ConvertOptions::new().with_pipeline(PipelineOptions::ipcc());
//!
//!     let result = registry.convert(Path::new("chapter1.html"), &options)?;
//!     std::fs::write("chapter1_annotated.html", &result.content)?;
//!     Ok(())
//! }
//! ```

mod html;
mod pdf;

pub use html::HtmlConverter;
pub use pdf::PdfConverter;

use crate::annotate::PdfAnnotateOptions;
use crate::detect::{detect_format_from_bytes, detect_format_from_path, InputFormat};
use crate::error::{Error, Result};
use crate::pipeline::{Diagnostic, PipelineContext, PipelineOptions};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Suffix added to the file stem of converted outputs.
pub const OUTPUT_SUFFIX: &str = "_annotated";

/// Options for document conversion.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// HTML passes; `pipeline.terms` also drives PDF annotation
    pub pipeline: PipelineOptions,

    /// PDF link and underline settings
    pub pdf: PdfAnnotateOptions,

    /// Directory for debug snapshots
    pub output_dir: Option<PathBuf>,

    /// Write a snapshot after each HTML pass
    pub debug_snapshots: bool,
}

impl ConvertOptions {
    /// Create new conversion options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the HTML pipeline.
    pub fn with_pipeline(mut self, pipeline: PipelineOptions) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Set PDF annotation options.
    pub fn with_pdf_options(mut self, pdf: PdfAnnotateOptions) -> Self {
        self.pdf = pdf;
        self
    }

    /// Set the snapshot directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Enable per-pass snapshots.
    pub fn with_debug_snapshots(mut self, enabled: bool) -> Self {
        self.debug_snapshots = enabled;
        self
    }

    /// A fresh context for one document.
    pub(crate) fn context(&self) -> PipelineContext {
        let mut ctx = PipelineContext::new().with_debug_snapshots(self.debug_snapshots);
        if let Some(dir) = &self.output_dir {
            ctx = ctx.with_output_dir(dir);
        }
        ctx
    }
}

/// Result of document conversion.
#[derive(Debug, Clone)]
pub struct ConvertResult {
    /// Converted document bytes
    pub content: Vec<u8>,

    /// Pass reports as JSON
    pub report: serde_json::Value,

    /// Warnings collected while converting
    pub diagnostics: Vec<Diagnostic>,

    /// MIME type of the output
    pub mime_type: &'static str,
}

impl ConvertResult {
    /// Create a new conversion result.
    pub fn new(content: Vec<u8>, report: serde_json::Value) -> Self {
        Self {
            content,
            report,
            diagnostics: Vec::new(),
            mime_type: "text/html",
        }
    }

    /// Set collected diagnostics.
    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Set MIME type.
    pub fn with_mime_type(mut self, mime_type: &'static str) -> Self {
        self.mime_type = mime_type;
        self
    }
}

/// Trait for document converters.
///
/// Implement this trait to add support for a new input format.
pub trait DocumentConverter: Send + Sync {
    /// Get the supported file extensions for this converter.
    ///
    /// Extensions should be lowercase without the leading dot (e.g., `["pdf"]`).
    fn supported_extensions(&self) -> &[&str];

    /// Get the name of this converter.
    fn name(&self) -> &str;

    /// Convert a file at the given path.
    fn convert(&self, path: &Path, options: &ConvertOptions) -> Result<ConvertResult>;

    /// Convert from bytes.
    fn convert_bytes(&self, bytes: &[u8], options: &ConvertOptions) -> Result<ConvertResult>;

    /// Check if this converter supports the given extension.
    fn supports_extension(&self, ext: &str) -> bool {
        let ext_lower = ext.to_lowercase();
        self.supported_extensions().iter().any(|e| *e == ext_lower)
    }
}

/// Registry for document converters.
///
/// The registry maps file extensions to converters and provides
/// convenient methods for converting documents.
pub struct ConverterRegistry {
    converters: HashMap<String, Arc<dyn DocumentConverter>>,
    by_name: HashMap<String, Arc<dyn DocumentConverter>>,
}

impl ConverterRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            converters: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Create a registry with the HTML and PDF converters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(HtmlConverter::new()));
        registry.register(Arc::new(PdfConverter::new()));
        registry
    }

    /// Register a converter for all its supported extensions.
    pub fn register(&mut self, converter: Arc<dyn DocumentConverter>) {
        for ext in converter.supported_extensions() {
            self.converters
                .insert(ext.to_lowercase(), converter.clone());
        }
        self.by_name
            .insert(converter.name().to_lowercase(), converter);
    }

    /// Get a converter by file extension.
    pub fn get_by_extension(&self, ext: &str) -> Option<Arc<dyn DocumentConverter>> {
        self.converters.get(&ext.to_lowercase()).cloned()
    }

    /// Get a converter by name.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn DocumentConverter>> {
        self.by_name.get(&name.to_lowercase()).cloned()
    }

    /// Check if an extension is supported.
    pub fn supports(&self, ext: &str) -> bool {
        self.converters.contains_key(&ext.to_lowercase())
    }

    /// Get all supported extensions.
    pub fn supported_extensions(&self) -> Vec<&str> {
        self.converters.keys().map(|s| s.as_str()).collect()
    }

    /// Convert a file with the converter for its extension. Files with a
    /// missing or unregistered extension are dispatched on their content.
    pub fn convert(&self, path: &Path, options: &ConvertOptions) -> Result<ConvertResult> {
        let by_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| self.get_by_extension(ext));
        let converter = match by_ext {
            Some(converter) => converter,
            None => self.for_format(detect_format_from_path(path)?)?,
        };
        converter.convert(path, options)
    }

    /// Convert bytes with the converter for `ext`, sniffing the bytes when
    /// no converter is registered for it.
    pub fn convert_bytes(
        &self,
        bytes: &[u8],
        ext: &str,
        options: &ConvertOptions,
    ) -> Result<ConvertResult> {
        let converter = match self.get_by_extension(ext) {
            Some(converter) => converter,
            None => self.for_format(detect_format_from_bytes(bytes)?)?,
        };
        converter.convert_bytes(bytes, options)
    }

    fn for_format(&self, format: InputFormat) -> Result<Arc<dyn DocumentConverter>> {
        self.get_by_extension(format.extension())
            .ok_or_else(|| Error::Other(format!("no converter registered for {}", format)))
    }

    /// Convert many files in parallel, writing each result to
    /// `out_dir/<stem>_annotated.<ext>`.
    ///
    /// Each document gets its own context; a failure is reported for that
    /// input only.
    pub fn convert_batch(
        &self,
        inputs: &[PathBuf],
        out_dir: &Path,
        options: &ConvertOptions,
    ) -> Vec<(PathBuf, Result<PathBuf>)> {
        inputs
            .par_iter()
            .map(|input| {
                let written = self.convert(input, options).and_then(|result| {
                    let out = output_path(input, out_dir);
                    std::fs::create_dir_all(out_dir)?;
                    std::fs::write(&out, &result.content)?;
                    Ok(out)
                });
                if let Err(e) = &written {
                    log::warn!("{}: {}", input.display(), e);
                }
                (input.clone(), written)
            })
            .collect()
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// `out_dir/<stem>_annotated.<ext>` for `input`.
pub fn output_path(input: &Path, out_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let name = match input.extension() {
        Some(ext) => format!("{}{}.{}", stem, OUTPUT_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, OUTPUT_SUFFIX),
    };
    out_dir.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TermList;

    #[test]
    fn test_convert_options_builder() {
        let options = ConvertOptions::new()
            .with_output_dir("/tmp/snapshots")
            .with_debug_snapshots(true)
            .with_pipeline(PipelineOptions::ipcc());

        assert_eq!(options.output_dir, Some(PathBuf::from("/tmp/snapshots")));
        assert!(options.debug_snapshots);
        assert!(options.pipeline.rules.is_some());
    }

    #[test]
    fn test_registry_with_defaults() {
        let registry = ConverterRegistry::with_defaults();
        assert!(registry.supports("pdf"));
        assert!(registry.supports("HTML"));
        assert!(registry.supports("htm"));
        assert!(!registry.supports("docx"));
    }

    #[test]
    fn test_registry_get_by_name() {
        let registry = ConverterRegistry::with_defaults();
        assert_eq!(registry.get_by_extension("pdf").unwrap().name(), "pdf");
        assert_eq!(registry.get_by_name("HTML").unwrap().name(), "html");
    }

    #[test]
    fn test_unregistered_extension_is_sniffed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chapter.txt");
        std::fs::write(&path, "<html><body><p>net zero</p></body></html>").unwrap();

        let options = ConvertOptions::new().with_pipeline(
            PipelineOptions::new().with_terms(TermList::from_phrases(&["net zero"])),
        );
        let result = ConverterRegistry::with_defaults()
            .convert(&path, &options)
            .unwrap();
        assert_eq!(result.mime_type, "text/html");

        let err = ConverterRegistry::with_defaults()
            .convert_bytes(b"plain notes", "txt", &options)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownFormat));
    }

    #[test]
    fn test_output_path() {
        let out = output_path(Path::new("in/chapter1.html"), Path::new("out"));
        assert_eq!(out, PathBuf::from("out/chapter1_annotated.html"));
    }

    #[test]
    fn test_convert_batch_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.html");
        std::fs::write(&good, "<html><body><p>climate change</p></body></html>").unwrap();
        let missing = dir.path().join("missing.html");
        let out_dir = dir.path().join("out");

        let options = ConvertOptions::new().with_pipeline(
            PipelineOptions::new().with_terms(TermList::from_phrases(&["climate change"])),
        );
        let registry = ConverterRegistry::with_defaults();
        let results = registry.convert_batch(&[good, missing], &out_dir, &options);

        assert_eq!(results.len(), 2);
        let written = results[0].1.as_ref().unwrap();
        let html = std::fs::read_to_string(written).unwrap();
        assert!(html.contains("<a "));
        assert!(matches!(results[1].1, Err(Error::MissingFile(_))));
    }
}
