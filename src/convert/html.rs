//! HTML document converter.

use crate::error::{Error, Result};
use crate::model::HtmlDocument;
use crate::pipeline::run_pipeline;
use std::path::Path;

use super::{ConvertOptions, ConvertResult, DocumentConverter};

/// Runs the HTML pipeline over a converter-produced HTML page.
#[derive(Debug, Clone, Default)]
pub struct HtmlConverter {
    _private: (),
}

impl HtmlConverter {
    /// Create a new HTML converter.
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn convert_str(&self, html: &str, options: &ConvertOptions) -> Result<ConvertResult> {
        let mut doc = HtmlDocument::parse(html)?;
        let mut ctx = options.context();
        let report = run_pipeline(&mut doc, &options.pipeline, &mut ctx)?;
        Ok(
            ConvertResult::new(doc.serialize().into_bytes(), serde_json::to_value(&report)?)
                .with_diagnostics(ctx.take_diagnostics())
                .with_mime_type("text/html"),
        )
    }
}

impl DocumentConverter for HtmlConverter {
    fn supported_extensions(&self) -> &[&str] {
        &["html", "htm", "xhtml"]
    }

    fn name(&self) -> &str {
        "html"
    }

    fn convert(&self, path: &Path, options: &ConvertOptions) -> Result<ConvertResult> {
        if !path.exists() {
            return Err(Error::MissingFile(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        self.convert_bytes(&bytes, options)
    }

    fn convert_bytes(&self, bytes: &[u8], options: &ConvertOptions) -> Result<ConvertResult> {
        let html = String::from_utf8_lossy(bytes);
        self.convert_str(&html, options)
    }
}
