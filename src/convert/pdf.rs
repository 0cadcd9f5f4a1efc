//! PDF document converter implementation.

use crate::annotate::{annotate_pdf_document, PhraseMatcher};
use crate::error::{Error, Result};
use crate::parser::load_pdf;
use lopdf::Document as LopdfDocument;
use std::path::Path;

use super::{ConvertOptions, ConvertResult, DocumentConverter};

/// PDF document converter.
///
/// Adds link annotations and underlines for the pipeline's terms.
#[derive(Debug, Clone, Default)]
pub struct PdfConverter {
    _private: (),
}

impl PdfConverter {
    /// Create a new PDF converter.
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn convert_document(
        &self,
        mut doc: LopdfDocument,
        options: &ConvertOptions,
    ) -> Result<ConvertResult> {
        let terms = options
            .pipeline
            .terms
            .as_ref()
            .ok_or_else(|| Error::Terms("PDF annotation needs a term list".to_string()))?;

        let mut ctx = options.context();
        let matcher = PhraseMatcher::new(terms, &mut ctx);
        let report = annotate_pdf_document(&mut doc, &matcher, &options.pdf)?;

        let mut content = Vec::new();
        doc.save_to(&mut content)?;
        Ok(ConvertResult::new(content, serde_json::to_value(&report)?)
            .with_diagnostics(ctx.take_diagnostics())
            .with_mime_type("application/pdf"))
    }
}

impl DocumentConverter for PdfConverter {
    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }

    fn name(&self) -> &str {
        "pdf"
    }

    fn convert(&self, path: &Path, options: &ConvertOptions) -> Result<ConvertResult> {
        let doc = load_pdf(path)?;
        self.convert_document(doc, options)
    }

    fn convert_bytes(&self, bytes: &[u8], options: &ConvertOptions) -> Result<ConvertResult> {
        let doc = LopdfDocument::load_mem(bytes)?;
        self.convert_document(doc, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TermList;
    use crate::parser::sample_pdf;
    use crate::pipeline::PipelineOptions;

    fn sample_bytes() -> Vec<u8> {
        let mut doc = sample_pdf("BT /F1 12 Tf 72 720 Td (Net zero by 2050) Tj ET");
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_pdf_converter_requires_terms() {
        let result = PdfConverter::new().convert_bytes(&sample_bytes(), &ConvertOptions::default());
        assert!(matches!(result, Err(Error::Terms(_))));
    }

    #[test]
    fn test_pdf_converter_adds_links() {
        let options = ConvertOptions::new().with_pipeline(
            PipelineOptions::new().with_terms(TermList::from_phrases(&["net zero"])),
        );
        let result = PdfConverter::new()
            .convert_bytes(&sample_bytes(), &options)
            .unwrap();

        assert_eq!(result.mime_type, "application/pdf");
        assert!(result.content.starts_with(b"%PDF-"));
        assert_eq!(result.report["links"].as_array().unwrap().len(), 1);

        let out = LopdfDocument::load_mem(&result.content).unwrap();
        let first = *out.get_pages().get(&1).unwrap();
        assert_eq!(out.get_page_annotations(first).unwrap().len(), 1);
    }
}
