//! Integration tests for the converter module.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dasc::convert::{
    output_path, ConvertOptions, ConvertResult, ConverterRegistry, DocumentConverter,
    HtmlConverter, PdfConverter,
};
use dasc::error::Result;
use dasc::{detect_format_from_path, InputFormat, PipelineOptions, TermList};

/// Mock converter for testing.
struct MockConverter {
    extensions: Vec<&'static str>,
    name: &'static str,
}

impl MockConverter {
    fn new(extensions: Vec<&'static str>, name: &'static str) -> Self {
        Self { extensions, name }
    }
}

impl DocumentConverter for MockConverter {
    fn supported_extensions(&self) -> &[&str] {
        &self.extensions
    }

    fn name(&self) -> &str {
        self.name
    }

    fn convert(&self, _path: &Path, _options: &ConvertOptions) -> Result<ConvertResult> {
        Ok(ConvertResult::new(
            format!("Converted by {}", self.name).into_bytes(),
            serde_json::Value::Null,
        ))
    }

    fn convert_bytes(&self, _bytes: &[u8], _options: &ConvertOptions) -> Result<ConvertResult> {
        Ok(ConvertResult::new(
            format!("Converted bytes by {}", self.name).into_bytes(),
            serde_json::Value::Null,
        ))
    }
}

#[test]
fn test_converter_registry_new() {
    let registry = ConverterRegistry::new();
    assert!(!registry.supports("html"));
    assert!(registry.supported_extensions().is_empty());
}

#[test]
fn test_registry_with_defaults() {
    let registry = ConverterRegistry::with_defaults();
    assert!(registry.supports("pdf"));
    assert!(registry.supports("html"));
    assert!(registry.supports("HTM"));
    assert!(!registry.supports("docx"));
}

#[test]
fn test_register_custom_converter() {
    let mut registry = ConverterRegistry::new();
    registry.register(Arc::new(MockConverter::new(vec!["xml", "xhtml"], "Mock")));

    assert!(registry.supports("xml"));
    assert!(registry.supports("XHTML"));
    assert!(registry.get_by_name("mock").is_some());

    let result = registry
        .convert_bytes(b"<x/>", "xml", &ConvertOptions::default())
        .unwrap();
    assert_eq!(result.content, b"Converted bytes by Mock");
    assert_eq!(result.mime_type, "text/html");
}

#[test]
fn test_later_registration_wins() {
    let mut registry = ConverterRegistry::with_defaults();
    registry.register(Arc::new(MockConverter::new(vec!["html"], "override")));

    let converter = registry.get_by_extension("html").unwrap();
    assert_eq!(converter.name(), "override");
    assert_eq!(registry.get_by_name("pdf").unwrap().name(), "pdf");
}

#[test]
fn test_unknown_extension() {
    let registry = ConverterRegistry::with_defaults();
    let result = registry.convert(Path::new("notes.docx"), &ConvertOptions::default());
    assert!(result.is_err());
    let result = registry.convert(Path::new("no_extension"), &ConvertOptions::default());
    assert!(result.is_err());
}

#[test]
fn test_converter_traits() {
    let html = HtmlConverter::new();
    let pdf = PdfConverter::new();
    assert!(html.supports_extension("html"));
    assert!(!html.supports_extension("pdf"));
    assert!(pdf.supports_extension("PDF"));
    assert_eq!(pdf.name(), "pdf");
}

#[test]
fn test_html_conversion_with_debug_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("chapter.html");
    std::fs::write(
        &input,
        r#"<html><body><div><span style="font-size: 11px">Section 1: Oceans</span></div>
        <div><span style="font-size: 11px">Ocean warming continues.</span></div></body></html>"#,
    )
    .unwrap();
    assert_eq!(detect_format_from_path(&input).unwrap(), InputFormat::Html);

    let snapshots = dir.path().join("debug");
    let options = ConvertOptions::new()
        .with_pipeline(
            PipelineOptions::ipcc().with_terms(TermList::from_phrases(&["ocean warming"])),
        )
        .with_output_dir(&snapshots)
        .with_debug_snapshots(true);
    let result = ConverterRegistry::with_defaults()
        .convert(&input, &options)
        .unwrap();

    let html = String::from_utf8(result.content).unwrap();
    assert!(html.contains(r##"href="#ocean_warming""##));
    assert!(html.contains("section1_title"));
    assert!(result.report["structure"]["sections"].is_array());
    assert!(snapshots.join("00_tidy.html").exists());
    assert!(snapshots.join("01_rules.html").exists());
    assert!(snapshots.join("02_structure.html").exists());
}

#[test]
fn test_batch_conversion() {
    let dir = tempfile::tempdir().unwrap();
    let inputs: Vec<PathBuf> = (1..=4)
        .map(|i| {
            let path = dir.path().join(format!("page{}.html", i));
            std::fs::write(
                &path,
                format!("<html><body><p>Page {} on net zero</p></body></html>", i),
            )
            .unwrap();
            path
        })
        .collect();
    let out_dir = dir.path().join("out");
    let options = ConvertOptions::new().with_pipeline(
        PipelineOptions::new().with_terms(TermList::from_phrases(&["net zero"])),
    );

    let results = ConverterRegistry::with_defaults().convert_batch(&inputs, &out_dir, &options);
    assert_eq!(results.len(), 4);
    for (input, written) in &results {
        let written = written.as_ref().unwrap();
        assert_eq!(written, &output_path(input, &out_dir));
        let html = std::fs::read_to_string(written).unwrap();
        assert!(html.contains(r#"class="annotation""#));
    }
}
