//! # dasc
//!
//! Structuring and semantic annotation of converted scientific reports.
//!
//! This library takes the HTML a PDF converter produces for long technical
//! reports, tidies it, recovers sections, floats and footnotes, classifies
//! spans with declarative rules and links vocabulary phrases and citations.
//! PDFs can be annotated directly with link annotations.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dasc::{read_term_file, Dasc};
//!
//! fn main() -> dasc::Result<()> {
//!     let terms = read_term_file("glossary.csv")?;
//!
//!     let result = Dasc::ipcc()
//!         .with_terms(terms)
//!         .process("chapter1.html")?;
//!     std::fs::write("chapter1_annotated.html", result.to_html())?;
//!     println!("{}", result.to_json()?);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Tidying**: skeleton repair, running header/footer removal, style hoisting
//! - **Style tables**: readable class names for font and layout declarations
//! - **Structure**: nested sections, START/END floats, footnotes in back matter
//! - **Rules**: regex, locator, superscript and grouping classifiers
//! - **Annotation**: phrase links in HTML and PDF, bibliographic references
//! - **Parallel processing**: uses Rayon for batches of documents

pub mod annotate;
pub mod convert;
pub mod detect;
pub mod error;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod structure;
pub mod style;
pub mod tidy;

// Re-export commonly used types
pub use annotate::{
    AnnotateOptions, AnnotationReport, BiblioOptions, BiblioReport, PdfAnnotateOptions,
    PdfAnnotationReport, RuleSet, RuleSpec,
};
pub use convert::{ConvertOptions, ConvertResult, ConverterRegistry, DocumentConverter};
pub use detect::{detect_format_from_bytes, detect_format_from_path, is_html, is_pdf, InputFormat};
pub use error::{Error, Result};
pub use model::{
    ClassName, ClassRef, Element, HtmlDocument, Locator, NodeId, StructureReport, TermEntry,
    TermList,
};
pub use parser::{parse_html, read_term_file};
pub use pipeline::{run_pipeline, Diagnostic, PipelineContext, PipelineOptions, PipelineReport};
pub use structure::StructureOptions;
pub use style::{CssStyle, StyleTable};
pub use tidy::TidyOptions;

use std::path::{Path, PathBuf};

/// Parse an HTML file into a document.
///
/// # Example
///
/// ```no_run
/// use dasc::parse_file;
///
/// let doc = parse_file("chapter1.html").unwrap();
/// println!("{}", doc.serialize());
/// ```
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<HtmlDocument> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::MissingFile(path.to_path_buf()));
    }
    let html = std::fs::read_to_string(path)?;
    parse_html(&html)
}

/// Tidy an HTML string with default options.
///
/// # Example
///
/// ```no_run
/// use dasc::tidy_html;
///
/// let html = std::fs::read_to_string("chapter1.html").unwrap();
/// let tidied = tidy_html(&html).unwrap();
/// ```
pub fn tidy_html(html: &str) -> Result<String> {
    let mut doc = parse_html(html)?;
    let mut ctx = PipelineContext::new();
    tidy::tidy(&mut doc, &TidyOptions::default(), &mut ctx)
}

/// Link every occurrence of `terms` in an HTML string.
///
/// # Example
///
/// ```no_run
/// use dasc::{annotate_html, TermList};
///
/// let terms = TermList::from_phrases(&["climate change"]);
/// let (html, report) = annotate_html("<p>Climate change</p>", &terms).unwrap();
/// assert_eq!(report.total(), 1);
/// ```
pub fn annotate_html(html: &str, terms: &TermList) -> Result<(String, AnnotationReport)> {
    let mut doc = parse_html(html)?;
    let mut ctx = PipelineContext::new();
    let report = annotate::annotate(&mut doc, terms, &AnnotateOptions::default(), &mut ctx);
    Ok((doc.serialize(), report))
}

/// Annotate a PDF file with links for the terms in `terms_file`.
///
/// # Example
///
/// ```no_run
/// use dasc::annotate_pdf_file;
///
/// let report = annotate_pdf_file("report.pdf", "glossary.csv", "report_annotated.pdf").unwrap();
/// println!("{} links", report.links.len());
/// ```
pub fn annotate_pdf_file<P, T, Q>(
    in_pdf: P,
    terms_file: T,
    out_pdf: Q,
) -> Result<PdfAnnotationReport>
where
    P: AsRef<Path>,
    T: AsRef<Path>,
    Q: AsRef<Path>,
{
    let terms = read_term_file(terms_file)?;
    let mut ctx = PipelineContext::new();
    annotate::annotate_pdf(in_pdf, &terms, out_pdf, &PdfAnnotateOptions::default(), &mut ctx)
}

/// Builder for running the HTML pipeline over a document.
///
/// # Example
///
/// ```no_run
/// use dasc::{Dasc, BiblioOptions};
///
/// let result = Dasc::ipcc()
///     .with_biblio(BiblioOptions::new())
///     .with_output_dir("./debug")
///     .with_debug_snapshots(true)
///     .process("chapter1.html")?;
/// println!("{}", result.to_json()?);
/// # Ok::<(), dasc::Error>(())
/// ```
pub struct Dasc {
    options: PipelineOptions,
    output_dir: Option<PathBuf>,
    debug_snapshots: bool,
}

impl Dasc {
    /// Create a builder with every pass disabled.
    pub fn new() -> Self {
        Self {
            options: PipelineOptions::new(),
            output_dir: None,
            debug_snapshots: false,
        }
    }

    /// IPCC tidying, structure and rules.
    pub fn ipcc() -> Self {
        Self::new().with_options(PipelineOptions::ipcc())
    }

    /// Replace all pass options.
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Enable tidying.
    pub fn with_tidy(mut self, opts: TidyOptions) -> Self {
        self.options = self.options.with_tidy(opts);
        self
    }

    /// Enable structure recognition.
    pub fn with_structure(mut self, opts: StructureOptions) -> Self {
        self.options = self.options.with_structure(opts);
        self
    }

    /// Apply classification rules.
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.options = self.options.with_rules(rules);
        self
    }

    /// Link curly-brace target ids against `base`.
    pub fn with_target_ids(mut self, base: impl Into<String>) -> Self {
        self.options = self.options.with_target_ids(base);
        self
    }

    /// Enable citation and reference recognition.
    pub fn with_biblio(mut self, opts: BiblioOptions) -> Self {
        self.options = self.options.with_biblio(opts);
        self
    }

    /// Link occurrences of `terms`.
    pub fn with_terms(mut self, terms: TermList) -> Self {
        self.options = self.options.with_terms(terms);
        self
    }

    /// Set phrase link options.
    pub fn with_annotate_options(mut self, opts: AnnotateOptions) -> Self {
        self.options = self.options.with_annotate_options(opts);
        self
    }

    /// Set the directory for snapshots.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Write the document after each pass.
    pub fn with_debug_snapshots(mut self, enabled: bool) -> Self {
        self.debug_snapshots = enabled;
        self
    }

    fn context(&self) -> PipelineContext {
        let mut ctx = PipelineContext::new().with_debug_snapshots(self.debug_snapshots);
        if let Some(dir) = &self.output_dir {
            ctx = ctx.with_output_dir(dir);
        }
        ctx
    }

    /// Run the pipeline over an HTML file.
    pub fn process<P: AsRef<Path>>(self, path: P) -> Result<DascResult> {
        let document = parse_file(path)?;
        self.process_document(document)
    }

    /// Run the pipeline over an HTML string.
    pub fn process_str(self, html: &str) -> Result<DascResult> {
        self.process_document(parse_html(html)?)
    }

    /// Run the pipeline over a parsed document.
    pub fn process_document(self, mut document: HtmlDocument) -> Result<DascResult> {
        let mut ctx = self.context();
        let report = run_pipeline(&mut document, &self.options, &mut ctx)?;
        Ok(DascResult { document, report })
    }
}

impl Default for Dasc {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of running the pipeline.
pub struct DascResult {
    /// The rewritten document
    pub document: HtmlDocument,
    /// What each pass did
    pub report: PipelineReport,
}

impl DascResult {
    /// Serialize the document.
    pub fn to_html(&self) -> String {
        self.document.serialize()
    }

    /// The report as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.report)?)
    }

    /// Get the document.
    pub fn document(&self) -> &HtmlDocument {
        &self.document
    }
}
