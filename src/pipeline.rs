//! Per-document pipeline state and the full HTML pipeline.
//!
//! A [`PipelineContext`] is created for each document and passed to every
//! pass. It owns the id allocator, the output directory and the warnings
//! collected along the way. Nothing here is shared between documents.
//!
//! [`run_pipeline`] applies the configured passes in a fixed order:
//! tidy, rules, structure, target-id links, bibliography, phrases. Rules
//! run before structure so that cruft is gone and footnote numbers are
//! classed when sections, floats and footnotes are recognized.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::annotate::{
    annotate, link_target_ids, recognize_bibliography, AnnotateOptions, AnnotationReport,
    BiblioOptions, BiblioReport, RuleHits, RuleSet,
};
use crate::error::Result;
use crate::model::{HtmlDocument, StructureReport, TermList};
use crate::structure::{extract_structure, StructureOptions};
use crate::tidy::{tidy_document, TidyOptions, TidyReport};

/// A recoverable problem noticed by a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Pass that reported it, e.g. "styles" or "floats"
    pub pass: String,
    pub message: String,
}

/// Hands out `prefix{n}` identifiers, one counter per prefix.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    counters: HashMap<String, usize>,
}

impl IdAllocator {
    /// Create an allocator with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next identifier for `prefix`.
    pub fn next(&mut self, prefix: &str) -> String {
        let counter = self.counters.entry(prefix.to_string()).or_insert(0);
        let id = format!("{}{}", prefix, counter);
        *counter += 1;
        id
    }

    /// Number of identifiers issued for `prefix`.
    pub fn issued(&self, prefix: &str) -> usize {
        self.counters.get(prefix).copied().unwrap_or(0)
    }
}

/// State threaded through the passes applied to one document.
#[derive(Debug, Clone, Default)]
pub struct PipelineContext {
    ids: IdAllocator,
    output_dir: Option<PathBuf>,
    diagnostics: Vec<Diagnostic>,
    debug_snapshots: bool,
    snapshots_written: usize,
}

impl PipelineContext {
    /// Create a context with no output directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the directory that relative output paths resolve against.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Write an HTML snapshot after each pass (requires an output directory).
    pub fn with_debug_snapshots(mut self, enabled: bool) -> Self {
        self.debug_snapshots = enabled;
        self
    }

    /// The output directory, if set.
    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    /// The id allocator.
    pub fn ids(&mut self) -> &mut IdAllocator {
        &mut self.ids
    }

    /// Shorthand for `ids().next(prefix)`.
    pub fn next_id(&mut self, prefix: &str) -> String {
        self.ids.next(prefix)
    }

    /// Log a warning and record it.
    pub fn warn(&mut self, pass: &str, message: impl Into<String>) {
        let message = message.into();
        log::warn!("[{}] {}", pass, message);
        self.diagnostics.push(Diagnostic {
            pass: pass.to_string(),
            message,
        });
    }

    /// Warnings recorded so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Remove and return the recorded warnings.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Write `doc` as `NN_<pass>.html` in the output directory when
    /// snapshots are enabled. Returns the path written, if any.
    pub fn snapshot(&mut self, pass: &str, doc: &HtmlDocument) -> Result<Option<PathBuf>> {
        if !self.debug_snapshots || self.output_dir.is_none() {
            return Ok(None);
        }
        let name = format!("{:02}_{}.html", self.snapshots_written, pass);
        self.snapshots_written += 1;
        let path = self.write_output(name, doc.serialize().as_bytes())?;
        log::debug!("snapshot after {}: {}", pass, path.display());
        Ok(Some(path))
    }

    /// Write bytes to `path`, resolved against the output directory when
    /// relative. Parent directories are created on demand.
    pub fn write_output(&self, path: impl AsRef<Path>, content: &[u8]) -> Result<PathBuf> {
        let path = path.as_ref();
        let full = match &self.output_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        };
        if let Some(parent) = full.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&full, content)?;
        Ok(full)
    }
}

/// Which passes [`run_pipeline`] applies. Unset passes are skipped.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub tidy: Option<TidyOptions>,
    pub structure: Option<StructureOptions>,
    pub rules: Option<RuleSet>,
    /// Base URL for curly-brace target id links
    pub target_ids: Option<String>,
    pub biblio: Option<BiblioOptions>,
    pub terms: Option<TermList>,
    pub annotate: AnnotateOptions,
}

impl PipelineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// IPCC tidying, structure and rules.
    pub fn ipcc() -> Self {
        Self::new()
            .with_tidy(TidyOptions::ipcc())
            .with_structure(StructureOptions::ipcc())
            .with_rules(RuleSet::ipcc())
    }

    pub fn with_tidy(mut self, opts: TidyOptions) -> Self {
        self.tidy = Some(opts);
        self
    }

    pub fn with_structure(mut self, opts: StructureOptions) -> Self {
        self.structure = Some(opts);
        self
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn with_target_ids(mut self, base: impl Into<String>) -> Self {
        self.target_ids = Some(base.into());
        self
    }

    pub fn with_biblio(mut self, opts: BiblioOptions) -> Self {
        self.biblio = Some(opts);
        self
    }

    pub fn with_terms(mut self, terms: TermList) -> Self {
        self.terms = Some(terms);
        self
    }

    pub fn with_annotate_options(mut self, opts: AnnotateOptions) -> Self {
        self.annotate = opts;
        self
    }
}

/// What [`run_pipeline`] did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tidy: Option<TidyReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<StructureReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleHits>,
    pub target_links: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub biblio: Option<BiblioReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<AnnotationReport>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Apply the configured passes to `doc` in place.
pub fn run_pipeline(
    doc: &mut HtmlDocument,
    opts: &PipelineOptions,
    ctx: &mut PipelineContext,
) -> Result<PipelineReport> {
    let mut report = PipelineReport::default();
    if let Some(tidy) = &opts.tidy {
        report.tidy = Some(tidy_document(doc, tidy, ctx)?);
    }
    if let Some(rules) = &opts.rules {
        report.rules = rules.apply(doc, ctx)?;
    }
    if let Some(structure) = &opts.structure {
        report.structure = Some(extract_structure(doc, structure, ctx)?);
    }
    if let Some(base) = &opts.target_ids {
        report.target_links = link_target_ids(doc, base);
    }
    if let Some(biblio) = &opts.biblio {
        report.biblio = Some(recognize_bibliography(doc, biblio, ctx)?);
    }
    if let Some(terms) = &opts.terms {
        report.annotations = Some(annotate(doc, terms, &opts.annotate, ctx));
        ctx.snapshot("annotate", doc)?;
    }
    report.diagnostics = ctx.diagnostics().to_vec();
    Ok(report)
}
