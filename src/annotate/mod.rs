//! Annotation passes.
//!
//! - [`phrase`]: link controlled-vocabulary phrases in HTML text
//! - [`pdf`]: the same for PDF pages, as link annotations
//! - [`rules`]: classify elements with declarative rules
//! - [`biblio`]: recognize citations, references and DOIs

pub mod biblio;
pub mod pdf;
pub mod phrase;
pub mod rules;

pub use biblio::{
    doi_href, extract_references, find_bibliorefs, link_dois, parse_biblioref_body,
    recognize_bibliography, BiblioOptions, BiblioReport,
};
pub use pdf::{
    annotate_pdf, annotate_pdf_document, PdfAnnotateOptions, PdfAnnotationReport, PdfLink,
};
pub use phrase::{
    annotate, annotate_with, AnnotateOptions, AnnotationReport, PhraseHits, PhraseMatch,
    PhraseMatcher,
};
pub use rules::{
    link_target_ids, AnnotatorRule, DeleteScope, RuleHits, RuleSet, RuleSpec, ScriptKind,
    SCRIPT_FACTOR,
};
