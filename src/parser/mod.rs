//! Input parsing: HTML documents, term lists and positioned PDF text.

mod html;
mod pdf_text;
mod terms;

pub use html::parse_html;
pub use pdf_text::{extract_page_spans, extract_spans, load_pdf, PdfSpan};
pub(crate) use pdf_text::page_content;
#[cfg(test)]
pub(crate) use pdf_text::sample_pdf;
pub use terms::{
    read_delimited_terms, read_dictionary_html, read_europepmc_json, read_term_file, Paper,
    PapersFile,
};
