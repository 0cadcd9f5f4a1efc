//! Term list readers.
//!
//! Supported sources:
//! - delimited text (CSV or TSV, UTF-8 with optional BOM, header row required)
//! - dictionary HTML whose entries carry the `entry` class
//! - Europe PMC style JSON with a top-level `papers` array

use std::fs;
use std::path::Path;

use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{slug, TermEntry, TermList};

const TERM_COLUMNS: &[&str] = &["term", "word", "phrase"];
const LINK_COLUMNS: &[&str] = &["link", "href", "url", "hyperlink"];
const TOOLTIP_COLUMNS: &[&str] = &["definition", "tooltip", "description"];

/// Read a term list, choosing the reader from the file extension.
///
/// `.json` is read as Europe PMC JSON, `.html`/`.htm` as a dictionary,
/// anything else as delimited text.
pub fn read_term_file<P: AsRef<Path>>(path: P) -> Result<TermList> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::MissingFile(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let terms = match ext.as_str() {
        "json" => read_europepmc_json(&content)?,
        "html" | "htm" => read_dictionary_html(&content)?,
        "tsv" | "tab" => read_delimited_terms(&content, Some(b'\t'))?,
        _ => read_delimited_terms(&content, None)?,
    };
    log::debug!("read {} terms from {}", terms.len(), path.display());
    Ok(terms)
}

/// Read delimited term rows.
///
/// With no explicit delimiter, a tab in the header line selects TSV,
/// otherwise CSV. Columns are located by header name; `term` is required,
/// `link` and `definition` are optional (a missing link falls back to `#slug`).
pub fn read_delimited_terms(content: &str, delimiter: Option<u8>) -> Result<TermList> {
    let content = content.trim_start_matches('\u{feff}');
    let header_line = content.lines().next().unwrap_or_default();
    let delimiter = delimiter.unwrap_or(if header_line.contains('\t') {
        b'\t'
    } else {
        b','
    });

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    let column = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.contains(&h.to_ascii_lowercase().as_str()))
    };
    let term_col = column(TERM_COLUMNS).ok_or_else(|| {
        Error::Terms(format!(
            "header row has no term column (expected one of {:?})",
            TERM_COLUMNS
        ))
    })?;
    let link_col = column(LINK_COLUMNS);
    let tooltip_col = column(TOOLTIP_COLUMNS);

    let mut terms = TermList::new();
    for record in reader.records() {
        let record = record?;
        let phrase = record.get(term_col).unwrap_or_default();
        if phrase.is_empty() {
            continue;
        }
        let href = link_col
            .and_then(|c| record.get(c))
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", slug(phrase)));
        let mut entry = TermEntry::new(phrase, href);
        if let Some(tooltip) = tooltip_col.and_then(|c| record.get(c)) {
            entry = entry.with_tooltip(tooltip);
        }
        if !terms.push(entry) {
            log::debug!("duplicate term skipped: {}", phrase);
        }
    }
    Ok(terms)
}

/// Read a dictionary HTML document.
///
/// Every element with class `entry` is one term. The phrase comes from a
/// `data-term` attribute, a `.term` child, the first link, or the entry text;
/// the href from `data-href`, the first link's `href`, or `#slug`.
pub fn read_dictionary_html(content: &str) -> Result<TermList> {
    let entry_sel = selector(".entry")?;
    let term_sel = selector(".term")?;
    let link_sel = selector("a[href]")?;
    let definition_sel = selector(".definition")?;

    let html = Html::parse_document(content);
    let mut terms = TermList::new();
    for entry in html.select(&entry_sel) {
        let link = entry.select(&link_sel).next();
        let phrase = entry
            .attr("data-term")
            .map(str::to_string)
            .or_else(|| entry.select(&term_sel).next().map(element_text))
            .or_else(|| link.map(element_text))
            .unwrap_or_else(|| element_text(entry));
        if phrase.is_empty() {
            continue;
        }
        let href = entry
            .attr("data-href")
            .or_else(|| link.and_then(|a| a.attr("href")))
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", slug(&phrase)));
        let mut term = TermEntry::new(&phrase, href);
        if let Some(definition) = entry.select(&definition_sel).next() {
            term = term.with_tooltip(element_text(definition));
        } else if let Some(title) = entry.attr("title") {
            term = term.with_tooltip(title);
        }
        terms.push(term);
    }
    Ok(terms)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::HtmlParse(format!("selector {}: {}", css, e)))
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Europe PMC search results.
#[derive(Debug, Clone, Deserialize)]
pub struct PapersFile {
    /// Result records
    #[serde(default)]
    pub papers: Vec<Paper>,
}

/// One Europe PMC result record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    pub pmcid: Option<String>,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub author_string: Option<String>,
    pub abstract_text: Option<String>,
    pub journal_info: Option<JournalInfo>,
}

/// Journal block of a result record.
#[derive(Debug, Clone, Deserialize)]
pub struct JournalInfo {
    pub journal: Option<Journal>,
}

/// Journal name.
#[derive(Debug, Clone, Deserialize)]
pub struct Journal {
    pub title: Option<String>,
}

impl Paper {
    /// Link for the record: DOI resolver first, then Europe PMC.
    pub fn href(&self) -> Option<String> {
        if let Some(doi) = self.doi.as_deref().filter(|d| !d.is_empty()) {
            return Some(format!("https://doi.org/{}", doi));
        }
        self.pmcid
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| format!("https://europepmc.org/article/PMC/{}", p))
    }

    /// Short description: authors and journal.
    pub fn description(&self) -> String {
        let journal = self
            .journal_info
            .as_ref()
            .and_then(|j| j.journal.as_ref())
            .and_then(|j| j.title.as_deref());
        match (self.author_string.as_deref(), journal) {
            (Some(a), Some(j)) => format!("{} ({})", a, j),
            (Some(a), None) => a.to_string(),
            (None, Some(j)) => j.to_string(),
            (None, None) => String::new(),
        }
    }
}

/// Read Europe PMC JSON; each paper title becomes a term linking to the paper.
pub fn read_europepmc_json(content: &str) -> Result<TermList> {
    let file: PapersFile = serde_json::from_str(content.trim_start_matches('\u{feff}'))?;
    let mut terms = TermList::new();
    for paper in &file.papers {
        let (Some(title), Some(href)) = (paper.title.as_deref(), paper.href()) else {
            continue;
        };
        let title = title.trim().trim_end_matches('.');
        terms.push(TermEntry::new(title, href).with_tooltip(paper.description()));
    }
    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_csv_with_bom_and_aliases() {
        let csv = "\u{feff}word,hyperlink,definition\nclimate change,https://x/cc,Long-term shift\nIPCC,,\n";
        let terms = read_delimited_terms(csv, None).unwrap();
        assert_eq!(terms.len(), 2);
        let cc = terms.get("Climate Change").unwrap();
        assert_eq!(cc.target_href, "https://x/cc");
        assert_eq!(cc.tooltip.as_deref(), Some("Long-term shift"));
        assert_eq!(terms.get("ipcc").unwrap().target_href, "#ipcc");
    }

    #[test]
    fn test_read_tsv_sniffed() {
        let tsv = "term\tlink\nglobal warming\thttps://x/gw\n";
        let terms = read_delimited_terms(tsv, None).unwrap();
        assert_eq!(terms.entries()[0].phrase, "global warming");
        assert_eq!(terms.entries()[0].target_href, "https://x/gw");
    }

    #[test]
    fn test_missing_term_column() {
        let result = read_delimited_terms("name,link\na,b\n", None);
        assert!(matches!(result, Err(Error::Terms(_))));
    }

    #[test]
    fn test_read_dictionary_html() {
        let html = r##"<html><body>
            <div class="entry" data-term="aerosol"><a href="#aerosol">Aerosol</a>
              <p class="definition">A suspension of particles.</p></div>
            <p class="entry"><a href="https://w/albedo">Albedo</a></p>
            <p>not an entry</p>
        </body></html>"##;
        let terms = read_dictionary_html(html).unwrap();
        assert_eq!(terms.len(), 2);
        let aerosol = terms.get("aerosol").unwrap();
        assert_eq!(aerosol.target_href, "#aerosol");
        assert_eq!(aerosol.tooltip.as_deref(), Some("A suspension of particles."));
        assert_eq!(terms.get("albedo").unwrap().target_href, "https://w/albedo");
    }

    #[test]
    fn test_read_europepmc_json() {
        let json = r#"{"papers": [
            {"pmcid": "PMC1", "doi": "10.1/abc", "title": "Ocean heat.", "authorString": "Smith J",
             "journalInfo": {"journal": {"title": "Nature"}}},
            {"pmcid": "PMC2", "title": "Sea ice"},
            {"title": "No link"}
        ]}"#;
        let terms = read_europepmc_json(json).unwrap();
        assert_eq!(terms.len(), 2);
        let heat = terms.get("ocean heat").unwrap();
        assert_eq!(heat.target_href, "https://doi.org/10.1/abc");
        assert_eq!(heat.tooltip.as_deref(), Some("Smith J (Nature)"));
        assert_eq!(
            terms.get("sea ice").unwrap().target_href,
            "https://europepmc.org/article/PMC/PMC2"
        );
    }

    #[test]
    fn test_read_term_file_missing() {
        let result = read_term_file("/definitely/not/here.csv");
        assert!(matches!(result, Err(Error::MissingFile(_))));
    }

    #[test]
    fn test_read_term_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terms.tsv");
        fs::write(&path, "term\tlink\nsea level\thttps://x/sl\n").unwrap();
        let terms = read_term_file(&path).unwrap();
        assert_eq!(terms.len(), 1);
    }
}
