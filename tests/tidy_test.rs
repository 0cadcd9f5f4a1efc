//! Integration tests for tidying converted HTML.

use dasc::model::normalize_ws;
use dasc::tidy::{tidy, tidy_document, HeaderFooterOptions};
use dasc::{HtmlDocument, PipelineContext, TidyOptions};

/// Three converted pages of 1000px with a marker, running header, body
/// paragraph, line number and running footer each.
fn converted_pages() -> String {
    let mut html = String::from("<html><body>");
    for page in 0..3 {
        let top = 10 + page * 1000;
        html.push_str(&format!(
            r#"<div style="top: {}px"><a name="{}">Page {}</a></div>"#,
            top,
            page + 1,
            page + 1
        ));
        html.push_str(&format!(
            r#"<div style="top: {}px; left: 72px"><span style="font-size: 8px">IPCC AR6 WGI Chapter 3</span></div>"#,
            top + 30
        ));
        html.push_str(&format!(
            r#"<div style="top: {}px; left: 72px"><span style="font-family: ArialMT; font-size: 11px">Observed</span><span style="font-family: ArialMT; font-size: 11px">warming {}</span><br></div>"#,
            top + 400,
            page
        ));
        html.push_str(&format!(
            r#"<div style="top: {}px; left: 20px">{}</div>"#,
            top + 420,
            page * 40 + 12
        ));
        html.push_str(&format!(
            r#"<div style="top: {}px; left: 300px"><span style="font-size: 8px">3-{}</span></div>"#,
            top + 960,
            page + 1
        ));
    }
    html.push_str("</body></html>");
    html
}

#[test]
fn test_tidy_ipcc_document() {
    let mut doc = HtmlDocument::parse(&converted_pages()).unwrap();
    let mut ctx = PipelineContext::new();
    let report = tidy_document(&mut doc, &TidyOptions::ipcc(), &mut ctx).unwrap();

    let text = doc.text_content(doc.body().unwrap());
    assert!(!text.contains("IPCC AR6 WGI Chapter 3"));
    assert!(!text.contains("3-2"));
    assert!(text.contains("Observed warming 0"));
    assert!(text.contains("Observed warming 2"));
    assert!(!text.contains("52"));

    assert!(report.header_footer_removed > 0);
    assert!(report.line_numbers_removed >= 3);
    assert_eq!(report.spans_joined, 3);
    assert!(doc.find_all(doc.root(), "br").is_empty());
    assert!(ctx.diagnostics().is_empty());
}

#[test]
fn test_tidy_twice_is_stable() {
    let opts = TidyOptions::ipcc();
    let mut ctx = PipelineContext::new();

    let mut doc = HtmlDocument::parse(&converted_pages()).unwrap();
    let once = tidy(&mut doc, &opts, &mut ctx).unwrap();
    let mut again = HtmlDocument::parse(&once).unwrap();
    let twice = tidy(&mut again, &opts, &mut ctx).unwrap();

    assert_eq!(normalize_ws(&once), normalize_ws(&twice));
}

#[test]
fn test_fragment_gets_skeleton() {
    let mut doc = HtmlDocument::parse(
        r#"<title>Chapter</title><div><div><span style="font-size: 9px">text</span></div></div>"#,
    )
    .unwrap();
    let mut ctx = PipelineContext::new();
    tidy_document(&mut doc, &TidyOptions::new(), &mut ctx).unwrap();

    let root = doc.root();
    assert_eq!(doc.tag(root), "html");
    assert_eq!(doc.child_elements(root, "head").len(), 1);
    assert_eq!(doc.child_elements(root, "body").len(), 1);
    let head = doc.head().unwrap();
    assert!(doc.find_first(head, "title").is_some());
    assert!(doc.find_first(doc.body().unwrap(), "title").is_none());
    assert_eq!(doc.find_all(doc.body().unwrap(), "div").len(), 1);
}

#[test]
fn test_poor_page_fit_keeps_document() {
    let html = r#"<body>
        <div style="top: 10px"><a name="1">1</a></div>
        <div style="top: 30px"><a name="2">2</a></div>
        <div style="top: 2000px"><a name="3">3</a></div>
        <div style="top: 2010px"><a name="4">4</a></div>
        <div style="top: 2015px"><span>text</span></div>
        </body>"#;
    let mut doc = HtmlDocument::parse(html).unwrap();
    let mut ctx = PipelineContext::new();
    let opts = TidyOptions::new().with_header_footer(HeaderFooterOptions::new());
    let report = tidy_document(&mut doc, &opts, &mut ctx).unwrap();

    assert_eq!(report.header_footer_removed, 0);
    assert!(doc.text_content(doc.root()).contains("text"));
    assert_eq!(ctx.diagnostics().len(), 1);
}
