//! Running header and footer removal.
//!
//! Converted pages carry one marker element per page (for example
//! `<div style="top: 50px"><a name="1">Page 1</a></div>`) whose `top`
//! grows by a constant page pitch. A straight line fitted through the
//! marker coordinates gives the page tops; any positioned element that sits
//! inside the top or bottom band of its page is removed.

use ego_tree::NodeId;
use serde::Serialize;

use crate::error::Result;
use crate::model::{HtmlDocument, Locator};
use crate::pipeline::PipelineContext;
use crate::style::{content_elements, StyleTable};

/// Header/footer detection settings.
#[derive(Debug, Clone)]
pub struct HeaderFooterOptions {
    /// Path selecting one marker element per page, relative to the body
    pub marker: String,
    /// Height of the band removed at the top of every page
    pub header_height: f64,
    /// Height of the band removed at the bottom of every page
    pub footer_height: f64,
    /// Page height; the fitted pitch when unset
    pub page_height: Option<f64>,
    /// Minimum coefficient of determination for the marker fit
    pub min_r_squared: f64,
}

impl Default for HeaderFooterOptions {
    fn default() -> Self {
        Self {
            marker: ".//div[a[@name]]".to_string(),
            header_height: 80.0,
            footer_height: 80.0,
            page_height: None,
            min_r_squared: 0.98,
        }
    }
}

impl HeaderFooterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    pub fn with_header_height(mut self, height: f64) -> Self {
        self.header_height = height;
        self
    }

    pub fn with_footer_height(mut self, height: f64) -> Self {
        self.footer_height = height;
        self
    }

    pub fn with_page_height(mut self, height: f64) -> Self {
        self.page_height = Some(height);
        self
    }

    pub fn with_min_r_squared(mut self, r_squared: f64) -> Self {
        self.min_r_squared = r_squared;
        self
    }
}

/// Least-squares line `y = intercept + slope * i`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearFit {
    pub intercept: f64,
    pub slope: f64,
    pub r_squared: f64,
}

/// Fit a line through `values` against their index.
///
/// Returns `None` for fewer than two points. Constant input has no
/// explained variance and yields an `r_squared` of zero.
pub fn fit_line(values: &[f64]) -> Option<LinearFit> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let mean_x = (nf - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / nf;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxx += dx * dx;
        sxy += dx * (y - mean_y);
    }
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let ss_tot: f64 = values.iter().map(|y| (y - mean_y).powi(2)).sum();
    let ss_res: f64 = values
        .iter()
        .enumerate()
        .map(|(i, y)| (y - (intercept + slope * i as f64)).powi(2))
        .sum();
    let r_squared = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else {
        0.0
    };

    Some(LinearFit {
        intercept,
        slope,
        r_squared,
    })
}

/// Page geometry derived from the marker fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub first_page_top: f64,
    pub pitch: f64,
    pub page_height: f64,
}

impl PageGeometry {
    /// Offset of `top` below the nearest page top at or above it.
    pub fn y_on_page(&self, top: f64) -> f64 {
        let page = ((top - self.first_page_top) / self.pitch).floor();
        top - (self.first_page_top + page * self.pitch)
    }

    /// Whether `top` falls in the header or footer band.
    pub fn in_margin(&self, top: f64, header_height: f64, footer_height: f64) -> bool {
        let y = self.y_on_page(top);
        y < header_height || y > self.page_height - footer_height
    }
}

/// Detect the page geometry from the marker elements.
///
/// A poor or impossible fit is reported through `ctx` and yields `None`.
pub fn detect_pages(
    doc: &HtmlDocument,
    opts: &HeaderFooterOptions,
    ctx: &mut PipelineContext,
) -> Result<Option<PageGeometry>> {
    let locator = Locator::parse(&opts.marker)?;
    let context = doc.body().unwrap_or_else(|| doc.root());
    let styles = StyleTable::from_document(doc);
    let tops: Vec<f64> = locator
        .select(doc, context)
        .into_iter()
        .filter_map(|id| styles.numeric(&doc[id], "top"))
        .collect();

    let Some(fit) = fit_line(&tops) else {
        ctx.warn(
            "headers",
            format!(
                "found {} page markers for '{}', need at least 2; header/footer removal skipped",
                tops.len(),
                opts.marker
            ),
        );
        return Ok(None);
    };
    if fit.r_squared < opts.min_r_squared || fit.slope <= 0.0 {
        ctx.warn(
            "headers",
            format!(
                "page markers do not fit a constant pitch (r2 = {:.3}, slope = {:.1}); header/footer removal skipped",
                fit.r_squared, fit.slope
            ),
        );
        return Ok(None);
    }

    log::debug!(
        "page markers: {} pages, first top {:.1}, pitch {:.1}",
        tops.len(),
        fit.intercept,
        fit.slope
    );
    Ok(Some(PageGeometry {
        first_page_top: fit.intercept,
        pitch: fit.slope,
        page_height: opts.page_height.unwrap_or(fit.slope),
    }))
}

/// Remove every positioned element inside a header or footer band.
/// Returns the number of elements removed.
pub fn remove_headers_and_footers(
    doc: &mut HtmlDocument,
    opts: &HeaderFooterOptions,
    ctx: &mut PipelineContext,
) -> Result<usize> {
    let Some(geometry) = detect_pages(doc, opts, ctx)? else {
        return Ok(0);
    };

    let styles = StyleTable::from_document(doc);
    let body = doc.body();
    let doomed: Vec<NodeId> = content_elements(doc)
        .into_iter()
        .filter(|&id| Some(id) != body)
        .filter(|&id| {
            styles
                .numeric(&doc[id], "top")
                .is_some_and(|top| geometry.in_margin(top, opts.header_height, opts.footer_height))
        })
        .collect();

    let mut removed = 0;
    for id in doomed {
        if doc.is_attached(id) {
            doc.remove(id);
            removed += 1;
        }
    }
    log::debug!("removed {} header/footer elements", removed);
    Ok(removed)
}
