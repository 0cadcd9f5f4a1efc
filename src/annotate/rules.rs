//! Rule-driven classification of document elements.
//!
//! A rule selects elements with its `target` path and then runs one
//! action on each of them: a regex over the element's leading text, a
//! path expression relative to it, a sub/superscript test against the
//! preceding span, or grouping of sibling runs. Matching elements get the
//! rule's class and optional `id`/`title` built from templates, or are
//! deleted. Rules run in declaration order and only ever add classes.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use ego_tree::NodeId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{normalize_ws, push_text, ClassName, Element, HtmlDocument, Locator};
use crate::pipeline::PipelineContext;
use crate::style::{append_style_rule, ensure_head, CssStyle, StyleRule, StyleTable};

/// Default size ratio below which a span counts as a sub/superscript.
pub const SCRIPT_FACTOR: f64 = 0.9;

/// Longest value written into a `title` attribute.
const TITLE_LEN: usize = 50;

/// Default elements a rule runs on.
const DEFAULT_TARGET: &str = ".//span";

static CURLY_GROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?s)(?P<pre>[^{]*)\{(?P<body>[^}]+)\}(?P<post>.*)$").unwrap());

static TARGET_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?P<report>WGI|WGII|WGIII|SRCCL|SROCC|SR15|SYR)\s+(?P<chapter>SPM|TS)\s+(?P<section>[A-G]\.?\d+(?:\.\d+)*)",
    )
    .unwrap()
});

static TARGET_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,;]").unwrap());

/// Which script position a rule tests for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    Sub,
    #[serde(alias = "super")]
    Sup,
}

impl ScriptKind {
    fn title_prefix(self) -> &'static str {
        match self {
            Self::Sub => "subscript_",
            Self::Sup => "superscript_",
        }
    }
}

/// What a deleting rule removes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteScope {
    /// The matched element only; its tail text stays
    #[default]
    Element,
    /// The nearest enclosing `div`, or the element when there is none
    ContainingDiv,
}

/// Serializable form of a rule, as read from JSON.
///
/// Templates have the form `prefix|suffix`; the `|` is replaced by the
/// captured value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSpec {
    pub html_class: Option<String>,
    pub regex: Option<String>,
    pub xpath: Option<String>,
    pub script: Option<ScriptKind>,
    pub script_factor: Option<f64>,
    pub add_id: Option<String>,
    pub add_title: Option<String>,
    /// CSS declarations for the rule's class, e.g. `{color: blue}`
    pub style: Option<String>,
    pub group_xpath: Option<String>,
    pub end_xpath: Option<String>,
    pub delete: bool,
    pub delete_scope: DeleteScope,
    /// Elements the rule runs on, relative to the body
    pub target: Option<String>,
    /// Only elements with a font size at most this large are considered
    pub max_font_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RuleSpec {
    pub fn new(html_class: impl Into<String>) -> Self {
        Self {
            html_class: Some(html_class.into()),
            ..Default::default()
        }
    }

    pub fn with_regex(mut self, regex: impl Into<String>) -> Self {
        self.regex = Some(regex.into());
        self
    }

    pub fn with_xpath(mut self, xpath: impl Into<String>) -> Self {
        self.xpath = Some(xpath.into());
        self
    }

    pub fn with_script(mut self, script: ScriptKind) -> Self {
        self.script = Some(script);
        self
    }

    pub fn with_script_factor(mut self, factor: f64) -> Self {
        self.script_factor = Some(factor);
        self
    }

    pub fn with_add_id(mut self, template: impl Into<String>) -> Self {
        self.add_id = Some(template.into());
        self
    }

    pub fn with_add_title(mut self, template: impl Into<String>) -> Self {
        self.add_title = Some(template.into());
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn with_group(mut self, lead: impl Into<String>, end: impl Into<String>) -> Self {
        self.group_xpath = Some(lead.into());
        self.end_xpath = Some(end.into());
        self
    }

    pub fn with_delete(mut self, scope: DeleteScope) -> Self {
        self.delete = true;
        self.delete_scope = scope;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_max_font_size(mut self, size: f64) -> Self {
        self.max_font_size = Some(size);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// `prefix|suffix` attribute template.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Template {
    prefix: String,
    suffix: String,
}

impl Template {
    fn parse(s: &str) -> Self {
        let (prefix, suffix) = s.split_once('|').unwrap_or((s, ""));
        Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        }
    }

    fn fill(&self, value: &str) -> String {
        format!("{}{}{}", self.prefix, value, self.suffix)
    }
}

#[derive(Debug, Clone)]
enum Action {
    Regex(Regex),
    Select(Locator),
    Script(ScriptKind, f64),
    Group { lead: Locator, end: Option<Locator> },
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct AnnotatorRule {
    spec: RuleSpec,
    action: Action,
    target: Locator,
    id_template: Option<Template>,
    title_template: Option<Template>,
}

impl AnnotatorRule {
    /// Compile a rule. When several actions are given the first of regex,
    /// xpath, script and group is used.
    pub fn new(spec: RuleSpec) -> Result<Self> {
        let action = if let Some(pattern) = &spec.regex {
            // match at the start of the text only
            let anchored = format!("^(?:{})", pattern);
            Action::Regex(Regex::new(&anchored).map_err(|e| Error::regex(pattern.as_str(), e))?)
        } else if let Some(xpath) = &spec.xpath {
            Action::Select(Locator::parse(xpath)?)
        } else if let Some(script) = spec.script {
            Action::Script(script, spec.script_factor.unwrap_or(SCRIPT_FACTOR))
        } else if let Some(lead) = &spec.group_xpath {
            Action::Group {
                lead: Locator::parse(lead)?,
                end: spec.end_xpath.as_deref().map(Locator::parse).transpose()?,
            }
        } else {
            return Err(Error::Other(format!(
                "rule {} has no regex, xpath, script or group_xpath",
                spec.html_class.as_deref().unwrap_or("?")
            )));
        };
        let default_target = match action {
            Action::Group { .. } => "./*",
            _ => DEFAULT_TARGET,
        };
        let target = Locator::parse(spec.target.as_deref().unwrap_or(default_target))?;
        Ok(Self {
            id_template: spec.add_id.as_deref().map(Template::parse),
            title_template: spec.add_title.as_deref().map(Template::parse),
            spec,
            action,
            target,
        })
    }

    /// The rule as it was declared.
    pub fn spec(&self) -> &RuleSpec {
        &self.spec
    }

    /// Class added by the rule, if any.
    pub fn html_class(&self) -> Option<&str> {
        self.spec.html_class.as_deref()
    }

    /// Rules for IPCC report HTML: section titles, confidence and
    /// probability qualifiers, superscripts, float boundaries, curly-brace
    /// target ids, copy-edit cruft, page numbers and footnote numbers.
    pub fn ipcc_preset() -> Vec<AnnotatorRule> {
        ipcc_specs()
            .into_iter()
            .filter_map(|spec| match AnnotatorRule::new(spec) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    log::warn!("skipping preset rule: {}", e);
                    None
                }
            })
            .collect()
    }

    fn apply(
        &self,
        doc: &mut HtmlDocument,
        styles: &StyleTable,
        scope: NodeId,
        hits: &mut RuleHits,
    ) {
        let mut grouped = HashSet::new();
        for elem in self.target.select(doc, scope) {
            if !doc.is_attached(elem) {
                continue;
            }
            if let Some(max) = self.spec.max_font_size {
                match styles.font_size(&doc[elem]) {
                    Some(size) if size <= max => {}
                    _ => continue,
                }
            }
            match &self.action {
                Action::Regex(re) => self.run_regex(doc, elem, re, hits),
                Action::Select(locator) => {
                    for hit in locator.select(doc, elem) {
                        if !doc.is_attached(hit) {
                            continue;
                        }
                        if self.spec.delete {
                            self.delete(doc, hit);
                            hits.deleted += 1;
                        } else {
                            self.mark(doc, hit, None, None);
                            hits.matched += 1;
                        }
                    }
                }
                Action::Script(kind, factor) => {
                    if is_script(doc, styles, elem, *kind, *factor) {
                        let text = normalize_ws(&doc.text_content(elem));
                        if self.title_template.is_none() {
                            doc[elem].set_attr("title", format!("{}{}", kind.title_prefix(), text));
                        }
                        self.mark(doc, elem, Some(&text), Some(&text));
                        hits.matched += 1;
                    }
                }
                Action::Group { lead, end } => {
                    let Some(parent) = doc.parent(elem) else {
                        continue;
                    };
                    if !grouped.insert(parent) || self.is_group(doc, parent) {
                        continue;
                    }
                    for first in lead.select(doc, parent) {
                        if doc.parent(first) != Some(parent) {
                            continue;
                        }
                        self.make_group(doc, first, end.as_ref());
                        hits.grouped += 1;
                    }
                }
            }
        }
    }

    fn run_regex(&self, doc: &mut HtmlDocument, elem: NodeId, re: &Regex, hits: &mut RuleHits) {
        let text = doc[elem].text_str();
        if text.is_empty() {
            return;
        }
        let Some(caps) = re.captures(text) else {
            return;
        };
        let id = caps.name("id").map(|m| m.as_str().trim().to_string());
        let title = caps
            .name("title")
            .map(|m| m.as_str().trim().chars().take(TITLE_LEN).collect::<String>());
        if self.spec.delete {
            self.delete(doc, elem);
            hits.deleted += 1;
            return;
        }
        self.mark(doc, elem, id.as_deref(), title.as_deref());
        hits.matched += 1;
    }

    /// Add the rule's class and fill the id/title templates.
    fn mark(&self, doc: &mut HtmlDocument, elem: NodeId, id: Option<&str>, title: Option<&str>) {
        let element = &mut doc[elem];
        if let (Some(template), Some(id)) = (&self.id_template, id) {
            element.set_attr("id", template.fill(id));
        }
        if let (Some(template), Some(title)) = (&self.title_template, title) {
            element.set_attr("title", template.fill(title));
        }
        if let Some(class) = &self.spec.html_class {
            element.add_class(class);
        }
    }

    fn delete(&self, doc: &mut HtmlDocument, elem: NodeId) {
        let victim = match self.spec.delete_scope {
            DeleteScope::Element => elem,
            DeleteScope::ContainingDiv => doc
                .ancestors(elem)
                .into_iter()
                .find(|&a| doc[a].is("div"))
                .unwrap_or(elem),
        };
        doc.remove(victim);
    }

    fn group_class(&self) -> &str {
        self.spec.html_class.as_deref().unwrap_or("group")
    }

    fn is_group(&self, doc: &HtmlDocument, id: NodeId) -> bool {
        doc[id].is("div") && doc[id].has_class(self.group_class())
    }

    /// Wrap `first` and its following siblings, up to the first one
    /// matching `end`, in a new div.
    fn make_group(&self, doc: &mut HtmlDocument, first: NodeId, end: Option<&Locator>) {
        let siblings = doc.following_siblings(first);
        let mut title: String = normalize_ws(&doc.text_content(first))
            .chars()
            .take(TITLE_LEN)
            .collect();
        if title.is_empty() {
            title.push('?');
        }
        let wrapper = doc.create(
            Element::new("div")
                .with_attr("class", self.group_class())
                .with_attr("title", title),
        );
        doc.insert_before(first, wrapper);
        doc.append_child(wrapper, first);
        for sibling in siblings {
            if end.is_some_and(|end| end.matches(doc, sibling)) {
                break;
            }
            doc.append_child(wrapper, sibling);
        }
    }

    /// Add `.class { style }` to the head unless the class is already styled.
    fn install_style(&self, doc: &mut HtmlDocument, styles: &StyleTable) {
        let (Some(class), Some(style)) = (&self.spec.html_class, &self.spec.style) else {
            return;
        };
        let classref = ClassName::new(class).to_ref();
        if styles.contains(&classref) {
            return;
        }
        let decls = CssStyle::parse(style.trim().trim_start_matches('{').trim_end_matches('}'));
        if decls.is_empty() {
            return;
        }
        let head = ensure_head(doc);
        append_style_rule(doc, head, &StyleRule::new(classref, decls));
    }
}

/// Whether `elem` is smaller than the preceding span by `factor` and
/// shifted in the direction of `kind`. Positions are CSS `top` values,
/// which grow down the page.
fn is_script(
    doc: &HtmlDocument,
    styles: &StyleTable,
    elem: NodeId,
    kind: ScriptKind,
    factor: f64,
) -> bool {
    let Some(prev) = preceding_span(doc, elem) else {
        return false;
    };
    let (Some(size), Some(prev_size)) = (styles.font_size(&doc[elem]), styles.font_size(&doc[prev]))
    else {
        return false;
    };
    if size >= factor * prev_size {
        return false;
    }
    let (Some(y), Some(prev_y)) = (
        styles.numeric(&doc[elem], "top"),
        styles.numeric(&doc[prev], "top"),
    ) else {
        return false;
    };
    match kind {
        ScriptKind::Sup => y < prev_y,
        ScriptKind::Sub => y > prev_y,
    }
}

/// Last span before `id` in document order that is not its ancestor.
fn preceding_span(doc: &HtmlDocument, id: NodeId) -> Option<NodeId> {
    let mut node = id;
    loop {
        while let Some(prev) = doc.prev_sibling(node) {
            let inner = doc
                .descendants(prev)
                .into_iter()
                .rev()
                .find(|&d| doc[d].is("span"));
            if inner.is_some() {
                return inner;
            }
            if doc[prev].is("span") {
                return Some(prev);
            }
            node = prev;
        }
        node = doc.parent(node)?;
    }
}

/// Per-rule outcome of [`RuleSet::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleHits {
    pub html_class: Option<String>,
    pub matched: usize,
    pub deleted: usize,
    pub grouped: usize,
}

/// Rules applied in order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<AnnotatorRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The IPCC preset, see [`AnnotatorRule::ipcc_preset`].
    pub fn ipcc() -> Self {
        Self {
            rules: AnnotatorRule::ipcc_preset(),
        }
    }

    /// Compile rule specs, failing on the first bad pattern.
    pub fn from_specs(specs: Vec<RuleSpec>) -> Result<Self> {
        let rules = specs
            .into_iter()
            .map(AnnotatorRule::new)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Read a JSON array of rule specs.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_specs(serde_json::from_str(json)?)
    }

    /// Read a JSON rule file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::MissingFile(path.to_path_buf()));
        }
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn push(&mut self, rule: AnnotatorRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[AnnotatorRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule over the body in declaration order.
    pub fn apply(
        &self,
        doc: &mut HtmlDocument,
        ctx: &mut PipelineContext,
    ) -> Result<Vec<RuleHits>> {
        let scope = doc.body().unwrap_or_else(|| doc.root());
        let mut report = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let styles = StyleTable::from_document(doc);
            rule.install_style(doc, &styles);
            let mut hits = RuleHits {
                html_class: rule.spec.html_class.clone(),
                ..Default::default()
            };
            rule.apply(doc, &styles, scope, &mut hits);
            log::debug!(
                "rule {}: {} matched, {} deleted, {} grouped",
                rule.html_class().unwrap_or("?"),
                hits.matched,
                hits.deleted,
                hits.grouped
            );
            report.push(hits);
        }
        ctx.snapshot("rules", doc)?;
        Ok(report)
    }
}

fn ipcc_specs() -> Vec<RuleSpec> {
    vec![
        RuleSpec::new("section_title")
            .with_regex(r"\s*Section\s+(?P<id>\d+):\s+(?P<title>.*)")
            .with_add_id("section_|")
            .with_add_title("|")
            .with_style("{color: blue; background: pink}"),
        RuleSpec::new("sub_section_title")
            .with_regex(r"\s*(?P<id>\d+\.\d+)\s+(?P<title>.*)")
            .with_add_id("subsection_|")
            .with_add_title("|")
            .with_style("{color: green; background: yellow}"),
        RuleSpec::new("sub_sub_section_title")
            .with_regex(r"\s*(?P<id>\d+\.\d+\.\d+)\s+(?P<title>.*)")
            .with_add_id("subsubsection_|")
            .with_add_title("|")
            .with_style("{color: black; background: #dddddd}"),
        RuleSpec::new("confidence")
            .with_regex(r"\s*\(?(?P<title>(?:very high|high|medium|low) confidence)\)?")
            .with_add_title("|")
            .with_style("{color: black; background: #dd88dd}"),
        RuleSpec::new("probability")
            .with_regex(
                r"\s*\(?(?P<title>virtually certain|extremely likely|very likely|likely|about as likely as not|unlikely|very unlikely|extremely unlikely|exceptionally unlikely)\)?",
            )
            .with_add_title("|")
            .with_style("{color: cyan; background: #dd8888}"),
        RuleSpec::new("superscript")
            .with_script(ScriptKind::Sup)
            .with_add_id("super_|")
            .with_style("{color: blue; background: yellow}"),
        RuleSpec::new("start")
            .with_regex(r"\s*\[?START\s*(?P<title>FIGURE|TABLE|(?:[A-Z][A-Z-]*\s+)?BOX)\s*(?P<id>[A-Za-z0-9][A-Za-z0-9.\-]*)\s*(?:HERE)?\]?")
            .with_add_id("start_|")
            .with_add_title("start_|")
            .with_style("{color: green; background: pink}"),
        RuleSpec::new("end")
            .with_regex(r"\s*\[?END\s*(?P<title>FIGURE|TABLE|(?:[A-Z][A-Z-]*\s+)?BOX)\s*(?P<id>[A-Za-z0-9][A-Za-z0-9.\-]*)\s*(?:HERE)?\]?")
            .with_add_id("end_|")
            .with_add_title("end_|")
            .with_style("{color: green; background: blue}"),
        RuleSpec::new("targets")
            .with_regex(r".*\{(?P<title>[^}]+)\}")
            .with_add_title("|")
            .with_style("{color: green; background: orange}")
            .with_description("target ids in curly brackets {WGI SPM A.1.2, WGII SPM B.2.3}"),
        RuleSpec::new("cruft")
            .with_regex(r".*(?:Subject to Copy Edit|Adopted Longer Report IPCC AR6 SYR)")
            .with_delete(DeleteScope::Element),
        RuleSpec::new("page")
            .with_regex(r"(?P<title>p\.\d+)")
            .with_add_title("|")
            .with_style("{color: purple}"),
        RuleSpec::new("fact")
            .with_xpath("self::span[contains(@class, 'confidence')]/preceding-sibling::span[1]"),
        RuleSpec::new("footnote")
            .with_regex(r"^\s*(?P<id>\d{1,3})\s*$")
            .with_add_id("footnote_mark_|")
            .with_max_font_size(7.0),
    ]
}

/// Split curly-brace target groups such as `{WGI SPM A.1.2; WGII SPM B.2.3}`
/// into one `<a class="target_id">` per id, linked under `base`.
///
/// Text outside the braces stays in spans carrying the original attributes
/// and an `anchor` of `pre` or `post`. Returns the number of anchors made.
pub fn link_target_ids(doc: &mut HtmlDocument, base: &str) -> usize {
    let scope = doc.body().unwrap_or_else(|| doc.root());
    let spans: Vec<NodeId> = doc
        .find_all(scope, "span")
        .into_iter()
        .filter(|&s| doc.children(s).is_empty() && CURLY_GROUP.is_match(doc[s].text_str()))
        .collect();

    let mut anchors = 0;
    for span in spans {
        let text = doc[span].text_str().to_string();
        let Some(caps) = CURLY_GROUP.captures(&text) else {
            continue;
        };
        let attrs = doc[span].attrs.clone();
        let fragment = |doc: &mut HtmlDocument, text: String, anchor: &str| {
            let mut element = Element::new("span").with_text(text);
            element.attrs = attrs.clone();
            element.set_attr("anchor", anchor);
            doc.create(element)
        };

        let pre = fragment(doc, format!("{}{{", &caps["pre"]), "pre");
        doc.insert_before(span, pre);
        let mut last = pre;
        let body = &caps["body"];
        let mut start = 0;
        let separators = TARGET_SEPARATOR
            .find_iter(body)
            .map(|m| (m.start(), m.end()))
            .chain(std::iter::once((body.len(), body.len())));
        for (sep_start, sep_end) in separators {
            let piece = &body[start..sep_start];
            let id = piece.trim();
            let lead = &piece[..piece.len() - piece.trim_start().len()];
            let trail = &piece[piece.trim_end().len()..];
            push_tail(doc, last, lead);
            if !id.is_empty() {
                let mut element = Element::new("a")
                    .with_attr("class", "target_id")
                    .with_text(id);
                if let Some(href) = target_href(id, base) {
                    element.set_attr("href", href);
                }
                let a = doc.create(element);
                doc.insert_after(last, a);
                last = a;
                anchors += 1;
            }
            push_tail(doc, last, trail);
            push_tail(doc, last, &body[sep_start..sep_end]);
            start = sep_end;
        }
        let post = fragment(doc, format!("}}{}", &caps["post"]), "post");
        doc.insert_after(last, post);

        let tail = doc[span].tail.take();
        if let Some(tail) = tail {
            push_tail(doc, post, &tail);
        }
        doc.detach(span);
    }
    log::debug!("linked {} target ids", anchors);
    anchors
}

fn push_tail(doc: &mut HtmlDocument, id: NodeId, text: &str) {
    push_text(&mut doc[id].tail, text);
}

/// Link for a target id such as `WGII SPM B.2.3`.
fn target_href(id: &str, base: &str) -> Option<String> {
    let caps = TARGET_ID.captures(id)?;
    let report = caps["report"].to_lowercase();
    let report = match report.as_str() {
        "wgi" => "wg1",
        "wgii" => "wg2",
        "wgiii" => "wg3",
        other => other,
    };
    Some(format!(
        "{}{}/{}#{}",
        base,
        report,
        caps["chapter"].to_lowercase(),
        caps["section"].to_lowercase()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(rules: Vec<RuleSpec>, html: &str) -> (HtmlDocument, Vec<RuleHits>) {
        let mut doc = HtmlDocument::parse(html).unwrap();
        let set = RuleSet::from_specs(rules).unwrap();
        let hits = set.apply(&mut doc, &mut PipelineContext::new()).unwrap();
        (doc, hits)
    }

    #[test]
    fn test_regex_sets_id_title_and_class() {
        let (doc, hits) = run(
            vec![RuleSpec::new("section_title")
                .with_regex(r"Section\s+(?P<id>\d+):\s+(?P<title>.*)")
                .with_add_id("section_|")
                .with_add_title("|")],
            "<div><span>Section 3: Sustainable development</span></div>",
        );
        assert_eq!(hits[0].matched, 1);
        assert!(doc.serialize().contains(
            r#"<span id="section_3" title="Sustainable development" class="section_title">"#
        ));
    }

    #[test]
    fn test_regex_anchors_at_start() {
        let (_, hits) = run(
            vec![RuleSpec::new("page").with_regex(r"(?P<title>p\.\d+)")],
            "<div><span>see p.12</span><span>p.13</span></div>",
        );
        assert_eq!(hits[0].matched, 1);
    }

    #[test]
    fn test_rules_are_additive() {
        let (doc, _) = run(
            vec![
                RuleSpec::new("a").with_regex("high"),
                RuleSpec::new("b").with_regex(r"high\s+confidence"),
            ],
            "<p><span>high confidence</span></p>",
        );
        assert!(doc.serialize().contains(r#"<span class="a b">"#));
    }

    #[test]
    fn test_delete_scopes() {
        let html = "<div><span>keep</span></div><div><span>Subject to Copy Edit</span><span>x</span></div>";
        let (doc, hits) = run(
            vec![RuleSpec::new("cruft")
                .with_regex("Subject to Copy Edit")
                .with_delete(DeleteScope::Element)],
            html,
        );
        assert_eq!(hits[0].deleted, 1);
        let out = doc.serialize();
        assert!(!out.contains("Copy Edit"));
        assert!(out.contains("<span>x</span>"));

        let (doc, _) = run(
            vec![RuleSpec::new("cruft")
                .with_regex("Subject to Copy Edit")
                .with_delete(DeleteScope::ContainingDiv)],
            html,
        );
        let out = doc.serialize();
        assert!(!out.contains("<span>x</span>"));
        assert!(out.contains("keep"));
    }

    #[test]
    fn test_xpath_relative_to_element() {
        let (doc, hits) = run(
            vec![
                RuleSpec::new("confidence").with_regex(r"\(?(?:high|medium) confidence"),
                RuleSpec::new("fact").with_xpath(
                    "self::span[contains(@class, 'confidence')]/preceding-sibling::span[1]",
                ),
            ],
            "<p><span>Sea level rose.</span><span>(high confidence)</span></p>",
        );
        assert_eq!(hits[1].matched, 1);
        assert!(doc
            .serialize()
            .contains(r#"<span class="fact">Sea level rose.</span>"#));
    }

    #[test]
    fn test_superscript_and_subscript() {
        let html = r#"<p><span style="font-size: 10px; top: 100px">CO</span><span style="font-size: 7px; top: 104px">2</span><span style="font-size: 10px; top: 100px">m</span><span style="font-size: 6px; top: 96px">3</span></p>"#;
        let (doc, hits) = run(
            vec![
                RuleSpec::new("superscript").with_script(ScriptKind::Sup),
                RuleSpec::new("subscript").with_script(ScriptKind::Sub),
            ],
            html,
        );
        assert_eq!(hits[0].matched, 1);
        assert_eq!(hits[1].matched, 1);
        let out = doc.serialize();
        assert!(out.contains(r#"title="superscript_3" class="superscript">3<"#));
        assert!(out.contains(r#"title="subscript_2" class="subscript">2<"#));
    }

    #[test]
    fn test_max_font_size_condition() {
        let (_, hits) = run(
            vec![RuleSpec::new("footnote")
                .with_regex(r"\d+$")
                .with_max_font_size(7.0)],
            r#"<p><span style="font-size: 6px">1</span><span style="font-size: 10px">2</span></p>"#,
        );
        assert_eq!(hits[0].matched, 1);
    }

    #[test]
    fn test_group_until_end() {
        let html = r#"<body><div><span class="start">[START FIGURE 1.1]</span></div><div><span>a</span></div><div><span>END</span></div><div><span>after</span></div></body>"#;
        let rule = RuleSpec::new("group").with_group(
            "div[span[contains(@class, 'start')]]",
            "self::div[span[contains(text(), 'END')]]",
        );
        let (mut doc, hits) = run(vec![rule.clone()], html);
        assert_eq!(hits[0].grouped, 1);
        let out = doc.serialize();
        assert!(out.contains(
            r#"<div class="group" title="[START FIGURE 1.1]"><div><span class="start">[START FIGURE 1.1]</span></div><div><span>a</span></div></div><div><span>END</span></div>"#
        ));

        let again = RuleSet::from_specs(vec![rule])
            .unwrap()
            .apply(&mut doc, &mut PipelineContext::new())
            .unwrap();
        assert_eq!(again[0].grouped, 0);
        assert_eq!(doc.serialize(), out);
    }

    #[test]
    fn test_style_installed_once() {
        let spec = RuleSpec::new("page")
            .with_regex(r"p\.\d+")
            .with_style("{color : purple}");
        let (mut doc, _) = run(vec![spec.clone()], "<p><span>p.3</span></p>");
        RuleSet::from_specs(vec![spec])
            .unwrap()
            .apply(&mut doc, &mut PipelineContext::new())
            .unwrap();
        let out = doc.serialize();
        assert_eq!(out.matches(".page { color: purple }").count(), 1);
    }

    #[test]
    fn test_bad_rules_rejected() {
        let err = AnnotatorRule::new(RuleSpec::new("x").with_regex("(")).unwrap_err();
        assert!(matches!(err, Error::Regex { ref pattern, .. } if pattern == "("));
        assert!(matches!(
            AnnotatorRule::new(RuleSpec::new("x").with_xpath("[")),
            Err(Error::Locator { .. })
        ));
        assert!(AnnotatorRule::new(RuleSpec::new("x")).is_err());
    }

    #[test]
    fn test_rules_from_json() {
        let set = RuleSet::from_json(
            r#"[{"html_class": "cruft", "regex": "Draft", "delete": true, "delete_scope": "containing_div"},
                {"html_class": "superscript", "script": "super", "target": ".//span"}]"#,
        )
        .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.rules()[0].spec().delete_scope, DeleteScope::ContainingDiv);
        assert_eq!(set.rules()[1].spec().script, Some(ScriptKind::Sup));
    }

    #[test]
    fn test_ipcc_preset_compiles() {
        assert_eq!(AnnotatorRule::ipcc_preset().len(), ipcc_specs().len());
        let (doc, _) = run(
            ipcc_specs(),
            "<div><span>Section 4: Near-term responses</span></div><div><span>(medium confidence)</span></div>",
        );
        let out = doc.serialize();
        assert!(out.contains(r#"id="section_4""#));
        assert!(out.contains(r#"title="medium confidence" class="confidence""#));
    }

    #[test]
    fn test_link_target_ids() {
        let mut doc = HtmlDocument::parse(
            r#"<p><span class="s1">Risks rise {WGII SPM B.2.3; WGI SPM A.1.2} today.</span> tail</p>"#,
        )
        .unwrap();
        let before = normalize_ws(&doc.text_content(doc.root()));
        let n = link_target_ids(&mut doc, "https://example.org/");
        assert_eq!(n, 2);
        let out = doc.serialize();
        assert!(out.contains(r#"<span class="s1" anchor="pre">Risks rise {</span>"#));
        assert!(out.contains(
            r#"<a class="target_id" href="https://example.org/wg2/spm#b.2.3">WGII SPM B.2.3</a>; <a class="target_id" href="https://example.org/wg1/spm#a.1.2">WGI SPM A.1.2</a>"#
        ));
        assert!(out.contains(r#"<span class="s1" anchor="post">} today.</span> tail"#));
        assert_eq!(normalize_ws(&doc.text_content(doc.root())), before);
    }
}
