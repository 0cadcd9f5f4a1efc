//! CSS declaration lists.
//!
//! Only flat `name: value; ...` lists are handled, optionally wrapped in a
//! single `selector { ... }` rule. This is not a CSS engine.

use std::fmt;

use crate::model::ClassRef;

/// Properties that change how text looks; only these take part in style
/// equivalence and are hoisted into the head style table.
pub const TEXT_PROPERTIES: &[&str] = &[
    "font-family",
    "font-size",
    "font-weight",
    "font-style",
    "font-stretched",
    "color",
    "fill",
    "stroke",
];

/// Whether `name` is a text-affecting property.
pub fn is_text_property(name: &str) -> bool {
    TEXT_PROPERTIES.contains(&name)
}

/// An ordered list of CSS declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CssStyle {
    decls: Vec<(String, String)>,
}

impl CssStyle {
    /// Create an empty declaration list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a declaration list, logging and dropping malformed entries.
    pub fn parse(text: &str) -> Self {
        let (style, rejected) = Self::parse_checked(text);
        for entry in rejected {
            log::warn!("malformed CSS declaration dropped: '{}'", entry);
        }
        style
    }

    /// Parse a declaration list, returning the malformed entries separately.
    ///
    /// A `{...}` wrapper is unwrapped first. Entries are split on `;` and then
    /// on `:`; an entry without exactly one `:` is rejected. Later duplicates
    /// override earlier ones in place.
    pub fn parse_checked(text: &str) -> (Self, Vec<String>) {
        let body = match (text.find('{'), text.rfind('}')) {
            (Some(open), Some(close)) if open < close => &text[open + 1..close],
            (Some(open), None) => &text[open + 1..],
            _ => text,
        };

        let mut style = Self::new();
        let mut rejected = Vec::new();
        for entry in body.split(';') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let parts: Vec<&str> = entry.split(':').collect();
            if parts.len() != 2 || parts[0].trim().is_empty() {
                rejected.push(entry.to_string());
                continue;
            }
            style.set(parts[0].trim().to_ascii_lowercase(), parts[1].trim());
        }
        (style, rejected)
    }

    /// Value of a declaration.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.decls
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set a declaration, keeping its position if it already exists.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.decls.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.decls.push((name, value)),
        }
    }

    /// Remove a declaration.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self.decls.iter().position(|(k, _)| k == name)?;
        Some(self.decls.remove(pos).1)
    }

    /// Numeric value of a declaration with any trailing `px` stripped.
    pub fn numeric(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(parse_px)
    }

    /// Declarations in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.decls.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of declarations.
    pub fn len(&self) -> usize {
        self.decls.len()
    }

    /// Whether there are no declarations.
    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Split into (text-affecting, other) declarations, each keeping order.
    pub fn split_text(&self) -> (CssStyle, CssStyle) {
        let (text, other): (Vec<_>, Vec<_>) = self
            .decls
            .iter()
            .cloned()
            .partition(|(k, _)| is_text_property(k));
        (CssStyle { decls: text }, CssStyle { decls: other })
    }

    /// Text-affecting declarations in canonical property order; two styles
    /// with equal keys are equivalent.
    pub fn text_key(&self) -> Vec<(String, String)> {
        TEXT_PROPERTIES
            .iter()
            .filter_map(|p| self.get(p).map(|v| (p.to_string(), v.to_string())))
            .collect()
    }

    /// Merge `other` over `self`.
    pub fn merge(&mut self, other: &CssStyle) {
        for (k, v) in other.iter() {
            self.set(k, v);
        }
    }

    /// Render as `name: value; name: value`.
    pub fn to_css(&self) -> String {
        self.decls
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for CssStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_css())
    }
}

/// Parse a number with an optional trailing `px`.
pub fn parse_px(value: &str) -> Option<f64> {
    let value = value.trim();
    value
        .strip_suffix("px")
        .unwrap_or(value)
        .trim()
        .parse()
        .ok()
}

/// A single-class rule from a head `<style>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleRule {
    pub classref: ClassRef,
    pub style: CssStyle,
}

impl StyleRule {
    /// Create a rule.
    pub fn new(classref: ClassRef, style: CssStyle) -> Self {
        Self { classref, style }
    }

    /// Parse every `.name { decls }` rule in a style sheet. Rules whose
    /// selector is not a single class are skipped.
    pub fn parse_sheet(text: &str) -> Vec<StyleRule> {
        text.split('}')
            .filter_map(|chunk| {
                let (selector, body) = chunk.split_once('{')?;
                let classref = ClassRef::parse(selector)?;
                Some(StyleRule::new(classref, CssStyle::parse(body)))
            })
            .collect()
    }

    /// Render as `.name { decls }`.
    pub fn to_css(&self) -> String {
        format!("{} {{ {} }}", self.classref, self.style.to_css())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whitespace_tolerant() {
        let style = CssStyle::parse("  font-family :Arial;font-size: 9.5px ;; top:10px ");
        assert_eq!(style.len(), 3);
        assert_eq!(style.get("font-family"), Some("Arial"));
        assert_eq!(style.numeric("font-size"), Some(9.5));
        assert_eq!(style.numeric("top"), Some(10.0));
    }

    #[test]
    fn test_parse_unwraps_braces() {
        let style = CssStyle::parse(".s0 { font-size: 11px; color: #000 }");
        assert_eq!(style.to_css(), "font-size: 11px; color: #000");
    }

    #[test]
    fn test_malformed_entries_rejected_individually() {
        let (style, rejected) =
            CssStyle::parse_checked("color; font-size: 9px; background: url(http://x); left: 3px");
        assert_eq!(rejected, vec!["color", "background: url(http://x)"]);
        assert_eq!(style.to_css(), "font-size: 9px; left: 3px");
    }

    #[test]
    fn test_split_text_and_key() {
        let style = CssStyle::parse("top: 5px; font-size: 12px; left: 9px; font-family: Arial");
        let (text, other) = style.split_text();
        assert_eq!(text.to_css(), "font-size: 12px; font-family: Arial");
        assert_eq!(other.to_css(), "top: 5px; left: 9px");
        assert_eq!(
            text.text_key(),
            vec![
                ("font-family".to_string(), "Arial".to_string()),
                ("font-size".to_string(), "12px".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_px() {
        assert_eq!(parse_px("12px"), Some(12.0));
        assert_eq!(parse_px(" 7.25 "), Some(7.25));
        assert_eq!(parse_px("auto"), None);
    }

    #[test]
    fn test_style_rule_sheet() {
        let rules = StyleRule::parse_sheet(".s0 { font-size: 9px }\n.s1 {color: red} p { margin: 0 }");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].classref.as_str(), ".s1");
        assert_eq!(rules[0].to_css(), ".s0 { font-size: 9px }");
    }
}
