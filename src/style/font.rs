//! Font name decomposition.
//!
//! PDF font names pack weight, slant and width into the family name
//! (`ABCDEF+TimesNewRomanPS-BoldItalicMT`). The decomposition is driven by a
//! table of `(pattern, property, value)` rules applied until none matches.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::css::CssStyle;

/// Font weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
    Light,
}

/// Font slant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
}

/// Font width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStretch {
    #[default]
    Normal,
    Narrow,
    Wide,
}

/// Generic font class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenericClass {
    #[default]
    Sans,
    Serif,
    Monospace,
    Symbol,
}

impl FontWeight {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontWeight::Normal => "normal",
            FontWeight::Bold => "bold",
            FontWeight::Light => "light",
        }
    }

    /// Parse a CSS value; numeric weights of 600 and above are bold.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" | "400" => Some(FontWeight::Normal),
            "bold" | "bolder" => Some(FontWeight::Bold),
            "light" | "lighter" => Some(FontWeight::Light),
            other => other.parse::<u32>().ok().map(|n| match n {
                0..=399 => FontWeight::Light,
                400..=599 => FontWeight::Normal,
                _ => FontWeight::Bold,
            }),
        }
    }
}

impl FontStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontStyle::Normal => "normal",
            FontStyle::Italic => "italic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(FontStyle::Normal),
            "italic" | "oblique" => Some(FontStyle::Italic),
            _ => None,
        }
    }
}

impl FontStretch {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontStretch::Normal => "normal",
            FontStretch::Narrow => "narrow",
            FontStretch::Wide => "wide",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(FontStretch::Normal),
            "narrow" | "condensed" => Some(FontStretch::Narrow),
            "wide" | "expanded" => Some(FontStretch::Wide),
            _ => None,
        }
    }
}

impl GenericClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenericClass::Sans => "sans-serif",
            GenericClass::Serif => "serif",
            GenericClass::Monospace => "monospace",
            GenericClass::Symbol => "symbol",
        }
    }
}

/// Property a name rule sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontProperty {
    Weight(FontWeight),
    Style(FontStyle),
    Stretch(FontStretch),
}

/// One decomposition rule: when `pattern` matches the name, the matched
/// word is removed and `property` is recorded.
#[derive(Debug)]
pub struct FontRule {
    pub pattern: Regex,
    pub property: FontProperty,
}

impl FontRule {
    fn new(words: &str, property: FontProperty) -> Self {
        let pattern = format!("(?P<pre>.*)(?:{})(?P<post>.*)", words);
        Self {
            pattern: Regex::new(&pattern).unwrap(),
            property,
        }
    }
}

/// The name rules, in application order.
pub static FONT_RULES: Lazy<Vec<FontRule>> = Lazy::new(|| {
    vec![
        FontRule::new("Bold|Black|Heavy", FontProperty::Weight(FontWeight::Bold)),
        FontRule::new("Light|Thin", FontProperty::Weight(FontWeight::Light)),
        FontRule::new("Italic|Oblique|Ita", FontProperty::Style(FontStyle::Italic)),
        FontRule::new(
            "Condensed|Cn|Narrow",
            FontProperty::Stretch(FontStretch::Narrow),
        ),
        FontRule::new("Wide", FontProperty::Stretch(FontStretch::Wide)),
    ]
});

/// Family substrings that decide the generic class; the first match wins.
pub const GENERIC_CLASSES: &[(&str, GenericClass)] = &[
    ("Arial", GenericClass::Sans),
    ("Calibri", GenericClass::Sans),
    ("Frutiger", GenericClass::Sans),
    ("Helvetica", GenericClass::Sans),
    ("Times", GenericClass::Serif),
    ("Courier", GenericClass::Monospace),
    ("Symbol", GenericClass::Symbol),
];

static SUBSET_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{6}\+(?P<name>\S+)").unwrap());

/// A font name split into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontDescriptor {
    /// Name as given
    pub raw: String,
    /// Family with subset prefix, style words and hyphens removed
    pub family: String,
    pub weight: FontWeight,
    pub style: FontStyle,
    pub stretched: FontStretch,
    pub generic: GenericClass,
}

impl FontDescriptor {
    /// Decompose a font name.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let unquoted = raw.trim_matches(|c: char| c == '"' || c == '\'');
        let mut name = match SUBSET_PREFIX.captures(unquoted) {
            Some(caps) => caps["name"].to_string(),
            None => unquoted.to_string(),
        };

        let mut weight = FontWeight::Normal;
        let mut style = FontStyle::Normal;
        let mut stretched = FontStretch::Normal;
        loop {
            let mut changed = false;
            for rule in FONT_RULES.iter() {
                let Some(rewritten) = rule
                    .pattern
                    .captures(&name)
                    .map(|caps| format!("{}{}", &caps["pre"], &caps["post"]))
                else {
                    continue;
                };
                name = rewritten;
                match rule.property {
                    FontProperty::Weight(w) => weight = w,
                    FontProperty::Style(s) => style = s,
                    FontProperty::Stretch(s) => stretched = s,
                }
                changed = true;
            }
            if !changed {
                break;
            }
        }

        let family = name.replace('-', "");
        let generic = GENERIC_CLASSES
            .iter()
            .find(|(word, _)| family.contains(word))
            .map(|(_, class)| *class)
            .unwrap_or_default();

        Self {
            raw: raw.to_string(),
            family,
            weight,
            style,
            stretched,
            generic,
        }
    }

    /// Rewrite `font-family` in `style` to the bare family and write weight,
    /// style and (when not normal) stretch explicitly.
    ///
    /// A weight or slant found in the name wins over an existing declaration;
    /// otherwise the existing declaration is kept, defaulting to normal.
    /// Applying this twice gives the same result as applying it once.
    pub fn apply_to(style: &mut CssStyle) {
        let Some(family) = style.get("font-family") else {
            return;
        };
        let desc = FontDescriptor::parse(family);

        let weight = match desc.weight {
            FontWeight::Normal => style
                .get("font-weight")
                .and_then(FontWeight::parse)
                .unwrap_or_default(),
            w => w,
        };
        let slant = match desc.style {
            FontStyle::Normal => style
                .get("font-style")
                .and_then(FontStyle::parse)
                .unwrap_or_default(),
            s => s,
        };
        let stretched = match desc.stretched {
            FontStretch::Normal => style
                .get("font-stretched")
                .and_then(FontStretch::parse)
                .unwrap_or_default(),
            s => s,
        };

        style.set("font-family", desc.family);
        style.set("font-weight", weight.as_str());
        style.set("font-style", slant.as_str());
        if stretched != FontStretch::Normal || style.get("font-stretched").is_some() {
            style.set("font-stretched", stretched.as_str());
        }
    }
}

impl fmt::Display for FontDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}, {}, {})",
            self.family,
            self.weight.as_str(),
            self.style.as_str(),
            self.stretched.as_str(),
            self.generic.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bold_italic_with_subset_prefix() {
        let fd = FontDescriptor::parse("ABCDEF+TimesNewRomanPS-BoldItalicMT");
        assert_eq!(fd.family, "TimesNewRomanPSMT");
        assert_eq!(fd.weight, FontWeight::Bold);
        assert_eq!(fd.style, FontStyle::Italic);
        assert_eq!(fd.stretched, FontStretch::Normal);
        assert_eq!(fd.generic, GenericClass::Serif);
    }

    #[test]
    fn test_each_rule() {
        let cases = [
            ("Arial-Black", FontProperty::Weight(FontWeight::Bold)),
            ("Frutiger-Heavy", FontProperty::Weight(FontWeight::Bold)),
            ("Frutiger-Light", FontProperty::Weight(FontWeight::Light)),
            ("Helvetica-Thin", FontProperty::Weight(FontWeight::Light)),
            ("Helvetica-Oblique", FontProperty::Style(FontStyle::Italic)),
            ("FrutigerIta", FontProperty::Style(FontStyle::Italic)),
            ("ArialNarrow", FontProperty::Stretch(FontStretch::Narrow)),
            ("FrutigerCn", FontProperty::Stretch(FontStretch::Narrow)),
            ("Helvetica-Condensed", FontProperty::Stretch(FontStretch::Narrow)),
            ("ArialWide", FontProperty::Stretch(FontStretch::Wide)),
        ];
        for (name, expected) in cases {
            let fd = FontDescriptor::parse(name);
            let got = match expected {
                FontProperty::Weight(_) => FontProperty::Weight(fd.weight),
                FontProperty::Style(_) => FontProperty::Style(fd.style),
                FontProperty::Stretch(_) => FontProperty::Stretch(fd.stretched),
            };
            assert_eq!(got, expected, "{}", name);
            assert_eq!(fd.generic, GenericClass::Sans, "{}", name);
        }
    }

    #[test]
    fn test_plain_and_generic_classes() {
        let fd = FontDescriptor::parse("Helvetica");
        assert_eq!(fd.family, "Helvetica");
        assert_eq!(fd.weight, FontWeight::Normal);
        assert_eq!(FontDescriptor::parse("Courier").generic, GenericClass::Monospace);
        assert_eq!(FontDescriptor::parse("Symbol").generic, GenericClass::Symbol);
        assert_eq!(FontDescriptor::parse("Garamond").generic, GenericClass::Sans);
    }

    #[test]
    fn test_apply_to_style() {
        let mut style =
            CssStyle::parse("font-family: TimesNewRomanPS-BoldItalicMT; font-size: 11px");
        FontDescriptor::apply_to(&mut style);
        assert_eq!(
            style.to_css(),
            "font-family: TimesNewRomanPSMT; font-size: 11px; font-weight: bold; font-style: italic"
        );
        let once = style.clone();
        FontDescriptor::apply_to(&mut style);
        assert_eq!(style, once);
    }

    #[test]
    fn test_apply_keeps_declared_weight() {
        let mut style = CssStyle::parse("font-family: Arial; font-weight: bold");
        FontDescriptor::apply_to(&mut style);
        assert_eq!(style.get("font-weight"), Some("bold"));
        assert_eq!(style.get("font-style"), Some("normal"));
        assert_eq!(style.get("font-stretched"), None);
    }

    #[test]
    fn test_weight_parse() {
        assert_eq!(FontWeight::parse("700"), Some(FontWeight::Bold));
        assert_eq!(FontWeight::parse("300"), Some(FontWeight::Light));
        assert_eq!(FontWeight::parse("Bold"), Some(FontWeight::Bold));
        assert_eq!(FontWeight::parse("heavy-ish"), None);
    }
}
