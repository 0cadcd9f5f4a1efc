//! Element values stored in the document tree, and class-name types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An element node: tag, ordered attributes, and the two text slots.
///
/// `text` is the text before the first child; `tail` is the text that follows
/// the element inside its parent, up to the next sibling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Lowercase tag name
    pub tag: String,
    /// Attributes in insertion order
    pub attrs: Vec<(String, String)>,
    /// Leading text
    pub text: Option<String>,
    /// Trailing text, owned by the parent sequence
    pub tail: Option<String>,
}

impl Element {
    /// Create an element with the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    /// Add an attribute (builder form).
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Set the leading text (builder form).
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Get an attribute value.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Check whether an attribute is present.
    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|(k, _)| k == name)
    }

    /// Set an attribute, keeping its position if it already exists.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    /// Remove an attribute, returning its value.
    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|(k, _)| k == name)?;
        Some(self.attrs.remove(pos).1)
    }

    /// Whether the element has this tag.
    pub fn is(&self, tag: &str) -> bool {
        self.tag == tag
    }

    /// Class names from the `class` attribute, in order.
    pub fn classes(&self) -> Vec<ClassName> {
        self.attr("class")
            .map(|c| c.split_whitespace().map(ClassName::new).collect())
            .unwrap_or_default()
    }

    /// Whether the class list contains `name`.
    pub fn has_class(&self, name: &str) -> bool {
        self.attr("class")
            .map(|c| c.split_whitespace().any(|n| n == name))
            .unwrap_or(false)
    }

    /// Append a class name unless it is already present.
    pub fn add_class(&mut self, name: &str) {
        if name.is_empty() || self.has_class(name) {
            return;
        }
        let value = match self.attr("class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), name),
            _ => name.to_string(),
        };
        self.set_attr("class", value);
    }

    /// Replace the class list. An empty list removes the attribute.
    pub fn set_classes(&mut self, classes: &[ClassName]) {
        if classes.is_empty() {
            self.remove_attr("class");
        } else {
            let joined: Vec<&str> = classes.iter().map(|c| c.as_str()).collect();
            self.set_attr("class", joined.join(" "));
        }
    }

    /// Leading text, or "" when absent.
    pub fn text_str(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Tail text, or "" when absent.
    pub fn tail_str(&self) -> &str {
        self.tail.as_deref().unwrap_or("")
    }
}

/// Append to an optional text slot.
pub(crate) fn push_text(slot: &mut Option<String>, extra: &str) {
    if extra.is_empty() {
        return;
    }
    match slot {
        Some(s) => s.push_str(extra),
        None => *slot = Some(extra.to_string()),
    }
}

/// A bare class name, e.g. `s17`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassName(String);

impl ClassName {
    /// Create a class name; a leading dot is stripped.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().trim_start_matches('.').to_string())
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The selector form of this name.
    pub fn to_ref(&self) -> ClassRef {
        ClassRef(format!(".{}", self.0))
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A style-table key with its leading dot, e.g. `.s17`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassRef(String);

impl ClassRef {
    /// Parse a selector; returns `None` unless it is a single `.name` selector.
    pub fn parse(selector: &str) -> Option<Self> {
        let selector = selector.trim();
        let name = selector.strip_prefix('.')?;
        if name.is_empty() || name.contains(|c: char| c.is_whitespace() || c == '.') {
            return None;
        }
        Some(Self(selector.to_string()))
    }

    /// The selector as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bare class name.
    pub fn name(&self) -> ClassName {
        ClassName(self.0[1..].to_string())
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
