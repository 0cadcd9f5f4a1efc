//! Document model types.
//!
//! This module defines the mutable HTML tree that every pass works on,
//! the path expressions used to select nodes in it, the controlled
//! vocabulary types, and the record types produced by structure
//! recognition.

mod document;
mod element;
mod locator;
mod records;
mod terms;

pub use document::{escape_attr, escape_text, normalize_ws, HtmlDocument};
pub use element::{ClassName, ClassRef, Element};
pub(crate) use element::push_text;
pub use locator::Locator;
pub use records::{
    Biblioref, Float, FloatKind, Footnote, Reference, Section, SectionNode, StructureReport,
};
pub use terms::{slug, TermEntry, TermList};

pub use ego_tree::NodeId;
