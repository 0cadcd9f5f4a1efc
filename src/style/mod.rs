//! Style table handling: CSS declaration parsing, font name decomposition
//! and the head `<style>` table operations.

mod css;
mod font;
mod table;

pub use css::{is_text_property, parse_px, CssStyle, StyleRule, TEXT_PROPERTIES};
pub use font::{
    FontDescriptor, FontProperty, FontRule, FontStretch, FontStyle, FontWeight, GenericClass,
    FONT_RULES, GENERIC_CLASSES,
};
pub(crate) use table::{append_style_rule, content_elements, ensure_head};
pub use table::{
    abbreviate, extract_styles_into_head, normalize, readable_name, NormalizeReport, StyleTable,
};
