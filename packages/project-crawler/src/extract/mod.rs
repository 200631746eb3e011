//! Field extraction from rendered project pages.
//!
//! Pure functions over HTML: no I/O, no logging of page content. Selectors
//! follow the project site's markup.

pub mod gallery;
pub mod project;
pub mod text;

pub use gallery::{extract_manifest, resolve_gallery_image, GalleryImage};
pub use project::extract_project;
pub use text::purge_description;

use scraper::{ElementRef, Selector};

use crate::error::{ExtractionError, ExtractionResult};

/// Compile a CSS selector.
pub(crate) fn selector(css: &str) -> ExtractionResult<Selector> {
    Selector::parse(css).map_err(|e| ExtractionError::Selector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

/// Text content of an element with whitespace collapsed.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    text::collapse_whitespace(&element.text().collect::<String>())
}

/// Text content, or `None` when it is blank.
pub(crate) fn non_empty_text(element: ElementRef<'_>) -> Option<String> {
    let text = element_text(element);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
