//! Description text cleanup.

use std::collections::HashSet;

/// Paragraphs with this many words or fewer are captions or labels.
const MIN_WORDS: usize = 4;

const BOILERPLATE: &[&str] = &[
    "You'll now receive updates based on what you follow!",
    "Save this picture!",
];

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop short fragments, site boilerplate and repeats from description
/// paragraphs. Order of the kept paragraphs is preserved.
pub fn purge_description<I, S>(paragraphs: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    paragraphs
        .into_iter()
        .map(|p| collapse_whitespace(p.as_ref()))
        .filter(|p| p.split_whitespace().count() >= MIN_WORDS)
        .filter(|p| !BOILERPLATE.iter().any(|b| p.contains(b)))
        .filter(|p| !p.starts_with("Check the"))
        .filter(|p| seen.insert(p.clone()))
        .collect()
}
