//! File name sanitizing and per-manifest disambiguation.

use std::collections::{HashMap, HashSet};

/// Make a declared file name safe to join onto a directory.
///
/// Path separators and anything outside `[A-Za-z0-9._-]` become `_`;
/// leading dots are stripped so nothing lands hidden or outside the folder.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}

fn with_suffix(name: &str, n: usize) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{n}.{ext}"),
        _ => format!("{name}_{n}"),
    }
}

/// Sanitize and deduplicate the file names of one manifest.
///
/// The first occurrence keeps its name; the k-th repeat gets `_k` before the
/// extension (`a.jpg`, `a_2.jpg`, `a_3.jpg`), skipping names already used.
/// Deterministic for a given input order.
pub fn disambiguate<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::with_capacity(names.len());
    let mut seen: HashMap<String, usize> = HashMap::new();

    names
        .iter()
        .map(|name| {
            let name = sanitize_filename(name.as_ref());
            let count = seen.entry(name.clone()).or_insert(0);
            *count += 1;
            let mut k = *count;

            let mut candidate = if k == 1 {
                name.clone()
            } else {
                with_suffix(&name, k)
            };
            while taken.contains(&candidate) {
                k += 1;
                candidate = with_suffix(&name, k);
            }
            taken.insert(candidate.clone());
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_filename("1001_01.jpg"), "1001_01.jpg");
        assert_eq!(sanitize_filename("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_filename("a b/c.png"), "a_b_c.png");
        assert_eq!(sanitize_filename("..."), "image");
        assert_eq!(sanitize_filename(""), "image");
    }

    #[test]
    fn test_disambiguate_repeats() {
        assert_eq!(
            disambiguate(&["a.jpg", "b.jpg", "a.jpg", "a.jpg"]),
            vec!["a.jpg", "b.jpg", "a_2.jpg", "a_3.jpg"]
        );
    }

    #[test]
    fn test_disambiguate_skips_taken_names() {
        assert_eq!(
            disambiguate(&["a_2.jpg", "a.jpg", "a.jpg"]),
            vec!["a_2.jpg", "a.jpg", "a_3.jpg"]
        );
        assert_eq!(disambiguate(&["noext", "noext"]), vec!["noext", "noext_2"]);
    }

    proptest! {
        #[test]
        fn disambiguated_names_are_unique(names in prop::collection::vec("[a-c]{1,2}(\\.jpg)?", 0..30)) {
            let out = disambiguate(&names);
            prop_assert_eq!(out.len(), names.len());
            let unique: HashSet<_> = out.iter().collect();
            prop_assert_eq!(unique.len(), out.len());
        }

        #[test]
        fn unique_input_is_unchanged(names in prop::collection::hash_set("[a-z]{1,8}\\.png", 0..20)) {
            let names: Vec<String> = names.into_iter().collect();
            prop_assert_eq!(disambiguate(&names), names);
        }
    }
}
