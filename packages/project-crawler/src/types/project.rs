//! Extracted project document.

use serde::{Deserialize, Serialize};

use crate::types::task::ProjectMetadata;

/// Metadata and full text of one project page.
///
/// Serialized as the per-task details document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub architects: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    /// Cleaned description paragraphs, in page order
    pub description: Vec<String>,
}

impl ProjectRecord {
    /// Flatten into the columns kept on the task record.
    pub fn metadata(&self) -> ProjectMetadata {
        let location = match (&self.city, &self.country) {
            (Some(city), Some(country)) if city != country => Some(format!("{city}, {country}")),
            (Some(city), _) => Some(city.clone()),
            (None, Some(country)) => Some(country.clone()),
            (None, None) => None,
        };

        ProjectMetadata {
            architect: join_non_empty(&self.architects),
            area: self.area.clone(),
            year: self.year.clone(),
            location,
            category: join_non_empty(&self.categories),
        }
    }

    /// Description paragraphs joined into one text block.
    pub fn full_text(&self) -> String {
        self.description.join("\n\n")
    }
}

fn join_non_empty(values: &[String]) -> Option<String> {
    if values.is_empty() {
        None
    } else {
        Some(values.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ProjectRecord {
        ProjectRecord {
            id: "1001".into(),
            title: "Science Museum".into(),
            url: "https://example.com/1001/science-museum".into(),
            categories: vec!["Museum".into(), "Planetarium".into()],
            city: Some("Lyon".into()),
            country: Some("France".into()),
            architects: vec!["Studio A".into(), "Studio B".into()],
            area: Some("1200 m²".into()),
            year: Some("2021".into()),
            description: vec!["First paragraph here.".into(), "Second one too.".into()],
        }
    }

    #[test]
    fn test_metadata_flattening() {
        let meta = record().metadata();

        assert_eq!(meta.architect.as_deref(), Some("Studio A; Studio B"));
        assert_eq!(meta.location.as_deref(), Some("Lyon, France"));
        assert_eq!(meta.category.as_deref(), Some("Museum; Planetarium"));
        assert_eq!(meta.area.as_deref(), Some("1200 m²"));
        assert_eq!(meta.year.as_deref(), Some("2021"));
    }

    #[test]
    fn test_empty_lists_are_omitted_from_json() {
        let mut record = record();
        record.architects.clear();
        record.city = None;

        let json = serde_json::to_value(&record).unwrap();

        assert!(json.get("architects").is_none());
        assert!(json.get("city").is_none());
        assert_eq!(record.metadata().location.as_deref(), Some("France"));
    }
}
