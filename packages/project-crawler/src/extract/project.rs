//! Project metadata and description extraction.

use scraper::{ElementRef, Html};

use super::{element_text, non_empty_text, selector, text};
use crate::error::{ExtractionError, ExtractionResult};
use crate::types::project::ProjectRecord;

/// Extract the project document from a rendered page.
///
/// `task_id` and `url` come from the task record, not the page. Fails with
/// `MissingField` when the page has no title or no usable description,
/// which is what a partial render or a block page looks like.
pub fn extract_project(task_id: &str, url: &str, html: &str) -> ExtractionResult<ProjectRecord> {
    let document = Html::parse_document(html);

    let title = extract_title(&document)?.ok_or(ExtractionError::MissingField { field: "title" })?;

    let categories = match document.select(&selector(".afd-specs__header-category")?).next() {
        Some(container) => link_texts(container)?,
        None => Vec::new(),
    };

    let (city, country) = extract_location(&document)?;

    let mut record = ProjectRecord {
        id: task_id.to_string(),
        title,
        url: url.to_string(),
        categories,
        city,
        country,
        architects: Vec::new(),
        area: None,
        year: None,
        description: Vec::new(),
    };

    let key_sel = selector(".afd-specs__key")?;
    let value_sel = selector(".afd-specs__value")?;
    for item in document.select(&selector(".afd-specs__item")?) {
        let (Some(key), Some(value)) = (item.select(&key_sel).next(), item.select(&value_sel).next())
        else {
            continue;
        };
        let key = element_text(key);
        if key.contains("Architects") {
            record.architects = link_texts(value)?;
        } else if key.contains("Area") {
            let area = element_text(value).replace("m²", "").trim().to_string();
            if !area.is_empty() {
                record.area = Some(format!("{area} m²"));
            }
        } else if key.contains("Year") {
            record.year = non_empty_text(value);
        }
    }

    record.description = text::purge_description(description_paragraphs(&document)?);
    if record.description.is_empty() {
        return Err(ExtractionError::MissingField {
            field: "description",
        });
    }

    Ok(record)
}

fn extract_title(document: &Html) -> ExtractionResult<Option<String>> {
    let heading = document
        .select(&selector(".afd-title-big--bmargin-big")?)
        .next()
        .map(element_text);
    let fallback = || -> ExtractionResult<Option<String>> {
        Ok(document.select(&selector("title")?).next().map(element_text))
    };

    let raw = match heading {
        Some(text) if !text.is_empty() => Some(text),
        _ => fallback()?,
    };

    // Headings read "Name / Architect"
    Ok(raw
        .and_then(|t| t.split('/').next().map(|s| s.trim().to_string()))
        .filter(|t| !t.is_empty()))
}

fn extract_location(document: &Html) -> ExtractionResult<(Option<String>, Option<String>)> {
    let Some(container) = document
        .select(&selector(".afd-specs__header-location")?)
        .next()
    else {
        return Ok((None, None));
    };

    let full = element_text(container);
    let city = full
        .split(',')
        .next()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let country = container
        .select(&selector("a")?)
        .next()
        .and_then(non_empty_text);

    Ok((city, country))
}

fn link_texts(container: ElementRef<'_>) -> ExtractionResult<Vec<String>> {
    Ok(container
        .select(&selector("a")?)
        .filter_map(non_empty_text)
        .collect())
}

/// Direct paragraph children of the article body, else every paragraph.
fn description_paragraphs(document: &Html) -> ExtractionResult<Vec<String>> {
    if let Some(content) = document.select(&selector("div.the-content")?).next() {
        return Ok(content
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "p")
            .map(element_text)
            .collect());
    }

    Ok(document.select(&selector("p")?).map(element_text).collect())
}
