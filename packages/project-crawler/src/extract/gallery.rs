//! Gallery manifest extraction and gallery viewer resolution.

use scraper::Html;
use serde::Deserialize;
use url::Url;

use super::{selector, text};
use crate::error::{AssetError, AssetResult, ExtractionResult};
use crate::types::manifest::{ImageDescriptor, ImageManifest};

const DEFAULT_EXTENSION: &str = "jpg";

/// Build the image manifest from the gallery thumbnails of a project page.
///
/// Each entry points at whatever the thumbnail links to: either the image
/// itself or a gallery viewer page that [`resolve_gallery_image`] can read.
/// An empty manifest is valid.
pub fn extract_manifest(task_id: &str, page_url: &str, html: &str) -> ExtractionResult<ImageManifest> {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();
    let link_sel = selector("a.gallery-thumbs-link")?;
    let img_sel = selector("img")?;

    let mut images = Vec::new();
    for (position, item) in document.select(&selector("li.gallery-thumbs-item")?).enumerate() {
        let Some(link) = item.select(&link_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href").map(str::trim).filter(|h| !h.is_empty()) else {
            continue;
        };
        let Some(source_url) = resolve(base.as_ref(), href) else {
            continue;
        };
        if source_url == page_url {
            continue;
        }

        let caption = link
            .value()
            .attr("title")
            .map(text::collapse_whitespace)
            .filter(|t| !t.is_empty())
            .or_else(|| {
                link.select(&img_sel)
                    .next()
                    .and_then(|img| img.value().attr("alt"))
                    .map(text::collapse_whitespace)
                    .filter(|t| !t.is_empty())
            })
            .unwrap_or_else(|| format!("Untitled_{}", position + 1));

        let filename = format!(
            "{}_{:02}.{}",
            task_id,
            images.len() + 1,
            extension_of(&source_url)
        );
        images.push(ImageDescriptor::new(source_url, filename).with_caption(caption));
    }

    Ok(ImageManifest::new(images))
}

fn resolve(base: Option<&Url>, href: &str) -> Option<String> {
    let url = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

/// File extension from a URL path: at most four alphanumerics, else `jpg`.
pub(crate) fn extension_of(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let last = path.rsplit('/').next().unwrap_or_default();

    match last.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=4).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

/// The image a gallery viewer page points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryImage {
    pub url: String,
    pub tags: Vec<String>,
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GalleryEntry {
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    url_large: Option<String>,
    #[serde(default)]
    url_slideshow: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    tags: Vec<serde_json::Value>,
}

impl GalleryEntry {
    fn links_to(&self, id: &str) -> bool {
        self.link.as_deref().is_some_and(|link| link.contains(id))
    }
}

/// Resolve the target image of a gallery viewer page.
///
/// The page carries every gallery image as JSON in
/// `div#gallery-items[data-images]`. The target is the entry matching the
/// URL fragment id, else the one matching `data-id`, else the first.
pub fn resolve_gallery_image(page_url: &str, html: &str) -> AssetResult<GalleryImage> {
    let unresolvable = |reason: &str| AssetError::Unresolvable {
        reason: reason.to_string(),
    };

    let document = Html::parse_document(html);
    let gallery_sel = selector("div#gallery-items").map_err(|e| unresolvable(&e.to_string()))?;
    let gallery = document
        .select(&gallery_sel)
        .next()
        .ok_or_else(|| unresolvable("no gallery container"))?;
    let data = gallery
        .value()
        .attr("data-images")
        .ok_or_else(|| unresolvable("no data-images attribute"))?;
    let entries: Vec<GalleryEntry> = serde_json::from_str(data)
        .map_err(|e| unresolvable(&format!("invalid data-images JSON: {e}")))?;

    let page = Url::parse(page_url).ok();
    let fragment_id = page
        .as_ref()
        .and_then(Url::fragment)
        .and_then(|f| f.split('-').next())
        .filter(|id| !id.is_empty());
    let default_id = gallery.value().attr("data-id").filter(|id| !id.is_empty());

    let target = fragment_id
        .and_then(|id| entries.iter().find(|e| e.links_to(id)))
        .or_else(|| default_id.and_then(|id| entries.iter().find(|e| e.links_to(id))))
        .or_else(|| entries.first())
        .ok_or_else(|| unresolvable("gallery is empty"))?;

    let raw_url = target
        .url_large
        .as_deref()
        .or(target.url_slideshow.as_deref())
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| unresolvable("gallery entry has no image URL"))?;
    let url = resolve(page.as_ref(), raw_url.trim())
        .ok_or_else(|| unresolvable("gallery entry has an invalid image URL"))?;

    let tags = target
        .tags
        .iter()
        .filter_map(|tag| tag.get("name").and_then(|n| n.as_str()))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    Ok(GalleryImage {
        url,
        tags,
        caption: target
            .caption
            .as_deref()
            .map(text::collapse_whitespace)
            .filter(|c| !c.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "https://example.com/1001/science-museum";

    #[test]
    fn test_extract_manifest() {
        let html = r#"
            <ul>
              <li class="gallery-thumbs-item">
                <a class="gallery-thumbs-link" href="/1001/science-museum/photo-a" title="Facade">
                  <img alt="ignored"></a></li>
              <li class="gallery-thumbs-item"><span>no link</span></li>
              <li class="gallery-thumbs-item">
                <a class="gallery-thumbs-link" href="https://cdn.example.com/b.PNG">
                  <img alt="Lobby"></a></li>
              <li class="gallery-thumbs-item">
                <a class="gallery-thumbs-link" href="https://example.com/1001/science-museum"></a></li>
              <li class="gallery-thumbs-item">
                <a class="gallery-thumbs-link" href="https://cdn.example.com/c.jpeg"></a></li>
            </ul>"#;

        let manifest = extract_manifest("1001", PAGE, html).unwrap();
        let names: Vec<_> = manifest.iter().map(|d| d.filename.as_str()).collect();
        let captions: Vec<_> = manifest.iter().map(|d| d.caption.as_str()).collect();

        assert_eq!(names, vec!["1001_01.jpg", "1001_02.png", "1001_03.jpeg"]);
        assert_eq!(captions, vec!["Facade", "Lobby", "Untitled_5"]);
        assert_eq!(
            manifest.images[0].source_url,
            "https://example.com/1001/science-museum/photo-a"
        );
    }

    #[test]
    fn test_empty_gallery() {
        let manifest = extract_manifest("1", PAGE, "<p>No gallery</p>").unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("https://cdn.example.com/x/photo.WEBP?w=800"), "webp");
        assert_eq!(extension_of("https://cdn.example.com/x/photo"), "jpg");
        assert_eq!(extension_of("https://cdn.example.com/x/photo.backup"), "jpg");
        assert_eq!(extension_of("https://cdn.example.com/x/.png"), "jpg");
    }

    fn viewer(data_id: &str) -> String {
        let data = r#"[
            {"link": "/1001/science-museum/111-photo", "url_large": "https://cdn.example.com/111.jpg",
             "caption": "Facade", "tags": [{"name": "Exterior"}, {"name": " Facade "}]},
            {"link": "/1001/science-museum/222-photo", "url_slideshow": "/img/222.jpg",
             "caption": "Lobby", "tags": [{"name": "Interior"}, "junk"]}
        ]"#;
        format!(
            r#"<div id="gallery-items" data-id="{data_id}" data-images='{data}'></div>"#
        )
    }

    #[test]
    fn test_resolve_by_fragment() {
        let image = resolve_gallery_image(&format!("{PAGE}#222-photo"), &viewer("111")).unwrap();
        assert_eq!(image.url, "https://example.com/img/222.jpg");
        assert_eq!(image.tags, vec!["Interior"]);
        assert_eq!(image.caption.as_deref(), Some("Lobby"));
    }

    #[test]
    fn test_resolve_by_data_id_then_first() {
        let image = resolve_gallery_image(PAGE, &viewer("222")).unwrap();
        assert_eq!(image.url, "https://example.com/img/222.jpg");

        let image = resolve_gallery_image(PAGE, &viewer("999")).unwrap();
        assert_eq!(image.url, "https://cdn.example.com/111.jpg");
        assert_eq!(image.tags, vec!["Exterior", "Facade"]);
    }

    #[test]
    fn test_resolve_failures() {
        assert!(matches!(
            resolve_gallery_image(PAGE, "<p>nothing</p>"),
            Err(AssetError::Unresolvable { .. })
        ));
        assert!(matches!(
            resolve_gallery_image(PAGE, r#"<div id="gallery-items" data-images="[]"></div>"#),
            Err(AssetError::Unresolvable { .. })
        ));
    }
}
