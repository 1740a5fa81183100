//! Video page metadata.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

/// What a video watch page says about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub video_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub channel: Option<String>,
}

impl VideoMetadata {
    /// Plain-text rendering used as generator context.
    pub fn to_context(&self) -> String {
        let mut lines = Vec::new();
        if let Some(title) = &self.title {
            lines.push(format!("Video title: {title}"));
        }
        if let Some(channel) = &self.channel {
            lines.push(format!("Channel: {channel}"));
        }
        if let Some(description) = &self.description {
            lines.push(format!("Description: {description}"));
        }
        lines.join("\n")
    }
}

/// Extract the video id from `watch?v=`, `youtu.be/`, `shorts/` and `embed/` URLs.
pub fn video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();

    let id = match (host, segments.as_slice()) {
        ("youtu.be", [id, ..]) => Some(id.to_string()),
        ("youtube.com", ["watch"]) => url
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned()),
        ("youtube.com", ["shorts" | "embed" | "live", id, ..]) => Some(id.to_string()),
        _ => None,
    }?;

    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(id)
}

/// Reduce a watch page to its metadata. Missing tags stay `None`.
pub fn parse_video_page(html: &str, url: &Url) -> VideoMetadata {
    let document = Html::parse_document(html);

    let title = meta_content(&document, r#"meta[property="og:title"]"#)
        .or_else(|| meta_content(&document, r#"meta[name="title"]"#))
        .or_else(|| element_text(&document, "title"))
        .map(|t| t.trim_end_matches(" - YouTube").to_string());

    VideoMetadata {
        video_id: video_id(url),
        title,
        description: meta_content(&document, r#"meta[property="og:description"]"#)
            .or_else(|| meta_content(&document, r#"meta[name="description"]"#)),
        channel: meta_content(&document, r#"link[itemprop="name"]"#)
            .or_else(|| meta_content(&document, r#"meta[itemprop="author"]"#)),
    }
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .find_map(|el| el.value().attr("content"))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn element_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    let el = document.select(&selector).next()?;
    let text = el.text().collect::<String>();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
