//! Turning generator output into a [`ProjectRecord`].
//!
//! Field extraction is lenient: the generator may use camelCase or snake_case
//! keys, numbers where strings are expected, and strings where objects are
//! expected. Anything unusable is dropped rather than rejected.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde_json::{Map, Value};
use url::Url;

use paperpage_authors::parse_manual_authors;
use paperpage_shared::{
    AuthorCandidate, AuxFields, CURRENT_SCHEMA_VERSION, CarouselItem, DetailedDescription,
    ProjectLink, ProjectRecord, SourceDescriptor,
};

/// Characters of raw reply kept as the abstract of a fallback record.
const FALLBACK_ABSTRACT_CHARS: usize = 1_500;

/// Characters kept when a title is taken from the first reply line.
const FALLBACK_TITLE_CHARS: usize = 200;

/// Metadata fields read from one generator reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct GeneratedFields {
    pub title: String,
    pub authors: Vec<AuthorCandidate>,
    pub institution: String,
    pub venue: String,
    pub year: String,
    pub abstract_text: String,
    pub highlights: Vec<String>,
    pub detailed_description: DetailedDescription,
    pub links: Vec<ProjectLink>,
    pub carousel: Vec<CarouselItem>,
    pub bibtex: String,
}

impl GeneratedFields {
    pub(crate) fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            title: text_field(map, &["title"]),
            authors: lookup(map, &["authors", "author"])
                .map(author_list)
                .unwrap_or_default(),
            institution: text_field(map, &["institution", "affiliation"]),
            venue: text_field(map, &["venue", "conference"]),
            year: text_field(map, &["year", "researchYear", "research_year"]),
            abstract_text: text_field(map, &["abstract", "summary"]),
            highlights: lookup(map, &["highlights", "keyPoints", "key_points"])
                .map(string_list)
                .unwrap_or_default(),
            detailed_description: lookup(map, &["detailedDescription", "detailed_description"])
                .map(detailed_description)
                .unwrap_or_default(),
            links: lookup(map, &["links"]).map(link_list).unwrap_or_default(),
            carousel: lookup(map, &["carousel", "images"])
                .map(carousel_list)
                .unwrap_or_default(),
            bibtex: text_field(map, &["bibtex", "bibTex", "citation"]),
        }
    }
}

/// Minimal fields salvaged from a reply that could not be parsed.
///
/// Quoted `title`/`abstract` values are pulled out by pattern when present;
/// otherwise the first prose line becomes the title and the reply text the
/// abstract.
pub(crate) fn fallback_fields(raw: &str, source: &SourceDescriptor) -> GeneratedFields {
    static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#""title"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid regex")
    });
    static ABSTRACT_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#""abstract"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid regex")
    });

    let salvaged_title = TITLE_RE.captures(raw).map(|c| unescape(&c[1]));
    let salvaged_abstract = ABSTRACT_RE.captures(raw).map(|c| unescape(&c[1]));
    let looks_structured = raw.contains('{');

    let title = salvaged_title
        .filter(|t| !t.is_empty())
        .or_else(|| {
            if looks_structured {
                return None;
            }
            raw.lines()
                .map(|l| l.trim().trim_start_matches('#').trim())
                .find(|l| !l.is_empty() && !l.starts_with("```"))
                .map(|l| l.chars().take(FALLBACK_TITLE_CHARS).collect())
        })
        .unwrap_or_else(|| title_from_locator(&source.locator));

    let abstract_text = salvaged_abstract
        .filter(|a| !a.is_empty())
        .or_else(|| {
            if looks_structured {
                return None;
            }
            let prose = raw.replace("```", "");
            let prose = prose.trim();
            (!prose.is_empty()).then(|| prose.chars().take(FALLBACK_ABSTRACT_CHARS).collect())
        })
        .unwrap_or_default();

    GeneratedFields {
        title,
        abstract_text,
        ..Default::default()
    }
}

/// Inputs to [`assemble_record`] besides the generated fields.
#[derive(Debug, Clone)]
pub(crate) struct RecordContext<'a> {
    pub id: &'a str,
    pub source: &'a SourceDescriptor,
    pub source_sha256: Option<String>,
    pub aux: &'a AuxFields,
    pub recovered_from_malformed: bool,
}

/// Build the persisted record. Non-blank aux fields override generated ones.
pub(crate) fn assemble_record(
    ctx: RecordContext<'_>,
    fields: GeneratedFields,
    authors: Vec<AuthorCandidate>,
) -> ProjectRecord {
    let title = if fields.title.trim().is_empty() {
        title_from_locator(&ctx.source.locator)
    } else {
        fields.title.trim().to_string()
    };

    ProjectRecord {
        schema_version: CURRENT_SCHEMA_VERSION,
        id: ctx.id.to_string(),
        title,
        authors,
        institution: prefer_aux(ctx.aux.institution.as_deref(), fields.institution),
        venue: prefer_aux(ctx.aux.venue.as_deref(), fields.venue),
        year: prefer_aux(ctx.aux.year.as_deref(), fields.year),
        abstract_text: fields.abstract_text,
        highlights: fields.highlights,
        detailed_description: fields.detailed_description,
        links: fields.links,
        carousel: fields.carousel,
        bibtex: fields.bibtex,
        source: ctx.source.clone(),
        source_sha256: ctx.source_sha256,
        generated_at: Utc::now(),
        recovered_from_malformed: ctx.recovered_from_malformed,
    }
}

fn prefer_aux(aux: Option<&str>, generated: String) -> String {
    match aux.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => generated,
    }
}

/// A readable title from the last path segment of a locator.
pub(crate) fn title_from_locator(locator: &str) -> String {
    let segment = match Url::parse(locator) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string))
            .or_else(|| url.host_str().map(str::to_string)),
        Err(_) => locator.rsplit(['/', '\\']).find(|s| !s.is_empty()).map(str::to_string),
    };

    let segment = segment.unwrap_or_default();
    let stem = match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() <= 4 => stem,
        _ => segment.as_str(),
    };
    let title = stem.replace(['-', '_'], " ");
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");

    if title.is_empty() {
        "Untitled Project".to_string()
    } else {
        title
    }
}

// ---------------------------------------------------------------------------
// Lenient value readers
// ---------------------------------------------------------------------------

fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

fn text_field(map: &Map<String, Value>, keys: &[&str]) -> String {
    lookup(map, keys).and_then(as_text).unwrap_or_default()
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn object_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    lookup(obj, keys).and_then(as_text).filter(|s| !s.is_empty())
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(as_text)
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => s
            .lines()
            .map(|l| l.trim().trim_start_matches(['-', '*', '•']).trim().to_string())
            .filter(|l| !l.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn author_list(value: &Value) -> Vec<AuthorCandidate> {
    match value {
        Value::String(s) => parse_manual_authors(s),
        Value::Array(items) => items
            .iter()
            .flat_map(|item| match item {
                Value::String(s) => parse_manual_authors(s),
                Value::Object(obj) => author_object(obj).into_iter().collect(),
                _ => Vec::new(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn author_object(obj: &Map<String, Value>) -> Option<AuthorCandidate> {
    let name = object_text(obj, &["name", "fullName", "full_name"])?;
    let equal_contribution = lookup(obj, &["equalContribution", "equal_contribution"])
        .and_then(Value::as_bool);

    Some(AuthorCandidate {
        name,
        url: object_text(obj, &["url", "homepage"]),
        affiliation: object_text(obj, &["affiliation", "institution"]),
        equal_contribution,
    })
}

fn detailed_description(value: &Value) -> DetailedDescription {
    match value {
        Value::Object(obj) => DetailedDescription {
            problem: object_text(obj, &["problem", "motivation"]).unwrap_or_default(),
            method: object_text(obj, &["method", "approach"]).unwrap_or_default(),
            results: object_text(obj, &["results", "result"]).unwrap_or_default(),
        },
        Value::String(s) => DetailedDescription {
            method: s.trim().to_string(),
            ..Default::default()
        },
        _ => DetailedDescription::default(),
    }
}

fn link_list(value: &Value) -> Vec<ProjectLink> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(url) => Some(ProjectLink {
                    label: String::new(),
                    url: url.trim().to_string(),
                }),
                Value::Object(obj) => Some(ProjectLink {
                    label: object_text(obj, &["label", "name", "title"]).unwrap_or_default(),
                    url: object_text(obj, &["url", "href", "link"])?,
                }),
                _ => None,
            })
            .filter(|link| !link.url.is_empty())
            .collect(),
        Value::Object(obj) => obj
            .iter()
            .filter_map(|(label, url)| {
                Some(ProjectLink {
                    label: label.clone(),
                    url: as_text(url).filter(|u| !u.is_empty())?,
                })
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn carousel_list(value: &Value) -> Vec<CarouselItem> {
    let Value::Array(items) = value else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(CarouselItem {
                image_url: None,
                caption: Some(s.trim().to_string()),
            }),
            Value::Object(obj) => {
                let slide = CarouselItem {
                    image_url: object_text(obj, &["image_url", "imageUrl", "image", "url"]),
                    caption: object_text(obj, &["caption", "description", "title"]),
                };
                (slide.image_url.is_some() || slide.caption.is_some()).then_some(slide)
            }
            _ => None,
        })
        .collect()
}

fn unescape(captured: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{captured}\""))
        .unwrap_or_else(|_| captured.to_string())
        .trim()
        .to_string()
}
