//! Core domain types shared by every paperpage crate.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PaperpageError;

/// Current schema version for persisted project records.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// BatchId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one batch run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub Uuid);

impl BatchId {
    /// Generate a new time-sortable batch identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// The kind of material a generation request starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pdf,
    Github,
    Youtube,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Github => "github",
            Self::Youtube => "youtube",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = PaperpageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "github" => Ok(Self::Github),
            "youtube" => Ok(Self::Youtube),
            other => Err(PaperpageError::validation(format!(
                "unknown source type '{other}': expected pdf, github or youtube"
            ))),
        }
    }
}

/// Where to find the source material for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    /// URL, or a file name relative to the uploads root.
    pub locator: String,
}

impl SourceDescriptor {
    pub fn new(kind: SourceKind, locator: impl Into<String>) -> Self {
        Self {
            kind,
            locator: locator.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Authors
// ---------------------------------------------------------------------------

/// Provenance of an author candidate. Only drives merge precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Extracted,
    Manual,
    Generated,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extracted => "extracted",
            Self::Manual => "manual",
            Self::Generated => "generated",
        }
    }
}

/// One proposed author entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorCandidate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equal_contribution: Option<bool>,
}

impl AuthorCandidate {
    /// A candidate carrying only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder-style affiliation setter.
    pub fn with_affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.affiliation = Some(affiliation.into());
        self
    }

    /// Identity key: trimmed, lowercased, whitespace-collapsed name.
    pub fn identity_key(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Normalize a name for identity comparison.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Caller-supplied fields that travel alongside a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxFields {
    /// Raw manual author input (`Name @ Affiliation; ...`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
}

// ---------------------------------------------------------------------------
// ProjectRecord
// ---------------------------------------------------------------------------

/// Problem / method / results breakdown of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedDescription {
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub results: String,
}

/// A labelled outbound link (paper, code, demo...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectLink {
    #[serde(default)]
    pub label: String,
    pub url: String,
}

/// One carousel slide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarouselItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// The structured project document handed to the content store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub schema_version: u32,
    pub id: String,
    pub title: String,
    pub authors: Vec<AuthorCandidate>,
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub year: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub detailed_description: DetailedDescription,
    #[serde(default)]
    pub links: Vec<ProjectLink>,
    #[serde(default)]
    pub carousel: Vec<CarouselItem>,
    #[serde(default)]
    pub bibtex: String,
    pub source: SourceDescriptor,
    /// SHA-256 of the resolved source bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_sha256: Option<String>,
    pub generated_at: DateTime<Utc>,
    /// True when the generator output could not be parsed and the record was synthesized.
    #[serde(default)]
    pub recovered_from_malformed: bool,
}
