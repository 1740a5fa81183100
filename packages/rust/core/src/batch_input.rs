//! Batch input: loading rows from JSON or CSV and validating them into requests.
//!
//! Rejected rows never become jobs; each yields one [`RowError`] reported at
//! batch level.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use paperpage_shared::{AuxFields, PaperpageError, Result, SourceDescriptor, SourceKind};

use crate::pipeline::GenerationRequest;

/// One input row as supplied by the caller. All fields optional until validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRow {
    #[serde(default, alias = "source_type", deserialize_with = "lenient_string")]
    pub source_type: Option<String>,
    #[serde(default, alias = "source_url", deserialize_with = "lenient_string")]
    pub source_url: Option<String>,
    #[serde(default, alias = "project_id", deserialize_with = "lenient_string")]
    pub project_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub authors: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub institution: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub venue: Option<String>,
    #[serde(default, alias = "research_year", deserialize_with = "lenient_string")]
    pub research_year: Option<String>,
    #[serde(default, alias = "pdf_file_name", deserialize_with = "lenient_string")]
    pub pdf_file_name: Option<String>,
}

/// Accept strings, numbers and booleans; anything else reads as absent.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// A row rejected during validation. `row` is 1-based over data rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub row: usize,
    pub project_id: Option<String>,
    pub message: String,
}

/// Validated requests plus the rows that were rejected.
#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    pub jobs: Vec<GenerationRequest>,
    pub errors: Vec<RowError>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load rows from a `.json` array or a `.csv` file with a header row.
pub fn load_rows(path: &Path) -> Result<Vec<BatchRow>> {
    let content = std::fs::read_to_string(path).map_err(|e| PaperpageError::io(path, e))?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let rows = match extension.as_deref() {
        Some("json") => serde_json::from_str::<Vec<BatchRow>>(&content).map_err(|e| {
            PaperpageError::validation(format!("invalid batch JSON in {}: {e}", path.display()))
        })?,
        Some("csv") => rows_from_csv(&content)?,
        _ => {
            return Err(PaperpageError::validation(format!(
                "unsupported batch file {}: expected .json or .csv",
                path.display()
            )));
        }
    };

    info!(path = %path.display(), rows = rows.len(), "batch rows loaded");
    Ok(rows)
}

/// Map CSV records onto rows using the header line.
pub fn rows_from_csv(content: &str) -> Result<Vec<BatchRow>> {
    let mut records = parse_csv(content).into_iter();
    let Some(header) = records.next() else {
        return Ok(Vec::new());
    };
    let columns: Vec<String> = header.iter().map(|h| header_key(h)).collect();

    let rows = records
        .filter(|record| record.iter().any(|field| !field.trim().is_empty()))
        .map(|record| {
            let fields: HashMap<&str, String> = columns
                .iter()
                .map(String::as_str)
                .zip(record)
                .filter(|(_, v)| !v.trim().is_empty())
                .collect();
            let get = |key: &str| fields.get(key).cloned();
            BatchRow {
                source_type: get("sourcetype"),
                source_url: get("sourceurl"),
                project_id: get("projectid"),
                authors: get("authors"),
                institution: get("institution"),
                venue: get("venue"),
                research_year: get("researchyear"),
                pdf_file_name: get("pdffilename"),
            }
        })
        .collect();
    Ok(rows)
}

/// `Source Type`, `source_type` and `sourceType` all become `sourcetype`.
fn header_key(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split CSV text into records. Quoted fields may contain separators,
/// line breaks and `""` escapes.
pub fn parse_csv(content: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
            }
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

// ---------------------------------------------------------------------------
// File set
// ---------------------------------------------------------------------------

/// Files supplied alongside a batch, addressable by file name.
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    files: HashMap<String, PathBuf>,
}

impl FileSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index the regular files directly inside `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| PaperpageError::io(dir, e))?;
        let mut files = HashMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| PaperpageError::io(dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                files.insert(name.to_string(), path.clone());
            }
        }
        debug!(dir = %dir.display(), files = files.len(), "file set indexed");
        Ok(Self { files })
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let files = names
            .into_iter()
            .map(Into::into)
            .map(|name: String| {
                let path = PathBuf::from(&name);
                (name, path)
            })
            .collect();
        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Path of the file named `name`. Leading directories in `name` are ignored.
    pub fn resolve(&self, name: &str) -> Option<&Path> {
        let base = name.trim().rsplit(['/', '\\']).next().unwrap_or_default();
        self.files.get(base).map(PathBuf::as_path)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate every row. Valid rows become requests in input order; a
/// duplicate `projectId` rejects the later row.
pub fn validate_rows(rows: &[BatchRow], files: &FileSet) -> BatchPlan {
    let mut plan = BatchPlan::default();
    let mut seen = HashSet::new();

    for (index, row) in rows.iter().enumerate() {
        let row_number = index + 1;
        match validate_row(row, files, &mut seen) {
            Ok(request) => plan.jobs.push(request),
            Err(message) => plan.errors.push(RowError {
                row: row_number,
                project_id: non_blank(&row.project_id).map(str::to_string),
                message,
            }),
        }
    }

    info!(jobs = plan.jobs.len(), rejected = plan.errors.len(), "batch rows validated");
    plan
}

fn validate_row(
    row: &BatchRow,
    files: &FileSet,
    seen: &mut HashSet<String>,
) -> std::result::Result<GenerationRequest, String> {
    let id = non_blank(&row.project_id).ok_or("projectId is required")?;

    let kind_text = non_blank(&row.source_type).ok_or("sourceType is required")?;
    let kind: SourceKind = kind_text.parse().map_err(|e: PaperpageError| match e {
        PaperpageError::Validation { message } => message,
        other => other.to_string(),
    })?;

    if let Some(year) = non_blank(&row.research_year) {
        if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("researchYear '{year}' must be a 4-digit year"));
        }
    }

    let url = non_blank(&row.source_url);
    let locator = match kind {
        SourceKind::Pdf => match (url, non_blank(&row.pdf_file_name)) {
            (Some(url), _) => url.to_string(),
            (None, Some(name)) => {
                let path = files.resolve(name).ok_or_else(|| {
                    format!("pdfFileName '{name}' was not found in the supplied files")
                })?;
                path.file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(name)
                    .to_string()
            }
            (None, None) => return Err("pdf rows require sourceUrl or pdfFileName".into()),
        },
        SourceKind::Github | SourceKind::Youtube => match url {
            Some(url) if is_http_url(url) => url.to_string(),
            Some(url) => return Err(format!("sourceUrl '{url}' must be an http(s) URL")),
            None => return Err(format!("{kind} rows require sourceUrl")),
        },
    };

    if !seen.insert(id.to_string()) {
        return Err(format!("duplicate projectId '{id}'"));
    }

    let aux = AuxFields {
        authors: non_blank(&row.authors).map(str::to_string),
        institution: non_blank(&row.institution).map(str::to_string),
        venue: non_blank(&row.venue).map(str::to_string),
        year: non_blank(&row.research_year).map(str::to_string),
    };

    Ok(GenerationRequest::new(id, SourceDescriptor::new(kind, locator)).with_aux(aux))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn is_http_url(value: &str) -> bool {
    url::Url::parse(value)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, kind: &str, url: &str) -> BatchRow {
        BatchRow {
            project_id: Some(id.into()),
            source_type: Some(kind.into()),
            source_url: Some(url.into()),
            ..Default::default()
        }
    }

    #[test]
    fn invalid_source_type_rejects_only_that_row() {
        let rows = vec![
            row("a", "pdf", "https://x.test/a.pdf"),
            row("b", "vimeo", "https://vimeo.com/1"),
            row("c", "github", "https://github.com/acme/c"),
        ];
        let plan = validate_rows(&rows, &FileSet::empty());

        assert_eq!(plan.jobs.len(), 2);
        assert_eq!(plan.errors.len(), 1);
        assert_eq!(plan.errors[0].row, 2);
        assert_eq!(plan.errors[0].project_id.as_deref(), Some("b"));
        assert!(plan.errors[0].message.contains("unknown source type"));
        let ids: Vec<&str> = plan.jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn duplicate_and_missing_ids() {
        let rows = vec![
            row("a", "pdf", "https://x.test/a.pdf"),
            row("a", "pdf", "https://x.test/b.pdf"),
            row(" ", "pdf", "https://x.test/c.pdf"),
        ];
        let plan = validate_rows(&rows, &FileSet::empty());

        assert_eq!(plan.jobs.len(), 1);
        assert!(plan.errors[0].message.contains("duplicate projectId 'a'"));
        assert_eq!(plan.errors[1].message, "projectId is required");
        assert_eq!(plan.errors[1].project_id, None);
    }

    #[test]
    fn pdf_rows_resolve_file_names() {
        let files = FileSet::from_names(["paper.pdf"]);
        let mut with_file = row("a", "pdf", "");
        with_file.pdf_file_name = Some("uploads/paper.pdf".into());
        let mut missing_file = row("b", "pdf", "");
        missing_file.pdf_file_name = Some("other.pdf".into());
        let neither = row("c", "pdf", "");

        let plan = validate_rows(&[with_file, missing_file, neither], &files);

        assert_eq!(plan.jobs.len(), 1);
        assert_eq!(plan.jobs[0].source.locator, "paper.pdf");
        assert!(plan.errors[0].message.contains("'other.pdf' was not found"));
        assert!(plan.errors[1].message.contains("require sourceUrl or pdfFileName"));
    }

    #[test]
    fn url_and_year_rules() {
        let mut bad_year = row("y", "github", "https://github.com/acme/y");
        bad_year.research_year = Some("24".into());
        let mut good_year = row("z", "youtube", "https://youtu.be/abc");
        good_year.research_year = Some("2024".into());
        good_year.venue = Some(" CVPR ".into());
        let rows = vec![row("g", "github", "github.com/acme/g"), bad_year, good_year];

        let plan = validate_rows(&rows, &FileSet::empty());

        assert_eq!(plan.errors.len(), 2);
        assert!(plan.errors[0].message.contains("must be an http(s) URL"));
        assert!(plan.errors[1].message.contains("4-digit year"));
        assert_eq!(plan.jobs[0].aux.year.as_deref(), Some("2024"));
        assert_eq!(plan.jobs[0].aux.venue.as_deref(), Some("CVPR"));
    }

    #[test]
    fn csv_quoting_and_headers() {
        let csv = "\u{feff}Project ID,source_type,sourceUrl,authors\r\n\
                   p1,pdf,https://x.test/a.pdf,\"Doe, Jane; Smith, John\"\r\n\
                   p2,github,https://github.com/a/b,\"Say \"\"hi\"\"\nsecond line\"\r\n\
                   ,,,\r\n";
        let rows = rows_from_csv(csv).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].project_id.as_deref(), Some("p1"));
        assert_eq!(rows[0].authors.as_deref(), Some("Doe, Jane; Smith, John"));
        assert_eq!(rows[1].source_type.as_deref(), Some("github"));
        assert_eq!(rows[1].authors.as_deref(), Some("Say \"hi\"\nsecond line"));
    }

    #[test]
    fn json_rows_accept_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        std::fs::write(
            &path,
            r#"[{"projectId": 7, "sourceType": "pdf", "sourceUrl": "https://x.test/a.pdf", "researchYear": 2023, "venue": null}]"#,
        )
        .unwrap();

        let rows = load_rows(&path).unwrap();
        assert_eq!(rows[0].project_id.as_deref(), Some("7"));
        assert_eq!(rows[0].research_year.as_deref(), Some("2023"));
        assert_eq!(rows[0].venue, None);

        let other = dir.path().join("rows.txt");
        std::fs::write(&other, "x").unwrap();
        assert!(load_rows(&other).is_err());
    }

    #[test]
    fn file_set_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"%PDF-").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let files = FileSet::from_dir(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files.resolve("a.pdf").is_some());
        assert!(files.resolve("nested").is_none());
    }
}
