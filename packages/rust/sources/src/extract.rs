//! PDF bytes to bounded plain text.

use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use pdf_oxide::PdfDocument;
use regex::Regex;
use tracing::{info, instrument};

use paperpage_shared::{ExtractorLimits, PaperpageError, Result};

const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);

const PDF_MAGIC: &[u8] = b"%PDF-";

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Converts a binary document into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8]) -> Result<String>;
}

/// `pdf_oxide`-backed extractor. Holds no global state; construct one per pipeline.
#[derive(Debug, Clone)]
pub struct PdfTextExtractor {
    limits: ExtractorLimits,
    timeout: Duration,
}

impl PdfTextExtractor {
    pub fn new(limits: ExtractorLimits) -> Self {
        Self {
            limits,
            timeout: EXTRACTION_TIMEOUT,
        }
    }

    fn extract_pages(path: &Path, max_pages: usize) -> Result<Vec<String>> {
        let mut doc = PdfDocument::open(path)
            .map_err(|e| PaperpageError::ExtractionFailed(format!("failed to parse PDF: {e}")))?;

        let page_count = doc.page_count().map_err(|e| {
            PaperpageError::ExtractionFailed(format!("failed to read page count: {e}"))
        })?;

        let mut pages = Vec::with_capacity(page_count.min(max_pages));
        for page_index in 0..page_count.min(max_pages) {
            pages.push(doc.extract_text(page_index).unwrap_or_default());
        }
        Ok(pages)
    }
}

impl Default for PdfTextExtractor {
    fn default() -> Self {
        Self::new(ExtractorLimits::default())
    }
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    #[instrument(skip_all, fields(bytes = bytes.len()))]
    async fn extract(&self, bytes: &[u8]) -> Result<String> {
        if bytes.is_empty() {
            return Err(PaperpageError::ExtractionFailed(
                "the document is empty; upload the PDF again".into(),
            ));
        }
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(PaperpageError::ExtractionFailed(
                "the source is not a PDF file; check the URL points at the PDF itself".into(),
            ));
        }

        let mut temp_file = tempfile::NamedTempFile::new().map_err(|e| {
            PaperpageError::ExtractionFailed(format!("failed to create temp file: {e}"))
        })?;
        temp_file.write_all(bytes).map_err(|e| {
            PaperpageError::ExtractionFailed(format!("failed to write temp file: {e}"))
        })?;

        let temp_path = temp_file.path().to_path_buf();
        let max_pages = self.limits.max_pages;

        let pages = tokio::time::timeout(
            self.timeout,
            tokio::task::spawn_blocking(move || Self::extract_pages(&temp_path, max_pages)),
        )
        .await
        .map_err(|_| PaperpageError::ExtractionFailed("PDF extraction timed out".into()))?
        .map_err(|e| PaperpageError::ExtractionFailed(format!("task join error: {e}")))??;

        let text = assemble_text(&pages, self.limits);
        info!(pages = pages.len(), chars = text.chars().count(), "PDF text extraction complete");

        if text.trim().is_empty() {
            return Err(PaperpageError::ExtractionFailed(
                "no text could be extracted; the PDF may be scanned images, try a text-based PDF"
                    .into(),
            ));
        }
        Ok(text)
    }
}

/// Join normalised pages with line breaks, honouring the page and character caps.
pub fn assemble_text(pages: &[String], limits: ExtractorLimits) -> String {
    let mut out = String::new();
    let mut remaining = limits.max_chars;

    for page in pages.iter().take(limits.max_pages) {
        let page = normalize_page(page);
        if page.is_empty() {
            continue;
        }
        if !out.is_empty() {
            if remaining == 0 {
                break;
            }
            out.push('\n');
            remaining -= 1;
        }

        let taken: String = page.chars().take(remaining).collect();
        remaining -= taken.chars().count();
        out.push_str(&taken);
        if remaining == 0 {
            break;
        }
    }
    out
}

/// Trim trailing whitespace per line and collapse runs of blank lines.
pub fn normalize_page(page: &str) -> String {
    let trimmed: Vec<&str> = page.lines().map(str::trim_end).collect();
    let joined = trimmed.join("\n");
    BLANK_RUNS.replace_all(joined.trim(), "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_pages: usize, max_chars: usize) -> ExtractorLimits {
        ExtractorLimits {
            max_pages,
            max_chars,
        }
    }

    #[test]
    fn pages_are_joined_with_line_breaks() {
        let pages = vec!["Title\nJane Doe".to_string(), "Abstract".to_string()];
        assert_eq!(
            assemble_text(&pages, limits(80, 100_000)),
            "Title\nJane Doe\nAbstract"
        );
    }

    #[test]
    fn page_cap_applies() {
        let pages: Vec<String> = (1..=5).map(|i| format!("page {i}")).collect();
        assert_eq!(assemble_text(&pages, limits(2, 100_000)), "page 1\npage 2");
    }

    #[test]
    fn char_cap_applies_across_pages() {
        let pages = vec!["abcdef".to_string(), "ghijkl".to_string()];
        let text = assemble_text(&pages, limits(80, 9));
        assert_eq!(text, "abcdef\ngh");
        assert_eq!(text.chars().count(), 9);
    }

    #[test]
    fn char_cap_counts_characters_not_bytes() {
        let pages = vec!["저자홍길동".to_string()];
        assert_eq!(assemble_text(&pages, limits(80, 3)), "저자홍");
    }

    #[test]
    fn empty_pages_are_skipped() {
        let pages = vec!["  \n ".to_string(), "text".to_string()];
        assert_eq!(assemble_text(&pages, limits(80, 100)), "text");
    }

    #[test]
    fn normalize_collapses_blank_runs() {
        assert_eq!(normalize_page("a   \n\n\n\nb  \n"), "a\n\nb");
    }

    #[tokio::test]
    async fn empty_input_fails() {
        let err = PdfTextExtractor::default().extract(b"").await.unwrap_err();
        assert!(matches!(err, PaperpageError::ExtractionFailed(_)));
    }

    #[tokio::test]
    async fn non_pdf_input_fails() {
        let err = PdfTextExtractor::default()
            .extract(b"<html>not a pdf</html>")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a PDF"));
    }
}
