//! End-to-end generation for one request:
//! resolve → extract → detect authors → prompt → generate → repair → roster → persist.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use paperpage_authors::{
    AuthorNameDetector, RosterSources, build_roster, parse_manual_authors,
};
use paperpage_shared::{
    AuthorCandidate, AuxFields, ContentStore, PaperpageError, Result, SourceDescriptor,
    SourceKind,
};
use paperpage_sources::{ResolvedSource, SourceFetcher, TextExtractor, parse_video_page};

use crate::batch::JobRunner;
use crate::generator::ContentGenerator;
use crate::prompt::{DEFAULT_MAX_PROMPT_CHARS, PromptInput, build_prompt, prompt_hash};
use crate::record::{GeneratedFields, RecordContext, assemble_record, fallback_fields};
use crate::repair::parse_generated;

/// One generation request: a record id, its source, and caller-supplied fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub id: String,
    pub source: SourceDescriptor,
    #[serde(default)]
    pub aux: AuxFields,
}

impl GenerationRequest {
    pub fn new(id: impl Into<String>, source: SourceDescriptor) -> Self {
        Self {
            id: id.into(),
            source,
            aux: AuxFields::default(),
        }
    }

    pub fn with_aux(mut self, aux: AuxFields) -> Self {
        self.aux = aux;
        self
    }
}

/// Result of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub id: String,
    pub title: String,
    pub authors: Vec<AuthorCandidate>,
    /// The generator reply was unparseable and a fallback record was stored.
    pub recovered_from_malformed: bool,
    pub cache_hit: bool,
    pub elapsed: std::time::Duration,
}

/// Runs single requests against injected collaborators.
///
/// Holds no process-wide state; every collaborator is passed in so tests can
/// substitute fakes.
pub struct GenerationPipeline {
    fetcher: Arc<dyn SourceFetcher>,
    extractor: Arc<dyn TextExtractor>,
    detector: AuthorNameDetector,
    generator: Arc<dyn ContentGenerator>,
    store: Arc<dyn ContentStore>,
    max_prompt_chars: usize,
}

impl GenerationPipeline {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        extractor: Arc<dyn TextExtractor>,
        generator: Arc<dyn ContentGenerator>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            detector: AuthorNameDetector::default(),
            generator,
            store,
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
        }
    }

    pub fn with_detector(mut self, detector: AuthorNameDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_max_prompt_chars(mut self, max_chars: usize) -> Self {
        self.max_prompt_chars = max_chars;
        self
    }

    /// Generate and persist the record for `request`.
    ///
    /// Re-running the same id overwrites the stored record. Malformed
    /// generator output never fails the run.
    #[instrument(skip_all, fields(job_id = %request.id, kind = %request.source.kind, locator = %request.source.locator))]
    pub async fn run(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        let start = Instant::now();

        let resolved = self.fetcher.resolve(&request.source).await?;
        debug!(bytes = resolved.bytes.len(), from = ?resolved.resolved_from, "source resolved");

        let (source_text, detected) = self.source_text(&request.source, &resolved).await?;
        let manual = request
            .aux
            .authors
            .as_deref()
            .map(parse_manual_authors)
            .unwrap_or_default();

        let known = build_roster(RosterSources {
            detected: &detected,
            manual: &manual,
            generated: &[],
        });
        let known_authors = if known.seeded_by.is_some() {
            known.authors
        } else {
            Vec::new()
        };
        debug!(detected = detected.len(), manual = manual.len(), "author origins gathered");

        let prompt = build_prompt(
            PromptInput {
                source: &request.source,
                source_text: &source_text,
                known_authors: &known_authors,
                aux: &request.aux,
            },
            self.max_prompt_chars,
        );
        let model_id = self.generator.model_id().to_string();
        let hash = prompt_hash(&prompt, &model_id);

        let (raw, cache_hit) = match self.cached_reply(&hash, &model_id).await {
            Some(text) => (text, true),
            None => (self.generator.generate(&prompt).await?, false),
        };

        let (fields, recovered) = match parse_generated(&raw) {
            Ok(map) => {
                if !cache_hit {
                    self.remember_reply(&hash, &model_id, &raw).await;
                }
                (GeneratedFields::from_map(&map), false)
            }
            Err(malformed) => {
                warn!(reason = %malformed.reason, reply_chars = raw.len(), "generator reply malformed, using fallback record");
                (fallback_fields(&raw, &request.source), true)
            }
        };

        let roster = build_roster(RosterSources {
            detected: &detected,
            manual: &manual,
            generated: &fields.authors,
        });

        let record = assemble_record(
            RecordContext {
                id: &request.id,
                source: &request.source,
                source_sha256: Some(resolved.sha256.clone()),
                aux: &request.aux,
                recovered_from_malformed: recovered,
            },
            fields,
            roster.authors,
        );

        self.store
            .persist(&request.id, &record)
            .await
            .map_err(|e| match e {
                PaperpageError::PersistFailed(_) => e,
                other => PaperpageError::PersistFailed(other.to_string()),
            })?;

        let elapsed = start.elapsed();
        info!(
            title = %record.title,
            authors = record.authors.len(),
            recovered,
            cache_hit,
            elapsed_ms = elapsed.as_millis() as u64,
            "project generated"
        );

        Ok(GenerationOutcome {
            id: record.id,
            title: record.title,
            authors: record.authors,
            recovered_from_malformed: recovered,
            cache_hit,
            elapsed,
        })
    }

    /// Source text for the prompt, plus names detected in it (pdf only).
    async fn source_text(
        &self,
        source: &SourceDescriptor,
        resolved: &ResolvedSource,
    ) -> Result<(String, Vec<String>)> {
        match source.kind {
            SourceKind::Pdf => {
                let text = self.extractor.extract(&resolved.bytes).await?;
                if text.trim().is_empty() {
                    return Err(PaperpageError::ExtractionFailed(
                        "no text could be extracted from the PDF".into(),
                    ));
                }
                let detected = self.detector.detect(&text);
                info!(chars = text.chars().count(), authors = detected.len(), "document text extracted");
                Ok((text, detected))
            }
            SourceKind::Github => Ok((
                String::from_utf8_lossy(&resolved.bytes).into_owned(),
                Vec::new(),
            )),
            SourceKind::Youtube => {
                let url = Url::parse(&source.locator).map_err(|e| {
                    PaperpageError::validation(format!("invalid video URL {}: {e}", source.locator))
                })?;
                let html = String::from_utf8_lossy(&resolved.bytes);
                let metadata = parse_video_page(&html, &url);
                debug!(video_id = ?metadata.video_id, "video page parsed");
                Ok((metadata.to_context(), Vec::new()))
            }
        }
    }

    async fn cached_reply(&self, hash: &str, model_id: &str) -> Option<String> {
        match self.store.cached_generation(hash, model_id).await {
            Ok(Some(text)) => {
                debug!(prompt_hash = %hash, "generation cache hit");
                Some(text)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "generation cache lookup failed, calling generator");
                None
            }
        }
    }

    async fn remember_reply(&self, hash: &str, model_id: &str, text: &str) {
        if let Err(e) = self.store.cache_generation(hash, model_id, text).await {
            warn!(error = %e, "failed to cache generator reply");
        }
    }
}

#[async_trait]
impl JobRunner for GenerationPipeline {
    async fn run_job(&self, request: &GenerationRequest) -> Result<String> {
        self.run(request).await.map(|outcome| outcome.title)
    }
}
