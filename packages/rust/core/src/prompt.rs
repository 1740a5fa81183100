//! Generator prompt construction.

use sha2::{Digest, Sha256};

use paperpage_shared::{AuthorCandidate, AuxFields, SourceDescriptor, SourceKind};

/// Characters of source text embedded in a prompt.
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 60_000;

pub const SYSTEM_PROMPT: &str = "You write structured metadata for academic project pages. \
Reply with a single JSON object and nothing else.";

/// Shape of the reply the generator is asked for.
pub const EXPECTED_SCHEMA: &str = r#"{
  "title": "string",
  "authors": [{ "name": "string", "affiliation": "string", "url": "string" }],
  "institution": "string",
  "venue": "string",
  "year": "string",
  "abstract": "string",
  "highlights": ["string"],
  "detailedDescription": { "problem": "string", "method": "string", "results": "string" },
  "links": [{ "label": "string", "url": "string" }],
  "carousel": [{ "image_url": "string", "caption": "string" }],
  "bibtex": "string"
}"#;

const NO_FABRICATION: &str = "Use SOURCE TEXT as the only source of fact. Do not invent authors, \
affiliations, venues, years, numbers or links. Leave a field empty (\"\" or []) when the source \
does not state it.";

/// Everything a prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub source: &'a SourceDescriptor,
    /// Extracted document text, README, or video metadata.
    pub source_text: &'a str,
    pub known_authors: &'a [AuthorCandidate],
    pub aux: &'a AuxFields,
}

pub fn build_prompt(input: PromptInput<'_>, max_chars: usize) -> String {
    let mut prompt = String::new();

    prompt.push_str(match input.source.kind {
        SourceKind::Pdf => "Describe the research paper below as a project page.\n",
        SourceKind::Github => "Describe the software project whose README is below as a project page.\n",
        SourceKind::Youtube => "Describe the project presented in the video below as a project page.\n",
    });
    prompt.push_str(NO_FABRICATION);
    prompt.push_str("\n\nReturn JSON matching this schema:\n");
    prompt.push_str(EXPECTED_SCHEMA);
    prompt.push_str("\n\n");

    if !input.known_authors.is_empty() {
        prompt.push_str("KNOWN AUTHORS (keep this order and spelling; do not add others):\n");
        for author in input.known_authors {
            match &author.affiliation {
                Some(aff) => prompt.push_str(&format!("- {} ({aff})\n", author.name)),
                None => prompt.push_str(&format!("- {}\n", author.name)),
            }
        }
        prompt.push('\n');
    }

    let provided: Vec<(&str, &str)> = [
        ("institution", input.aux.institution.as_deref()),
        ("venue", input.aux.venue.as_deref()),
        ("year", input.aux.year.as_deref()),
    ]
    .into_iter()
    .filter_map(|(k, v)| v.map(str::trim).filter(|v| !v.is_empty()).map(|v| (k, v)))
    .collect();

    if !provided.is_empty() {
        prompt.push_str("PROVIDED FIELDS (use verbatim):\n");
        for (key, value) in provided {
            prompt.push_str(&format!("- {key}: {value}\n"));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("SOURCE ({}): {}\n", input.source.kind, input.source.locator));
    prompt.push_str("SOURCE TEXT:\n");
    prompt.push_str(&truncate_chars(input.source_text, max_chars));
    prompt
}

/// Truncate to at most `max_chars` characters, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}\n\n[... source text truncated ...]", &text[..cut]),
    }
}

/// Cache key for a generator reply: SHA-256 over prompt and model.
pub fn prompt_hash(prompt: &str, model_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update([0u8]);
    hasher.update(model_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceDescriptor {
        SourceDescriptor::new(SourceKind::Pdf, "paper.pdf")
    }

    #[test]
    fn prompt_embeds_text_and_instructions() {
        let authors = vec![AuthorCandidate::named("Jane Doe").with_affiliation("MIT")];
        let aux = AuxFields {
            venue: Some("CVPR".into()),
            year: Some("  ".into()),
            ..Default::default()
        };
        let src = source();
        let prompt = build_prompt(
            PromptInput {
                source: &src,
                source_text: "We present a method.",
                known_authors: &authors,
                aux: &aux,
            },
            DEFAULT_MAX_PROMPT_CHARS,
        );

        assert!(prompt.contains("only source of fact"));
        assert!(prompt.contains("Do not invent authors"));
        assert!(prompt.contains("\"detailedDescription\""));
        assert!(prompt.contains("- Jane Doe (MIT)"));
        assert!(prompt.contains("- venue: CVPR"));
        assert!(!prompt.contains("- year:"));
        assert!(prompt.ends_with("SOURCE TEXT:\nWe present a method."));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        let cut = truncate_chars("가나다라", 2);
        assert!(cut.starts_with("가나\n\n[..."));
    }

    #[test]
    fn prompt_hash_depends_on_model() {
        let a = prompt_hash("p", "m1");
        assert_eq!(a, prompt_hash("p", "m1"));
        assert_ne!(a, prompt_hash("p", "m2"));
        assert_eq!(a.len(), 64);
    }
}
