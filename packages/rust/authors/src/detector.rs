//! Heuristic author-name detection over a document's header region.
//!
//! There is no ground truth for "who is an author": every line of the header
//! is cleaned, tokenized and scored, and the best-scoring line (or wrapped
//! pair of lines) wins. The whole detector is a pure function of its input
//! text and a [`DetectorConfig`], so thresholds can be tuned in tests.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use paperpage_shared::normalize_name;

use crate::vocabulary::{contains_noise, has_korean_name_shape};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Every threshold and weight used by the detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Characters of input considered at all.
    pub max_chars: usize,
    /// Non-empty lines kept before the boundary scan.
    pub max_lines: usize,
    /// Lines actually scored.
    pub scan_lines: usize,
    /// Cleaned lines longer than this are discarded.
    pub max_line_chars: usize,
    /// Upper bound on returned names.
    pub max_names: usize,
    pub min_name_chars: usize,
    pub max_name_chars: usize,

    pub name_weight: i32,
    pub prefix_bonus: i32,
    pub early_bonus: i32,
    /// Lines with an index below this get `early_bonus`.
    pub early_lines: usize,
    pub short_bonus: i32,
    /// Lines at most this long get `short_bonus`.
    pub short_line_chars: usize,
    pub noise_penalty: i32,
    pub email_penalty: i32,

    /// A best candidate with at least this many names is returned alone.
    pub confident_names: usize,
    /// Other candidates within this many points of the best are accumulated.
    pub accumulate_window: i32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_chars: 12_000,
            max_lines: 70,
            scan_lines: 45,
            max_line_chars: 240,
            max_names: 12,
            min_name_chars: 2,
            max_name_chars: 60,
            name_weight: 3,
            prefix_bonus: 7,
            early_bonus: 2,
            early_lines: 9,
            short_bonus: 1,
            short_line_chars: 110,
            noise_penalty: 3,
            email_penalty: 1,
            confident_names: 2,
            accumulate_window: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static BOUNDARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:\d+|[ivx]+)\.?\s+)?(?:abstract|introduction|keywords|key\s+words|index\s+terms|초록|요약|서론|키워드|주제어)\b",
    )
    .expect("valid regex")
});

static AUTHOR_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:authors?|by|저자)\b\s*[:：]?\s*").expect("valid regex")
});

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\w.+-]+@[\w-]+(?:\.[\w-]+)+").expect("valid regex")
});

/// `{alice, bob}@lab.org` style grouped addresses.
static GROUPED_EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]*\}\s*@\S+").expect("valid regex"));

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("valid regex"));

static ORCID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\borcid(?:\.org)?\b[:/\s]*)?(?:\d{4}-){3}\d{3}[\dX]\b|\borcid\b")
        .expect("valid regex")
});

static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[•·∙▪●◦‧]").expect("valid regex"));

/// Footnote digits and affiliation markers.
static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\d*†‡§¶⁎]+").expect("valid regex"));

static SPACES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").expect("valid regex"));

/// Wide gaps left by column-aligned PDF headers separate names too.
static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*(?:[,;，、&/]|\band\b|\s및\s|\s{3,})\s*").expect("valid regex")
});

const PARTICLES: &str = "van|von|der|den|de|da|di|del|della|la|le|du|dos|das|bin|ibn|al|ter|ten";

static CAPITALIZED_RUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    let word = r"(?:\p{Lu}\.(?:-?\p{Lu}\.)*|\p{Lu}[\p{L}'’-]*\p{Ll})";
    Regex::new(&format!(
        r"\b{word}(?:\s+(?:(?:{PARTICLES})\s+)*{word}){{1,4}}"
    ))
    .expect("valid regex")
});

static KOREAN_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[가-힣]{2,5}\b").expect("valid regex"));

static CAPITALIZED_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\p{Lu}[\p{L}'’-]*\p{Ll}$").expect("valid regex"));

static INITIAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\p{Lu}\.-?)+$|^\p{Lu}$").expect("valid regex"));

static PARTICLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^(?:{PARTICLES})$")).expect("valid regex"));

/// Two to four syllables: a surname plus a one- to three-syllable given name.
static KOREAN_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[가-힣](?:\s?[가-힣]){1,3}$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// One scored proposal: a line, or two adjacent lines merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredCandidate {
    /// Index of the (first) line within the header region.
    pub line_index: usize,
    pub names: Vec<String>,
    pub score: i32,
    /// True for a synthesized two-line candidate.
    pub merged: bool,
}

/// Every candidate produced for a header, in line order.
#[derive(Debug, Clone, Default)]
pub struct ExtractedAuthorSet {
    pub candidates: Vec<ScoredCandidate>,
}

/// Per-line facts feeding the score.
#[derive(Debug, Clone)]
struct LineAnalysis {
    index: usize,
    names: Vec<String>,
    /// Every token on the line was accepted as a name.
    clean: bool,
    prefixed: bool,
    noisy: bool,
    has_email: bool,
    chars: usize,
}

/// Proposes author names from unstructured header text.
#[derive(Debug, Clone, Default)]
pub struct AuthorNameDetector {
    config: DetectorConfig,
}

impl AuthorNameDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Best-effort ordered, deduplicated author names (at most `max_names`).
    /// Empty when nothing name-shaped is found.
    pub fn detect(&self, text: &str) -> Vec<String> {
        let set = self.candidates(text);
        let names = self.select(&set);
        debug!(
            candidates = set.candidates.len(),
            authors = names.len(),
            "author detection finished"
        );
        names
    }

    /// Score every line (and wrapped line pair) of the header region.
    pub fn candidates(&self, text: &str) -> ExtractedAuthorSet {
        let lines = self.header_lines(text);
        let mut analyses: Vec<LineAnalysis> = Vec::new();
        let mut pending_prefix = false;

        for (index, line) in lines.iter().take(self.config.scan_lines).enumerate() {
            let (prefixed, rest) = match AUTHOR_PREFIX_RE.find(line) {
                Some(m) => (true, &line[m.end()..]),
                None => (false, line.as_str()),
            };

            // A bare "Authors" heading applies to the following line.
            if prefixed && rest.trim().is_empty() {
                pending_prefix = true;
                continue;
            }
            let prefixed = prefixed || std::mem::take(&mut pending_prefix);

            if let Some(analysis) = self.analyze_line(index, rest, prefixed) {
                analyses.push(analysis);
            }
        }

        let mut candidates = Vec::new();
        for (i, line) in analyses.iter().enumerate() {
            candidates.push(ScoredCandidate {
                line_index: line.index,
                names: line.names.clone(),
                score: self.score(line),
                merged: false,
            });

            if let Some(next) = analyses.get(i + 1) {
                if next.index == line.index + 1 && next.clean {
                    candidates.push(self.merge(line, next));
                }
            }
        }

        ExtractedAuthorSet { candidates }
    }

    /// Pick names from scored candidates.
    pub fn select(&self, set: &ExtractedAuthorSet) -> Vec<String> {
        let Some(best) = set
            .candidates
            .iter()
            .reduce(|best, c| {
                // On a tie the single line beats the merged pair.
                let better = c.score > best.score
                    || (c.score == best.score && best.merged && !c.merged);
                if better { c } else { best }
            })
        else {
            return Vec::new();
        };

        let max = self.config.max_names;
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        extend_unique(&mut out, &mut seen, &best.names, max);
        if best.names.len() >= self.config.confident_names {
            return out;
        }

        let mut close: Vec<&ScoredCandidate> = set
            .candidates
            .iter()
            .filter(|c| !std::ptr::eq(*c, best))
            .filter(|c| c.score >= best.score - self.config.accumulate_window)
            .collect();
        close.sort_by(|a, b| b.score.cmp(&a.score));

        for candidate in close {
            if out.len() >= max {
                break;
            }
            extend_unique(&mut out, &mut seen, &candidate.names, max);
        }
        out
    }

    /// Leading trimmed, non-empty lines up to the first section boundary.
    fn header_lines(&self, text: &str) -> Vec<String> {
        let head: String = text.chars().take(self.config.max_chars).collect();
        head.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .take(self.config.max_lines)
            .take_while(|l| !BOUNDARY_RE.is_match(l))
            .map(String::from)
            .collect()
    }

    fn analyze_line(&self, index: usize, raw: &str, prefixed: bool) -> Option<LineAnalysis> {
        let has_email = EMAIL_RE.is_match(raw) || GROUPED_EMAIL_RE.is_match(raw);
        let cleaned = clean_line(raw);
        let chars = cleaned.chars().count();
        if cleaned.is_empty() || chars > self.config.max_line_chars {
            return None;
        }

        let tokens: Vec<&str> = SEPARATOR_RE
            .split(&cleaned)
            .map(trim_token)
            .filter(|t| !t.is_empty())
            .collect();

        let (names, clean) = if tokens.len() > 1 {
            let names: Vec<String> = tokens
                .iter()
                .filter(|t| self.is_name(t))
                .map(|t| t.to_string())
                .collect();
            let clean = names.len() == tokens.len();
            (names, clean)
        } else {
            self.fallback_names(&cleaned)
        };

        if names.is_empty() {
            return None;
        }

        Some(LineAnalysis {
            index,
            names,
            clean,
            prefixed,
            noisy: contains_noise(&cleaned),
            has_email,
            chars,
        })
    }

    /// Regex runs of capitalized words or Korean names. Clean when the runs cover the line.
    fn fallback_names(&self, line: &str) -> (Vec<String>, bool) {
        let mut names = Vec::new();
        let mut residue = line.to_string();

        for m in CAPITALIZED_RUN_RE.find_iter(line) {
            self.take_name(trim_token(m.as_str()), &mut names, &mut residue);
        }

        // Hangul titles share the name shape, so a line's Hangul words are all names or none.
        let hangul: Vec<&str> = KOREAN_RUN_RE
            .find_iter(line)
            .map(|m| trim_token(m.as_str()))
            .collect();
        if hangul.iter().all(|word| self.is_name(word)) {
            for word in hangul {
                self.take_name(word, &mut names, &mut residue);
            }
        }

        let clean = !residue.chars().any(char::is_alphabetic);
        (names, clean)
    }

    fn take_name(&self, candidate: &str, names: &mut Vec<String>, residue: &mut String) {
        if self.is_name(candidate) && !names.iter().any(|n| n == candidate) {
            names.push(candidate.to_string());
            *residue = residue.replacen(candidate, " ", 1);
        }
    }

    /// Token acceptance: length, no digits or contact details, not noise, name-shaped.
    pub fn is_name(&self, token: &str) -> bool {
        let len = token.chars().count();
        if len < self.config.min_name_chars || len > self.config.max_name_chars {
            return false;
        }
        if token.chars().any(|c| c.is_ascii_digit())
            || token.contains('@')
            || URL_RE.is_match(token)
            || contains_noise(token)
        {
            return false;
        }
        (KOREAN_NAME_RE.is_match(token) && has_korean_name_shape(token)) || is_english_name(token)
    }

    fn score(&self, line: &LineAnalysis) -> i32 {
        let c = &self.config;
        let mut score = c.name_weight * line.names.len() as i32;
        if line.prefixed {
            score += c.prefix_bonus;
        }
        if line.index < c.early_lines {
            score += c.early_bonus;
        }
        if line.chars <= c.short_line_chars {
            score += c.short_bonus;
        }
        if line.noisy && !line.prefixed {
            score -= c.noise_penalty;
        }
        if line.has_email {
            score -= c.email_penalty;
        }
        score
    }

    fn merge(&self, first: &LineAnalysis, second: &LineAnalysis) -> ScoredCandidate {
        let mut seen = HashSet::new();
        let names: Vec<String> = first
            .names
            .iter()
            .chain(&second.names)
            .filter(|n| seen.insert(normalize_name(n)))
            .cloned()
            .collect();

        let combined = LineAnalysis {
            index: first.index,
            names,
            clean: true,
            prefixed: first.prefixed || second.prefixed,
            noisy: first.noisy || second.noisy,
            has_email: first.has_email || second.has_email,
            chars: first.chars + 1 + second.chars,
        };

        ScoredCandidate {
            line_index: first.index,
            score: self.score(&combined),
            names: combined.names,
            merged: true,
        }
    }
}

fn extend_unique(out: &mut Vec<String>, seen: &mut HashSet<String>, names: &[String], max: usize) {
    for name in names {
        if out.len() >= max {
            return;
        }
        if seen.insert(normalize_name(name)) {
            out.push(name.clone());
        }
    }
}

/// Detect with the default thresholds.
pub fn detect_author_names(text: &str) -> Vec<String> {
    AuthorNameDetector::default().detect(text)
}

// ---------------------------------------------------------------------------
// Cleanup passes
// ---------------------------------------------------------------------------

fn clean_line(line: &str) -> String {
    let mut result = GROUPED_EMAIL_RE.replace_all(line, " ").into_owned();
    result = EMAIL_RE.replace_all(&result, " ").into_owned();
    result = URL_RE.replace_all(&result, " ").into_owned();
    result = ORCID_RE.replace_all(&result, " ").into_owned();
    result = BULLET_RE.replace_all(&result, ",").into_owned();
    result = MARKER_RE.replace_all(&result, "").into_owned();
    result = collapse_spaces(&result);
    result
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':'))
        .to_string()
}

/// Collapse ordinary spacing but keep wide gaps as a single separator marker.
fn collapse_spaces(line: &str) -> String {
    SPACES_RE
        .replace_all(line, |caps: &regex::Captures| {
            if caps[0].chars().count() >= 3 { "   " } else { " " }
        })
        .into_owned()
}

fn trim_token(token: &str) -> &str {
    let token = token.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, ',' | ';' | ':' | '(' | ')' | '[' | ']' | '"' | '-')
    });
    // A sentence-final period, but not the dot of a trailing initial.
    match token.strip_suffix('.') {
        Some(rest) if rest.chars().last().is_some_and(char::is_lowercase) => rest,
        _ => token,
    }
}

fn is_english_name(token: &str) -> bool {
    let words: Vec<&str> = token.split_whitespace().collect();
    if !(2..=5).contains(&words.len()) {
        return false;
    }

    let mut capitalized = 0;
    for word in &words {
        if CAPITALIZED_WORD_RE.is_match(word) {
            capitalized += 1;
        } else if !INITIAL_RE.is_match(word) && !PARTICLE_RE.is_match(word) {
            return false;
        }
    }

    let last_is_capitalized = words
        .last()
        .is_some_and(|w| CAPITALIZED_WORD_RE.is_match(w));
    capitalized >= 1 && last_is_capitalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authors_prefix_line() {
        assert_eq!(
            detect_author_names("Authors: Jane Doe, John Smith"),
            vec!["Jane Doe", "John Smith"]
        );
    }

    #[test]
    fn no_name_shaped_lines() {
        let text = "deep learning for protein structure prediction\n\
                    this paper presents a new approach\n\
                    results on 3 benchmarks";
        assert!(detect_author_names(text).is_empty());
    }

    #[test]
    fn empty_input() {
        assert!(detect_author_names("").is_empty());
        assert!(detect_author_names("   \n\n  ").is_empty());
    }

    #[test]
    fn typical_paper_header() {
        let text = "Sparse Voxel Grids for Fast Rendering\n\
                    Alice Martin1, Bob Chen2, Carol van der Berg1\n\
                    1Stanford University 2MIT CSAIL\n\
                    {alice, carol}@stanford.edu\n\
                    Abstract\n\
                    Jack Black, Jill White wrote nothing here.";
        assert_eq!(
            detect_author_names(text),
            vec!["Alice Martin", "Bob Chen", "Carol van der Berg"]
        );
    }

    #[test]
    fn stops_at_boundary() {
        let text = "Efficient Neural Rendering\n1 Introduction\nJane Doe, John Smith";
        assert!(detect_author_names(text).is_empty());
    }

    #[test]
    fn wrapped_author_list_is_merged() {
        let text = "Jane Doe, John Smith, Alice Wong,\nBob Lee, Carol King\nAbstract";
        let detector = AuthorNameDetector::default();
        let set = detector.candidates(text);
        assert!(set.candidates.iter().any(|c| c.merged && c.names.len() == 5));
        assert_eq!(
            detector.detect(text),
            vec!["Jane Doe", "John Smith", "Alice Wong", "Bob Lee", "Carol King"]
        );
    }

    #[test]
    fn korean_header() {
        let text = "딥러닝 기반 영상 분석\n저자: 홍길동, 김철수\n서울대학교 컴퓨터공학부\n초록\n본 논문은";
        assert_eq!(detect_author_names(text), vec!["홍길동", "김철수"]);
    }

    #[test]
    fn korean_title_words_are_not_names() {
        let text = "자연어 처리를 위한 새로운 기법\n홍길동, 김철수\n한빛대학교\n초록";
        assert_eq!(detect_author_names(text), vec!["홍길동", "김철수"]);

        let d = AuthorNameDetector::default();
        assert!(d.candidates("자연어 처리를 위한 새로운 기법").candidates.is_empty());
        assert!(!d.is_name("처리를"));
        assert!(!d.is_name("위한"));
        assert!(!d.is_name("남궁민수호"));
        assert!(d.is_name("남궁민수"));
    }

    #[test]
    fn bare_authors_heading_prefixes_next_line() {
        let text = "Authors\nJane Doe and John Smith";
        let set = AuthorNameDetector::default().candidates(text);
        assert_eq!(set.candidates.len(), 1);
        // 2 names + prefix + early + short
        assert_eq!(set.candidates[0].score, 6 + 7 + 2 + 1);
    }

    #[test]
    fn emails_urls_and_markers_are_stripped() {
        let text = "By Jane Doe* (jane@x.org), John Smith† https://example.org";
        assert_eq!(detect_author_names(text), vec!["Jane Doe", "John Smith"]);
    }

    #[test]
    fn adjacent_single_names_merge() {
        let text = "Jane Doe\nJohn Smith\nAbstract";
        let set = AuthorNameDetector::default().candidates(text);
        let merged = set.candidates.iter().find(|c| c.merged).unwrap();
        assert_eq!(merged.score, 6 + 2 + 1);
        assert_eq!(detect_author_names(text), vec!["Jane Doe", "John Smith"]);
    }

    #[test]
    fn merge_needs_only_a_clean_next_line() {
        // The first line carries an affiliation token, the continuation is clean.
        let text = "Jane Doe, Stanford University Press, John Smith,\nAlice Wong, Bob Lee\nAbstract";
        let set = AuthorNameDetector::default().candidates(text);
        let merged = set.candidates.iter().find(|c| c.merged).unwrap();
        assert_eq!(merged.names.len(), 4);
        assert_eq!(
            detect_author_names(text),
            vec!["Jane Doe", "John Smith", "Alice Wong", "Bob Lee"]
        );

        // A dirty continuation line does not merge.
        let set = AuthorNameDetector::default()
            .candidates("Jane Doe, John Smith\nAlice Wong, Stanford University");
        assert!(set.candidates.iter().all(|c| !c.merged));
    }

    #[test]
    fn weak_best_accumulates_close_candidates() {
        // Lines 0 and 2 score 6 each and are not adjacent, so nothing merges.
        let text = "Jane Doe\nStanford University\nJohn Smith";
        let set = AuthorNameDetector::default().candidates(text);
        assert!(set.candidates.iter().all(|c| !c.merged));
        assert_eq!(detect_author_names(text), vec!["Jane Doe", "John Smith"]);
    }

    #[test]
    fn names_capped_at_twelve() {
        let names = [
            "Alice Adams", "Brian Baker", "Clara Cole", "Dylan Dunn", "Emma Evans",
            "Felix Ford", "Grace Green", "Henry Hill", "Irene Irwin", "Jonas Jones",
            "Karen King", "Liam Lane", "Maya Moore", "Noah Nash", "Olga Owens",
        ];
        let text = format!("Authors: {}", names.join(", "));
        let detected = detect_author_names(&text);
        assert_eq!(detected.len(), 12);
        assert_eq!(detected[0], names[0]);
    }

    #[test]
    fn duplicates_removed_case_insensitively() {
        let detected = detect_author_names("Authors: Jane Doe, Jane  Doe, John Smith");
        assert_eq!(detected, vec!["Jane Doe", "John Smith"]);
    }

    #[test]
    fn token_acceptance_rules() {
        let d = AuthorNameDetector::default();
        assert!(d.is_name("Jane Doe"));
        assert!(d.is_name("J. R. Tolkien"));
        assert!(d.is_name("Ludwig van Beethoven"));
        assert!(d.is_name("Jean-Luc O'Neil"));
        assert!(d.is_name("홍길동"));
        assert!(!d.is_name("Jane"));
        assert!(!d.is_name("Stanford University"));
        assert!(!d.is_name("Jane Doe 2"));
        assert!(!d.is_name("jane doe"));
        assert!(!d.is_name("One Two Three Four Five Six"));
        assert!(!d.is_name("서울대학교"));
    }

    #[test]
    fn thresholds_are_injectable() {
        let config = DetectorConfig {
            prefix_bonus: 0,
            ..DetectorConfig::default()
        };
        let set = AuthorNameDetector::new(config).candidates("Authors: Jane Doe, John Smith");
        assert_eq!(set.candidates[0].score, 6 + 2 + 1);
    }
}
