//! Words that mark a line or token as "not a person's name".
//!
//! English terms match on word boundaries, Korean terms as substrings
//! (Hangul compounds such as `서울대학교` carry the marker inside the word).

use std::sync::LazyLock;

use regex::Regex;

/// Affiliation, venue and section-heading vocabulary.
const ENGLISH_NOISE: &[&str] = &[
    // affiliations
    "university",
    "universität",
    "université",
    "universidad",
    "institute",
    "institut",
    "department",
    "dept",
    "school",
    "college",
    "faculty",
    "laboratory",
    "laboratories",
    "lab",
    "labs",
    "center",
    "centre",
    "academy",
    "inc",
    "corp",
    "corporation",
    "company",
    "ltd",
    "gmbh",
    "research",
    "group",
    "hospital",
    "foundation",
    // sections and venue boilerplate
    "abstract",
    "introduction",
    "keywords",
    "contents",
    "references",
    "acknowledgments",
    "acknowledgements",
    "appendix",
    "supplementary",
    "conference",
    "proceedings",
    "journal",
    "workshop",
    "symposium",
    "transactions",
    "volume",
    "preprint",
    "arxiv",
    "copyright",
    "license",
    "licensed",
    "published",
    "submitted",
    "accepted",
    "correspondence",
    "corresponding",
    "contribution",
    "contributed",
    "email",
    "figure",
    "table",
    "ieee",
    "acm",
    // frequent title words
    "learning",
    "neural",
    "network",
    "networks",
    "model",
    "models",
    "language",
    "vision",
    "image",
    "images",
    "video",
    "data",
    "dataset",
    "benchmark",
    "survey",
    "towards",
    "using",
    "via",
    "efficient",
    "robust",
    "scalable",
    "generative",
    "diffusion",
    "transformer",
    "transformers",
    "attention",
    "reinforcement",
    "framework",
    "approach",
    "method",
    "methods",
    "system",
    "systems",
    "analysis",
    "rendering",
    "detection",
    "segmentation",
    "recognition",
    "generation",
    "estimation",
    "optimization",
    "representation",
    "representations",
];

/// Korean affiliation, heading and title vocabulary.
const KOREAN_NOISE: &[&str] = &[
    "대학교",
    "대학원",
    "대학",
    "연구소",
    "연구원",
    "연구실",
    "연구",
    "학과",
    "학부",
    "센터",
    "재단",
    "병원",
    "주식회사",
    "소속",
    "교신저자",
    "공동",
    "초록",
    "요약",
    "서론",
    "키워드",
    "주제어",
    "논문",
    "학회",
    "학술",
    "기반",
    "분석",
    "학습",
    "모델",
    "방법",
    "시스템",
    "데이터",
    "네트워크",
    "개발",
    "설계",
    "평가",
    "영상",
];

/// Common Korean surnames. Two-syllable surnames come first.
const KOREAN_SURNAMES: &[&str] = &[
    "남궁", "황보", "제갈", "선우", "독고", "사공", "서문", "김", "이", "박", "최", "정", "강",
    "조", "윤", "장", "임", "한", "오", "서", "신", "권", "황", "안", "송", "류", "유", "전",
    "홍", "고", "문", "양", "손", "배", "백", "허", "남", "심", "노", "하", "곽", "성", "차",
    "주", "우", "구", "민", "진", "나", "지", "엄", "채", "원", "천", "방", "공", "현", "함",
    "변", "염", "여", "추", "도", "소", "석", "선", "설", "마", "길", "연", "위", "표", "명",
    "기", "반", "라", "왕", "금", "옥", "육", "인", "맹", "제", "모", "탁", "국", "어", "은",
    "편", "용", "예", "경", "봉", "사", "부",
];

/// Particles and endings that close Korean title words but not given names.
const KOREAN_WORD_ENDINGS: &[&str] = &[
    "에서", "으로", "위한", "하는", "적인", "에게", "를", "을", "의", "에", "로", "와", "과",
];

static NOISE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let english = ENGLISH_NOISE
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    let korean = KOREAN_NOISE
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{english})\b|(?:{korean})")).expect("valid regex")
});

/// True when `text` contains any noise term.
pub fn contains_noise(text: &str) -> bool {
    NOISE_RE.is_match(text)
}

/// True when a Hangul token starts with a known surname and does not end like
/// a particle-bearing word. Spacing inside the token is ignored.
pub fn has_korean_name_shape(token: &str) -> bool {
    let compact: String = token.chars().filter(|c| !c.is_whitespace()).collect();
    let syllables = compact.chars().count();
    if !(2..=4).contains(&syllables) {
        return false;
    }
    if KOREAN_WORD_ENDINGS.iter().any(|e| compact.ends_with(e)) {
        return false;
    }
    KOREAN_SURNAMES
        .iter()
        .any(|s| compact.starts_with(s) && syllables > s.chars().count())
}
