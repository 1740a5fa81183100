//! Merging author rosters from several origins.
//!
//! The earlier roster always wins: a matched entry only gains fields it did
//! not have, and an entry's set fields are never overwritten.

use std::collections::HashMap;

use tracing::debug;

use paperpage_shared::{AuthorCandidate, Origin};

/// Name used when no origin produced any author.
pub const PLACEHOLDER_AUTHOR: &str = "Unknown Author";

/// Controls what an enrichment roster may contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// When false, names absent from the base are dropped instead of appended.
    pub allow_new_names: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            allow_new_names: true,
        }
    }
}

impl ReconcileOptions {
    pub fn enrich_only() -> Self {
        Self {
            allow_new_names: false,
        }
    }
}

/// Tidy a roster: trimmed names, blank fields cleared, empty names dropped,
/// duplicates folded into their first occurrence.
pub fn normalize_roster(list: &[AuthorCandidate]) -> Vec<AuthorCandidate> {
    let mut out: Vec<AuthorCandidate> = Vec::with_capacity(list.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for candidate in list {
        let candidate = tidy(candidate);
        if candidate.name.is_empty() {
            continue;
        }
        match index.get(&candidate.identity_key()) {
            Some(&i) => fill_missing(&mut out[i], &candidate),
            None => {
                index.insert(candidate.identity_key(), out.len());
                out.push(candidate);
            }
        }
    }
    out
}

/// Merge `incoming` into `base`.
///
/// Identity matches fill unset fields. When both rosters have the same nonzero
/// length and line up index-for-index (each incoming entry is either the same
/// person as the base entry at that index or matches nobody), affiliations are
/// also copied positionally and unmatched incoming names are never appended.
pub fn reconcile(
    base: &[AuthorCandidate],
    incoming: &[AuthorCandidate],
    options: ReconcileOptions,
) -> Vec<AuthorCandidate> {
    let mut roster = normalize_roster(base);
    let incoming = normalize_roster(incoming);
    if incoming.is_empty() {
        return roster;
    }

    let positional = is_aligned(&roster, &incoming);
    let mut index: HashMap<String, usize> = roster
        .iter()
        .enumerate()
        .map(|(i, c)| (c.identity_key(), i))
        .collect();

    for candidate in &incoming {
        match index.get(&candidate.identity_key()) {
            Some(&i) => fill_missing(&mut roster[i], candidate),
            None if !positional && options.allow_new_names => {
                index.insert(candidate.identity_key(), roster.len());
                roster.push(candidate.clone());
            }
            None => {}
        }
    }

    if positional {
        for (entry, enrichment) in roster.iter_mut().zip(&incoming) {
            if entry.affiliation.is_none() {
                entry.affiliation = enrichment.affiliation.clone();
            }
        }
    }

    roster
}

fn is_aligned(base: &[AuthorCandidate], incoming: &[AuthorCandidate]) -> bool {
    if base.is_empty() || base.len() != incoming.len() {
        return false;
    }
    let keys: Vec<String> = base.iter().map(AuthorCandidate::identity_key).collect();
    incoming.iter().zip(&keys).all(|(candidate, base_key)| {
        let key = candidate.identity_key();
        &key == base_key || !keys.contains(&key)
    })
}

fn fill_missing(entry: &mut AuthorCandidate, other: &AuthorCandidate) {
    if entry.url.is_none() {
        entry.url = other.url.clone();
    }
    if entry.affiliation.is_none() {
        entry.affiliation = other.affiliation.clone();
    }
    if entry.equal_contribution.is_none() {
        entry.equal_contribution = other.equal_contribution;
    }
}

fn tidy(candidate: &AuthorCandidate) -> AuthorCandidate {
    let non_blank = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };
    AuthorCandidate {
        name: candidate.name.split_whitespace().collect::<Vec<_>>().join(" "),
        url: non_blank(&candidate.url),
        affiliation: non_blank(&candidate.affiliation),
        equal_contribution: candidate.equal_contribution,
    }
}

// ---------------------------------------------------------------------------
// Pipeline precedence chain
// ---------------------------------------------------------------------------

/// Author lists gathered for one request, one per origin.
#[derive(Debug, Clone, Default)]
pub struct RosterSources<'a> {
    pub detected: &'a [String],
    pub manual: &'a [AuthorCandidate],
    pub generated: &'a [AuthorCandidate],
}

/// The final roster and the origin that seeded it (`None` for the placeholder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltRoster {
    pub authors: Vec<AuthorCandidate>,
    pub seeded_by: Option<Origin>,
}

/// Detected names (else manual) enriched by manual then generated entries
/// without admitting new names; then raw generated; then the placeholder.
pub fn build_roster(sources: RosterSources<'_>) -> BuiltRoster {
    let detected: Vec<AuthorCandidate> = sources
        .detected
        .iter()
        .map(|n| AuthorCandidate::named(n.as_str()))
        .collect();

    let (base, seed) = if normalize_roster(&detected).is_empty() {
        (sources.manual.to_vec(), Origin::Manual)
    } else {
        (detected, Origin::Extracted)
    };

    let roster = reconcile(&base, sources.manual, ReconcileOptions::enrich_only());
    let roster = reconcile(&roster, sources.generated, ReconcileOptions::enrich_only());
    if !roster.is_empty() {
        debug!(origin = seed.as_str(), authors = roster.len(), "roster built");
        return BuiltRoster {
            authors: roster,
            seeded_by: Some(seed),
        };
    }

    let generated = normalize_roster(sources.generated);
    if !generated.is_empty() {
        debug!(origin = Origin::Generated.as_str(), authors = generated.len(), "roster built");
        return BuiltRoster {
            authors: generated,
            seeded_by: Some(Origin::Generated),
        };
    }

    debug!("no author from any origin, using placeholder");
    BuiltRoster {
        authors: vec![AuthorCandidate::named(PLACEHOLDER_AUTHOR)],
        seeded_by: None,
    }
}

// ---------------------------------------------------------------------------
// Manual input
// ---------------------------------------------------------------------------

/// Parse `Name @ Affiliation; Name (Affiliation); Name*` style input.
///
/// Entries split on `;`, `|` or newlines; commas only when none of those appear.
/// A trailing `*` on an entry or name marks equal contribution.
pub fn parse_manual_authors(input: &str) -> Vec<AuthorCandidate> {
    let entries: Vec<&str> = if input.contains([';', '|', '\n']) {
        input.split([';', '|', '\n']).collect()
    } else {
        input.split(',').collect()
    };

    entries.into_iter().filter_map(parse_entry).collect()
}

fn parse_entry(entry: &str) -> Option<AuthorCandidate> {
    let mut entry = entry.trim();
    let mut equal = false;
    if let Some(rest) = entry.strip_suffix('*') {
        equal = true;
        entry = rest.trim_end_matches('*').trim_end();
    }

    let (name, affiliation) = if let Some((name, aff)) = entry.split_once('@') {
        (name, Some(aff))
    } else if let Some(open) = entry.rfind('(').filter(|_| entry.ends_with(')')) {
        (&entry[..open], Some(&entry[open + 1..entry.len() - 1]))
    } else {
        (entry, None)
    };

    let mut name = name.trim();
    if let Some(rest) = name.strip_suffix('*') {
        equal = true;
        name = rest.trim_end_matches('*').trim_end();
    }
    if name.is_empty() {
        return None;
    }

    Some(AuthorCandidate {
        name: name.to_string(),
        url: None,
        affiliation: affiliation
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from),
        equal_contribution: equal.then_some(true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(names: &[&str]) -> Vec<AuthorCandidate> {
        names.iter().map(|n| AuthorCandidate::named(*n)).collect()
    }

    fn keys(roster: &[AuthorCandidate]) -> Vec<String> {
        roster.iter().map(AuthorCandidate::identity_key).collect()
    }

    #[test]
    fn enrich_only_keeps_base_length_and_unique_keys() {
        let cases: Vec<(Vec<AuthorCandidate>, Vec<AuthorCandidate>)> = vec![
            (named(&["Jane Doe", "John Smith"]), named(&["Someone Else"])),
            (named(&["Jane Doe"]), named(&["jane  doe", "John Smith", "Ann Lee"])),
            (named(&[]), named(&["Ann Lee"])),
            (named(&["A B", "C D", "E F"]), named(&["c d", "X Y", "a b"])),
            (named(&["Jane Doe", "John Smith"]), named(&["JOHN SMITH", "Jane Doe"])),
        ];

        for (a, b) in cases {
            let out = reconcile(&a, &b, ReconcileOptions::enrich_only());
            assert!(out.len() >= a.len());
            let mut k = keys(&out);
            let total = k.len();
            k.sort();
            k.dedup();
            assert_eq!(k.len(), total, "duplicate identity in {out:?}");
        }
    }

    #[test]
    fn empty_enrichment_is_normalization() {
        let a = vec![
            AuthorCandidate::named("  Jane   Doe "),
            AuthorCandidate::named("John Smith").with_affiliation("  "),
            AuthorCandidate::named("jane doe").with_affiliation("MIT"),
        ];
        let out = reconcile(&a, &[], ReconcileOptions::default());
        assert_eq!(out, normalize_roster(&a));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "Jane Doe");
        assert_eq!(out[0].affiliation.as_deref(), Some("MIT"));
        assert!(out[1].affiliation.is_none());
    }

    #[test]
    fn positional_affiliation_backfill() {
        let base = named(&["A", "B"]);
        let enrich = vec![
            AuthorCandidate::named("X").with_affiliation("MIT"),
            AuthorCandidate::named("Y").with_affiliation("CMU"),
        ];
        let expected = vec![
            AuthorCandidate::named("A").with_affiliation("MIT"),
            AuthorCandidate::named("B").with_affiliation("CMU"),
        ];

        assert_eq!(reconcile(&base, &enrich, ReconcileOptions::enrich_only()), expected);
        assert_eq!(reconcile(&base, &enrich, ReconcileOptions::default()), expected);
    }

    #[test]
    fn fields_are_never_overwritten() {
        let base = vec![AuthorCandidate::named("Jane Doe").with_affiliation("Stanford")];
        let enrich = vec![AuthorCandidate {
            name: "jane doe".into(),
            url: Some("https://jane.dev".into()),
            affiliation: Some("MIT".into()),
            equal_contribution: Some(true),
        }];

        let out = reconcile(&base, &enrich, ReconcileOptions::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "Jane Doe");
        assert_eq!(out[0].affiliation.as_deref(), Some("Stanford"));
        assert_eq!(out[0].url.as_deref(), Some("https://jane.dev"));
        assert_eq!(out[0].equal_contribution, Some(true));
    }

    #[test]
    fn new_names_follow_policy() {
        let base = named(&["Jane Doe"]);
        let enrich = named(&["John Smith", "Ann Lee"]);

        let closed = reconcile(&base, &enrich, ReconcileOptions::enrich_only());
        assert_eq!(keys(&closed), vec!["jane doe"]);

        let open = reconcile(&base, &enrich, ReconcileOptions::default());
        assert_eq!(keys(&open), vec!["jane doe", "john smith", "ann lee"]);
    }

    #[test]
    fn misaligned_equal_length_merges_by_identity_only() {
        // "B" appears at a different index, so positional copying is off.
        let base = named(&["A", "B"]);
        let enrich = vec![
            AuthorCandidate::named("B").with_affiliation("CMU"),
            AuthorCandidate::named("Z").with_affiliation("MIT"),
        ];
        let out = reconcile(&base, &enrich, ReconcileOptions::enrich_only());
        assert!(out[0].affiliation.is_none());
        assert_eq!(out[1].affiliation.as_deref(), Some("CMU"));
    }

    #[test]
    fn length_mismatch_merges_by_identity_only() {
        let base = named(&["A", "B"]);
        let enrich = vec![AuthorCandidate::named("X").with_affiliation("MIT")];
        let out = reconcile(&base, &enrich, ReconcileOptions::enrich_only());
        assert!(out.iter().all(|c| c.affiliation.is_none()));
    }

    #[test]
    fn chain_prefers_detected_names() {
        let detected = vec!["Jane Doe".to_string(), "John Smith".to_string()];
        let manual = parse_manual_authors("Jane Doe @ MIT; Ghost Writer @ Nowhere; Third Person");
        let generated = vec![
            AuthorCandidate::named("John Smith").with_affiliation("CMU"),
            AuthorCandidate::named("Hallucinated Person"),
        ];

        let built = build_roster(RosterSources {
            detected: &detected,
            manual: &manual,
            generated: &generated,
        });

        assert_eq!(built.seeded_by, Some(Origin::Extracted));
        assert_eq!(keys(&built.authors), vec!["jane doe", "john smith"]);
        assert_eq!(built.authors[0].affiliation.as_deref(), Some("MIT"));
        assert_eq!(built.authors[1].affiliation.as_deref(), Some("CMU"));
    }

    #[test]
    fn chain_falls_back_to_manual_then_generated_then_placeholder() {
        let manual = parse_manual_authors("Ann Lee (KAIST), Bo Kim");
        let built = build_roster(RosterSources {
            manual: &manual,
            ..Default::default()
        });
        assert_eq!(built.seeded_by, Some(Origin::Manual));
        assert_eq!(keys(&built.authors), vec!["ann lee", "bo kim"]);

        let generated = named(&["Gen Author"]);
        let built = build_roster(RosterSources {
            generated: &generated,
            ..Default::default()
        });
        assert_eq!(built.seeded_by, Some(Origin::Generated));
        assert_eq!(keys(&built.authors), vec!["gen author"]);

        let built = build_roster(RosterSources::default());
        assert_eq!(built.seeded_by, None);
        assert_eq!(built.authors, vec![AuthorCandidate::named(PLACEHOLDER_AUTHOR)]);
    }

    #[test]
    fn manual_input_forms() {
        let parsed = parse_manual_authors("Jane Doe @ MIT; John Smith (CMU)*\nAnn Lee*");
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].affiliation.as_deref(), Some("MIT"));
        assert_eq!(parsed[1].name, "John Smith");
        assert_eq!(parsed[1].affiliation.as_deref(), Some("CMU"));
        assert_eq!(parsed[1].equal_contribution, Some(true));
        assert_eq!(parsed[2].name, "Ann Lee");
        assert_eq!(parsed[2].equal_contribution, Some(true));
        assert!(parsed[0].equal_contribution.is_none());
    }

    #[test]
    fn manual_input_comma_fallback() {
        let parsed = parse_manual_authors("Jane Doe, John Smith* @ Stanford, ");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].name, "John Smith");
        assert_eq!(parsed[1].affiliation.as_deref(), Some("Stanford"));
        assert_eq!(parsed[1].equal_contribution, Some(true));
        assert!(parse_manual_authors("  ").is_empty());
    }
}
