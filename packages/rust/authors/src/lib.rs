//! Author identity: heuristic detection from document text and
//! reconciliation of rosters coming from several origins.

mod detector;
mod reconcile;
mod vocabulary;

pub use detector::{
    AuthorNameDetector, DetectorConfig, ExtractedAuthorSet, ScoredCandidate, detect_author_names,
};
pub use reconcile::{
    BuiltRoster, PLACEHOLDER_AUTHOR, ReconcileOptions, RosterSources, build_roster,
    normalize_roster, parse_manual_authors, reconcile,
};
pub use vocabulary::contains_noise;
