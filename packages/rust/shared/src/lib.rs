//! Shared types, error model, and configuration for paperpage.
//!
//! This crate is the foundation depended on by all other paperpage crates.
//! It provides:
//! - [`PaperpageError`] — the unified error type
//! - Domain types ([`SourceDescriptor`], [`AuthorCandidate`], [`ProjectRecord`])
//! - Configuration ([`AppConfig`], runtime configs, config loading)
//! - The [`ContentStore`] port

pub mod config;
pub mod error;
pub mod ports;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, ExtractorLimits, FetchConfig, GeneratorConfig, GeneratorSettings,
    HostingConfig, MAX_WORKERS, ResolverConfig, clamp_workers, config_dir, config_file_path,
    init_config, load_config, load_config_from, resolve_database_path, validate_api_key,
};
pub use error::{PaperpageError, Result};
pub use ports::ContentStore;
pub use types::{
    AuthorCandidate, AuxFields, BatchId, CURRENT_SCHEMA_VERSION, CarouselItem,
    DetailedDescription, Origin, ProjectLink, ProjectRecord, SourceDescriptor, SourceKind,
    normalize_name,
};
