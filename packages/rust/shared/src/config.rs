//! Application configuration for paperpage.
//!
//! User config lives at `~/.paperpage/paperpage.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PaperpageError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "paperpage.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".paperpage";

/// Default database file name inside the config directory.
const DATABASE_FILE_NAME: &str = "paperpage.db";

/// Hard upper bound on concurrent pipeline runs.
pub const MAX_WORKERS: usize = 3;

// ---------------------------------------------------------------------------
// Config structs (matching paperpage.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Content generator endpoint.
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Code-hosting content API.
    #[serde(default)]
    pub hosting: HostingConfig,

    /// Direct network fetch settings.
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory that local upload locators resolve against.
    #[serde(default = "default_uploads_root")]
    pub uploads_root: String,

    /// Database path; `~/.paperpage/paperpage.db` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,

    /// Batch worker count (clamped to 1..=3 at run time).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pages read from a PDF before stopping.
    #[serde(default = "default_max_pdf_pages")]
    pub max_pdf_pages: usize,

    /// Characters of extracted text kept in total.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            uploads_root: default_uploads_root(),
            database_path: None,
            workers: default_workers(),
            max_pdf_pages: default_max_pdf_pages(),
            max_text_chars: default_max_text_chars(),
        }
    }
}

fn default_uploads_root() -> String {
    "./uploads".into()
}
fn default_workers() -> usize {
    MAX_WORKERS
}
fn default_max_pdf_pages() -> usize {
    80
}
fn default_max_text_chars() -> usize {
    100_000
}

/// `[generator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API base URL.
    #[serde(default = "default_generator_base_url")]
    pub base_url: String,

    /// Model identifier sent with each request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Request timeout in seconds.
    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_generator_base_url(),
            model: default_model(),
            timeout_secs: default_generator_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_generator_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "google/gemini-2.5-flash".into()
}
fn default_generator_timeout() -> u64 {
    120
}

/// `[hosting]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostingConfig {
    /// Content API base URL.
    #[serde(default = "default_hosting_api_base")]
    pub api_base: String,

    /// Name of the env var holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Ref used when a locator does not name one.
    #[serde(default = "default_ref")]
    pub default_ref: String,
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            api_base: default_hosting_api_base(),
            token_env: default_token_env(),
            default_ref: default_ref(),
        }
    }
}

fn default_hosting_api_base() -> String {
    "https://api.github.com".into()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}
fn default_ref() -> String {
    "main".into()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_redirects: default_max_redirects(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    30
}
fn default_max_redirects() -> usize {
    5
}

// ---------------------------------------------------------------------------
// Runtime configs (derived from AppConfig + environment)
// ---------------------------------------------------------------------------

/// Runtime source-resolution settings.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub uploads_root: PathBuf,
    pub fetch_timeout_secs: u64,
    pub max_redirects: usize,
    pub hosting_api_base: String,
    pub hosting_token: Option<String>,
    pub default_ref: String,
}

impl From<&AppConfig> for ResolverConfig {
    fn from(config: &AppConfig) -> Self {
        let hosting_token = std::env::var(&config.hosting.token_env)
            .ok()
            .filter(|t| !t.is_empty());

        Self {
            uploads_root: PathBuf::from(&config.defaults.uploads_root),
            fetch_timeout_secs: config.fetch.timeout_secs,
            max_redirects: config.fetch.max_redirects,
            hosting_api_base: config.hosting.api_base.clone(),
            hosting_token,
            default_ref: config.hosting.default_ref.clone(),
        }
    }
}

/// Page and character caps applied to extracted document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractorLimits {
    pub max_pages: usize,
    pub max_chars: usize,
}

impl Default for ExtractorLimits {
    fn default() -> Self {
        Self {
            max_pages: default_max_pdf_pages(),
            max_chars: default_max_text_chars(),
        }
    }
}

impl From<&AppConfig> for ExtractorLimits {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_pages: config.defaults.max_pdf_pages,
            max_chars: config.defaults.max_text_chars,
        }
    }
}

/// Runtime generator settings, with the API key read from the environment.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl GeneratorSettings {
    /// Resolve settings, failing if the API key env var is missing.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        validate_api_key(config)?;
        let api_key = std::env::var(&config.generator.api_key_env).unwrap_or_default();
        Ok(Self {
            base_url: config.generator.base_url.trim_end_matches('/').to_string(),
            model: config.generator.model.clone(),
            api_key,
            timeout_secs: config.generator.timeout_secs,
        })
    }
}

/// Clamp a requested worker count to `1..=MAX_WORKERS`.
pub fn clamp_workers(requested: usize) -> usize {
    requested.clamp(1, MAX_WORKERS)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.paperpage/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PaperpageError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.paperpage/paperpage.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve where the content store database lives.
pub fn resolve_database_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.defaults.database_path {
        Some(path) => Ok(expand_home(path)),
        None => Ok(config_dir()?.join(DATABASE_FILE_NAME)),
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PaperpageError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| PaperpageError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PaperpageError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PaperpageError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PaperpageError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the generator API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.generator.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(PaperpageError::config(format!(
            "generator API key not found. Set the {var_name} environment variable."
        ))),
    }
}
