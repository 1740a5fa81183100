//! Code-hosting locators and the authenticated content API client.
//!
//! Only GitHub URL shapes are recognised. The content API returns file bytes
//! base64-encoded; a 404 is the not-found signal, not an error.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use paperpage_shared::{PaperpageError, Result};

/// README path requested for repository sources.
pub const README_PATH: &str = "README.md";

pub(crate) const GITHUB_HOST: &str = "github.com";
const RAW_HOST: &str = "raw.githubusercontent.com";

// ---------------------------------------------------------------------------
// Locators
// ---------------------------------------------------------------------------

/// A file inside a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostingLocation {
    pub owner: String,
    pub repo: String,
    pub path: String,
    /// Branch, tag or commit. `None` means the client's default ref.
    pub git_ref: Option<String>,
}

impl HostingLocation {
    /// Recognise a file URL (`github.com/o/r/blob/ref/path`, `github.com/o/r/raw/ref/path`
    /// or `raw.githubusercontent.com/o/r/ref/path`).
    pub fn from_file_url(url: &Url) -> Option<Self> {
        Self::from_file_url_on(url, &[GITHUB_HOST])
    }

    /// Like [`from_file_url`](Self::from_file_url), with `blob_hosts` serving
    /// the `o/r/blob/ref/path` layout.
    pub fn from_file_url_on(url: &Url, blob_hosts: &[&str]) -> Option<Self> {
        let host = url.host_str()?.trim_start_matches("www.");
        let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();

        let (owner, repo, git_ref, rest) = match host {
            host if blob_hosts.contains(&host) => match segments.as_slice() {
                [owner, repo, "blob" | "raw", git_ref, rest @ ..] if !rest.is_empty() => {
                    (*owner, *repo, *git_ref, rest)
                }
                _ => return None,
            },
            RAW_HOST => match segments.as_slice() {
                [owner, repo, git_ref, rest @ ..] if !rest.is_empty() => {
                    (*owner, *repo, *git_ref, rest)
                }
                _ => return None,
            },
            _ => return None,
        };

        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path: rest.join("/"),
            git_ref: Some(git_ref.to_string()),
        })
    }

    /// Recognise a repository URL and point at its README.
    ///
    /// `github.com/o/r`, `github.com/o/r.git` and `github.com/o/r/tree/<ref>` are accepted.
    pub fn readme_for_repository(url: &Url) -> Option<Self> {
        let host = url.host_str()?.trim_start_matches("www.");
        if host != GITHUB_HOST {
            return None;
        }
        let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();

        let (owner, repo, git_ref) = match segments.as_slice() {
            [owner, repo] => (*owner, *repo, None),
            [owner, repo, "tree", git_ref, ..] => (*owner, *repo, Some(git_ref.to_string())),
            _ => return None,
        };

        let repo = repo.trim_end_matches(".git");
        if owner.is_empty() || repo.is_empty() {
            return None;
        }

        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path: README_PATH.to_string(),
            git_ref,
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Body of a contents-API file response.
#[derive(Debug, Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

/// Authenticated client for the hosting content API.
#[derive(Debug, Clone)]
pub struct HostingClient {
    client: Client,
    api_base: String,
    token: Option<String>,
    default_ref: String,
}

impl HostingClient {
    pub fn new(
        client: Client,
        api_base: impl Into<String>,
        token: Option<String>,
        default_ref: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            token,
            default_ref: default_ref.into(),
        }
    }

    /// Fetch a file's bytes. `Ok(None)` when the API reports it does not exist.
    #[instrument(skip_all, fields(owner = %location.owner, repo = %location.repo, path = %location.path))]
    pub async fn fetch_file(&self, location: &HostingLocation) -> Result<Option<Vec<u8>>> {
        let url = self.contents_url(location)?;
        debug!(%url, authenticated = self.token.is_some(), "requesting hosting content");

        let response = self
            .authorized(self.client.get(url.clone()))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await
            .map_err(|e| PaperpageError::SourceUnavailable(format!("{url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(PaperpageError::SourceUnavailable(format!(
                "{}/{}/{}: hosting API returned HTTP {status}",
                location.owner, location.repo, location.path
            )));
        }

        let body: ContentsResponse = response.json().await.map_err(|e| {
            PaperpageError::SourceUnavailable(format!("{url}: invalid hosting API response: {e}"))
        })?;

        match (body.encoding.as_deref(), body.content, body.download_url) {
            (Some("base64"), Some(content), _) => decode_content(&content).map(Some),
            // Large files come back without inline content.
            (_, _, Some(download_url)) => self.fetch_download_url(&download_url).await.map(Some),
            (encoding, _, None) => Err(PaperpageError::SourceUnavailable(format!(
                "{url}: unsupported content encoding {encoding:?}"
            ))),
        }
    }

    async fn fetch_download_url(&self, download_url: &str) -> Result<Vec<u8>> {
        let response = self
            .authorized(self.client.get(download_url))
            .send()
            .await
            .map_err(|e| PaperpageError::SourceUnavailable(format!("{download_url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaperpageError::SourceUnavailable(format!(
                "{download_url}: HTTP {status}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PaperpageError::SourceUnavailable(format!("{download_url}: {e}")))?;
        Ok(bytes.to_vec())
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn contents_url(&self, location: &HostingLocation) -> Result<Url> {
        let mut url = Url::parse(&self.api_base).map_err(|e| {
            PaperpageError::config(format!("invalid hosting api_base '{}': {e}", self.api_base))
        })?;

        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                PaperpageError::config(format!("hosting api_base cannot be a base URL: {}", self.api_base))
            })?;
            segments.pop_if_empty();
            segments.extend([
                "repos",
                location.owner.as_str(),
                location.repo.as_str(),
                "contents",
            ]);
            segments.extend(location.path.split('/').filter(|s| !s.is_empty()));
        }

        let git_ref = location.git_ref.as_deref().unwrap_or(&self.default_ref);
        url.query_pairs_mut().append_pair("ref", git_ref);
        Ok(url)
    }
}

/// Decode base64 content that may contain embedded line breaks.
fn decode_content(content: &str) -> Result<Vec<u8>> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| PaperpageError::SourceUnavailable(format!("invalid base64 content: {e}")))
}
