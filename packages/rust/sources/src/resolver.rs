//! Turns a [`SourceDescriptor`] into raw bytes.
//!
//! Document sources are tried in order: a file under the uploads root, a
//! direct network fetch, then the hosting content API when the locator is a
//! recognised hosting URL and the direct fetch was refused. No retries here.

use std::net::IpAddr;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use url::Url;

use paperpage_shared::{PaperpageError, ResolverConfig, Result, SourceDescriptor, SourceKind};

use crate::hosting::{GITHUB_HOST, HostingClient, HostingLocation};

/// User-Agent string for source requests.
const USER_AGENT: &str = concat!("paperpage/", env!("CARGO_PKG_VERSION"));

/// URL path prefix that marks a locator as an upload reference.
const UPLOADS_PREFIX: &str = "/uploads/";

// ---------------------------------------------------------------------------
// Resolved output
// ---------------------------------------------------------------------------

/// Which resolution step produced the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedFrom {
    Local,
    Direct,
    HostingApi,
}

/// Raw source bytes plus provenance.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub bytes: Vec<u8>,
    pub resolved_from: ResolvedFrom,
    pub content_type: Option<String>,
    /// Hex SHA-256 of `bytes`.
    pub sha256: String,
}

impl ResolvedSource {
    fn new(bytes: Vec<u8>, resolved_from: ResolvedFrom, content_type: Option<String>) -> Self {
        let sha256 = compute_hash(&bytes);
        Self {
            bytes,
            resolved_from,
            content_type,
            sha256,
        }
    }
}

/// Anything that can resolve a source descriptor to bytes.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn resolve(&self, source: &SourceDescriptor) -> Result<ResolvedSource>;
}

// ---------------------------------------------------------------------------
// SourceResolver
// ---------------------------------------------------------------------------

/// Outcome of a direct fetch attempt.
enum DirectFetch {
    Fetched(ResolvedSource),
    /// 401/403/404: eligible for the hosting-API fallback.
    Refused(StatusCode),
}

/// Default resolver: uploads root, direct HTTP, hosting API.
pub struct SourceResolver {
    config: ResolverConfig,
    client: Client,
    hosting: HostingClient,
    /// Hosts whose file URLs use the `owner/repo/blob/ref/path` layout.
    blob_hosts: Vec<&'static str>,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_localhost: bool,
}

impl SourceResolver {
    pub fn new(config: ResolverConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .map_err(|e| PaperpageError::config(format!("failed to build HTTP client: {e}")))?;

        let hosting = HostingClient::new(
            client.clone(),
            config.hosting_api_base.clone(),
            config.hosting_token.clone(),
            config.default_ref.clone(),
        );

        Ok(Self {
            config,
            client,
            hosting,
            blob_hosts: vec![GITHUB_HOST],
            allow_localhost: false,
        })
    }

    /// Treat `host` as a code host for the hosting-API fallback (for mock servers).
    #[cfg(test)]
    pub fn with_blob_host(mut self, host: &'static str) -> Self {
        self.blob_hosts.push(host);
        self
    }

    /// Allow fetching localhost/private IPs (for integration tests).
    #[cfg(test)]
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    async fn resolve_document(&self, locator: &str) -> Result<ResolvedSource> {
        let url = match Url::parse(locator) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            _ => return self.read_upload(locator).await,
        };

        // Upload links served by the app itself resolve locally when the file is here.
        if let Some(name) = url.path().strip_prefix(UPLOADS_PREFIX) {
            if let Ok(source) = self.read_upload(name).await {
                return Ok(source);
            }
        }

        match self.fetch_direct(&url).await? {
            DirectFetch::Fetched(source) => Ok(source),
            DirectFetch::Refused(status) => match self.hosted_location(&url) {
                Some(location) => {
                    info!(%url, %status, "direct fetch refused, trying hosting API");
                    self.fetch_hosted(&location, &url).await
                }
                None => Err(PaperpageError::SourceUnavailable(format!("{url}: HTTP {status}"))),
            },
        }
    }

    fn hosted_location(&self, url: &Url) -> Option<HostingLocation> {
        HostingLocation::from_file_url_on(url, &self.blob_hosts)
    }

    async fn resolve_repository(&self, locator: &str) -> Result<ResolvedSource> {
        let url = parse_http_url(locator)?;
        let location = HostingLocation::readme_for_repository(&url).ok_or_else(|| {
            PaperpageError::SourceUnavailable(format!("{url}: not a recognised repository URL"))
        })?;
        self.fetch_hosted(&location, &url).await
    }

    async fn resolve_video(&self, locator: &str) -> Result<ResolvedSource> {
        let url = parse_http_url(locator)?;
        match self.fetch_direct(&url).await? {
            DirectFetch::Fetched(source) => Ok(source),
            DirectFetch::Refused(status) => {
                Err(PaperpageError::SourceUnavailable(format!("{url}: HTTP {status}")))
            }
        }
    }

    async fn fetch_hosted(&self, location: &HostingLocation, url: &Url) -> Result<ResolvedSource> {
        match self.hosting.fetch_file(location).await? {
            Some(bytes) => Ok(ResolvedSource::new(bytes, ResolvedFrom::HostingApi, None)),
            None => Err(PaperpageError::SourceUnavailable(format!(
                "{url}: {}/{}/{} not found via hosting API",
                location.owner, location.repo, location.path
            ))),
        }
    }

    async fn fetch_direct(&self, url: &Url) -> Result<DirectFetch> {
        if !self.allow_localhost && is_ssrf_target(url) {
            warn!(%url, "SSRF protection: blocked");
            return Err(PaperpageError::SourceUnavailable(format!(
                "{url}: refusing to fetch a private or local address"
            )));
        }

        debug!(%url, "direct fetch");
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| PaperpageError::SourceUnavailable(format!("{url}: {e}")))?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        ) {
            return Ok(DirectFetch::Refused(status));
        }
        if !status.is_success() {
            return Err(PaperpageError::SourceUnavailable(format!("{url}: HTTP {status}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PaperpageError::SourceUnavailable(format!("{url}: body read failed: {e}")))?;

        Ok(DirectFetch::Fetched(ResolvedSource::new(
            bytes.to_vec(),
            ResolvedFrom::Direct,
            content_type,
        )))
    }

    async fn read_upload(&self, name: &str) -> Result<ResolvedSource> {
        let path = upload_path(&self.config.uploads_root, name)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            PaperpageError::SourceUnavailable(format!("{}: {e}", path.display()))
        })?;
        Ok(ResolvedSource::new(bytes, ResolvedFrom::Local, None))
    }
}

#[async_trait]
impl SourceFetcher for SourceResolver {
    #[instrument(skip_all, fields(kind = %source.kind, locator = %source.locator))]
    async fn resolve(&self, source: &SourceDescriptor) -> Result<ResolvedSource> {
        let locator = source.locator.trim();
        if locator.is_empty() {
            return Err(PaperpageError::SourceUnavailable("empty source locator".into()));
        }

        let resolved = match source.kind {
            SourceKind::Pdf => self.resolve_document(locator).await?,
            SourceKind::Github => self.resolve_repository(locator).await?,
            SourceKind::Youtube => self.resolve_video(locator).await?,
        };

        info!(
            from = ?resolved.resolved_from,
            bytes = resolved.bytes.len(),
            "source resolved"
        );
        Ok(resolved)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_http_url(locator: &str) -> Result<Url> {
    match Url::parse(locator) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
        _ => Err(PaperpageError::SourceUnavailable(format!(
            "{locator}: expected an http(s) URL"
        ))),
    }
}

/// Map an upload name onto the uploads root, refusing anything that escapes it.
pub fn upload_path(root: &Path, name: &str) -> Result<PathBuf> {
    let relative = name
        .strip_prefix(UPLOADS_PREFIX)
        .unwrap_or(name)
        .trim_start_matches('/');

    let relative_path = Path::new(relative);
    let escapes = relative.is_empty()
        || relative_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));

    if escapes {
        return Err(PaperpageError::SourceUnavailable(format!(
            "{name}: not a file under the uploads directory"
        )));
    }

    Ok(root.join(relative_path))
}

/// Compute SHA-256 hash of content.
fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(uploads_root: PathBuf, hosting_api_base: String) -> ResolverConfig {
        ResolverConfig {
            uploads_root,
            fetch_timeout_secs: 5,
            max_redirects: 3,
            hosting_api_base,
            hosting_token: None,
            default_ref: "main".into(),
        }
    }

    fn temp_uploads() -> tempfile::TempDir {
        tempfile::tempdir().expect("temp dir")
    }

    #[test]
    fn upload_path_rejects_traversal() {
        let root = PathBuf::from("/srv/uploads");
        assert_eq!(
            upload_path(&root, "paper.pdf").unwrap(),
            PathBuf::from("/srv/uploads/paper.pdf")
        );
        assert_eq!(
            upload_path(&root, "/uploads/2024/paper.pdf").unwrap(),
            PathBuf::from("/srv/uploads/2024/paper.pdf")
        );
        assert!(upload_path(&root, "../etc/passwd").is_err());
        assert!(upload_path(&root, "a/../../b.pdf").is_err());
        assert!(upload_path(&root, "").is_err());
    }

    #[test]
    fn ssrf_blocks_private_targets() {
        assert!(is_ssrf_target(&Url::parse("http://127.0.0.1:8080/a.pdf").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://10.1.2.3/a.pdf").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://localhost/a.pdf").unwrap()));
        assert!(!is_ssrf_target(&Url::parse("https://arxiv.org/pdf/1").unwrap()));
    }

    #[tokio::test]
    async fn local_upload_resolves_first() {
        let dir = temp_uploads();
        std::fs::write(dir.path().join("paper.pdf"), b"%PDF-1.4 local").unwrap();

        let resolver =
            SourceResolver::new(test_config(dir.path().to_path_buf(), "http://unused".into()))
                .unwrap();
        let source = SourceDescriptor::new(SourceKind::Pdf, "/uploads/paper.pdf");
        let resolved = resolver.resolve(&source).await.unwrap();

        assert_eq!(resolved.resolved_from, ResolvedFrom::Local);
        assert_eq!(resolved.bytes, b"%PDF-1.4 local");
        assert_eq!(resolved.sha256.len(), 64);
    }

    #[tokio::test]
    async fn missing_upload_is_unavailable() {
        let dir = temp_uploads();
        let resolver =
            SourceResolver::new(test_config(dir.path().to_path_buf(), "http://unused".into()))
                .unwrap();
        let source = SourceDescriptor::new(SourceKind::Pdf, "nope.pdf");

        let err = resolver.resolve(&source).await.unwrap_err();
        assert!(matches!(err, PaperpageError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn direct_fetch_returns_bytes() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/papers/a.pdf"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.7 remote".to_vec()),
            )
            .mount(&server)
            .await;

        let dir = temp_uploads();
        let resolver = SourceResolver::new(test_config(dir.path().to_path_buf(), server.uri()))
            .unwrap()
            .allow_localhost();
        let source =
            SourceDescriptor::new(SourceKind::Pdf, format!("{}/papers/a.pdf", server.uri()));
        let resolved = resolver.resolve(&source).await.unwrap();

        assert_eq!(resolved.resolved_from, ResolvedFrom::Direct);
        assert_eq!(resolved.bytes, b"%PDF-1.7 remote");
        assert_eq!(resolved.content_type.as_deref(), Some("application/pdf"));
    }

    #[tokio::test]
    async fn refused_fetch_without_hosting_pattern_passes_status_through() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let dir = temp_uploads();
        let resolver = SourceResolver::new(test_config(dir.path().to_path_buf(), server.uri()))
            .unwrap()
            .allow_localhost();
        let locator = format!("{}/private.pdf", server.uri());
        let source = SourceDescriptor::new(SourceKind::Pdf, locator.clone());

        let err = resolver.resolve(&source).await.unwrap_err();
        assert_eq!(err.to_string(), format!("{locator}: HTTP 403 Forbidden"));
    }

    #[tokio::test]
    async fn refused_hosted_file_falls_back_to_hosting_api() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/acme/widget/blob/main/paper.pdf"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/repos/acme/widget/contents/paper.pdf"))
            .and(wiremock::matchers::query_param("ref", "main"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "encoding": "base64", "content": "JVBERi0xLjcg\nZGF0YQ==" }),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let dir = temp_uploads();
        let resolver = SourceResolver::new(test_config(dir.path().to_path_buf(), server.uri()))
            .unwrap()
            .allow_localhost()
            .with_blob_host("127.0.0.1");
        let source = SourceDescriptor::new(
            SourceKind::Pdf,
            format!("{}/acme/widget/blob/main/paper.pdf", server.uri()),
        );
        let resolved = resolver.resolve(&source).await.unwrap();

        assert_eq!(resolved.resolved_from, ResolvedFrom::HostingApi);
        assert_eq!(resolved.bytes, b"%PDF-1.7 data");
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = temp_uploads();
        let resolver = SourceResolver::new(test_config(dir.path().to_path_buf(), server.uri()))
            .unwrap()
            .allow_localhost();
        let source = SourceDescriptor::new(SourceKind::Youtube, format!("{}/watch", server.uri()));

        let err = resolver.resolve(&source).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn repository_readme_comes_from_hosting_api() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/repos/acme/tool/contents/README.md"))
            .and(wiremock::matchers::query_param("ref", "main"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(
                serde_json::json!({ "encoding": "base64", "content": "IyBUb29s" }),
            ))
            .mount(&server)
            .await;

        let dir = temp_uploads();
        let resolver =
            SourceResolver::new(test_config(dir.path().to_path_buf(), server.uri())).unwrap();
        let source = SourceDescriptor::new(SourceKind::Github, "https://github.com/acme/tool");
        let resolved = resolver.resolve(&source).await.unwrap();

        assert_eq!(resolved.resolved_from, ResolvedFrom::HostingApi);
        assert_eq!(resolved.bytes, b"# Tool");
    }

    #[tokio::test]
    async fn non_repository_url_is_unavailable() {
        let dir = temp_uploads();
        let resolver =
            SourceResolver::new(test_config(dir.path().to_path_buf(), "http://unused".into()))
                .unwrap();
        let source = SourceDescriptor::new(SourceKind::Github, "https://gitlab.com/acme/tool");

        let err = resolver.resolve(&source).await.unwrap_err();
        assert!(err.to_string().contains("not a recognised repository URL"));
    }
}
