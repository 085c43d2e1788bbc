//! OCI distribution registry adapter.
//!
//! Tag listing and manifest/config reads go through `oci-distribution`,
//! which performs the registry's token handshake. The distribution API has
//! no batch delete, so manifests are deleted one digest at a time over
//! `reqwest`, answering a `WWW-Authenticate: Bearer` challenge when the
//! registry sends one.
//!
//! Tag listing never returns untagged manifests, so this adapter reports no
//! untagged images. Use the ECR adapter when untagged images matter.

use std::collections::HashMap;

use a3s_reaper_core::error::{ReaperError, Result};
use a3s_reaper_core::RunConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::errors::{OciDistributionError, OciErrorCode};
use oci_distribution::manifest::{OciImageManifest, OciManifest};
use oci_distribution::secrets::RegistryAuth as OciAuth;
use oci_distribution::{Client, Reference};
use parking_lot::Mutex;
use reqwest::header::WWW_AUTHENTICATE;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use super::{DeleteResponse, ImagePage, ImageRecord, RegistryService, RejectedImage};

/// Tags requested per listing page.
const PAGE_SIZE: usize = 100;

const USERNAME_VAR: &str = "REGISTRY_USERNAME";
const PASSWORD_VAR: &str = "REGISTRY_PASSWORD";

/// Credentials presented to the registry and its token service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RegistryCredentials {
    #[default]
    Anonymous,
    Basic { username: String, password: String },
}

impl RegistryCredentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        RegistryCredentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `REGISTRY_USERNAME` / `REGISTRY_PASSWORD` as returned by `lookup`.
    ///
    /// Anonymous unless both are set and non-empty.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.is_empty());
        match (value(USERNAME_VAR), value(PASSWORD_VAR)) {
            (Some(username), Some(password)) => Self::basic(username, password),
            _ => RegistryCredentials::Anonymous,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn to_oci(&self) -> OciAuth {
        match self {
            RegistryCredentials::Basic { username, password } => {
                OciAuth::Basic(username.clone(), password.clone())
            }
            RegistryCredentials::Anonymous => OciAuth::Anonymous,
        }
    }

    fn apply_basic(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            RegistryCredentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            RegistryCredentials::Anonymous => request,
        }
    }
}

/// Registry host as it appears in references, plus the URL scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    host: String,
    insecure: bool,
}

impl Endpoint {
    /// The endpoint override when given, the registry itself otherwise.
    /// Only an explicit `http://` prefix selects plain HTTP.
    fn resolve(registry: &str, endpoint: Option<&str>) -> Self {
        let raw = endpoint.unwrap_or(registry).trim().trim_end_matches('/');
        match raw.strip_prefix("http://") {
            Some(host) => Self {
                host: host.to_string(),
                insecure: true,
            },
            None => Self {
                host: raw.strip_prefix("https://").unwrap_or(raw).to_string(),
                insecure: false,
            },
        }
    }

    fn base_url(&self) -> String {
        let scheme = if self.insecure { "http" } else { "https" };
        format!("{}://{}", scheme, self.host)
    }
}

#[derive(Debug, Deserialize)]
struct ImageConfigDoc {
    #[serde(default)]
    created: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    code: String,
    #[serde(default)]
    message: String,
}

impl ErrorBody {
    fn summary(body: &str, status: StatusCode) -> String {
        let parsed: Self = serde_json::from_str(body).unwrap_or_default();
        match parsed.errors.first() {
            Some(e) if e.message.is_empty() => e.code.clone(),
            Some(e) => format!("{}: {}", e.code, e.message),
            None => format!("HTTP {}", status.as_u16()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Parameters of a `WWW-Authenticate: Bearer` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BearerChallenge {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

impl BearerChallenge {
    fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for (key, value) in challenge_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }

        Some(Self {
            realm: realm?,
            service,
            scope,
        })
    }
}

/// `key=value` pairs of a challenge. Commas inside quotes stay in the value.
fn challenge_params(params: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = params.trim();

    while let Some((key, after)) = rest.split_once('=') {
        let key = key.trim().to_string();
        let after = after.trim_start();
        let (value, remainder) = match after.strip_prefix('"') {
            Some(quoted) => quoted.split_once('"').unwrap_or((quoted, "")),
            None => match after.split_once(',') {
                Some((value, remainder)) => (value.trim(), remainder),
                None => (after.trim(), ""),
            },
        };
        pairs.push((key, value.to_string()));
        rest = remainder.trim_start().trim_start_matches(',').trim_start();
    }

    pairs
}

/// A tag resolved to the image it points at.
struct ResolvedTag {
    digest: String,
    size_bytes: u64,
    /// `None` when the image config carries no creation time
    pushed_at: Option<DateTime<Utc>>,
}

/// Registry client for the OCI distribution API.
pub struct DistributionRegistry {
    client: Client,
    http: reqwest::Client,
    endpoint: Endpoint,
    credentials: RegistryCredentials,
    /// Bearer tokens for delete calls, by repository
    delete_tokens: Mutex<HashMap<String, String>>,
}

impl DistributionRegistry {
    /// Create a client with anonymous access.
    pub fn new(registry: &str, endpoint: Option<&str>) -> Self {
        Self::with_credentials(registry, endpoint, RegistryCredentials::Anonymous)
    }

    pub fn with_credentials(
        registry: &str,
        endpoint: Option<&str>,
        credentials: RegistryCredentials,
    ) -> Self {
        let endpoint = Endpoint::resolve(registry, endpoint);
        let protocol = if endpoint.insecure {
            ClientProtocol::Http
        } else {
            ClientProtocol::Https
        };
        let client = Client::new(ClientConfig {
            protocol,
            ..Default::default()
        });

        Self {
            client,
            http: reqwest::Client::new(),
            endpoint,
            credentials,
            delete_tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Create a client for a run, taking credentials from the environment.
    pub fn from_config(config: &RunConfig) -> Self {
        Self::with_credentials(
            &config.registry,
            config.endpoint.as_deref(),
            RegistryCredentials::from_env(),
        )
    }

    pub fn base_url(&self) -> String {
        self.endpoint.base_url()
    }

    fn unavailable(&self, what: &str, err: impl std::fmt::Display) -> ReaperError {
        ReaperError::unavailable(self.endpoint.host.clone(), format!("Failed to {}: {}", what, err))
    }

    fn tag_reference(&self, repository: &str, tag: &str) -> Reference {
        Reference::with_tag(
            self.endpoint.host.clone(),
            repository.to_string(),
            tag.to_string(),
        )
    }

    /// Resolve a tag to its digest, size, and creation time.
    ///
    /// Returns `None` when the tag vanished between listing and resolution.
    async fn resolve_tag(&self, repository: &str, tag: &str) -> Result<Option<ResolvedTag>> {
        let auth = self.credentials.to_oci();
        let reference = self.tag_reference(repository, tag);

        let (manifest, digest) = match self.client.pull_manifest(&reference, &auth).await {
            Ok(pulled) => pulled,
            Err(e) if is_missing(&e) => {
                tracing::warn!(repository, tag, "Tag disappeared while listing");
                return Ok(None);
            }
            Err(e) => {
                return Err(self.unavailable(&format!("fetch manifest {}:{}", repository, tag), e))
            }
        };

        let Some(image_digest) = config_manifest_digest(&manifest, &digest) else {
            tracing::warn!(repository, tag, %digest, "Image index lists no platform image");
            return Ok(Some(ResolvedTag {
                digest,
                size_bytes: 0,
                pushed_at: None,
            }));
        };

        let image_reference = Reference::with_digest(
            self.endpoint.host.clone(),
            repository.to_string(),
            image_digest,
        );
        let (image, _, config) = self
            .client
            .pull_manifest_and_config(&image_reference, &auth)
            .await
            .map_err(|e| self.unavailable(&format!("fetch image config {}:{}", repository, tag), e))?;

        Ok(Some(ResolvedTag {
            digest,
            size_bytes: image_size(&image),
            pushed_at: created_at(&config),
        }))
    }

    async fn send_delete(&self, url: &str, token: Option<&str>) -> std::result::Result<Response, String> {
        let request = self.http.delete(url);
        let request = match token {
            Some(token) => request.bearer_auth(token),
            None => self.credentials.apply_basic(request),
        };
        request.send().await.map_err(|e| e.to_string())
    }

    async fn fetch_token(
        &self,
        challenge: &BearerChallenge,
        repository: &str,
    ) -> std::result::Result<String, String> {
        let scope = challenge
            .scope
            .clone()
            .unwrap_or_else(|| format!("repository:{}:delete", repository));
        let mut query = vec![("scope", scope)];
        if let Some(service) = &challenge.service {
            query.push(("service", service.clone()));
        }

        let response = self
            .credentials
            .apply_basic(self.http.get(&challenge.realm).query(&query))
            .send()
            .await
            .map_err(|e| format!("token request failed: {}", e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("token request failed: HTTP {}", status.as_u16()));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid token response: {}", e))?;
        body.token
            .or(body.access_token)
            .ok_or_else(|| "token response carried no token".to_string())
    }

    /// Delete one manifest; the error is the reason the registry gave.
    async fn delete_manifest(&self, repository: &str, digest: &str) -> std::result::Result<(), String> {
        let url = format!(
            "{}/v2/{}/manifests/{}",
            self.endpoint.base_url(),
            repository,
            digest
        );

        let cached = self.delete_tokens.lock().get(repository).cloned();
        let mut response = self.send_delete(&url, cached.as_deref()).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .and_then(BearerChallenge::parse)
                .ok_or_else(|| "unauthorized".to_string())?;
            let token = self.fetch_token(&challenge, repository).await?;
            self.delete_tokens
                .lock()
                .insert(repository.to_string(), token.clone());
            response = self.send_delete(&url, Some(&token)).await?;
        }

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::ACCEPTED {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ErrorBody::summary(&body, status))
    }
}

#[async_trait]
impl RegistryService for DistributionRegistry {
    async fn list_images(&self, repository: &str, cursor: Option<&str>) -> Result<ImagePage> {
        let auth = self.credentials.to_oci();
        let reference = self.tag_reference(repository, "latest");

        tracing::debug!(repository, last = ?cursor, "Listing tags");

        let listing = match self
            .client
            .list_tags(&reference, &auth, Some(PAGE_SIZE), cursor)
            .await
        {
            Ok(listing) => listing,
            Err(e) if is_missing(&e) => {
                return Err(ReaperError::RepositoryNotFound {
                    repository: repository.to_string(),
                })
            }
            Err(e) => return Err(self.unavailable(&format!("list tags of {}", repository), e)),
        };

        let next_cursor = next_cursor(&listing.tags);
        // Without a creation time the image counts as pushed now and is kept.
        let now = Utc::now();

        let mut page = PageBuilder::default();
        for tag in listing.tags {
            if let Some(resolved) = self.resolve_tag(repository, &tag).await? {
                page.add_tag(
                    resolved.digest,
                    tag,
                    resolved.pushed_at.unwrap_or(now),
                    resolved.size_bytes,
                );
            }
        }

        Ok(ImagePage {
            images: page.finish(),
            next_cursor,
        })
    }

    async fn delete_images(&self, repository: &str, digests: &[String]) -> Result<DeleteResponse> {
        let mut response = DeleteResponse::default();

        for digest in digests {
            match self.delete_manifest(repository, digest).await {
                Ok(()) => response.removed.push(digest.clone()),
                Err(reason) => response.rejected.push(RejectedImage {
                    digest: digest.clone(),
                    reason,
                }),
            }
        }

        Ok(response)
    }
}

/// Groups tags resolving to the same digest into one record, first-seen order.
#[derive(Default)]
struct PageBuilder {
    images: Vec<ImageRecord>,
    by_digest: HashMap<String, usize>,
}

impl PageBuilder {
    fn add_tag(&mut self, digest: String, tag: String, pushed_at: DateTime<Utc>, size: u64) {
        match self.by_digest.get(&digest) {
            Some(&i) => self.images[i].tags.push(tag),
            None => {
                self.by_digest.insert(digest.clone(), self.images.len());
                self.images
                    .push(ImageRecord::new(digest, vec![tag], pushed_at, size));
            }
        }
    }

    fn finish(self) -> Vec<ImageRecord> {
        self.images
    }
}

/// A full page may have a successor; its last tag is the next `last` marker.
fn next_cursor(tags: &[String]) -> Option<String> {
    if tags.len() >= PAGE_SIZE {
        tags.last().cloned()
    } else {
        None
    }
}

/// Digest of the image manifest whose config holds the creation time.
///
/// An image manifest is its own answer. For an index, the first platform
/// entry is used; attestation entries (`unknown/unknown`) are skipped.
fn config_manifest_digest(manifest: &OciManifest, digest: &str) -> Option<String> {
    match manifest {
        OciManifest::Image(_) => Some(digest.to_string()),
        OciManifest::ImageIndex(index) => index
            .manifests
            .iter()
            .find(|entry| entry.platform.as_ref().map_or(true, |p| p.os != "unknown"))
            .map(|entry| entry.digest.clone()),
    }
}

fn image_size(manifest: &OciImageManifest) -> u64 {
    let layers: i64 = manifest.layers.iter().map(|l| l.size).sum();
    (manifest.config.size + layers).max(0) as u64
}

fn created_at(config: &str) -> Option<DateTime<Utc>> {
    serde_json::from_str::<ImageConfigDoc>(config)
        .ok()
        .and_then(|c| c.created)
}

/// Repository or manifest unknown to the registry.
fn is_missing(err: &OciDistributionError) -> bool {
    match err {
        OciDistributionError::RegistryError { envelope, .. } => envelope.errors.iter().any(|e| {
            matches!(
                e.code,
                OciErrorCode::NameUnknown | OciErrorCode::ManifestUnknown
            )
        }),
        OciDistributionError::ServerError { code, .. } => *code == 404,
        OciDistributionError::ImageManifestNotFoundError(_) => true,
        _ => false,
    }
}
