//! Federation discovery and director lookups.
//!
//! The director is the federation service that knows which caches and
//! origins serve a namespace. All lookups go through [`DirectorClient`]:
//!
//! ```text
//!   discovery URL ──GET /.well-known/pelican-configuration──► director_endpoint   (once)
//!
//!   GET      <director>/<path>                        ──► Link + X-Pelican-Namespace   (caches)
//!   GET      <director>/api/v1.0/director/origin/<path> ──► Location                 (origin)
//!   PROPFIND <director>/<path>                        ──► Link                        (dirlist host)
//! ```
//!
//! Redirects are never followed: the routing information lives in the
//! headers of the director's redirect response itself.

pub mod metalink;

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, LINK, LOCATION};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use self::metalink::{NAMESPACE_HEADER, parse_link_header, parse_namespace_header};
use crate::path::{ObjectPath, same_federation};
use crate::telemetry;
use crate::{PelicanError, Result};

/// Path of the federation discovery document.
pub const WELL_KNOWN_PATH: &str = "/.well-known/pelican-configuration";

/// Director API prefix for origin lookups.
pub const ORIGIN_API_PATH: &str = "/api/v1.0/director/origin/";

/// Default timeout for discovery and director requests.
pub const DEFAULT_DIRECTOR_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for dirlist (`PROPFIND`) lookups.
pub const DEFAULT_DIRLIST_TIMEOUT: Duration = Duration::from_secs(5);

/// The federation discovery document.
#[derive(Debug, Clone, Deserialize)]
pub struct FederationMetadata {
    #[serde(default)]
    pub director_endpoint: String,
    #[serde(default)]
    pub namespace_registration_endpoint: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub broker_endpoint: Option<String>,
}

/// Ranked caches for one object and the namespace that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResult {
    /// Object URLs on each candidate cache, most preferred first.
    pub candidates: Vec<Url>,
    /// Namespace prefix the caches are authoritative for.
    pub namespace: String,
    /// Whether the namespace requires a token for reads.
    pub require_token: bool,
}

struct Federation {
    metadata: FederationMetadata,
    director: Url,
}

/// Client for the federation's discovery endpoint and director.
///
/// The discovery URL may be supplied up front or bound later by the first
/// federation URL the filesystem sees. The discovery document is fetched
/// once and memoized; concurrent first callers share a single fetch, and a
/// failed fetch leaves nothing behind so the next call tries again.
pub struct DirectorClient {
    http: Client,
    discovery: OnceLock<Url>,
    federation: OnceCell<Federation>,
    authorization: Option<String>,
    timeout: Duration,
    dirlist_timeout: Duration,
}

impl DirectorClient {
    /// Create a client, optionally bound to a federation discovery URL.
    ///
    /// Accepts `pelican://host`, `osdf://`, `https://host[:port]`,
    /// `http://host[:port]` or a bare `host`.
    pub fn new(discovery_url: Option<&str>) -> Result<Self> {
        let http = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| PelicanError::Configuration(format!("failed to build HTTP client: {e}")))?;

        let discovery = OnceLock::new();
        if let Some(url) = discovery_url.filter(|u| !u.is_empty()) {
            let _ = discovery.set(parse_discovery_url(url)?);
        }

        Ok(Self {
            http,
            discovery,
            federation: OnceCell::new(),
            authorization: None,
            timeout: DEFAULT_DIRECTOR_TIMEOUT,
            dirlist_timeout: DEFAULT_DIRLIST_TIMEOUT,
        })
    }

    /// Send this `Authorization` header value with every request.
    pub fn with_authorization(mut self, authorization: Option<String>) -> Self {
        self.authorization = authorization;
        self
    }

    /// Timeout for discovery, cache and origin lookups.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Timeout for dirlist lookups.
    pub fn with_dirlist_timeout(mut self, timeout: Duration) -> Self {
        self.dirlist_timeout = timeout;
        self
    }

    /// The bound discovery URL, if any.
    pub fn discovery_url(&self) -> Option<&Url> {
        self.discovery.get()
    }

    /// Bind to `discovery` if unbound; otherwise check it names the bound
    /// federation.
    pub fn bind_federation(&self, discovery: &Url) -> Result<()> {
        let bound = self.discovery.get_or_init(|| discovery.clone());
        if same_federation(bound, discovery) {
            Ok(())
        } else {
            Err(PelicanError::InvalidMetadata(format!(
                "{discovery} is not part of federation {bound}"
            )))
        }
    }

    /// Fetch the federation discovery document (not memoized).
    pub async fn discover_federation_metadata(&self) -> Result<FederationMetadata> {
        let discovery = self.discovery.get().ok_or_else(|| {
            PelicanError::InvalidMetadata("no federation discovery URL configured".to_string())
        })?;
        let url = well_known_url(discovery)?;

        let result = self.fetch_metadata(&url).await;
        record_discovery("metadata", result.is_ok());
        result
    }

    /// The memoized discovery document.
    pub async fn federation_metadata(&self) -> Result<&FederationMetadata> {
        Ok(&self.federation().await?.metadata)
    }

    /// The memoized director base URL (always ends in `/`).
    pub async fn director_url(&self) -> Result<&Url> {
        Ok(&self.federation().await?.director)
    }

    /// Ask the director which caches serve `object`.
    pub async fn get_cache_candidates(&self, object: &ObjectPath) -> Result<DiscoveryResult> {
        let url = object.join_under(self.director_url().await?)?;
        let result = self.cache_candidates(object, url).await;
        record_discovery("cache", result.is_ok());
        result
    }

    /// Ask the director for the origin URL of `object`.
    pub async fn get_origin_url(&self, object: &ObjectPath) -> Result<Url> {
        let base = self
            .director_url()
            .await?
            .join(ORIGIN_API_PATH)
            .map_err(|e| PelicanError::InvalidMetadata(format!("invalid director URL: {e}")))?;
        let url = object.join_under(&base)?;
        let result = self.origin_url(object, url).await;
        record_discovery("origin", result.is_ok());
        result
    }

    /// Ask the director which host serves directory listings for `object`.
    pub async fn get_dirlist_endpoint(&self, object: &ObjectPath) -> Result<Url> {
        let url = object.join_under(self.director_url().await?)?;
        let result = self.dirlist_endpoint(object, url).await;
        record_discovery("dirlist", result.is_ok());
        result
    }

    async fn federation(&self) -> Result<&Federation> {
        self.federation
            .get_or_try_init(|| async {
                let metadata = self.discover_federation_metadata().await?;
                let director = director_base(&metadata.director_endpoint)?;
                info!(director = %director, "discovered federation director");
                Ok::<_, PelicanError>(Federation { metadata, director })
            })
            .await
    }

    async fn fetch_metadata(&self, url: &Url) -> Result<FederationMetadata> {
        let response = self
            .request(Method::GET, url.clone(), self.timeout)
            .send()
            .await
            .map_err(|e| PelicanError::InvalidMetadata(format!("failed to reach {url}: {e}")))?;

        if response.status() != StatusCode::OK {
            return Err(PelicanError::InvalidMetadata(format!(
                "{url} returned HTTP {}",
                response.status()
            )));
        }

        let body = response.text().await.map_err(|e| {
            PelicanError::InvalidMetadata(format!("failed to read discovery document: {e}"))
        })?;
        let metadata: FederationMetadata = serde_json::from_str(&body).map_err(|e| {
            PelicanError::InvalidMetadata(format!("failed to parse discovery document: {e}"))
        })?;

        if metadata.director_endpoint.is_empty() {
            return Err(PelicanError::InvalidMetadata(format!(
                "discovery document at {url} has no director_endpoint"
            )));
        }
        Ok(metadata)
    }

    async fn cache_candidates(&self, object: &ObjectPath, url: Url) -> Result<DiscoveryResult> {
        let response = self.request(Method::GET, url, self.timeout).send().await?;
        let headers = response.headers();

        let link = headers
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                PelicanError::BadDirectorResponse(format!(
                    "no Link header in director response for {} (HTTP {})",
                    object.path(),
                    response.status()
                ))
            })?;

        let candidates: Vec<Url> = parse_link_header(link)
            .into_iter()
            .map(|entry| {
                let mut url = entry.url;
                object.apply_query(&mut url);
                url
            })
            .collect();
        if candidates.is_empty() {
            return Err(PelicanError::BadDirectorResponse(format!(
                "director Link header for {} lists no usable caches",
                object.path()
            )));
        }

        let namespace = headers
            .get(NAMESPACE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(parse_namespace_header)
            .unwrap_or_default();

        debug!(
            path = object.path(),
            namespace = namespace.prefix.as_deref().unwrap_or("<none>"),
            candidates = candidates.len(),
            "director returned cache candidates"
        );

        Ok(DiscoveryResult {
            candidates,
            namespace: namespace
                .prefix
                .unwrap_or_else(|| object.path().to_string()),
            require_token: namespace.require_token,
        })
    }

    async fn origin_url(&self, object: &ObjectPath, url: Url) -> Result<Url> {
        let response = self
            .request(Method::GET, url.clone(), self.timeout)
            .send()
            .await?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                PelicanError::NoAvailableSource(format!(
                    "director returned no origin for {}",
                    object.path()
                ))
            })?;
        url.join(location).map_err(|e| {
            PelicanError::BadDirectorResponse(format!("invalid origin location '{location}': {e}"))
        })
    }

    async fn dirlist_endpoint(&self, object: &ObjectPath, url: Url) -> Result<Url> {
        let propfind = Method::from_bytes(b"PROPFIND")
            .map_err(|e| PelicanError::Http(format!("invalid method: {e}")))?;
        let response = self
            .request(propfind, url, self.dirlist_timeout)
            .send()
            .await?;

        let link = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                PelicanError::BadDirectorResponse(format!(
                    "no Link header in dirlist response for {}",
                    object.path()
                ))
            })?;

        parse_link_header(link)
            .into_iter()
            .next()
            .map(|entry| entry.url)
            .ok_or_else(|| {
                PelicanError::NoAvailableSource(format!(
                    "director returned no dirlist host for {}",
                    object.path()
                ))
            })
    }

    fn request(&self, method: Method, url: Url, timeout: Duration) -> RequestBuilder {
        let request = self.http.request(method, url).timeout(timeout);
        match &self.authorization {
            Some(value) => request.header(AUTHORIZATION, value),
            None => request,
        }
    }
}

/// Parse a user-supplied discovery location.
pub fn parse_discovery_url(input: &str) -> Result<Url> {
    let candidate = if input.contains("://") {
        input.to_string()
    } else {
        format!("pelican://{input}")
    };
    let url = Url::parse(&candidate).map_err(|e| {
        PelicanError::Configuration(format!("invalid federation discovery URL '{input}': {e}"))
    })?;
    if !url.has_host() {
        return Err(PelicanError::Configuration(format!(
            "federation discovery URL '{input}' has no host"
        )));
    }
    Ok(url)
}

/// The discovery document URL for a federation.
///
/// `http://` discovery URLs are honoured as-is; every other scheme
/// (`pelican`, `osdf`, `https`) is queried over HTTPS.
pub fn well_known_url(discovery: &Url) -> Result<Url> {
    let scheme = if discovery.scheme() == "http" { "http" } else { "https" };
    let host = discovery.host_str().ok_or_else(|| {
        PelicanError::InvalidMetadata(format!("discovery URL {discovery} has no host"))
    })?;
    let port = discovery.port().map(|p| format!(":{p}")).unwrap_or_default();
    Url::parse(&format!("{scheme}://{host}{port}{WELL_KNOWN_PATH}")).map_err(|e| {
        PelicanError::InvalidMetadata(format!("invalid discovery URL {discovery}: {e}"))
    })
}

fn director_base(endpoint: &str) -> Result<Url> {
    let endpoint = if endpoint.ends_with('/') {
        endpoint.to_string()
    } else {
        format!("{endpoint}/")
    };
    Url::parse(&endpoint).map_err(|e| {
        PelicanError::InvalidMetadata(format!("invalid director_endpoint '{endpoint}': {e}"))
    })
}

fn record_discovery(kind: &'static str, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!(telemetry::DISCOVERIES_TOTAL,
        "kind" => kind,
        "status" => status,
    )
    .increment(1);
}
