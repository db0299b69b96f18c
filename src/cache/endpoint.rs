//! Normalized cache identities.

use std::fmt;

use reqwest::Url;

use crate::path::ObjectPath;
use crate::{PelicanError, Result};

/// A cache reduced to `scheme://host[:port]`.
///
/// Path, query, fragment and credentials are dropped, the host is
/// lower-cased and a default port (`:443` for https, `:80` for http) is
/// elided, so `https://Cache.example.org:443/ns/obj?x` and
/// `https://cache.example.org` are the same endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheEndpoint {
    key: String,
    base: Url,
}

impl CacheEndpoint {
    /// Parse and normalize a cache URL.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input).map_err(|e| {
            PelicanError::Configuration(format!("invalid cache URL '{input}': {e}"))
        })?;
        Self::from_url(&url)
    }

    /// Normalize an already-parsed URL. Only `http` and `https` are accepted.
    pub fn from_url(url: &Url) -> Result<Self> {
        if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
            return Err(PelicanError::Configuration(format!(
                "unsupported cache URL '{url}': expected http(s)://host[:port]"
            )));
        }
        let key = url.origin().ascii_serialization();
        let base = Url::parse(&key)
            .map_err(|e| PelicanError::Configuration(format!("invalid cache origin '{key}': {e}")))?;
        Ok(Self { key, base })
    }

    /// The normalized identity, e.g. `https://cache.example.org`.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// The endpoint as a URL with an empty (`/`) path.
    pub fn url(&self) -> &Url {
        &self.base
    }

    /// Build the URL of `object` on this cache.
    pub fn object_url(&self, object: &ObjectPath) -> Result<Url> {
        object.join_onto(&self.base)
    }
}

impl fmt::Display for CacheEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Normalize a URL string to its [`CacheEndpoint`] identity.
pub fn normalize(url: &str) -> Result<String> {
    CacheEndpoint::parse(url).map(|endpoint| endpoint.key)
}
