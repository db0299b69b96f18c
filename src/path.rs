//! Federation paths, resolved once at the API boundary.
//!
//! Callers may hand the filesystem either a bare object path
//! (`/ospool/data/file.dat?authz=...`) or a federation URL
//! (`pelican://osg-htc.org/ospool/data/file.dat`, `osdf:///ospool/data/file.dat`).
//! [`FederationPath::parse`] turns both into an [`ObjectPath`] plus, for URLs,
//! the discovery location of the federation they name. Everything past the
//! boundary works on [`ObjectPath`] only.

use std::fmt;

use reqwest::Url;

use crate::{PelicanError, Result};

/// Discovery host of the Open Science Data Federation.
pub const OSDF_DISCOVERY_HOST: &str = "osg-htc.org";

/// An absolute object path inside a federation, with its optional query.
///
/// The query (typically an `authz=` token) travels with the path to the
/// director and to every cache the object is requested from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPath {
    path: String,
    query: Option<String>,
}

impl ObjectPath {
    /// Parse `"/ns/object?query"`. A missing leading slash is added.
    pub fn new(input: &str) -> Result<Self> {
        let input = input.split('#').next().unwrap_or_default();
        let (path, query) = match input.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (input, None),
        };
        if path.is_empty() {
            return Err(PelicanError::InvalidPath(format!(
                "empty object path in '{input}'"
            )));
        }
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        Ok(Self {
            path,
            query: query.filter(|q| !q.is_empty()).map(str::to_string),
        })
    }

    /// The path component, always starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The query string, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Join onto `base` replacing its path (host and scheme are kept).
    pub fn join_onto(&self, base: &Url) -> Result<Url> {
        base.join(&self.to_string())
            .map_err(|e| PelicanError::InvalidPath(format!("cannot join {self} onto {base}: {e}")))
    }

    /// Join underneath `base`'s path, e.g. a director URL ending in `/`.
    pub fn join_under(&self, base: &Url) -> Result<Url> {
        let relative = self.to_string();
        base.join(relative.trim_start_matches('/'))
            .map_err(|e| PelicanError::InvalidPath(format!("cannot join {self} under {base}: {e}")))
    }

    /// Replace `url`'s query with this path's query.
    pub fn apply_query(&self, url: &mut Url) {
        url.set_query(self.query());
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.query {
            Some(query) => write!(f, "{}?{query}", self.path),
            None => f.write_str(&self.path),
        }
    }
}

/// A caller-supplied location, classified once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FederationPath {
    /// A bare absolute path in the filesystem's own federation.
    Path(ObjectPath),
    /// A URL naming its federation explicitly.
    FederationUrl {
        /// Discovery URL of the named federation (`pelican://host[:port]`).
        discovery: Url,
        object: ObjectPath,
    },
}

impl FederationPath {
    /// Classify `input`.
    ///
    /// - `/path` → [`FederationPath::Path`]
    /// - `osdf://path` or `osdf:///path` → the OSDF federation
    /// - `pelican://host/path`, or `host/path` with no scheme → that host's federation
    pub fn parse(input: &str) -> Result<Self> {
        if input.starts_with('/') {
            return Ok(Self::Path(ObjectPath::new(input)?));
        }

        if let Some(rest) = input.strip_prefix("osdf://") {
            let discovery = discovery_url(OSDF_DISCOVERY_HOST)?;
            return Ok(Self::FederationUrl {
                discovery,
                object: ObjectPath::new(rest.trim_start_matches('/'))?,
            });
        }

        let rest = match input.strip_prefix("pelican://") {
            Some(rest) => rest,
            None if input.contains("://") => {
                return Err(PelicanError::InvalidPath(format!(
                    "unsupported URL scheme in '{input}'"
                )));
            }
            None => input,
        };
        let (host, object) = match rest.find(['/', '?']) {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        if host.is_empty() {
            return Err(PelicanError::InvalidPath(format!(
                "federation URL without a host: '{input}'"
            )));
        }
        let object = if object.starts_with('?') {
            format!("/{object}")
        } else {
            object.to_string()
        };

        Ok(Self::FederationUrl {
            discovery: discovery_url(host)?,
            object: ObjectPath::new(&object)?,
        })
    }

    /// The object path, whichever shape the input had.
    pub fn object(&self) -> &ObjectPath {
        match self {
            Self::Path(object) | Self::FederationUrl { object, .. } => object,
        }
    }

    /// The explicitly named federation, if any.
    pub fn discovery(&self) -> Option<&Url> {
        match self {
            Self::Path(_) => None,
            Self::FederationUrl { discovery, .. } => Some(discovery),
        }
    }
}

fn discovery_url(host: &str) -> Result<Url> {
    Url::parse(&format!("pelican://{host}/"))
        .map_err(|e| PelicanError::InvalidPath(format!("invalid federation host '{host}': {e}")))
}

/// Whether two discovery URLs name the same federation (host and port,
/// case-insensitive host; scheme is ignored).
pub fn same_federation(a: &Url, b: &Url) -> bool {
    let host = |u: &Url| u.host_str().map(str::to_ascii_lowercase);
    host(a) == host(b) && a.port() == b.port()
}

/// Strip scheme and host from a URL, leaving the federation-relative path
/// (and query). Inputs that are not absolute URLs are returned unchanged.
pub fn federation_relative(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) if parsed.has_host() => match parsed.query() {
            Some(query) => format!("{}?{query}", parsed.path()),
            None => parsed.path().to_string(),
        },
        _ => url.to_string(),
    }
}
