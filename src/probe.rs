//! Cache liveness probing and preferred-cache splicing.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Url};
use tracing::{debug, warn};

use crate::cache::CacheEndpoint;
use crate::path::ObjectPath;
use crate::telemetry;
use crate::{PelicanError, Result};

/// Default timeout of one HEAD probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Preferred-cache sentinel meaning "the director's caches go here".
pub const DISCOVERED_SENTINEL: &str = "+";

/// One entry of the user's preferred-cache list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreferredCache {
    /// A cache to try at this position.
    Cache(Url),
    /// Splice the director-discovered caches in at this position.
    Discovered,
}

impl PreferredCache {
    /// Parse a cache URL or the `"+"` sentinel.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input == DISCOVERED_SENTINEL {
            return Ok(Self::Discovered);
        }
        let url = Url::parse(input).map_err(|e| {
            PelicanError::Configuration(format!("invalid preferred cache '{input}': {e}"))
        })?;
        // Validates the scheme and host.
        CacheEndpoint::from_url(&url)?;
        Ok(Self::Cache(url))
    }

    /// Parse a whole list.
    pub fn parse_list<I, S>(inputs: I) -> Result<Vec<Self>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        inputs
            .into_iter()
            .map(|input| Self::parse(input.as_ref()))
            .collect()
    }
}

impl fmt::Display for PreferredCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache(url) => write!(f, "{url}"),
            Self::Discovered => f.write_str(DISCOVERED_SENTINEL),
        }
    }
}

/// Whether the director must be asked given this preferred list.
pub fn needs_discovery(preferred: &[PreferredCache]) -> bool {
    preferred.is_empty() || preferred.contains(&PreferredCache::Discovered)
}

/// Build the ordered candidate list for `object`.
///
/// Without preferences the discovered candidates are used as-is. Otherwise
/// each preferred cache is joined with the object path and query, and the
/// discovered candidates replace the `"+"` entry. Later entries that name an
/// endpoint already in the list are dropped.
pub fn splice_candidates(
    preferred: &[PreferredCache],
    object: &ObjectPath,
    discovered: &[Url],
) -> Result<Vec<Url>> {
    if preferred.is_empty() {
        return Ok(discovered.to_vec());
    }

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |url: Url, out: &mut Vec<Url>| match CacheEndpoint::from_url(&url) {
        Ok(endpoint) => {
            if seen.insert(endpoint.as_str().to_string()) {
                out.push(url);
            }
        }
        Err(e) => debug!(url = %url, error = %e, "dropping non-cache candidate"),
    };

    for entry in preferred {
        match entry {
            PreferredCache::Cache(cache) => push(object.join_onto(cache)?, &mut out),
            PreferredCache::Discovered => {
                for url in discovered {
                    push(url.clone(), &mut out);
                }
            }
        }
    }
    Ok(out)
}

/// Result of a successful probe round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingCache {
    /// The first candidate that answered.
    pub url: Url,
    /// That candidate and every later one, in original order.
    pub cache_list: Vec<Url>,
}

/// HEAD-probes candidates in order and returns the first live one.
#[derive(Debug, Clone)]
pub struct CacheProber {
    http: Client,
    timeout: Duration,
    authorization: Option<String>,
}

impl CacheProber {
    /// Create a prober with the given per-probe timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| PelicanError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            timeout,
            authorization: None,
        })
    }

    /// Send this `Authorization` header value with every probe.
    pub fn with_authorization(mut self, authorization: Option<String>) -> Self {
        self.authorization = authorization;
        self
    }

    /// The per-probe timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe `candidates` in order.
    ///
    /// A 2xx or 3xx answer within the timeout counts as alive; connection
    /// errors, timeouts and 4xx/5xx move on to the next candidate. Fails with
    /// [`PelicanError::NoAvailableSource`] when none answers.
    pub async fn find_working_cache(&self, candidates: &[Url]) -> Result<WorkingCache> {
        for (idx, candidate) in candidates.iter().enumerate() {
            if self.probe(candidate).await {
                return Ok(WorkingCache {
                    url: candidate.clone(),
                    cache_list: candidates[idx..].to_vec(),
                });
            }
        }
        warn!(candidates = candidates.len(), "no cache answered the probe");
        Err(PelicanError::NoAvailableSource(format!(
            "none of {} candidate caches responded",
            candidates.len()
        )))
    }

    /// Probe a single URL.
    pub async fn probe(&self, url: &Url) -> bool {
        let mut request = self.http.head(url.clone()).timeout(self.timeout);
        if let Some(value) = &self.authorization {
            request = request.header(AUTHORIZATION, value);
        }

        let alive = match request.send().await {
            Ok(response) => {
                let status = response.status();
                let alive = status.is_success() || status.is_redirection();
                debug!(cache = %url, status = status.as_u16(), alive, "probed cache");
                alive
            }
            Err(e) => {
                debug!(cache = %url, error = %e, "cache probe failed");
                false
            }
        };

        let status = if alive { "ok" } else { "error" };
        metrics::counter!(telemetry::PROBES_TOTAL, "status" => status).increment(1);
        alive
    }
}
