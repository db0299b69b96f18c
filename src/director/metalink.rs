//! Director routing headers.
//!
//! The director answers object lookups with an RFC 8288 style `Link` header
//! listing the caches (or dirlist hosts) able to serve the object:
//!
//! ```text
//! Link: <https://cache-a.example.org:8443/ns/obj>; rel="duplicate"; pri=1; depth=2,
//!       <https://cache-b.example.org/ns/obj>; rel="duplicate"; pri=2; depth=2
//! X-Pelican-Namespace: namespace=/ns, require-token=false
//! ```

use reqwest::Url;
use tracing::debug;

/// Header carrying the namespace that owns the requested path.
pub const NAMESPACE_HEADER: &str = "X-Pelican-Namespace";

/// One target from a `Link` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetalinkEntry {
    pub url: Url,
    /// `pri` parameter; lower is preferred.
    pub priority: Option<u32>,
    /// `depth` parameter: number of path components of the namespace.
    pub depth: Option<u32>,
}

/// Namespace details from [`NAMESPACE_HEADER`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceInfo {
    pub prefix: Option<String>,
    pub require_token: bool,
}

/// Parse a `Link` header into entries ranked by ascending priority.
///
/// The sort is stable, so equal priorities keep header order; entries
/// without a `pri` sort after every prioritized entry. Targets that are not
/// absolute URLs are skipped.
pub fn parse_link_header(value: &str) -> Vec<MetalinkEntry> {
    let mut entries = Vec::new();
    let mut rest = value;

    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('>') else {
            break;
        };
        let target = after[..end].trim();
        let tail = &after[end + 1..];
        let params_end = tail.find('<').unwrap_or(tail.len());
        let params = &tail[..params_end];
        rest = &tail[params_end..];

        let url = match Url::parse(target) {
            Ok(url) => url,
            Err(e) => {
                debug!(target, error = %e, "skipping unparseable Link target");
                continue;
            }
        };

        let mut entry = MetalinkEntry {
            url,
            priority: None,
            depth: None,
        };
        for param in params.split(';') {
            let param = param.trim().trim_end_matches(',').trim();
            let Some((key, val)) = param.split_once('=') else {
                continue;
            };
            let val = val.trim().trim_matches('"');
            match key.trim().to_ascii_lowercase().as_str() {
                "pri" => entry.priority = val.parse().ok(),
                "depth" => entry.depth = val.parse().ok(),
                _ => {}
            }
        }
        entries.push(entry);
    }

    entries.sort_by_key(|entry| (entry.priority.is_none(), entry.priority.unwrap_or(0)));
    entries
}

/// Parse `namespace=/ns, require-token=true, ...`.
pub fn parse_namespace_header(value: &str) -> NamespaceInfo {
    let mut info = NamespaceInfo::default();
    for field in value.split(',') {
        let Some((key, val)) = field.split_once('=') else {
            continue;
        };
        let val = val.trim().trim_matches('"');
        match key.trim().to_ascii_lowercase().as_str() {
            "namespace" if !val.is_empty() => info.prefix = Some(val.to_string()),
            "require-token" => info.require_token = val.eq_ignore_ascii_case("true"),
            _ => {}
        }
    }
    info
}
