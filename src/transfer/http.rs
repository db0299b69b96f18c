//! HTTP(S) transfer backend.

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, RANGE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{ByteRange, ObjectInfo, TransferBackend};
use crate::{PelicanError, Result};

/// Plain HTTP access to caches, origins and dirlist hosts.
///
/// Redirects are followed. Directory listings are read from the HTML index
/// the server returns for a directory URL.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: Client,
    timeout: Option<Duration>,
    authorization: Option<String>,
}

impl HttpBackend {
    /// Create a backend. `timeout` bounds each whole request; `None` means
    /// no limit.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| PelicanError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            timeout,
            authorization: None,
        })
    }

    /// Send this `Authorization` header value with every request.
    pub fn with_authorization(mut self, authorization: Option<String>) -> Self {
        self.authorization = authorization;
        self
    }

    fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        let mut request = self.http.request(method, url.clone());
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        if let Some(value) = &self.authorization {
            request = request.header(AUTHORIZATION, value);
        }
        request
    }

    /// Map 404 to `NotFound` and any other 4xx/5xx to `Status`.
    fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PelicanError::NotFound(response.url().to_string()));
        }
        if status.is_client_error() || status.is_server_error() {
            return Err(PelicanError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl TransferBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn cat_file(&self, url: &Url, range: Option<ByteRange>) -> Result<Vec<u8>> {
        let mut request = self.request(Method::GET, url);
        if let Some(range) = range {
            match range.header_value() {
                Some(value) => request = request.header(RANGE, value),
                None => return Ok(Vec::new()),
            }
        }
        let response = request.send().await?;
        let status = response.status();

        // Unsatisfiable range: the start is at or past the end of the object.
        if range.is_some() && status == StatusCode::RANGE_NOT_SATISFIABLE {
            debug!(url = %url, "range starts past end of object");
            return Ok(Vec::new());
        }

        let response = Self::check_status(response)?;
        let body = response.bytes().await?;
        match range {
            Some(range) if status != StatusCode::PARTIAL_CONTENT => {
                debug!(url = %url, status = status.as_u16(), "server ignored Range header");
                Ok(slice_to_range(&body, range).to_vec())
            }
            _ => Ok(body.to_vec()),
        }
    }

    async fn exists(&self, url: &Url) -> Result<bool> {
        let response = self.request(Method::HEAD, url).send().await?;
        let status = response.status();
        debug!(url = %url, status = status.as_u16(), "exists check");
        Ok(!(status.is_client_error() || status.is_server_error()))
    }

    async fn info(&self, url: &Url) -> Result<ObjectInfo> {
        let response = Self::check_status(self.request(Method::HEAD, url).send().await?)?;
        let headers = response.headers();

        // Read the header directly: the decoded length of a HEAD body is 0.
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let mimetype = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string());

        let mut info = ObjectInfo::file(url.as_str(), size);
        info.mimetype = mimetype;
        info.url = Some(url.to_string());
        Ok(info)
    }

    async fn get_file(&self, url: &Url, dest: &Path) -> Result<u64> {
        let response = Self::check_status(self.request(Method::GET, url).send().await?)?;
        let mut file = File::create(dest).await?;
        match write_body(response, &mut file).await {
            Ok(written) => {
                debug!(url = %url, dest = %dest.display(), bytes = written, "downloaded object");
                Ok(written)
            }
            Err(e) => {
                drop(file);
                if let Err(rm) = tokio::fs::remove_file(dest).await {
                    warn!(dest = %dest.display(), error = %rm, "failed to remove partial download");
                }
                Err(e)
            }
        }
    }

    async fn ls(&self, url: &Url) -> Result<Vec<ObjectInfo>> {
        let response = Self::check_status(self.request(Method::GET, url).send().await?)?;
        let base = response.url().clone();
        let body = response.text().await?;
        Ok(parse_listing(&base, &body))
    }
}

async fn write_body(mut response: Response, file: &mut File) -> Result<u64> {
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// The part of a full object body covered by `range`.
fn slice_to_range(body: &[u8], range: ByteRange) -> &[u8] {
    let len = body.len();
    let start = usize::try_from(range.start).map_or(len, |s| s.min(len));
    let end = range
        .end
        .map_or(len, |e| usize::try_from(e).map_or(len, |e| e.min(len)));
    &body[start..end.max(start)]
}

/// Extract the entries of a directory index page.
///
/// Every `href` that resolves to a location strictly below `base` counts as
/// an entry; hrefs ending in `/` are directories. Duplicates are dropped.
pub fn parse_listing(base: &Url, body: &str) -> Vec<ObjectInfo> {
    let dir_path = base.path().trim_end_matches('/');
    let dir_prefix = format!("{dir_path}/");
    let mut entries: Vec<ObjectInfo> = Vec::new();

    for href in hrefs(body) {
        let Ok(mut target) = base.join(href) else {
            continue;
        };
        target.set_fragment(None);
        if target.origin() != base.origin() {
            continue;
        }
        let path = target.path();
        if !path.starts_with(&dir_prefix) || path.len() == dir_prefix.len() {
            continue;
        }
        if entries.iter().any(|e| e.name == target.as_str()) {
            continue;
        }
        let entry = if path.ends_with('/') {
            ObjectInfo::directory(target.as_str())
        } else {
            ObjectInfo::file(target.as_str(), None)
        };
        entries.push(entry);
    }
    entries
}

static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*["']?([^"'\s>]+)"#).expect("href pattern is valid")
});

fn hrefs(body: &str) -> impl Iterator<Item = &str> {
    HREF.captures_iter(body)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = concat!(
        r#"<link rel="stylesheet" type="text/css" href="/static/css/xrdhttp.css"/>"#,
        r#"<td class="name"><a href="/foo/bar/file1">file1</a></td>"#,
        r#"<td class="name"><a href="/foo/bar/file2">file2/a></td>"#,
        r#"<td class="name"><a href='sub/'>sub</a></td>"#,
        r#"<td class="name"><a href="/foo/bar/file1">again</a></td>"#,
        r#"<a href="/foo/bar/">self</a><a href="https://elsewhere.example.org/foo/bar/x">x</a>"#,
    );

    #[test]
    fn listing_keeps_only_children() {
        let base = Url::parse("https://cache.example.org/foo/bar").unwrap();
        let names: Vec<_> = parse_listing(&base, LISTING)
            .into_iter()
            .map(|e| (e.name, e.kind))
            .collect();
        assert_eq!(
            names,
            [
                ("https://cache.example.org/foo/bar/file1".to_string(), super::super::EntryKind::File),
                ("https://cache.example.org/foo/bar/file2".to_string(), super::super::EntryKind::File),
            ]
        );
    }

    #[test]
    fn relative_hrefs_resolve_against_trailing_slash_base() {
        let base = Url::parse("https://cache.example.org/foo/bar/").unwrap();
        let entries = parse_listing(&base, LISTING);
        assert!(entries.iter().any(|e| e.name == "https://cache.example.org/foo/bar/sub/" && e.is_dir()));
    }

    #[test]
    fn hrefs_tolerate_spacing_case_and_missing_quotes() {
        let body = r#"<a href = "/d/a">a</a><A HREF='/d/b'>b</A><a href=/d/c>c</a><a href=/d/e class=x>"#;
        assert_eq!(hrefs(body).collect::<Vec<_>>(), ["/d/a", "/d/b", "/d/c", "/d/e"]);
    }

    #[test]
    fn unquoted_hrefs_are_listed() {
        let base = Url::parse("https://cache.example.org/d/").unwrap();
        let entries = parse_listing(&base, "<a href=/d/file>file</a> <a href=sub/>sub</a>");
        assert_eq!(entries.len(), 2);
        assert!(!entries[0].is_dir());
        assert!(entries[1].is_dir());
    }

    #[test]
    fn slice_clamps_to_body() {
        let body = b"01234567";
        assert_eq!(slice_to_range(body, ByteRange::new(2, Some(4))), b"23");
        assert_eq!(slice_to_range(body, ByteRange::new(6, None)), b"67");
        assert_eq!(slice_to_range(body, ByteRange::new(6, Some(100))), b"67");
        assert!(slice_to_range(body, ByteRange::new(8, Some(12))).is_empty());
        assert!(slice_to_range(body, ByteRange::new(20, None)).is_empty());
    }

    #[test]
    fn page_without_links_is_empty() {
        let base = Url::parse("https://cache.example.org/foo/bar/file1").unwrap();
        assert!(parse_listing(&base, "file1").is_empty());
    }
}
