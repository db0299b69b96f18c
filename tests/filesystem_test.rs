//! End-to-end tests: mocked director and caches, real HTTP backend.

use std::time::Duration;

use pelican_client::{EntryKind, PelicanError, PelicanFileSystem};
use reqwest::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Nothing listens on port 1.
const DEAD: &str = "http://127.0.0.1:1";

const LISTING: &str = concat!(
    "<html><head>",
    r#"<link rel="stylesheet" type="text/css" href="/static/css/xrdhttp.css"/>"#,
    "<title>/foo/bar</title></head><body><h1>Listing of: /foo/bar</h1><table>",
    r#"<tr><td class="name"><a href="/foo/bar/file1">file1</a></td></tr>"#,
    r#"<tr><td class="name"><a href="/foo/bar/file2">file2/a></td></tr>"#,
    r#"<tr><td class="name"><a href="/foo/bar/file3">file3</a></td></tr>"#,
    "</table></body></html>",
);

// ============================================================================
// Helpers
// ============================================================================

/// A director serving its own discovery document.
async fn director() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/pelican-configuration"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "director_endpoint": server.uri() })),
        )
        .mount(&server)
        .await;
    server
}

/// `Link` header ranking `bases` in order, each joined with `object`.
fn link(bases: &[&str], object: &str) -> String {
    bases
        .iter()
        .enumerate()
        .map(|(i, base)| format!(r#"<{base}{object}>; rel="duplicate"; pri={}; depth=1"#, i + 1))
        .collect::<Vec<_>>()
        .join(", ")
}

async fn redirect_to_caches(director: &MockServer, object: &str, bases: &[&str], namespace: &str) {
    Mock::given(method("GET"))
        .and(path(object))
        .respond_with(
            ResponseTemplate::new(307)
                .insert_header("Link", link(bases, object).as_str())
                .insert_header("X-Pelican-Namespace", format!("namespace={namespace}").as_str()),
        )
        .mount(director)
        .await;
}

/// A cache that answers probes and serves `body` at `object`.
async fn cache_serving(object: &str, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path(object))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(object))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    server
}

fn filesystem(director: &MockServer) -> PelicanFileSystem {
    PelicanFileSystem::builder()
        .discovery_url(director.uri())
        .probe_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

// ============================================================================
// Reads through discovered caches
// ============================================================================

#[tokio::test]
async fn cat_through_discovered_cache() {
    let director = director().await;
    let cache = cache_serving("/foo/bar", "hello, world!").await;
    redirect_to_caches(&director, "/foo/bar", &[&cache.uri()], "/foo").await;

    let fs = filesystem(&director);
    assert_eq!(fs.cat_file("/foo/bar").await.unwrap(), b"hello, world!");
    assert_eq!(fs.registry().prefixes(), ["/foo"]);
}

#[tokio::test]
async fn namespace_discovered_once_for_sibling_objects() {
    let director = director().await;
    let cache = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&cache)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("data"))
        .mount(&cache)
        .await;
    Mock::given(method("GET"))
        .and(path("/foo/a"))
        .respond_with(
            ResponseTemplate::new(307)
                .insert_header("Link", link(&[&cache.uri()], "/foo/a").as_str())
                .insert_header("X-Pelican-Namespace", "namespace=/foo"),
        )
        .expect(1)
        .mount(&director)
        .await;

    let fs = filesystem(&director);
    fs.cat_file("/foo/a").await.unwrap();
    // Registry hit: the director is not asked about /foo/b.
    assert_eq!(fs.cat_file("/foo/b").await.unwrap(), b"data");
}

#[tokio::test]
async fn ns1_dead_cache_skipped_by_probe() {
    let director = director().await;
    let cache_b = cache_serving("/ns1/file.dat", "payload").await;
    redirect_to_caches(&director, "/ns1/file.dat", &[DEAD, &cache_b.uri()], "/ns1").await;

    let fs = filesystem(&director);
    assert_eq!(fs.cat_file("/ns1/file.dat").await.unwrap(), b"payload");

    let manager = fs.registry().lookup("/ns1/file.dat").unwrap();
    let caches: Vec<String> = manager.caches().iter().map(|c| c.to_string()).collect();
    assert_eq!(caches, [cache_b.uri()]);

    let object = pelican_client::ObjectPath::new("/ns1/file.dat").unwrap();
    assert_eq!(
        manager.get_preferred(&object).unwrap().as_str(),
        format!("{}/ns1/file.dat", cache_b.uri())
    );
}

#[tokio::test]
async fn fallback_until_every_cache_is_gone() {
    let director = director().await;
    let cache = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/foo/bar"))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(1)
        .mount(&cache)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/foo/bar"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&cache)
        .await;
    Mock::given(method("GET"))
        .and(path("/foo/bar"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello, world 2"))
        .up_to_n_times(2)
        .mount(&cache)
        .await;
    Mock::given(method("GET"))
        .and(path("/foo/bar"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&cache)
        .await;
    redirect_to_caches(&director, "/foo/bar", &[DEAD, &cache.uri()], "/foo").await;

    let fs = filesystem(&director);
    assert_eq!(fs.cat_file("/foo/bar").await.unwrap(), b"hello, world 2");
    assert_eq!(fs.cat_file("/foo/bar").await.unwrap(), b"hello, world 2");

    let err = fs.cat_file("/foo/bar").await.unwrap_err();
    assert!(matches!(err, PelicanError::Status { status: 500, .. }), "got {err:?}");

    // The only working cache was dropped; rediscovery finds nothing alive.
    let err = fs.cat_file("/foo/bar").await.unwrap_err();
    assert!(matches!(err, PelicanError::NoAvailableSource(_)), "got {err:?}");
}

#[tokio::test]
async fn exhausted_probe_registers_nothing() {
    let director = director().await;
    let broken = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&broken)
        .await;
    redirect_to_caches(&director, "/foo/bar", &[DEAD, &broken.uri()], "/foo").await;

    let fs = filesystem(&director);
    let err = fs.cat_file("/foo/bar").await.unwrap_err();
    assert!(matches!(err, PelicanError::NoAvailableSource(_)));
    assert!(fs.registry().is_empty());
}

// ============================================================================
// Preferred caches
// ============================================================================

#[tokio::test]
async fn preferred_cache_skips_director() {
    let director = director().await;
    Mock::given(method("GET"))
        .and(path("/foo/bar"))
        .respond_with(ResponseTemplate::new(307))
        .expect(0)
        .mount(&director)
        .await;
    let preferred = cache_serving("/foo/bar", "hello, world").await;

    let fs = PelicanFileSystem::builder()
        .discovery_url(director.uri())
        .preferred_caches([preferred.uri()])
        .build()
        .unwrap();

    assert_eq!(fs.cat_file("/foo/bar").await.unwrap(), b"hello, world");
    assert_eq!(fs.registry().prefixes(), ["/"]);
}

#[tokio::test]
async fn preferred_plus_falls_back_to_discovered() {
    let director = director().await;
    let discovered = cache_serving("/foo/bar", "hello, world").await;
    redirect_to_caches(&director, "/foo/bar", &[&discovered.uri()], "/foo").await;

    let preferred = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&preferred)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&preferred)
        .await;

    let fs = PelicanFileSystem::builder()
        .discovery_url(director.uri())
        .preferred_caches([preferred.uri(), "+".to_string()])
        .build()
        .unwrap();

    let err = fs.cat_file("/foo/bar").await.unwrap_err();
    assert!(matches!(err, PelicanError::Status { status: 500, .. }));
    assert_eq!(fs.cat_file("/foo/bar").await.unwrap(), b"hello, world");
    assert_eq!(fs.registry().prefixes(), ["/foo"]);
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn authorization_header_reaches_cache() {
    let director = director().await;
    let cache = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/foo/bar"))
        .and(header("Authorization", "Bearer test"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&cache)
        .await;
    Mock::given(method("GET"))
        .and(path("/foo/bar"))
        .and(header("Authorization", "Bearer test"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello, world!"))
        .mount(&cache)
        .await;
    redirect_to_caches(&director, "/foo/bar", &[&cache.uri()], "/foo").await;

    let fs = PelicanFileSystem::builder()
        .discovery_url(director.uri())
        .authorization("Bearer test")
        .build()
        .unwrap();
    assert_eq!(fs.cat_file("/foo/bar").await.unwrap(), b"hello, world!");
}

#[tokio::test]
async fn authz_query_reaches_cache() {
    let director = director().await;
    let cache = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/foo/bar"))
        .and(query_param("authz", "test"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&cache)
        .await;
    Mock::given(method("GET"))
        .and(path("/foo/bar"))
        .and(query_param("authz", "test"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello, world!"))
        .mount(&cache)
        .await;
    redirect_to_caches(&director, "/foo/bar", &[&cache.uri()], "/foo").await;

    let fs = filesystem(&director);
    assert_eq!(fs.cat_file("/foo/bar?authz=test").await.unwrap(), b"hello, world!");
}

// ============================================================================
// Direct reads
// ============================================================================

#[tokio::test]
async fn direct_reads_go_to_origin() {
    let director = director().await;
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/foo/bar"))
        .respond_with(ResponseTemplate::new(200).set_body_string("from origin"))
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1.0/director/origin/foo/bar"))
        .respond_with(
            ResponseTemplate::new(307)
                .insert_header("Location", format!("{}/foo/bar", origin.uri()).as_str()),
        )
        .mount(&director)
        .await;

    let fs = PelicanFileSystem::builder()
        .discovery_url(director.uri())
        .direct_reads(true)
        .build()
        .unwrap();

    assert_eq!(fs.cat_file("/foo/bar").await.unwrap(), b"from origin");
    assert!(fs.registry().is_empty());
}

// ============================================================================
// Metadata and downloads
// ============================================================================

#[tokio::test]
async fn info_reports_relative_name_and_type() {
    let director = director().await;
    let cache = cache_serving("/foo/bar", "hello").await;
    // Probe and info share the HEAD mock; give info a content type.
    Mock::given(method("HEAD"))
        .and(path("/foo/bar"))
        .respond_with(ResponseTemplate::new(200).insert_header("Content-Type", "text/plain; charset=utf-8"))
        .with_priority(1)
        .mount(&cache)
        .await;
    redirect_to_caches(&director, "/foo/bar", &[&cache.uri()], "/foo").await;

    let info = filesystem(&director).info("/foo/bar").await.unwrap();
    assert_eq!(info.name, "/foo/bar");
    assert_eq!(info.url.as_deref(), Some("/foo/bar"));
    assert_eq!(info.kind, EntryKind::File);
    assert_eq!(info.mimetype.as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn get_file_writes_destination() {
    let director = director().await;
    let cache = cache_serving("/foo/bar", "downloaded bytes").await;
    redirect_to_caches(&director, "/foo/bar", &[&cache.uri()], "/foo").await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("bar");
    let written = filesystem(&director).get_file("/foo/bar", &dest).await.unwrap();

    assert_eq!(written, 16);
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "downloaded bytes");
}

#[tokio::test]
async fn missing_object_is_not_found_and_marks_cache_bad() {
    let director = director().await;
    let cache = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&cache)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&cache)
        .await;
    redirect_to_caches(&director, "/foo/missing", &[&cache.uri()], "/foo").await;

    let fs = filesystem(&director);
    let err = fs.cat_file("/foo/missing").await.unwrap_err();
    assert!(matches!(err, PelicanError::NotFound(_)));
    assert!(fs.registry().lookup("/foo/missing").is_none());
}

// ============================================================================
// Directory operations
// ============================================================================

async fn mount_dirlist(director: &MockServer, object: &str) {
    Mock::given(method("PROPFIND"))
        .and(path(object))
        .respond_with(ResponseTemplate::new(307).insert_header(
            "Link",
            format!(r#"<{}{object}>; rel="duplicate"; pri=1; depth=1"#, director.uri()).as_str(),
        ))
        .mount(director)
        .await;
}

#[tokio::test]
async fn ls_lists_relative_names() {
    let director = director().await;
    mount_dirlist(&director, "/foo/bar").await;
    Mock::given(method("GET"))
        .and(path("/foo/bar"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
        .mount(&director)
        .await;

    let entries = filesystem(&director).ls("/foo/bar").await.unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["/foo/bar/file1", "/foo/bar/file2", "/foo/bar/file3"]);
}

#[tokio::test]
async fn isdir_and_isfile() {
    let director = director().await;
    mount_dirlist(&director, "/foo/bar").await;
    mount_dirlist(&director, "/foo/bar/file1").await;
    Mock::given(method("GET"))
        .and(path("/foo/bar"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
        .mount(&director)
        .await;
    Mock::given(method("GET"))
        .and(path("/foo/bar/file1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("file1"))
        .mount(&director)
        .await;

    let fs = filesystem(&director);
    assert!(fs.isdir("/foo/bar").await.unwrap());
    assert!(!fs.isdir("/foo/bar/file1").await.unwrap());
    assert!(!fs.isfile("/foo/bar").await.unwrap());
    assert!(fs.isfile("/foo/bar/file1").await.unwrap());
}

#[tokio::test]
async fn dirlist_failure_leaves_registry_alone() {
    let director = director().await;
    mount_dirlist(&director, "/foo/bar").await;
    Mock::given(method("GET"))
        .and(path("/foo/bar"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&director)
        .await;

    let fs = filesystem(&director);
    let err = fs.ls("/foo/bar").await.unwrap_err();
    assert!(matches!(err, PelicanError::Status { status: 500, .. }));
    assert!(fs.registry().is_empty());
}

// ============================================================================
// Federation URLs
// ============================================================================

#[tokio::test]
async fn federation_url_for_bound_federation_is_accepted() {
    let director = director().await;
    let cache = cache_serving("/foo/bar", "bound").await;
    redirect_to_caches(&director, "/foo/bar", &[&cache.uri()], "/foo").await;

    // pelican:// discovery goes over HTTPS, so bind the plain HTTP mock first.
    let fs = PelicanFileSystem::builder().build().unwrap();
    let discovery = Url::parse(&director.uri()).unwrap();
    fs.director().bind_federation(&discovery).unwrap();

    let authority = format!("{}:{}", discovery.host_str().unwrap(), discovery.port().unwrap());
    let body = fs
        .cat_file(&format!("pelican://{authority}/foo/bar"))
        .await
        .unwrap();
    assert_eq!(body, b"bound");

    let err = fs.cat_file("pelican://elsewhere.example.org/foo/bar").await.unwrap_err();
    assert!(matches!(err, PelicanError::InvalidMetadata(_)));
}
