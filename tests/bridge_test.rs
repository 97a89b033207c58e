//! Bridge Tests
//!
//! UI-facing operations end to end: credential store on disk, mocked WebDAV
//! server, live proxy.

use mockito::{Server, ServerGuard};
use std::sync::Arc;
use tempfile::TempDir;

use echolingo::bridge::Bridge;
use echolingo::credentials::CredentialStore;
use echolingo::models::{CredentialBlob, Credentials, Scheme};
use echolingo::remote::{AuthRegistry, Gateway};
use echolingo::ErrorKind;

fn blob_for(server: &ServerGuard, password: &str) -> CredentialBlob {
    let addr = server.socket_address();
    CredentialBlob {
        scheme: Scheme::Http,
        host: addr.ip().to_string(),
        port: addr.port(),
        path_prefix: "dav/".to_string(),
        username: "alice".to_string(),
        password: password.to_string(),
    }
}

fn token(password: &str) -> String {
    Credentials::new("alice", password).basic_token()
}

async fn open_bridge(dir: &TempDir) -> Bridge {
    let store = CredentialStore::open(dir.path()).await;
    let gateway = Gateway::new(Arc::new(AuthRegistry::new()));
    Bridge::new(store, gateway, 0, 1)
}

const ROOT_LISTING: &str = r#"<d:multistatus xmlns:d="DAV:">
  <d:response><d:href>/dav/</d:href>
    <d:propstat><d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop></d:propstat>
  </d:response>
  <d:response><d:href>/dav/lesson.mp4</d:href>
    <d:propstat><d:prop>
      <d:getcontentlength>4</d:getcontentlength>
      <d:resourcetype/>
    </d:prop></d:propstat>
  </d:response>
</d:multistatus>"#;

const FILE_STAT: &str = r#"<d:multistatus xmlns:d="DAV:">
  <d:response><d:href>/dav/lesson.mp4</d:href>
    <d:propstat><d:prop>
      <d:getcontentlength>4</d:getcontentlength>
      <d:getcontenttype>video/mp4</d:getcontenttype>
      <d:resourcetype/>
    </d:prop></d:propstat>
  </d:response>
</d:multistatus>"#;

// =============================================================================
// Configuration
// =============================================================================

#[tokio::test]
async fn test_unconfigured_operations_fail_softly() {
    let dir = TempDir::new().unwrap();
    let bridge = open_bridge(&dir).await;

    assert!(bridge.get_config().await.is_none());

    let listing = bridge.get_directory_contents("/").await;
    assert!(!listing.success);
    assert!(listing.contents.is_empty());
    assert_eq!(listing.error_kind, Some(ErrorKind::ConfigInvalid));

    let url = bridge.get_file_url("/lesson.mp4").await;
    assert!(!url.success);
    assert!(url.url.is_none());
    assert_eq!(url.error_kind, Some(ErrorKind::ConfigInvalid));
}

#[tokio::test]
async fn test_save_config_normalizes_and_persists() {
    let server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let bridge = open_bridge(&dir).await;

    let result = bridge.save_config(blob_for(&server, "one")).await;
    assert!(result.success, "{:?}", result.error);

    let saved = bridge.get_config().await.unwrap();
    assert_eq!(saved.path_prefix, "/dav");
    assert_eq!(saved.password, "one");

    // Survives a new bridge over the same directory
    let again = open_bridge(&dir).await;
    assert_eq!(again.get_config().await, Some(saved));
}

#[tokio::test]
async fn test_save_config_rejects_missing_host() {
    let server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let bridge = open_bridge(&dir).await;

    let mut blob = blob_for(&server, "one");
    blob.host = "  ".to_string();
    let result = bridge.save_config(blob).await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::ConfigInvalid));
    assert!(bridge.get_config().await.is_none());
}

#[tokio::test]
async fn test_save_config_rebinds_host() {
    let server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let bridge = open_bridge(&dir).await;
    let host = server.socket_address().ip().to_string();

    bridge.gateway().registry().bind(&host, token("old"));
    assert!(bridge.save_config(blob_for(&server, "new")).await.success);

    assert_eq!(bridge.gateway().registry().token_for(&host), Some(token("new")));
}

#[tokio::test]
async fn test_connection_check_does_not_save_or_bind() {
    let mut server = Server::new_async().await;
    let ok = server
        .mock("PROPFIND", "/dav/")
        .match_header("authorization", token("good").as_str())
        .with_status(207)
        .with_body(ROOT_LISTING)
        .create_async()
        .await;
    server
        .mock("PROPFIND", "/dav/")
        .match_header("authorization", token("bad").as_str())
        .with_status(401)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let bridge = open_bridge(&dir).await;

    let result = bridge.test_connection(blob_for(&server, "good")).await;
    assert!(result.success, "{:?}", result.error);
    ok.assert_async().await;

    let result = bridge.test_connection(blob_for(&server, "bad")).await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::AuthFailed));

    assert!(bridge.get_config().await.is_none());
    assert!(bridge.gateway().registry().is_empty());
}

// =============================================================================
// Listing & Streaming
// =============================================================================

#[tokio::test]
async fn test_get_directory_contents() {
    let mut server = Server::new_async().await;
    server
        .mock("PROPFIND", "/dav/")
        .match_header("depth", "1")
        .with_status(207)
        .with_body(ROOT_LISTING)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let bridge = open_bridge(&dir).await;
    assert!(bridge.save_config(blob_for(&server, "pw")).await.success);

    let listing = bridge.get_directory_contents("/").await;
    assert!(listing.success);
    assert_eq!(listing.contents.len(), 1);
    assert_eq!(listing.contents[0].path, "/lesson.mp4");

    let json = serde_json::to_value(&listing).unwrap();
    assert_eq!(json["success"], true);
    assert!(json.get("error").is_none());
    assert_eq!(json["contents"][0]["type"], "file");
}

#[tokio::test]
async fn test_get_file_url_streams_through_proxy() {
    let mut server = Server::new_async().await;
    server
        .mock("PROPFIND", "/dav/lesson.mp4")
        .match_header("depth", "0")
        .with_status(207)
        .with_body(FILE_STAT)
        .create_async()
        .await;
    let get = server
        .mock("GET", "/dav/lesson.mp4")
        .match_header("authorization", token("pw").as_str())
        .with_status(200)
        .with_body("abcd")
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let bridge = open_bridge(&dir).await;
    assert!(bridge.save_config(blob_for(&server, "pw")).await.success);

    let result = bridge.get_file_url("/lesson.mp4").await;
    assert!(result.success, "{:?}", result.error);
    let url = result.url.unwrap();
    assert!(url.starts_with("http://127.0.0.1:"));

    let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
    assert_eq!(body, "abcd");
    get.assert_async().await;

    assert_eq!(bridge.proxy().await.unwrap().handle_count(), 1);
}

#[tokio::test]
async fn test_get_file_url_missing_file() {
    let mut server = Server::new_async().await;
    server
        .mock("PROPFIND", "/dav/gone.mp4")
        .with_status(404)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let bridge = open_bridge(&dir).await;
    assert!(bridge.save_config(blob_for(&server, "pw")).await.success);

    let result = bridge.get_file_url("/gone.mp4").await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::NotFound));

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["error_kind"], "not_found");
    assert!(json.get("url").is_none());
}
