//! WebDAV client
//!
//! Lists collections and stats files with `PROPFIND`, fetches (ranged) file
//! content with `GET`. All traffic goes through the [`Gateway`].

use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RANGE};
use reqwest::{Method, StatusCode, Url};
use tracing::debug;

use super::gateway::{Gateway, DEPTH};
use crate::error::{Error, Result};
use crate::models::{Credentials, DavEntry, EntryKind, ServerConfig};

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:displayname/>
    <d:getcontentlength/>
    <d:getlastmodified/>
    <d:getcontenttype/>
    <d:resourcetype/>
  </d:prop>
</d:propfind>"#;

/// WebDAV client bound to one server and login
#[derive(Clone)]
pub struct DavClient {
    gateway: Gateway,
    server: ServerConfig,
    credentials: Credentials,
}

impl DavClient {
    pub fn new(gateway: Gateway, server: ServerConfig, credentials: Credentials) -> Self {
        Self {
            gateway,
            server,
            credentials,
        }
    }

    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    /// List a collection. The collection itself is not part of the result;
    /// directories come first, then files, each sorted by name.
    pub async fn list(&self, path: &str) -> Result<Vec<DavEntry>> {
        let dir = normalize_path(path);
        let collection = if dir == "/" { dir.clone() } else { format!("{}/", dir) };
        let mut entries = self.propfind(&collection, "1").await?;

        entries.retain(|e| normalize_path(&e.path) != dir);
        entries.sort_by(|a, b| {
            b.is_dir()
                .cmp(&a.is_dir())
                .then_with(|| a.filename.to_lowercase().cmp(&b.filename.to_lowercase()))
        });

        debug!(path = %dir, count = entries.len(), "listed collection");
        Ok(entries)
    }

    /// Metadata of a single file or collection
    pub async fn stat(&self, path: &str) -> Result<DavEntry> {
        let mut entries = self.propfind(path, "0").await?;
        if entries.is_empty() {
            return Err(Error::NotFound(path.to_string()));
        }
        Ok(entries.swap_remove(0))
    }

    /// Start a GET for `path`, optionally for a byte range (`bytes=a-b`).
    ///
    /// Succeeds only for 200/206; the body is left unread for the caller to stream.
    pub async fn fetch(&self, path: &str, range: Option<&str>) -> Result<reqwest::Response> {
        let mut headers = self.auth_headers();
        if let Some(range) = range {
            let value = HeaderValue::from_str(range)
                .map_err(|_| Error::ConfigInvalid(format!("invalid range '{}'", range)))?;
            headers.insert(RANGE, value);
        }

        let url = self.server.url_for(path);
        let response = self.gateway.send(Method::GET, &url, headers).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::from_status(status, path));
        }
        Ok(response)
    }

    async fn propfind(&self, path: &str, depth: &'static str) -> Result<Vec<DavEntry>> {
        let mut headers = self.auth_headers();
        headers.insert(DEPTH, HeaderValue::from_static(depth));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/xml; charset=utf-8"),
        );

        let url = self.server.url_for(path);
        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|e| Error::ConfigInvalid(e.to_string()))?;
        let response = self
            .gateway
            .send_with_body(method, &url, headers, PROPFIND_BODY)
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::from_status(status, path));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Unreachable(e.to_string()))?;
        parse_multistatus(&body, &self.server)
    }

    /// Explicit login for hosts without an auth binding; the gateway
    /// replaces it with the bound token when one exists.
    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.credentials.basic_token()) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }
}

/// `/a/b/` → `/a/b`, `` → `/`
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", trimmed)
    }
}

// =============================================================================
// Multistatus Parsing
// =============================================================================

#[derive(Default)]
struct RawEntry {
    href: String,
    display_name: Option<String>,
    size: Option<u64>,
    lastmod: Option<String>,
    content_type: Option<String>,
    collection: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Href,
    DisplayName,
    Length,
    LastModified,
    ContentType,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"href" => Some(Field::Href),
            b"displayname" => Some(Field::DisplayName),
            b"getcontentlength" => Some(Field::Length),
            b"getlastmodified" => Some(Field::LastModified),
            b"getcontenttype" => Some(Field::ContentType),
            _ => None,
        }
    }
}

/// Parse a `207 Multi-Status` body into entries with prefix-relative paths.
///
/// Element names are matched by local name, so any namespace prefix works.
pub fn parse_multistatus(xml: &str, server: &ServerConfig) -> Result<Vec<DavEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<RawEntry> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = e.local_name();
                match local.as_ref() {
                    b"response" => current = Some(RawEntry::default()),
                    b"collection" => {
                        if let Some(entry) = current.as_mut() {
                            entry.collection = true;
                        }
                    }
                    name => field = Field::from_local_name(name),
                }
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"collection" {
                    if let Some(entry) = current.as_mut() {
                        entry.collection = true;
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    let text = t
                        .unescape()
                        .map_err(|e| malformed(e.to_string()))?
                        .into_owned();
                    match f {
                        Field::Href => entry.href.push_str(&text),
                        Field::DisplayName => entry.display_name = Some(text),
                        Field::Length => entry.size = text.trim().parse().ok(),
                        Field::LastModified => entry.lastmod = Some(text),
                        Field::ContentType => entry.content_type = Some(text),
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"response" {
                    if let Some(raw) = current.take() {
                        if !raw.href.is_empty() {
                            entries.push(into_entry(raw, server));
                        }
                    }
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(malformed(e.to_string())),
            _ => {}
        }
    }

    Ok(entries)
}

fn malformed(detail: String) -> Error {
    Error::Upstream {
        status: StatusCode::MULTI_STATUS.as_u16(),
        message: format!("malformed PROPFIND response: {}", detail),
    }
}

fn into_entry(raw: RawEntry, server: &ServerConfig) -> DavEntry {
    let path = href_to_path(&raw.href, server);
    let filename = raw
        .display_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| path.rsplit('/').next().unwrap_or_default().to_string());

    DavEntry {
        filename,
        path,
        kind: if raw.collection {
            EntryKind::Directory
        } else {
            EntryKind::File
        },
        size: raw.size.unwrap_or(0),
        lastmod: raw.lastmod,
        content_type: raw.content_type,
    }
}

/// Decode an href (absolute URL or absolute path) and strip the server prefix.
fn href_to_path(href: &str, server: &ServerConfig) -> String {
    let raw_path = if href.starts_with("http://") || href.starts_with("https://") {
        Url::parse(href)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| href.to_string())
    } else {
        href.to_string()
    };

    let decoded = urlencoding::decode(&raw_path)
        .map(|s| s.into_owned())
        .unwrap_or(raw_path);

    let prefix = server.path_prefix.trim_end_matches('/');
    let relative = match decoded.strip_prefix(prefix) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => decoded.as_str(),
    };

    normalize_path(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scheme;

    fn server() -> ServerConfig {
        ServerConfig {
            scheme: Scheme::Https,
            host: "dav.example.com".to_string(),
            port: 443,
            path_prefix: "/dav".to_string(),
        }
    }

    const LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/dav/Movies/</D:href>
    <D:propstat><D:prop>
      <D:displayname>Movies</D:displayname>
      <D:resourcetype><D:collection/></D:resourcetype>
    </D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat>
  </D:response>
  <D:response>
    <D:href>/dav/Movies/My%20Film.mp4</D:href>
    <D:propstat><D:prop>
      <D:getcontentlength>1000</D:getcontentlength>
      <D:getlastmodified>Mon, 01 Jan 2024 00:00:00 GMT</D:getlastmodified>
      <D:getcontenttype>video/mp4</D:getcontenttype>
      <D:resourcetype/>
    </D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat>
  </D:response>
  <D:response>
    <D:href>https://dav.example.com/dav/Movies/Extras/</D:href>
    <D:propstat><D:prop>
      <D:resourcetype><D:collection/></D:resourcetype>
    </D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat>
  </D:response>
</D:multistatus>"#;

    #[test]
    fn test_parse_multistatus() {
        let entries = parse_multistatus(LISTING, &server()).unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].path, "/Movies");
        assert!(entries[0].is_dir());

        assert_eq!(entries[1].filename, "My Film.mp4");
        assert_eq!(entries[1].path, "/Movies/My Film.mp4");
        assert_eq!(entries[1].size, 1000);
        assert_eq!(entries[1].content_type.as_deref(), Some("video/mp4"));
        assert_eq!(
            entries[1].lastmod.as_deref(),
            Some("Mon, 01 Jan 2024 00:00:00 GMT")
        );
        assert_eq!(entries[1].kind, EntryKind::File);

        assert_eq!(entries[2].filename, "Extras");
        assert_eq!(entries[2].path, "/Movies/Extras");
        assert!(entries[2].is_dir());
    }

    #[test]
    fn test_parse_lowercase_prefix() {
        let xml = r#"<d:multistatus xmlns:d="DAV:"><d:response><d:href>/dav/a.srt</d:href>
            <d:propstat><d:prop><d:getcontentlength>12</d:getcontentlength></d:prop></d:propstat>
            </d:response></d:multistatus>"#;
        let entries = parse_multistatus(xml, &server()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filename, "a.srt");
        assert_eq!(entries[0].size, 12);
    }

    #[test]
    fn test_parse_malformed() {
        let err = parse_multistatus("<a><b></a>", &server()).unwrap_err();
        assert!(matches!(err, Error::Upstream { status: 207, .. }));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("Movies/"), "/Movies");
        assert_eq!(normalize_path("/Movies/Extras/"), "/Movies/Extras");
    }

    #[test]
    fn test_href_outside_prefix_kept() {
        assert_eq!(href_to_path("/other/x.mp4", &server()), "/other/x.mp4");
        assert_eq!(href_to_path("/davinci/x.mp4", &server()), "/davinci/x.mp4");
        assert_eq!(href_to_path("/dav/", &server()), "/");
    }
}
