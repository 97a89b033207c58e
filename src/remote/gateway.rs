//! Outbound header rewriting
//!
//! Every request EchoLingo sends to a remote server passes through
//! [`Gateway`]. Requests to a host with an auth binding carry only a minimal
//! allow-list of headers plus the bound `Authorization` token; requests to
//! any other host lose their `Referer`. Responses from bound hosts get
//! permissive CORS headers, and `OPTIONS` preflights to bound hosts are
//! answered locally without touching the network.

use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, RANGE, REFERER,
    USER_AGENT,
};
use reqwest::{Method, StatusCode, Url};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// User-agent sent on every request to a bound host
pub const DEFAULT_USER_AGENT: &str = concat!("EchoLingo/", env!("CARGO_PKG_VERSION"));

/// WebDAV depth header, forwarded so PROPFIND keeps its semantics
pub const DEPTH: HeaderName = HeaderName::from_static("depth");

/// Request headers that survive rewriting for bound hosts
const PASS_THROUGH: [HeaderName; 4] = [RANGE, ACCEPT, CONTENT_TYPE, DEPTH];

// =============================================================================
// Auth Registry
// =============================================================================

/// Host name → precomputed basic-auth token.
///
/// Shared by reference between handle registration (the only writer) and the
/// gateway (reader on every request). Bindings are host-scoped: registering a
/// second file on the same host overwrites the token. Nothing removes a
/// binding; the table lives as long as the process.
#[derive(Debug, Default)]
pub struct AuthRegistry {
    bindings: RwLock<HashMap<String, String>>,
}

impl AuthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the token for `host`. Returns true if an existing binding was replaced.
    pub fn bind(&self, host: &str, token: impl Into<String>) -> bool {
        let mut bindings = self.bindings.write().unwrap_or_else(|e| e.into_inner());
        let replaced = bindings.insert(host.to_lowercase(), token.into()).is_some();
        debug!(host, replaced, "auth binding updated");
        replaced
    }

    pub fn token_for(&self, host: &str) -> Option<String> {
        let bindings = self.bindings.read().unwrap_or_else(|e| e.into_inner());
        bindings.get(&host.to_lowercase()).cloned()
    }

    pub fn is_bound(&self, host: &str) -> bool {
        self.token_for(host).is_some()
    }

    pub fn len(&self) -> usize {
        self.bindings.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Header Rewriting
// =============================================================================

/// Build the header set actually sent to `url`.
pub fn rewrite_request_headers(
    registry: &AuthRegistry,
    url: &Url,
    original: &HeaderMap,
    user_agent: &str,
) -> HeaderMap {
    let token = url.host_str().and_then(|host| registry.token_for(host));

    match token {
        Some(token) => {
            let mut headers = HeaderMap::new();
            match HeaderValue::from_str(&token) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("auth token for {:?} is not a valid header value", url.host_str()),
            }
            if let Ok(value) = HeaderValue::from_str(user_agent) {
                headers.insert(USER_AGENT, value);
            }
            for name in PASS_THROUGH.iter() {
                if let Some(value) = original.get(name) {
                    headers.insert(name.clone(), value.clone());
                }
            }
            headers
        }
        None => {
            let mut headers = original.clone();
            headers.remove(REFERER);
            headers
        }
    }
}

/// Add permissive CORS headers so browser-style clients accept cross-origin media.
pub fn inject_cors(headers: &mut HeaderMap) {
    headers.insert(
        "access-control-allow-origin",
        HeaderValue::from_static("*"),
    );
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET, HEAD, OPTIONS, PROPFIND"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("Authorization, Range, Accept, Content-Type, Depth"),
    );
    headers.insert(
        "access-control-allow-credentials",
        HeaderValue::from_static("true"),
    );
    headers.insert(
        "access-control-expose-headers",
        HeaderValue::from_static("Content-Length, Content-Range, Accept-Ranges"),
    );
}

// =============================================================================
// Gateway
// =============================================================================

/// The single outbound HTTP path. Cheap to clone.
#[derive(Clone)]
pub struct Gateway {
    client: reqwest::Client,
    registry: Arc<AuthRegistry>,
    user_agent: String,
}

impl Gateway {
    pub fn new(registry: Arc<AuthRegistry>) -> Self {
        Self::with_user_agent(registry, DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(registry: Arc<AuthRegistry>, user_agent: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            registry,
            user_agent: user_agent.into(),
        }
    }

    pub fn registry(&self) -> &Arc<AuthRegistry> {
        &self.registry
    }

    /// Same client and user-agent over an empty registry, for lookups that
    /// must not touch the shared bindings.
    pub fn detached(&self) -> Self {
        Self {
            client: self.client.clone(),
            registry: Arc::new(AuthRegistry::new()),
            user_agent: self.user_agent.clone(),
        }
    }

    /// Send a request with rewritten headers.
    ///
    /// Only connection-level failures are errors; any HTTP status is returned
    /// to the caller as a response.
    pub async fn send(&self, method: Method, url: &str, headers: HeaderMap) -> Result<reqwest::Response> {
        self.execute(method, url, headers, None).await
    }

    /// [`Gateway::send`] with a request body (PROPFIND queries)
    pub async fn send_with_body(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: impl Into<reqwest::Body>,
    ) -> Result<reqwest::Response> {
        self.execute(method, url, headers, Some(body.into())).await
    }

    pub async fn get(&self, url: &str, headers: HeaderMap) -> Result<reqwest::Response> {
        self.send(Method::GET, url, headers).await
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<reqwest::Body>,
    ) -> Result<reqwest::Response> {
        let url = Url::parse(url)
            .map_err(|e| Error::ConfigInvalid(format!("invalid URL '{}': {}", url, e)))?;
        let bound = url
            .host_str()
            .map(|host| self.registry.is_bound(host))
            .unwrap_or(false);

        if bound && method == Method::OPTIONS {
            debug!(%url, "answering preflight locally");
            return Ok(preflight_response());
        }

        let rewritten = rewrite_request_headers(&self.registry, &url, &headers, &self.user_agent);
        let mut request = self.client.request(method, url).headers(rewritten);
        if let Some(body) = body {
            request = request.body(body);
        }
        let mut response = request
            .send()
            .await
            .map_err(|e| Error::Unreachable(e.to_string()))?;

        if bound {
            inject_cors(response.headers_mut());
        }
        Ok(response)
    }
}

/// Synthetic `200 OK` for a short-circuited preflight
fn preflight_response() -> reqwest::Response {
    let mut response = axum::http::Response::new(Vec::<u8>::new());
    *response.status_mut() = StatusCode::OK;
    inject_cors(response.headers_mut());
    reqwest::Response::from(response)
}
