//! Local streaming proxy
//!
//! Serves each registered remote file at `http://127.0.0.1:<port>/<id>`.
//! Requests are relayed to the WebDAV server through the [`Gateway`] with
//! byte-range support. Upstream bodies are streamed, never buffered; when the
//! local client disconnects the response body is dropped, which drops the
//! upstream response and aborts the remote transfer.
//!
//! The handle table only grows. There is no session teardown, so every
//! registration lives until the process exits (`handle_count()` exposes the
//! size).

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, RwLock};
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::range::{ByteRange, ContentRange};
use crate::error::{Error, Result};
use crate::models::{guess_content_type, Credentials, RemoteHandle, ServerConfig};
use crate::remote::gateway::inject_cors;
use crate::remote::{DavClient, Gateway};

/// Result of a successful registration
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: String,
    /// Local URL to hand to the player
    pub url: String,
    pub content_type: String,
    pub size: Option<u64>,
}

struct ProxyInner {
    gateway: Gateway,
    addr: SocketAddr,
    handles: RwLock<HashMap<String, Arc<RemoteHandle>>>,
    /// Serialises registrations against each other
    register_lock: Mutex<()>,
    shutdown: watch::Sender<bool>,
}

/// Running proxy server. Cheap to clone; all clones share one handle table.
#[derive(Clone)]
pub struct StreamProxy {
    inner: Arc<ProxyInner>,
}

impl StreamProxy {
    /// Bind `127.0.0.1` and start serving.
    ///
    /// Tries `start_port`, then each following port while the address is in
    /// use, at most `max_attempts` times. `start_port == 0` lets the OS pick.
    /// Read the final address back with [`StreamProxy::local_addr`].
    pub async fn start(gateway: Gateway, start_port: u16, max_attempts: u32) -> Result<Self> {
        let listener = bind_listener(start_port, max_attempts).await?;
        let addr = listener.local_addr()?;
        let (shutdown, mut stop) = watch::channel(false);

        let inner = Arc::new(ProxyInner {
            gateway,
            addr,
            handles: RwLock::new(HashMap::new()),
            register_lock: Mutex::new(()),
            shutdown,
        });

        let app = router(inner.clone());
        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = stop.wait_for(|stopped| *stopped).await;
            });
            if let Err(e) = server.await {
                error!("Proxy server error: {}", e);
            }
        });

        info!("Streaming proxy listening on {}", addr);
        Ok(Self { inner })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.addr
    }

    pub fn port(&self) -> u16 {
        self.inner.addr.port()
    }

    /// Local URL for a handle id
    pub fn url_for(&self, id: &str) -> String {
        format!("http://{}/{}", self.inner.addr, id)
    }

    /// Stop accepting connections; in-flight streams finish on their own.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown.send(true);
    }

    /// Register a remote file and return its local URL.
    ///
    /// The file is looked up with a metadata request first, using a detached
    /// gateway so a failed lookup leaves the auth bindings untouched. On
    /// success the handle is stored and the host's auth binding is upserted.
    pub async fn register(
        &self,
        remote_path: &str,
        server: &ServerConfig,
        credentials: &Credentials,
    ) -> Result<Registration> {
        let _guard = self.inner.register_lock.lock().await;

        let lookup = DavClient::new(
            self.inner.gateway.detached(),
            server.clone(),
            credentials.clone(),
        );
        let entry = lookup.stat(remote_path).await?;
        if entry.is_dir() {
            return Err(Error::NotFound(format!("{} is a directory", remote_path)));
        }

        let content_type = entry
            .content_type
            .filter(|t| !t.trim().is_empty() && t != "application/octet-stream")
            .unwrap_or_else(|| guess_content_type(remote_path).to_string());

        self.inner
            .gateway
            .registry()
            .bind(&server.auth_host(), credentials.basic_token());

        let mut handles = self
            .inner
            .handles
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let id = loop {
            let candidate = Uuid::new_v4().simple().to_string();
            if !handles.contains_key(&candidate) {
                break candidate;
            }
        };

        let handle = RemoteHandle {
            id: id.clone(),
            remote_path: remote_path.to_string(),
            server: server.clone(),
            credentials: credentials.clone(),
            content_type: content_type.clone(),
            size: Some(entry.size).filter(|s| *s > 0),
        };
        let size = handle.size;
        handles.insert(id.clone(), Arc::new(handle));
        drop(handles);

        info!(handle = %id, path = remote_path, "registered remote file");
        Ok(Registration {
            url: self.url_for(&id),
            id,
            content_type,
            size,
        })
    }

    pub fn handle(&self, id: &str) -> Option<Arc<RemoteHandle>> {
        self.inner.handle(id)
    }

    pub fn handle_count(&self) -> usize {
        self.inner
            .handles
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Serve one request for `id` without going through HTTP
    pub async fn handle_request(&self, id: &str, range_header: Option<&str>) -> Response {
        self.inner.handle_request(id, range_header).await
    }
}

impl ProxyInner {
    fn handle(&self, id: &str) -> Option<Arc<RemoteHandle>> {
        self.handles
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    async fn handle_request(&self, id: &str, range_header: Option<&str>) -> Response {
        let range = range_header.and_then(ByteRange::parse);
        let mut response = match self.relay(id, range).await {
            Ok(response) => response,
            Err(e) => error_response(id, e),
        };
        inject_cors(response.headers_mut());
        response
    }

    async fn relay(&self, id: &str, range: Option<ByteRange>) -> Result<Response> {
        let handle = self
            .handle(id)
            .ok_or_else(|| Error::NotFound(format!("unknown handle {}", id)))?;
        let client = DavClient::new(
            self.gateway.clone(),
            handle.server.clone(),
            handle.credentials.clone(),
        );

        match range {
            Some(range) => relay_range(&client, &handle, range).await,
            None => relay_full(&client, &handle).await,
        }
    }
}

async fn relay_full(client: &DavClient, handle: &RemoteHandle) -> Result<Response> {
    let upstream = client.fetch(&handle.remote_path, None).await?;
    // Chunked upstream bodies carry no length; fall back to the stat size
    let length = upstream.content_length().or(handle.size);
    let body = non_empty_body(upstream.bytes_stream(), length).await?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &handle.content_type)
        .header(header::ACCEPT_RANGES, "bytes");
    if let Some(length) = length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }
    debug!(handle = %handle.id, ?length, "relaying full body");
    Ok(finish(builder, body))
}

async fn relay_range(client: &DavClient, handle: &RemoteHandle, range: ByteRange) -> Result<Response> {
    let upstream = client
        .fetch(&handle.remote_path, Some(&range.to_header()))
        .await?;

    if upstream.status() == StatusCode::PARTIAL_CONTENT {
        let content_range = upstream
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(ContentRange::parse)
            .or_else(|| {
                // No Content-Range: trust the requested start and the body length
                let length = upstream.content_length().filter(|l| *l > 0)?;
                Some(ContentRange {
                    start: range.start,
                    end: range.start.checked_add(length - 1)?,
                    total: handle.size,
                })
            })
            .ok_or(Error::EmptyPayload)?;

        let length = content_range.span_len();
        let body = non_empty_body(upstream.bytes_stream(), Some(length)).await?;
        debug!(handle = %handle.id, range = %content_range.to_header(), "relaying partial body");
        return Ok(partial(handle, content_range, body));
    }

    // Server ignored the Range header and sent everything: cut the span out locally.
    let total = match upstream.content_length().or(handle.size) {
        Some(total) => total,
        None => {
            warn!(handle = %handle.id, "upstream ignored range and sent no length, serving full body");
            let body = non_empty_body(upstream.bytes_stream(), None).await?;
            let builder = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, &handle.content_type)
                .header(header::ACCEPT_RANGES, "bytes");
            return Ok(finish(builder, body));
        }
    };

    let Some((start, end)) = range.resolve(total) else {
        let builder = Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{}", total))
            .header(header::ACCEPT_RANGES, "bytes");
        return Ok(finish(builder, Body::empty()));
    };

    let content_range = ContentRange {
        start,
        end,
        total: Some(total),
    };
    let sliced = slice_stream(upstream.bytes_stream(), start, content_range.span_len());
    let body = non_empty_body(sliced, Some(content_range.span_len())).await?;
    Ok(partial(handle, content_range, body))
}

fn partial(handle: &RemoteHandle, content_range: ContentRange, body: Body) -> Response {
    let builder = Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_TYPE, &handle.content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, content_range.span_len())
        .header(header::CONTENT_RANGE, content_range.to_header());
    finish(builder, body)
}

fn finish(builder: axum::http::response::Builder, body: Body) -> Response {
    builder.body(body).unwrap_or_else(|e| {
        error!("Failed to build proxy response: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}

/// Wrap an upstream stream as a response body, failing with
/// [`Error::EmptyPayload`] if it carries no bytes at all.
async fn non_empty_body<S>(stream: S, declared_len: Option<u64>) -> Result<Body>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
{
    if declared_len == Some(0) {
        return Err(Error::EmptyPayload);
    }

    let mut stream = Box::pin(stream);
    loop {
        match stream.next().await {
            Some(Ok(chunk)) if chunk.is_empty() => continue,
            Some(Ok(chunk)) => {
                let first = futures::stream::once(async move { Ok(chunk) });
                return Ok(Body::from_stream(first.chain(stream)));
            }
            Some(Err(e)) => return Err(Error::Unreachable(e.to_string())),
            None => return Err(Error::EmptyPayload),
        }
    }
}

/// Skip `skip` bytes, then yield at most `take` bytes
fn slice_stream<S>(
    stream: S,
    skip: u64,
    take: u64,
) -> impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
{
    stream.scan((skip, take), |state, item| {
        let out = match item {
            Err(e) => Some(Err(e)),
            Ok(_) if state.1 == 0 => None,
            Ok(chunk) => {
                let len = chunk.len() as u64;
                if state.0 >= len {
                    state.0 -= len;
                    Some(Ok(Bytes::new()))
                } else {
                    let from = state.0 as usize;
                    state.0 = 0;
                    let n = ((len - from as u64).min(state.1)) as usize;
                    state.1 -= n as u64;
                    Some(Ok(chunk.slice(from..from + n)))
                }
            }
        };
        futures::future::ready(out)
    })
}

fn error_response(id: &str, err: Error) -> Response {
    let status = match &err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::EmptyPayload => StatusCode::BAD_GATEWAY,
        Error::Upstream { status: 416, .. } => StatusCode::RANGE_NOT_SATISFIABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(handle = id, status = status.as_u16(), "proxy request failed: {}", err);
    (status, err.to_string()).into_response()
}

// =============================================================================
// HTTP Surface
// =============================================================================

fn router(inner: Arc<ProxyInner>) -> Router {
    Router::new()
        .route("/{id}", get(serve_handle).options(preflight))
        .fallback(unknown_path)
        .with_state(inner)
}

/// `GET /{id}` (also answers HEAD, body stripped)
async fn serve_handle(
    Path(id): Path<String>,
    State(inner): State<Arc<ProxyInner>>,
    headers: HeaderMap,
) -> Response {
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    inner.handle_request(&id, range).await
}

async fn preflight() -> Response {
    let mut response = StatusCode::OK.into_response();
    inject_cors(response.headers_mut());
    response
        .headers_mut()
        .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response
}

async fn unknown_path() -> Response {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}

async fn bind_listener(start_port: u16, max_attempts: u32) -> Result<TcpListener> {
    if start_port == 0 {
        return Ok(TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?);
    }

    let mut port = start_port;
    for _ in 0..max_attempts.max(1) {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                debug!(port, "port in use, trying the next one");
                port = match port.checked_add(1) {
                    Some(next) => next,
                    None => break,
                };
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::BindExhausted {
        start: start_port,
        attempts: max_attempts,
    })
}
