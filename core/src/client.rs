//! Request dispatcher for a Plex server.
//!
//! # Design
//! `PlexClient` owns one `Connection` behind an async `RwLock`. Each dispatch
//! takes a short read lock to snapshot the URL, token, headers and timeout,
//! then releases it before any network I/O. Token refresh takes the write
//! lock, so it is serialized against request construction and against other
//! refreshes.
//!
//! Dispatch never treats an HTTP status as failure. The caller receives the
//! `Envelope` and decides; a non-success status only produces an advisory
//! `Diagnosis` in the log. Transport failures are real errors.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::auth::Authenticator;
use crate::classify::classify;
use crate::codec::{decode_body, encode_body};
use crate::connection::Connection;
use crate::error::{PlexError, Result};
use crate::http::{Envelope, HttpMethod, PlexRequest};
use crate::paginate::Paginator;

pub const TOKEN_HEADER: &str = "X-Plex-Token";

/// Asynchronous client for one Plex server session.
#[derive(Debug)]
pub struct PlexClient {
    http: Client,
    connection: RwLock<Connection>,
    blocking: OnceLock<tokio::runtime::Runtime>,
}

/// Everything a dispatch needs from the connection, copied out of the lock.
struct Prepared {
    url: String,
    headers: HeaderMap,
    body: Option<(String, &'static str)>,
    timeout: std::time::Duration,
}

impl PlexClient {
    pub fn new(connection: Connection) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| PlexError::Config(format!("could not build HTTP client: {e}")))?;
        Ok(Self {
            http,
            connection: RwLock::new(connection),
            blocking: OnceLock::new(),
        })
    }

    /// Read access to the connection. Holding the guard delays token refresh.
    pub async fn connection(&self) -> RwLockReadGuard<'_, Connection> {
        self.connection.read().await
    }

    pub async fn server_url(&self) -> String {
        self.connection.read().await.server_url().to_string()
    }

    pub async fn headers(&self) -> BTreeMap<String, String> {
        self.connection.read().await.headers()
    }

    /// Re-derive the token through `authenticator` and store it.
    pub async fn refresh_token(&self, authenticator: &dyn Authenticator) -> Result<String> {
        let mut connection = self.connection.write().await;
        connection.refresh_token(authenticator).await
    }

    /// Dispatch one request and decode its response.
    #[tracing::instrument(skip(self, request), fields(method = %request.method, endpoint = %request.endpoint))]
    pub async fn send(&self, request: PlexRequest) -> Result<Envelope> {
        let prepared = {
            let connection = self.connection.read().await;
            prepare(&connection, &request)?
        };

        let mut builder = match request.method {
            HttpMethod::Get => self.http.get(&prepared.url),
            HttpMethod::Post => self.http.post(&prepared.url),
        }
        .headers(prepared.headers)
        .timeout(prepared.timeout);
        if let Some((body, content_type)) = prepared.body {
            builder = builder.header(CONTENT_TYPE, content_type).body(body);
        }

        let response = builder.send().await.map_err(|source| PlexError::Transport {
            url: prepared.url.clone(),
            source,
        })?;

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or_default().to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect::<BTreeMap<_, _>>();
        let text = response.text().await.map_err(|source| PlexError::Transport {
            url: prepared.url.clone(),
            source,
        })?;

        tracing::debug!(url = %prepared.url, status = status.as_u16(), bytes = text.len(), "response received");

        let content = match decode_body(&text, request.response_format) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(url = %prepared.url, "{e}; returning empty content");
                Value::Null
            }
        };

        if let Some(diagnosis) = classify(status.as_u16(), &prepared.url) {
            diagnosis.report();
        }

        Ok(Envelope::new(status.as_u16(), reason, prepared.url, headers, content))
    }

    /// Dispatch one request, blocking the calling thread until it completes.
    ///
    /// Must not be called from inside an async runtime.
    pub fn send_blocking(&self, request: PlexRequest) -> Result<Envelope> {
        self.block_on(self.send(request))
    }

    /// Fetch every page of `request` with the default paginator settings.
    pub async fn paginate(&self, request: PlexRequest, page_size: usize) -> Result<Vec<Value>> {
        Paginator::new().page_size(page_size).fetch_all(self, request).await
    }

    pub fn paginate_blocking(&self, request: PlexRequest, page_size: usize) -> Result<Vec<Value>> {
        self.block_on(self.paginate(request, page_size))
    }

    fn block_on<T, F>(&self, future: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(PlexError::Runtime(
                "blocking call made from inside an async runtime; use the async method".to_string(),
            ));
        }
        let runtime = match self.blocking.get() {
            Some(runtime) => runtime,
            None => {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| PlexError::Runtime(e.to_string()))?;
                self.blocking.get_or_init(|| runtime)
            }
        };
        runtime.block_on(future)
    }
}

/// Build the URL, merged headers and encoded body for `request`.
///
/// The request's own headers override connection defaults, but `Accept` and
/// the token are always the dispatcher's.
fn prepare(connection: &Connection, request: &PlexRequest) -> Result<Prepared> {
    let url = request.url(connection.server_url());

    let mut headers = HeaderMap::new();
    for (key, value) in connection.headers().iter().chain(request.headers.iter()) {
        headers.insert(header_name(key)?, header_value(key, value)?);
    }
    headers.insert(ACCEPT, HeaderValue::from_static(request.request_format.accept()));
    headers.insert(
        HeaderName::from_static("x-plex-token"),
        header_value(TOKEN_HEADER, connection.token())?,
    );

    let body = match (request.method, &request.body) {
        (HttpMethod::Post, Some(body)) => Some((
            encode_body(body, request.request_format)?,
            request.request_format.content_type(),
        )),
        _ => None,
    };

    Ok(Prepared {
        url,
        headers,
        body,
        timeout: connection.timeout(),
    })
}

fn header_name(key: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(key.as_bytes())
        .map_err(|e| PlexError::InvalidArgument(format!("header name {key:?}: {e}")))
}

fn header_value(key: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| PlexError::InvalidArgument(format!("header {key}: {e}")))
}
