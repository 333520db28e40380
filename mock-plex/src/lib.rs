//! In-process stand-in for a Plex Media Server.
//!
//! Serves the handful of endpoints the client exercises, honours
//! `X-Plex-Container-Start`/`X-Plex-Container-Size` paging, and records every
//! page request so tests can assert on the offsets a client sent.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const START_PARAM: &str = "X-Plex-Container-Start";
pub const SIZE_PARAM: &str = "X-Plex-Container-Size";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    pub key: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// One paged listing request as the server saw it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub start: usize,
    pub size: Option<usize>,
}

#[derive(Clone, Debug)]
struct Account {
    username: String,
    password: String,
    issued_token: String,
}

/// Shared mock state; clones share the same library and request log.
#[derive(Clone)]
pub struct MockPlex {
    machine_identifier: String,
    tokens: Arc<RwLock<HashSet<String>>>,
    account: Option<Account>,
    sections: Vec<Section>,
    items: Arc<HashMap<String, Vec<Value>>>,
    page_requests: Arc<Mutex<Vec<PageRequest>>>,
    refreshed: Arc<Mutex<Vec<String>>>,
    stall: Option<(usize, Duration)>,
}

impl MockPlex {
    /// A server accepting `token`, with an empty library.
    pub fn new(token: &str) -> Self {
        let mut tokens = HashSet::new();
        tokens.insert(token.to_string());
        Self {
            machine_identifier: Uuid::new_v4().simple().to_string(),
            tokens: Arc::new(RwLock::new(tokens)),
            account: None,
            sections: Vec::new(),
            items: Arc::new(HashMap::new()),
            page_requests: Arc::new(Mutex::new(Vec::new())),
            refreshed: Arc::new(Mutex::new(Vec::new())),
            stall: None,
        }
    }

    /// Accept basic-auth sign-in for `username`/`password`, issuing `token`.
    pub fn with_account(mut self, username: &str, password: &str, token: &str) -> Self {
        self.account = Some(Account {
            username: username.to_string(),
            password: password.to_string(),
            issued_token: token.to_string(),
        });
        self
    }

    /// Add a section holding `count` generated items.
    pub fn with_section(mut self, key: &str, title: &str, kind: &str, count: usize) -> Self {
        let items = (0..count)
            .map(|i| {
                json!({
                    "ratingKey": format!("{key}-{i}"),
                    "key": format!("/library/metadata/{key}-{i}"),
                    "title": format!("{title} #{i}"),
                    "type": kind,
                    "year": 1990 + (i % 30) as u32,
                })
            })
            .collect();
        self.sections.push(Section {
            key: key.to_string(),
            title: title.to_string(),
            kind: kind.to_string(),
        });
        Arc::make_mut(&mut self.items).insert(key.to_string(), items);
        self
    }

    /// Delay item pages starting at or beyond `start` by `delay`.
    pub fn with_stall_from(mut self, start: usize, delay: Duration) -> Self {
        self.stall = Some((start, delay));
        self
    }

    pub fn machine_identifier(&self) -> &str {
        &self.machine_identifier
    }

    /// Page requests received by section listings, in arrival order.
    pub fn page_requests(&self) -> Vec<PageRequest> {
        self.page_requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Section keys whose refresh endpoint was called.
    pub fn refreshed(&self) -> Vec<String> {
        self.refreshed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/identity", get(identity))
            .route("/library/sections", get(list_sections))
            .route("/library/sections/{id}/all", get(section_items))
            .route("/library/sections/{id}/refresh", get(refresh_section))
            .route("/broken", get(broken))
            .route("/echo", post(echo))
            .route("/users/sign_in.json", post(sign_in))
            .with_state(self.clone())
    }

    async fn authorize(&self, headers: &HeaderMap) -> Result<(), StatusCode> {
        let token = headers
            .get("x-plex-token")
            .and_then(|v| v.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;
        if self.tokens.read().await.contains(token) {
            Ok(())
        } else {
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// The router for a mock that accepts `token` and holds no sections.
pub fn app(token: &str) -> Router {
    MockPlex::new(token).router()
}

pub async fn run(listener: TcpListener, mock: MockPlex) -> Result<(), std::io::Error> {
    axum::serve(listener, mock.router()).await
}

fn wants_xml(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("xml"))
}

fn paging(params: &HashMap<String, String>) -> PageRequest {
    PageRequest {
        start: params
            .get(START_PARAM)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        size: params.get(SIZE_PARAM).and_then(|v| v.parse().ok()),
    }
}

fn window<T: Clone>(all: &[T], page: PageRequest) -> Vec<T> {
    let start = page.start.min(all.len());
    let end = match page.size {
        Some(size) => start.saturating_add(size).min(all.len()),
        None => all.len(),
    };
    all[start..end].to_vec()
}

/// Render a sections listing the way Plex does for `Accept: application/xml`.
fn sections_xml(sections: &[Section]) -> Result<String, quick_xml::Error> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let size = sections.len().to_string();
    let container = BytesStart::new("MediaContainer").with_attributes([("size", size.as_str())]);
    if sections.is_empty() {
        writer.write_event(Event::Empty(container))?;
    } else {
        writer.write_event(Event::Start(container))?;
        for section in sections {
            writer.write_event(Event::Empty(BytesStart::new("Directory").with_attributes([
                ("key", section.key.as_str()),
                ("title", section.title.as_str()),
                ("type", section.kind.as_str()),
            ])))?;
        }
        writer.write_event(Event::End(BytesEnd::new("MediaContainer")))?;
    }
    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

async fn identity(State(mock): State<MockPlex>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    mock.authorize(&headers).await?;
    Ok(Json(json!({
        "MediaContainer": {
            "size": 0,
            "claimed": true,
            "machineIdentifier": mock.machine_identifier,
            "version": "1.40.0.7998",
        }
    })))
}

async fn list_sections(
    State(mock): State<MockPlex>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, StatusCode> {
    mock.authorize(&headers).await?;
    let page = window(&mock.sections, paging(&params));

    if wants_xml(&headers) {
        let body = sections_xml(&page).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        return Ok(([(header::CONTENT_TYPE, "application/xml")], body).into_response());
    }

    let mut container = json!({ "size": page.len(), "title1": "Plex Library" });
    if !page.is_empty() {
        container["Directory"] = json!(page);
    }
    Ok(Json(json!({ "MediaContainer": container })).into_response())
}

async fn section_items(
    State(mock): State<MockPlex>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    mock.authorize(&headers).await?;
    let items = mock.items.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    let page = paging(&params);
    mock.page_requests
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(page);

    if let Some((from, delay)) = mock.stall {
        if page.start >= from {
            tokio::time::sleep(delay).await;
        }
    }

    let slice = window(items, page);
    let mut container = json!({
        "size": slice.len(),
        "totalSize": items.len(),
        "offset": page.start,
        "librarySectionID": id,
    });
    // Plex omits the list entirely once the offset runs past the end.
    if !slice.is_empty() {
        container["Metadata"] = Value::Array(slice);
    }
    Ok(Json(json!({ "MediaContainer": container })))
}

async fn refresh_section(
    State(mock): State<MockPlex>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, StatusCode> {
    mock.authorize(&headers).await?;
    if !mock.items.contains_key(&id) {
        return Err(StatusCode::NOT_FOUND);
    }
    mock.refreshed
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(id);
    Ok(StatusCode::OK)
}

async fn broken(State(mock): State<MockPlex>, headers: HeaderMap) -> Result<Response, StatusCode> {
    mock.authorize(&headers).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::HeaderName::from_static("x-mock-case"), "broken"),
        ],
        "{\"MediaContainer\": [unterminated",
    )
        .into_response())
}

async fn echo(State(mock): State<MockPlex>, headers: HeaderMap, body: Bytes) -> Result<Response, StatusCode> {
    mock.authorize(&headers).await?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/plain")
        .to_string();
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

async fn sign_in(State(mock): State<MockPlex>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    let account = mock.account.as_ref().ok_or(StatusCode::UNAUTHORIZED)?;
    let (username, password) = basic_credentials(&headers).ok_or(StatusCode::UNAUTHORIZED)?;
    if username != account.username || password != account.password {
        return Err(StatusCode::UNAUTHORIZED);
    }
    if headers.get("x-plex-client-identifier").is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }
    mock.tokens.write().await.insert(account.issued_token.clone());
    Ok(Json(json!({
        "user": {
            "username": account.username,
            "authToken": account.issued_token,
        }
    })))
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_clamps_to_bounds() {
        let all: Vec<u32> = (0..5).collect();
        assert_eq!(window(&all, PageRequest { start: 0, size: Some(2) }), vec![0, 1]);
        assert_eq!(window(&all, PageRequest { start: 4, size: Some(2) }), vec![4]);
        assert!(window(&all, PageRequest { start: 9, size: Some(2) }).is_empty());
        assert_eq!(window(&all, PageRequest { start: 1, size: None }).len(), 4);
    }

    #[test]
    fn paging_reads_plex_params() {
        let mut params = HashMap::new();
        params.insert(START_PARAM.to_string(), "200".to_string());
        params.insert(SIZE_PARAM.to_string(), "100".to_string());
        assert_eq!(paging(&params), PageRequest { start: 200, size: Some(100) });
        assert_eq!(paging(&HashMap::new()), PageRequest { start: 0, size: None });
    }

    #[test]
    fn generated_items_are_numbered() {
        let mock = MockPlex::new("t").with_section("3", "Shows", "show", 2);
        let items = &mock.items["3"];
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["ratingKey"], "3-1");
        assert_eq!(items[1]["title"], "Shows #1");
    }

    #[test]
    fn basic_credentials_decode() {
        let mut headers = HeaderMap::new();
        let encoded = STANDARD.encode("alice:pa:ss");
        headers.insert(header::AUTHORIZATION, format!("Basic {encoded}").parse().unwrap());
        assert_eq!(
            basic_credentials(&headers),
            Some(("alice".to_string(), "pa:ss".to_string()))
        );
    }

    #[test]
    fn sections_xml_escapes_attributes() {
        let sections = vec![Section {
            key: "1".to_string(),
            title: "Tom & \"Jerry\" <3".to_string(),
            kind: "show".to_string(),
        }];
        let xml = sections_xml(&sections).unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"title="Tom &amp; &quot;Jerry&quot; &lt;3""#));
        assert!(xml.ends_with("</MediaContainer>"));
    }

    #[test]
    fn empty_sections_xml_is_a_bare_container() {
        assert!(sections_xml(&[]).unwrap().ends_with(r#"<MediaContainer size="0"/>"#));
    }
}
