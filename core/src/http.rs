//! Request descriptors, URL building, and response envelopes.
//!
//! # Design
//! A `PlexRequest` is plain data built fresh for every call. Turning it into
//! a URL is a pure function of the server URL, so the query encoding can be
//! tested without a network. The `Envelope` is what every dispatch returns,
//! success or not; status interpretation is left to the caller.

use std::collections::BTreeMap;
use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{PlexError, Result};

/// RFC 3986 unreserved characters stay literal; everything else is escaped.
const QUERY_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
        }
    }
}

/// Wire format of a request or response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Json,
    Xml,
    Raw,
}

impl Format {
    /// Value for the `Accept` header.
    pub fn accept(self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Xml => "application/xml, text/xml",
            Format::Raw => "text/plain",
        }
    }

    /// Value for the `Content-Type` header of an encoded body.
    pub fn content_type(self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Xml => "application/xml",
            Format::Raw => "text/plain",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Json => write!(f, "json"),
            Format::Xml => write!(f, "xml"),
            Format::Raw => write!(f, "raw"),
        }
    }
}

/// One call against the server, described as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct PlexRequest {
    pub endpoint: String,
    pub method: HttpMethod,
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub request_format: Format,
    pub response_format: Format,
}

impl PlexRequest {
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: None,
            request_format: Format::Json,
            response_format: Format::Json,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, endpoint)
    }

    /// Set a query parameter, replacing an existing value for the same key.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_query(key, value);
        self
    }

    pub fn set_query(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.query.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.query.push((key, value)),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn request_format(mut self, format: Format) -> Self {
        self.request_format = format;
        self
    }

    pub fn response_format(mut self, format: Format) -> Self {
        self.response_format = format;
        self
    }

    /// Full URL for this request against `server_url`.
    pub fn url(&self, server_url: &str) -> String {
        build_url(server_url, &self.endpoint, &self.query)
    }
}

/// Join `endpoint` onto `server_url` and append the encoded query string.
pub fn build_url(server_url: &str, endpoint: &str, query: &[(String, String)]) -> String {
    let joined = format!("{}/{}", server_url, endpoint.trim_start_matches('/'));
    let mut url = joined.trim_end_matches('/').to_string();
    if !query.is_empty() {
        url.push('?');
        url.push_str(&encode_query(query));
    }
    url
}

/// Percent-encode `key=value` pairs joined by `&`; empty values emit the bare key.
pub fn encode_query(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| {
            let key = utf8_percent_encode(key, QUERY_ENCODE);
            if value.is_empty() {
                key.to_string()
            } else {
                format!("{key}={}", utf8_percent_encode(value, QUERY_ENCODE))
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encode one path segment so it cannot add segments or start a query.
///
/// Empty, `.` and `..` segments are rejected since URL parsing would drop or
/// resolve them.
pub fn encode_path_segment(segment: &str) -> Result<String> {
    if matches!(segment, "" | "." | "..") {
        return Err(PlexError::InvalidArgument(format!(
            "{segment:?} is not a usable path segment"
        )));
    }
    Ok(utf8_percent_encode(segment, QUERY_ENCODE).to_string())
}

/// Result of one HTTP call: status, reason, headers and decoded content.
///
/// `content` is `Value::Null` when the body was empty or could not be
/// decoded in the requested format.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    status: u16,
    reason: String,
    url: String,
    headers: BTreeMap<String, String>,
    content: Value,
}

impl Envelope {
    pub fn new(
        status: u16,
        reason: impl Into<String>,
        url: impl Into<String>,
        headers: BTreeMap<String, String>,
        content: Value,
    ) -> Self {
        Self {
            status,
            reason: reason.into(),
            url: url.into(),
            headers,
            content,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    pub fn into_content(self) -> Value {
        self.content
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the decoded content into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.content.clone()).map_err(|e| PlexError::Decode {
            format: Format::Json,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn query_encodes_spaces_and_bare_keys() {
        assert_eq!(encode_query(&pairs(&[("q", "a b"), ("flag", "")])), "q=a%20b&flag");
    }

    #[test]
    fn query_keeps_unreserved_characters() {
        assert_eq!(
            encode_query(&pairs(&[("title", "A-Z_0.9~"), ("sort", "titleSort:desc")])),
            "title=A-Z_0.9~&sort=titleSort%3Adesc"
        );
    }

    #[test]
    fn query_encodes_utf8_and_reserved_in_keys() {
        assert_eq!(encode_query(&pairs(&[("a&b", "é")])), "a%26b=%C3%A9");
    }

    #[test]
    fn url_without_query() {
        assert_eq!(build_url("http://h", "library/sections", &[]), "http://h/library/sections");
    }

    #[test]
    fn url_trims_slashes_around_endpoint() {
        assert_eq!(build_url("http://h", "/identity/", &[]), "http://h/identity");
        assert_eq!(build_url("http://h", "", &[]), "http://h");
    }

    #[test]
    fn url_with_query() {
        let url = build_url("http://h", "search", &pairs(&[("query", "star wars")]));
        assert_eq!(url, "http://h/search?query=star%20wars");
    }

    #[test]
    fn path_segment_escapes_separators() {
        assert_eq!(encode_path_segment("12").unwrap(), "12");
        assert_eq!(encode_path_segment("1/../2?x=y").unwrap(), "1%2F..%2F2%3Fx%3Dy");
        assert_eq!(encode_path_segment("a b#c").unwrap(), "a%20b%23c");
    }

    #[test]
    fn path_segment_rejects_dot_segments() {
        for segment in ["", ".", ".."] {
            let err = encode_path_segment(segment).unwrap_err();
            assert!(matches!(err, PlexError::InvalidArgument(_)), "{segment:?}");
        }
    }

    #[test]
    fn set_query_replaces_in_place() {
        let req = PlexRequest::get("x")
            .query("start", "0")
            .query("size", "10")
            .query("start", "20");
        assert_eq!(req.query, pairs(&[("start", "20"), ("size", "10")]));
    }

    #[test]
    fn builder_defaults_to_json() {
        let req = PlexRequest::post("x");
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.request_format, Format::Json);
        assert_eq!(req.response_format, Format::Json);
        assert!(req.body.is_none());
    }

    #[test]
    fn accept_and_content_types() {
        assert_eq!(Format::Json.accept(), "application/json");
        assert_eq!(Format::Xml.accept(), "application/xml, text/xml");
        assert_eq!(Format::Raw.accept(), "text/plain");
        assert_eq!(Format::Xml.content_type(), "application/xml");
    }

    #[test]
    fn envelope_header_lookup_ignores_case() {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "text/plain".to_string());
        let env = Envelope::new(200, "OK", "http://h", headers, Value::Null);
        assert_eq!(env.header("Content-Type"), Some("text/plain"));
        assert!(env.is_success());
    }

    #[test]
    fn envelope_decode_mismatch_is_decode_error() {
        let env = Envelope::new(
            200,
            "OK",
            "http://h",
            BTreeMap::new(),
            serde_json::json!({"a": 1}),
        );
        let err = env.decode::<Vec<u8>>().unwrap_err();
        assert!(matches!(err, PlexError::Decode { .. }));
    }
}
