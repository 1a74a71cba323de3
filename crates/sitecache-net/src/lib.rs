//! # Sitecache Net
//!
//! Request/response model and the network boundary for the sitecache layer.
//!
//! ## Design Goals
//!
//! 1. **Host-shaped requests**: method, URL, destination and mode as the host reports them
//! 2. **Cheap clones**: responses carry a fully buffered body so a copy can be cached
//!    while the original is returned to the page
//! 3. **Injected network**: strategies only see the [`Fetcher`] trait
//! 4. **HTTP loader**: a `reqwest`-backed [`HttpFetcher`] for real deployments

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use mime::Mime;
use thiserror::Error;
use url::Url;

pub mod loader;

pub use loader::{HttpFetcher, LoaderConfig};

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Body decode error: {0}")]
    Decode(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// What the requester intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    Document,
    Script,
    Style,
    Image,
    Font,
    Manifest,
    /// `fetch()`/XHR and anything the host reports as empty.
    #[default]
    Empty,
    Other,
}

impl Destination {
    /// Parse the host's destination string.
    pub fn parse(value: &str) -> Self {
        match value {
            "document" => Self::Document,
            "script" => Self::Script,
            "style" => Self::Style,
            "image" => Self::Image,
            "font" => Self::Font,
            "manifest" => Self::Manifest,
            "" => Self::Empty,
            _ => Self::Other,
        }
    }

    /// Script, style, image or font.
    pub fn is_subresource_asset(&self) -> bool {
        matches!(self, Self::Script | Self::Style | Self::Image | Self::Font)
    }
}

/// Request mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level or frame navigation.
    Navigate,
    #[default]
    SameOrigin,
    NoCors,
    Cors,
}

/// Identity of a cache entry: method plus absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub method: Method,
    pub url: Url,
}

impl RequestKey {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url }
    }

    /// Key for a GET of `url`.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub destination: Destination,
    pub mode: RequestMode,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            destination: Destination::Empty,
            mode: RequestMode::SameOrigin,
        }
    }

    /// Create a navigation request for a document.
    pub fn navigate(url: Url) -> Self {
        Self {
            destination: Destination::Document,
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    /// Create a POST request.
    pub fn post(url: Url, body: Bytes) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get(url)
        }
    }

    /// Set the destination.
    pub fn destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Set the method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Whether this request loads a document.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate || self.destination == Destination::Document
    }

    /// The cache identity of this request.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.method.clone(), self.url.clone())
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Option<Url>,
    pub status: StatusCode,
    pub headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Create a response with no headers.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            url: None,
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Create a `text/html` response.
    pub fn html(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self::new(status, body)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/html"))
    }

    /// Create an `application/json` response from a JSON value.
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
    }

    /// Add a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the final URL.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Check if the status is 2xx.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Parsed Content-Type.
    pub fn content_type(&self) -> Option<Mime> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<Mime>().ok())
    }

    /// Header value as a string, if present and ASCII.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Raw body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8 text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::Decode(e.to_string()))
    }

    /// Body as JSON.
    pub fn json_body<T: serde::de::DeserializeOwned>(&self) -> Result<T, NetError> {
        serde_json::from_slice(&self.body).map_err(|e| NetError::Decode(e.to_string()))
    }
}

/// The network boundary. Rejects (returns `Err`) only on network failure;
/// HTTP error statuses are ordinary responses.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_request_builder() {
        let request = Request::get(url("https://example.com/app.js"))
            .destination(Destination::Script)
            .header(
                HeaderName::from_static("accept"),
                HeaderValue::from_static("*/*"),
            );

        assert_eq!(request.method, Method::GET);
        assert_eq!(request.destination, Destination::Script);
        assert!(request.headers.contains_key("accept"));
        assert!(!request.is_navigation());
    }

    #[test]
    fn test_navigation_detection() {
        assert!(Request::navigate(url("https://example.com/")).is_navigation());
        let doc = Request::get(url("https://example.com/")).destination(Destination::Document);
        assert!(doc.is_navigation());
    }

    #[test]
    fn test_request_id_uniqueness() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn test_request_key_includes_method() {
        let get = Request::get(url("https://example.com/api/x"));
        let post = Request::post(url("https://example.com/api/x"), Bytes::new());
        assert_ne!(get.key(), post.key());
        assert_eq!(get.key().to_string(), "GET https://example.com/api/x");
    }

    #[test]
    fn test_destination_parse() {
        assert_eq!(Destination::parse("font"), Destination::Font);
        assert_eq!(Destination::parse(""), Destination::Empty);
        assert_eq!(Destination::parse("audio"), Destination::Other);
        assert!(Destination::Image.is_subresource_asset());
        assert!(!Destination::Manifest.is_subresource_asset());
    }

    #[test]
    fn test_json_response() {
        let response = Response::json(StatusCode::SERVICE_UNAVAILABLE, &json!({"offline": true}));
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.content_type(), Some(mime::APPLICATION_JSON));
        let body: serde_json::Value = response.json_body().unwrap();
        assert_eq!(body["offline"], true);
    }

    #[test]
    fn test_html_response() {
        let response = Response::html(StatusCode::OK, "<p>hi</p>");
        assert!(response.ok());
        assert_eq!(response.content_type(), Some(mime::TEXT_HTML));
        assert_eq!(response.header_str("content-type"), Some("text/html"));
        assert_eq!(response.text().unwrap(), "<p>hi</p>");
    }
}
