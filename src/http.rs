//! Normalized HTTP request/response model and injection value objects
//!
//! The transport delivering these is out of scope; any server that can
//! produce an [`HttpRequest`] and serialize an [`HttpResponse`] works.

use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// HTTP verb of a request or route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            other => Err(format!("unknown HTTP method: {other}")),
        }
    }
}

/// Authentication record attached to a request by upstream auth middleware.
#[derive(Debug, Clone)]
pub struct Authentication {
    pub principal: String,
    pub authenticated: bool,
    pub attributes: HashMap<String, Value>,
}

impl Authentication {
    /// A successfully authenticated principal.
    pub fn authenticated(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            authenticated: true,
            attributes: HashMap::new(),
        }
    }

    /// An anonymous, unauthenticated placeholder.
    pub fn anonymous() -> Self {
        Self {
            principal: String::new(),
            authenticated: false,
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Normalized inbound request.
///
/// Header, cookie, query, and path-parameter maps plus an optional
/// structured body. Mutable per-request state (path params, attached
/// authentication, the context map) is private to one dispatch.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub path_params: HashMap<String, String>,
    pub body: Option<Value>,
    authentication: Option<Arc<Authentication>>,
    context: HashMap<String, Value>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HashMap::new(),
            cookies: HashMap::new(),
            query: HashMap::new(),
            path_params: HashMap::new(),
            body: None,
            authentication: None,
            context: HashMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Header lookup by exact name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Attach the authentication produced by upstream middleware.
    pub fn set_authentication(&mut self, auth: Authentication) {
        self.authentication = Some(Arc::new(auth));
    }

    pub fn authentication(&self) -> Option<&Arc<Authentication>> {
        self.authentication.as_ref()
    }

    /// Per-request context map for middleware bookkeeping.
    pub fn set_context(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), value);
    }

    pub fn context(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }
}

/// Outbound response: status, headers, structured body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

impl HttpResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body,
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Bound header name/value pair handed to a handler parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderValue {
    pub name: String,
    pub value: String,
}

impl std::fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// Bound cookie name/value pair handed to a handler parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieValue {
    pub name: String,
    pub value: String,
}

impl std::fmt::Display for CookieValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// Parsed multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub content: Vec<u8>,
    pub content_type: Option<String>,
    pub size: usize,
}

impl UploadedFile {
    pub fn content_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

/// Whether a request-data entry looks like file data: an object carrying
/// `filename` and `content` keys, or a non-empty list of such objects.
pub(crate) fn is_file_value(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.contains_key("filename") && map.contains_key("content"),
        Value::Array(items) => items
            .first()
            .and_then(Value::as_object)
            .is_some_and(|map| map.contains_key("filename")),
        _ => false,
    }
}

/// Parse one file object. Returns `None` when the value is not file-shaped.
pub(crate) fn parse_file_value(value: &Value) -> Option<UploadedFile> {
    let map = value.as_object()?;
    let filename = map.get("filename")?.as_str()?.to_string();
    let content = map.get("content")?.as_str()?.as_bytes().to_vec();
    let content_type = map
        .get("content_type")
        .and_then(Value::as_str)
        .map(str::to_string);
    let size = content.len();
    Some(UploadedFile {
        filename,
        content,
        content_type,
        size,
    })
}

/// Parse a list of file objects, skipping entries that are not file-shaped.
pub(crate) fn parse_file_list(value: &Value) -> Vec<UploadedFile> {
    match value {
        Value::Array(items) => items.iter().filter_map(parse_file_value).collect(),
        other => parse_file_value(other).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_round_trips_through_str() {
        assert_eq!("GET".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!(HttpMethod::Delete.as_str(), "DELETE");
        assert!("TELEPORT".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn request_builder_sets_maps() {
        let req = HttpRequest::get("/users")
            .with_header("User-Agent", "Foo/1.0")
            .with_cookie("session", "abc")
            .with_query("page", "2");
        assert_eq!(req.header("User-Agent"), Some("Foo/1.0"));
        assert_eq!(req.cookie("session"), Some("abc"));
        assert_eq!(req.query.get("page").map(String::as_str), Some("2"));
    }

    #[test]
    fn authentication_attaches_to_request() {
        let mut req = HttpRequest::get("/");
        assert!(req.authentication().is_none());

        req.set_authentication(Authentication::authenticated("alice"));
        let auth = req.authentication().unwrap();
        assert!(auth.authenticated);
        assert_eq!(auth.principal, "alice");
    }

    #[test]
    fn file_value_detection_and_parsing() {
        let file = json!({"filename": "a.txt", "content": "hello", "content_type": "text/plain"});
        assert!(is_file_value(&file));
        let parsed = parse_file_value(&file).unwrap();
        assert_eq!(parsed.filename, "a.txt");
        assert_eq!(parsed.size, 5);
        assert_eq!(parsed.content_type.as_deref(), Some("text/plain"));

        assert!(!is_file_value(&json!("plain string")));
        assert!(!is_file_value(&json!({"filename": "a.txt"})));

        let list = json!([{"filename": "a", "content": "x"}, {"filename": "b", "content": "yz"}]);
        assert!(is_file_value(&list));
        let parsed = parse_file_list(&list);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].size, 2);
    }
}
