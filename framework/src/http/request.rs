use crate::error::FrameworkError;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// HTTP request as seen by middleware and route handlers
///
/// Middleware communicate through [`Request::locals`] (session id, locale,
/// cookie secret) the way handlers read route parameters through
/// [`Request::param`].
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    headers: HeaderMap,
    params: HashMap<String, String>,
    cookies: HashMap<String, String>,
    locals: Map<String, Value>,
    body: Bytes,
}

impl Request {
    /// Build a request from a method and a path with optional query string
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (uri, None),
        };
        let query = query
            .and_then(|q| serde_urlencoded::from_str::<Vec<(String, String)>>(q).ok())
            .map(|pairs| pairs.into_iter().collect())
            .unwrap_or_default();

        Self {
            method,
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            query,
            headers: HeaderMap::new(),
            params: HashMap::new(),
            cookies: HashMap::new(),
            locals: Map::new(),
            body: Bytes::new(),
        }
    }

    /// Convert an incoming hyper request, collecting its body
    pub async fn from_hyper(
        req: hyper::Request<hyper::body::Incoming>,
    ) -> Result<Self, FrameworkError> {
        let (parts, body) = req.into_parts();
        let uri = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let body = body
            .collect()
            .await
            .map_err(|e| FrameworkError::internal(format!("Failed to read request body: {}", e)))?
            .to_bytes();

        let mut request = Self::new(parts.method, &uri);
        request.headers = parts.headers;
        request.body = body;
        Ok(request)
    }

    /// Add a header (invalid names or values are ignored)
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    /// Get the request method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Get the request path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get a route parameter by name (e.g., /users/:id)
    pub fn param(&self, name: &str) -> Result<&str, FrameworkError> {
        self.params
            .get(name)
            .map(|s| s.as_str())
            .ok_or_else(|| FrameworkError::domain(format!("Missing required parameter: {}", name), 400))
    }

    /// Get all route parameters
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    /// Get a query string value
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(|s| s.as_str())
    }

    /// Get a header value by name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get the Content-Type header
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Get a parsed cookie (populated by the cookie-parser middleware)
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|s| s.as_str())
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.cookies
    }

    /// Per-request values shared between middleware and handlers
    pub fn locals(&self) -> &Map<String, Value> {
        &self.locals
    }

    pub fn local(&self, name: &str) -> Option<&Value> {
        self.locals.get(name)
    }

    pub fn set_local(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.locals.insert(name.into(), value.into());
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Parse the request body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FrameworkError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| FrameworkError::domain(format!("Invalid JSON body: {}", e), 400))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_splits_query() {
        let req = Request::new(Method::GET, "/search?q=rust&page=2");
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query("q"), Some("rust"));
        assert_eq!(req.query("page"), Some("2"));
        assert_eq!(req.query("missing"), None);
    }

    #[test]
    fn test_param_missing_is_bad_request() {
        let req = Request::new(Method::GET, "/users/1");
        let err = req.param("id").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_json_body() {
        let req = Request::new(Method::POST, "/users").with_body(r#"{"name":"ada"}"#);
        let value: Value = req.json().unwrap();
        assert_eq!(value["name"], "ada");
    }
}
