use crate::error::{AppError, FrameworkError};
use bytes::Bytes;
use http_body_util::Full;

/// HTTP Response builder
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: u16,
    body: String,
    headers: Vec<(String, String)>,
}

/// Response type alias - allows using `?` operator for early returns
pub type Response = Result<HttpResponse, HttpResponse>;

impl HttpResponse {
    pub fn new() -> Self {
        Self {
            status: 200,
            body: String::new(),
            headers: Vec::new(),
        }
    }

    /// Create a response with a string body
    pub fn text(body: impl Into<String>) -> Self {
        Self::new()
            .header("Content-Type", "text/plain")
            .body(body)
    }

    /// Create an HTML response
    pub fn html(body: impl Into<String>) -> Self {
        Self::new()
            .header("Content-Type", "text/html; charset=utf-8")
            .body(body)
    }

    /// Create a JSON response from a serde_json::Value
    pub fn json(body: serde_json::Value) -> Self {
        Self::new()
            .header("Content-Type", "application/json")
            .body(body.to_string())
    }

    /// Set the HTTP status code
    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Replace the body
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Add a header to the response
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set a header, replacing any existing value with the same name
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    /// Add a header without replacing existing ones (e.g. `Set-Cookie`)
    pub fn append_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn status_code(&self) -> u16 {
        self.status
    }

    pub fn body_str(&self) -> &str {
        &self.body
    }

    /// First value of a header (case-insensitive)
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Wrap this response in Ok() for use as Response type
    pub fn ok(self) -> Response {
        Ok(self)
    }

    /// Convert to hyper response
    pub fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let mut builder = hyper::Response::builder().status(self.status);

        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }

        builder
            .body(Full::new(Bytes::from(self.body)))
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "invalid response, sending 500");
                let mut response = hyper::Response::new(Full::new(Bytes::from_static(
                    b"Internal Server Error",
                )));
                *response.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
                response
            })
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `f` to a response whether it succeeded or failed
pub fn map_response<F>(response: Response, f: F) -> Response
where
    F: FnOnce(HttpResponse) -> HttpResponse,
{
    match response {
        Ok(r) => Ok(f(r)),
        Err(r) => Err(f(r)),
    }
}

/// HTTP Redirect response builder
pub struct Redirect {
    location: String,
    query_params: Vec<(String, String)>,
    status: u16,
}

impl Redirect {
    /// Create a redirect to a specific URL/path
    pub fn to(path: impl Into<String>) -> Self {
        Self {
            location: path.into(),
            query_params: Vec::new(),
            status: 302,
        }
    }

    /// Add a query parameter
    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query_params.push((key.to_string(), value.into()));
        self
    }

    /// Set status to 301 (Moved Permanently)
    pub fn permanent(mut self) -> Self {
        self.status = 301;
        self
    }

    fn build_url(&self) -> String {
        if self.query_params.is_empty() {
            self.location.clone()
        } else {
            let query = serde_urlencoded::to_string(&self.query_params).unwrap_or_default();
            format!("{}?{}", self.location, query)
        }
    }
}

/// Auto-convert Redirect to Response
impl From<Redirect> for Response {
    fn from(redirect: Redirect) -> Response {
        Ok(HttpResponse::new()
            .status(redirect.status)
            .header("Location", redirect.build_url()))
    }
}

/// Auto-convert FrameworkError to HttpResponse
///
/// This enables using the `?` operator in route handlers to propagate
/// framework errors as appropriate HTTP responses.
impl From<FrameworkError> for HttpResponse {
    fn from(err: FrameworkError) -> HttpResponse {
        HttpResponse::json(serde_json::json!({
            "error": err.to_string()
        }))
        .status(err.status_code())
    }
}

impl From<AppError> for HttpResponse {
    fn from(err: AppError) -> HttpResponse {
        let framework_err: FrameworkError = err.into();
        framework_err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_builds_location() {
        let response: Response = Redirect::to("/login").query("next", "/a b").into();
        let response = response.unwrap();
        assert_eq!(response.status_code(), 302);
        assert_eq!(response.header_value("location"), Some("/login?next=%2Fa+b"));
    }

    #[test]
    fn test_set_header_replaces() {
        let mut response = HttpResponse::text("hi").header("X-A", "1");
        response.set_header("x-a", "2");
        assert_eq!(response.header_value("X-A"), Some("2"));
        assert_eq!(response.header_value("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_app_error_to_response() {
        let response: HttpResponse = AppError::not_found("gone").into();
        assert_eq!(response.status_code(), 404);
        assert_eq!(response.body_str(), r#"{"error":"gone"}"#);
    }
}
