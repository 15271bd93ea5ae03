use super::object_arg;
use crate::config::security::generate_secret;
use crate::error::FrameworkError;
use crate::http::{map_response, HttpResponse, Request, Response};
use crate::middleware::{BoxedMiddleware, Middleware, Next};
use async_trait::async_trait;
use http::Method;
use serde_json::{json, Value};
use std::sync::Arc;

/// Double-submit cookie CSRF protection
///
/// Safe requests receive a token cookie (and the `csrfToken` local). Unsafe
/// requests must echo the cookie's value in the token header or get a 403.
pub struct Csrf {
    cookie: String,
    header: String,
}

impl Csrf {
    pub fn from_args(args: Vec<Value>) -> Result<BoxedMiddleware, FrameworkError> {
        let options = object_arg("csrf", &args)?;
        let field = |name: &str, default: &str| {
            options
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or(default)
                .to_string()
        };
        Ok(Arc::new(Self {
            cookie: field("cookie", "_csrf"),
            header: field("header", "x-csrf-token").to_ascii_lowercase(),
        }))
    }

    fn cookie_token(&self, request: &Request) -> Option<String> {
        if let Some(token) = request.cookie(&self.cookie) {
            return Some(token.to_string());
        }
        request
            .header("cookie")
            .map(super::parse_cookie_header)
            .unwrap_or_default()
            .into_iter()
            .find(|(name, _)| *name == self.cookie)
            .map(|(_, value)| value)
    }
}

fn is_safe(method: &Method) -> bool {
    [Method::GET, Method::HEAD, Method::OPTIONS, Method::TRACE].contains(method)
}

#[async_trait]
impl Middleware for Csrf {
    async fn handle(&self, mut request: Request, next: Next) -> Response {
        let existing = self.cookie_token(&request);

        if !is_safe(request.method()) {
            let submitted = request.header(&self.header);
            let valid = matches!((&existing, submitted), (Some(expected), Some(given)) if expected == given);
            if !valid {
                tracing::debug!(path = request.path(), "rejected request with a missing or wrong CSRF token");
                return Err(HttpResponse::json(json!({ "error": "Invalid CSRF token" })).status(403));
            }
            return next.run(request).await;
        }

        let (token, issued) = match existing {
            Some(token) => (token, false),
            None => (generate_secret(), true),
        };
        request.set_local("csrfToken", token.as_str());
        let response = next.run(request).await;
        if !issued {
            return response;
        }
        let cookie = format!("{}={}; Path=/; SameSite=Strict", self.cookie, token);
        map_response(response, |mut r| {
            r.append_header("Set-Cookie", cookie);
            r
        })
    }
}
