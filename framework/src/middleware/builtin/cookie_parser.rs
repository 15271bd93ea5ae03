use super::string_arg;
use crate::error::FrameworkError;
use crate::http::{Request, Response};
use crate::middleware::{BoxedMiddleware, Middleware, Next};
use async_trait::async_trait;
use http::header::COOKIE;
use serde_json::Value;
use std::sync::Arc;

/// Split a `Cookie` header into name/value pairs
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim().trim_matches('"');
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

/// Fills [`Request::cookies`] from the `Cookie` header
///
/// The configured secret (the session secret by default) is exposed to
/// later middleware as the `cookieSecret` local.
pub struct CookieParser {
    secret: Option<String>,
}

impl CookieParser {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    pub fn from_args(args: Vec<Value>) -> Result<BoxedMiddleware, FrameworkError> {
        Ok(Arc::new(Self::new(string_arg(&args, 0).map(str::to_string))))
    }
}

#[async_trait]
impl Middleware for CookieParser {
    async fn handle(&self, mut request: Request, next: Next) -> Response {
        let pairs: Vec<(String, String)> = request
            .headers()
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(parse_cookie_header)
            .collect();

        let cookies = request.cookies_mut();
        for (name, value) in pairs {
            cookies.entry(name).or_insert(value);
        }
        if let Some(secret) = &self.secret {
            request.set_local("cookieSecret", secret.as_str());
        }

        next.run(request).await
    }
}
