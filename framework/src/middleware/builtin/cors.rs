use super::{object_arg, string_list};
use crate::error::FrameworkError;
use crate::http::{map_response, HttpResponse, Request, Response};
use crate::middleware::{BoxedMiddleware, Middleware, Next};
use async_trait::async_trait;
use http::Method;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
enum AllowedOrigin {
    /// Echo the request's `Origin`
    Reflect,
    Any,
    List(Vec<String>),
}

/// Cross-origin resource sharing headers and preflight answers
pub struct Cors {
    origin: AllowedOrigin,
    credentials: bool,
    methods: String,
    allowed_headers: String,
}

impl Cors {
    pub fn from_args(args: Vec<Value>) -> Result<BoxedMiddleware, FrameworkError> {
        let options = object_arg("cors", &args)?;

        let origin = match options.get("origin") {
            None | Some(Value::Bool(true)) => AllowedOrigin::Reflect,
            Some(Value::String(s)) if s == "*" => AllowedOrigin::Any,
            Some(Value::Bool(false)) => AllowedOrigin::List(Vec::new()),
            other => AllowedOrigin::List(string_list(other).ok_or_else(|| {
                FrameworkError::invalid_middleware("cors", "`origin` must be a boolean, a string or a list")
            })?),
        };
        let methods = string_list(options.get("methods"))
            .unwrap_or_else(|| {
                ["GET", "HEAD", "PUT", "PATCH", "POST", "DELETE", "OPTIONS"]
                    .map(String::from)
                    .to_vec()
            })
            .join(",");
        let allowed_headers = string_list(options.get("allowedHeaders"))
            .unwrap_or_default()
            .join(",");

        Ok(Arc::new(Self {
            origin,
            credentials: options
                .get("credentials")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            methods,
            allowed_headers,
        }))
    }

    fn allow_origin(&self, origin: Option<&str>) -> Option<String> {
        match &self.origin {
            AllowedOrigin::Any => Some("*".to_string()),
            AllowedOrigin::Reflect => origin.map(str::to_string),
            AllowedOrigin::List(list) => origin
                .filter(|o| list.iter().any(|allowed| allowed == o))
                .map(str::to_string),
        }
    }

    fn decorate(&self, mut response: HttpResponse, allowed: &str) -> HttpResponse {
        response.set_header("Access-Control-Allow-Origin", allowed);
        if self.origin != AllowedOrigin::Any {
            response.append_header("Vary", "Origin");
        }
        if self.credentials {
            response.set_header("Access-Control-Allow-Credentials", "true");
        }
        response
    }
}

#[async_trait]
impl Middleware for Cors {
    async fn handle(&self, request: Request, next: Next) -> Response {
        let allowed = self.allow_origin(request.header("origin"));
        let preflight = request.method() == Method::OPTIONS
            && request.header("access-control-request-method").is_some();

        let Some(allowed) = allowed else {
            return next.run(request).await;
        };

        if preflight {
            let mut response = self.decorate(HttpResponse::new().status(204), &allowed);
            response.set_header("Access-Control-Allow-Methods", self.methods.as_str());
            let headers = if self.allowed_headers.is_empty() {
                request
                    .header("access-control-request-headers")
                    .unwrap_or_default()
                    .to_string()
            } else {
                self.allowed_headers.clone()
            };
            if !headers.is_empty() {
                response.set_header("Access-Control-Allow-Headers", headers);
            }
            return Ok(response);
        }

        map_response(next.run(request).await, |r| self.decorate(r, &allowed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{endpoint, MiddlewareChain};
    use serde_json::json;

    async fn run(options: Value, request: Request) -> HttpResponse {
        let mut chain = MiddlewareChain::new();
        chain.push(Cors::from_args(vec![options]).unwrap());
        chain
            .execute(request, endpoint(|_req| async { Ok(HttpResponse::text("body")) }))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_reflects_origin_with_credentials() {
        let response = run(
            json!({ "origin": true, "credentials": true }),
            Request::new(Method::GET, "/").with_header("origin", "https://app.example"),
        )
        .await;

        assert_eq!(response.body_str(), "body");
        assert_eq!(
            response.header_value("access-control-allow-origin"),
            Some("https://app.example")
        );
        assert_eq!(response.header_value("access-control-allow-credentials"), Some("true"));
    }

    #[tokio::test]
    async fn test_preflight_short_circuits() {
        let response = run(
            json!({ "origin": "*", "allowedHeaders": ["Content-Type", "Authorization"] }),
            Request::new(Method::OPTIONS, "/users")
                .with_header("origin", "https://other.example")
                .with_header("access-control-request-method", "POST"),
        )
        .await;

        assert_eq!(response.status_code(), 204);
        assert_eq!(response.body_str(), "");
        assert_eq!(response.header_value("access-control-allow-origin"), Some("*"));
        assert_eq!(
            response.header_value("access-control-allow-headers"),
            Some("Content-Type,Authorization")
        );
    }

    #[tokio::test]
    async fn test_unlisted_origin_gets_no_headers() {
        let response = run(
            json!({ "origin": ["https://a.example"] }),
            Request::new(Method::GET, "/").with_header("origin", "https://b.example"),
        )
        .await;
        assert_eq!(response.header_value("access-control-allow-origin"), None);
    }
}
