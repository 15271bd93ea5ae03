use super::string_arg;
use crate::error::FrameworkError;
use crate::http::{map_response, Request, Response};
use crate::middleware::{BoxedMiddleware, Middleware, Next};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Adds an `X-Powered-By` header to every response
pub struct PoweredBy {
    value: String,
}

impl PoweredBy {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn from_args(args: Vec<Value>) -> Result<BoxedMiddleware, FrameworkError> {
        Ok(Arc::new(Self::new(string_arg(&args, 0).unwrap_or("Trellis"))))
    }
}

#[async_trait]
impl Middleware for PoweredBy {
    async fn handle(&self, request: Request, next: Next) -> Response {
        let value = self.value.clone();
        map_response(next.run(request).await, |r| r.header("X-Powered-By", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use crate::middleware::{endpoint, MiddlewareChain};
    use http::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_header_on_success_and_failure() {
        let mut chain = MiddlewareChain::new();
        chain.push(PoweredBy::from_args(vec![json!("Demo")]).unwrap());

        let ok = chain
            .execute(
                Request::new(Method::GET, "/"),
                endpoint(|_req| async { Ok(HttpResponse::text("ok")) }),
            )
            .await
            .unwrap();
        assert_eq!(ok.header_value("x-powered-by"), Some("Demo"));

        let err = chain
            .execute(
                Request::new(Method::GET, "/"),
                endpoint(|_req| async { Err(HttpResponse::text("no").status(500)) }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.header_value("x-powered-by"), Some("Demo"));
    }
}
