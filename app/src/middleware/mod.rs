//! Application middleware

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use trellis::serde_json::json;
use trellis::{middleware_fn, BoxedMiddleware, HttpResponse, MiddlewareDescriptor, MiddlewareImpl};

/// Tags every request with a sequential id
///
/// Runs after the configured defaults. Under `global` middleware ordering its
/// order of 1 ties with the request logger, so it runs just after the logger.
pub fn request_id() -> MiddlewareDescriptor {
    let counter = Arc::new(AtomicU64::new(1));
    let handler = middleware_fn(move |mut req, next| {
        let id = counter.fetch_add(1, Ordering::Relaxed);
        async move {
            req.set_local("requestId", id);
            let response = next.run(req).await;
            trellis::http::map_response(response, |res| res.header("X-Request-Id", id.to_string()))
        }
    });
    MiddlewareDescriptor::new("requestId")
        .implementation(MiddlewareImpl::handler(handler))
        .order(1)
}

/// Route guard: requires an `Authorization: Bearer <token>` header
pub fn is_logged_in() -> BoxedMiddleware {
    middleware_fn(|req, next| async move {
        let authorized = req
            .header("authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| !token.is_empty());
        if !authorized {
            return Err(HttpResponse::json(json!({ "error": "Unauthorized" })).status(401));
        }
        next.run(req).await
    })
}
