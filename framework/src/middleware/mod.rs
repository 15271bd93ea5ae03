//! Middleware: the trait, the continuation, and the resolution pipeline
//!
//! Middleware are resolved from configuration by [`MiddlewareResolver`]
//! into a [`MiddlewarePlan`]: an ordered list that runs before routing.
//! Route handlers use the same trait, so a route's handler list is itself a
//! small middleware chain.
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis::middleware::{middleware_fn, MiddlewareDescriptor, MiddlewareImpl};
//!
//! let request_id = MiddlewareImpl::handler(middleware_fn(|mut req, next| async move {
//!     req.set_local("requestId", "abc");
//!     next.run(req).await
//! }));
//! let descriptor = MiddlewareDescriptor::new("requestId")
//!     .implementation(request_id)
//!     .order(1);
//! ```

pub mod builtin;
mod descriptor;
mod resolver;

pub use descriptor::{
    MiddlewareDescriptor, MiddlewareOptions, OptionsDone, OptionsProvider, UseRef,
};
pub use resolver::{
    MiddlewarePlan, MiddlewareResolver, OrderingMode, ResolvedMiddleware, DEFAULT_CUSTOM_ORDER,
};

use crate::error::FrameworkError;
use crate::http::{Request, Response};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed, sendable future
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A request-processing step that may pass control on with [`Next::run`]
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: Request, next: Next) -> Response;
}

pub type BoxedMiddleware = Arc<dyn Middleware>;

pub fn into_boxed<M: Middleware + 'static>(middleware: M) -> BoxedMiddleware {
    Arc::new(middleware)
}

/// What runs when every middleware in a chain has called `next`
pub type Endpoint = Arc<dyn Fn(Request) -> BoxFuture<Response> + Send + Sync>;

/// Continuation handed to each middleware
#[derive(Clone)]
pub struct Next {
    stack: Arc<[BoxedMiddleware]>,
    index: usize,
    endpoint: Endpoint,
}

impl Next {
    pub fn new(stack: Arc<[BoxedMiddleware]>, endpoint: Endpoint) -> Self {
        Self {
            stack,
            index: 0,
            endpoint,
        }
    }

    /// Run the rest of the chain
    pub async fn run(self, request: Request) -> Response {
        match self.stack.get(self.index).cloned() {
            Some(middleware) => {
                let next = Next {
                    stack: Arc::clone(&self.stack),
                    index: self.index + 1,
                    endpoint: Arc::clone(&self.endpoint),
                };
                middleware.handle(request, next).await
            }
            None => (self.endpoint)(request).await,
        }
    }
}

/// Ordered list of middleware executed around an endpoint
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middleware: Vec<BoxedMiddleware>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, middleware: BoxedMiddleware) {
        self.middleware.push(middleware);
    }

    pub fn extend(&mut self, middleware: impl IntoIterator<Item = BoxedMiddleware>) {
        self.middleware.extend(middleware);
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Execute the chain, ending in `endpoint`
    pub async fn execute(&self, request: Request, endpoint: Endpoint) -> Response {
        let stack: Arc<[BoxedMiddleware]> = self.middleware.clone().into();
        Next::new(stack, endpoint).run(request).await
    }
}

/// Wrap an async closure into an [`Endpoint`]
pub fn endpoint<F, Fut>(f: F) -> Endpoint
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |request| Box::pin(f(request)))
}

struct MiddlewareFn<F>(F);

#[async_trait]
impl<F, Fut> Middleware for MiddlewareFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Response> + Send,
{
    async fn handle(&self, request: Request, next: Next) -> Response {
        (self.0)(request, next).await
    }
}

/// Middleware from an async closure taking the request and the continuation
pub fn middleware_fn<F, Fut>(f: F) -> BoxedMiddleware
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(MiddlewareFn(f))
}

struct HandlerFn<F>(F);

#[async_trait]
impl<F, Fut> Middleware for HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Response> + Send,
{
    async fn handle(&self, request: Request, _next: Next) -> Response {
        (self.0)(request).await
    }
}

/// Terminal handler from an async closure (never calls `next`)
pub fn handler_fn<F, Fut>(f: F) -> BoxedMiddleware
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(HandlerFn(f))
}

/// Builds middleware from positional arguments
pub type MiddlewareFactory =
    Arc<dyn Fn(Vec<Value>) -> Result<BoxedMiddleware, FrameworkError> + Send + Sync>;

/// A middleware implementation as registered with the [`crate::Registry`]
///
/// `Handler` is attached as-is. `Factory` is called with the entry's
/// options: one argument for an object, the elements of a list spread as
/// positional arguments, none when options are absent.
#[derive(Clone)]
pub enum MiddlewareImpl {
    Handler(BoxedMiddleware),
    Factory(MiddlewareFactory),
}

impl MiddlewareImpl {
    pub fn handler(middleware: BoxedMiddleware) -> Self {
        Self::Handler(middleware)
    }

    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<BoxedMiddleware, FrameworkError> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(factory))
    }
}

impl std::fmt::Debug for MiddlewareImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handler(_) => write!(f, "MiddlewareImpl::Handler"),
            Self::Factory(_) => write!(f, "MiddlewareImpl::Factory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use http::Method;

    fn tagging(tag: &'static str) -> BoxedMiddleware {
        middleware_fn(move |mut req, next| async move {
            let mut seen = req
                .local("seen")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            seen.push_str(tag);
            req.set_local("seen", seen);
            next.run(req).await
        })
    }

    #[tokio::test]
    async fn test_chain_runs_in_order_then_endpoint() {
        let mut chain = MiddlewareChain::new();
        chain.push(tagging("a"));
        chain.push(tagging("b"));

        let response = chain
            .execute(
                Request::new(Method::GET, "/"),
                endpoint(|req| async move {
                    let seen = req.local("seen").and_then(Value::as_str).unwrap_or("").to_string();
                    Ok(HttpResponse::text(seen))
                }),
            )
            .await
            .unwrap();

        assert_eq!(response.body_str(), "ab");
    }

    #[tokio::test]
    async fn test_handler_short_circuits() {
        let mut chain = MiddlewareChain::new();
        chain.push(handler_fn(|_req| async { Ok(HttpResponse::text("stopped")) }));
        chain.push(tagging("never"));

        let response = chain
            .execute(
                Request::new(Method::GET, "/"),
                endpoint(|_req| async { Ok(HttpResponse::text("endpoint")) }),
            )
            .await
            .unwrap();

        assert_eq!(response.body_str(), "stopped");
    }
}
