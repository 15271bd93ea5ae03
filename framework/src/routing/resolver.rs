use super::route::{path_keys, split_key, ActionRef, PathKey, RouteMap, RouteMethod};
use crate::http::{HttpResponse, Redirect, Response};
use crate::middleware::{handler_fn, BoxedMiddleware};
use crate::registry::Registry;
use serde_json::{json, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A route with its actions bound to handlers
#[derive(Clone)]
pub struct ResolvedRoute {
    pub method: RouteMethod,
    pub path: String,
    pub keys: Vec<PathKey>,
    pub handlers: Vec<BoxedMiddleware>,
}

impl fmt::Debug for ResolvedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedRoute")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("keys", &self.keys)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Turns a final error response into its normalized form
pub type ErrorNormalizer = Arc<dyn Fn(HttpResponse) -> HttpResponse + Send + Sync>;

/// Catch-all handlers appended after every route
#[derive(Clone)]
pub struct StatusHandlers {
    pub not_found: BoxedMiddleware,
    pub error: ErrorNormalizer,
}

impl Default for StatusHandlers {
    fn default() -> Self {
        Self {
            not_found: handler_fn(|request| async move {
                Err(HttpResponse::json(json!({
                    "error": "Not Found",
                    "path": request.path(),
                }))
                .status(404))
            }),
            error: Arc::new(normalize_error),
        }
    }
}

/// Give an error response a 4xx/5xx status and a JSON body if it has none
pub fn normalize_error(response: HttpResponse) -> HttpResponse {
    let response = if response.status_code() < 400 {
        response.status(500)
    } else {
        response
    };
    if !response.body_str().is_empty() {
        return response;
    }
    let reason = http::StatusCode::from_u16(response.status_code())
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Error");
    let mut response = response.body(json!({ "error": reason }).to_string());
    response.set_header("Content-Type", "application/json");
    response
}

/// Routes in dispatch order plus the optional status handlers
#[derive(Clone, Default)]
pub struct RouteTable {
    pub routes: Vec<ResolvedRoute>,
    pub status: Option<StatusHandlers>,
}

impl RouteTable {
    /// `(method, path)` pairs in dispatch order
    pub fn summary(&self) -> Vec<(RouteMethod, &str)> {
        self.routes
            .iter()
            .map(|r| (r.method, r.path.as_str()))
            .collect()
    }
}

/// Resolves a [`RouteMap`] against the registry
pub struct RouteResolver<'a> {
    registry: &'a Registry,
    status_errors: bool,
    views_dir: PathBuf,
}

impl<'a> RouteResolver<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            status_errors: true,
            views_dir: PathBuf::from("views"),
        }
    }

    /// Read `framework.status_errors` and `paths.views`
    pub fn from_config(registry: &'a Registry, tree: &Value) -> Self {
        let mut resolver = Self::new(registry);
        if let Some(enabled) = tree.pointer("/framework/status_errors").and_then(Value::as_bool) {
            resolver.status_errors = enabled;
        }
        if let Some(views) = tree.pointer("/paths/views").and_then(Value::as_str) {
            resolver.views_dir = PathBuf::from(views);
        }
        resolver
    }

    pub fn status_errors(mut self, enabled: bool) -> Self {
        self.status_errors = enabled;
        self
    }

    pub fn views_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.views_dir = dir.into();
        self
    }

    /// Build the route table
    ///
    /// Entries that fail to parse or resolve are dropped with a log line;
    /// nothing here is fatal.
    pub fn resolve(&self, mut routes: RouteMap, layout: &str) -> RouteTable {
        if !routes.has_root() {
            tracing::debug!(layout, "no root route, rendering the layout at /");
            routes.insert("/", vec![ActionRef::Handler(render_view(&self.views_dir, layout))]);
        }

        let mut resolved: Vec<ResolvedRoute> = routes
            .into_entries()
            .into_iter()
            .filter_map(|(key, actions)| self.resolve_entry(&key, actions))
            .collect();
        resolved.sort_by_key(|route| route.keys.len());

        RouteTable {
            routes: resolved,
            status: self.status_errors.then(StatusHandlers::default),
        }
    }

    fn resolve_entry(&self, key: &str, actions: Vec<ActionRef>) -> Option<ResolvedRoute> {
        let Some((token, path)) = split_key(key) else {
            tracing::warn!(route = key, "malformed route key, skipping");
            return None;
        };
        let Some(method) = RouteMethod::parse(token) else {
            tracing::warn!(route = key, method = token, "unsupported route method, skipping");
            return None;
        };

        let handlers: Vec<BoxedMiddleware> = actions
            .into_iter()
            .filter_map(|action| {
                let handler = self.bind(method, action.clone());
                if handler.is_none() {
                    tracing::debug!(route = key, ?action, "route action did not resolve");
                }
                handler
            })
            .collect();

        if handlers.is_empty() {
            tracing::warn!(route = key, "route has no resolvable handlers, skipping");
            return None;
        }

        let (method, path) = match method {
            RouteMethod::Redirect => (RouteMethod::Get, path),
            RouteMethod::Param => (method, path.trim_start_matches(':')),
            _ => (method, path),
        };

        Some(ResolvedRoute {
            method,
            path: path.to_string(),
            keys: path_keys(path),
            handlers,
        })
    }

    fn bind(&self, method: RouteMethod, action: ActionRef) -> Option<BoxedMiddleware> {
        let name = match action {
            ActionRef::Handler(handler) => return Some(handler),
            ActionRef::Name(name) => name,
        };
        match method {
            RouteMethod::Render => Some(render_view(&self.views_dir, name.trim_start_matches('/'))),
            RouteMethod::Redirect if name.starts_with('/') => Some(redirect_to(name)),
            _ => self.registry.resolve_action(&name),
        }
    }
}

/// Handler that serves `<views_dir>/<view>.html`
pub fn render_view(views_dir: &Path, view: &str) -> BoxedMiddleware {
    let file = views_dir.join(format!("{}.html", view));
    let view = view.to_string();
    handler_fn(move |_request| {
        let file = file.clone();
        let view = view.clone();
        async move {
            match tokio::fs::read_to_string(&file).await {
                Ok(html) => Ok(HttpResponse::html(html)),
                Err(e) => {
                    tracing::error!(view = %view, path = %file.display(), error = %e, "failed to render view");
                    Err(HttpResponse::json(json!({ "error": format!("View '{}' not found", view) }))
                        .status(500))
                }
            }
        }
    })
}

fn redirect_to(target: String) -> BoxedMiddleware {
    handler_fn(move |_request| {
        let response: Response = Redirect::to(target.clone()).into();
        async move { response }
    })
}
