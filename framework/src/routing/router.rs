use super::resolver::{RouteTable, StatusHandlers};
use super::route::RouteMethod;
use crate::http::{HttpResponse, Request, Response};
use crate::middleware::{endpoint, BoxedMiddleware, Endpoint, MiddlewareChain};
use http::Method;
use matchit::Router as MatchitRouter;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Methods an `all` route is registered under
const ALL_METHODS: [Method; 7] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::OPTIONS,
];

/// A matched route's handlers and its position in the table
#[derive(Clone)]
struct RouteEntry {
    index: usize,
    handlers: Arc<[BoxedMiddleware]>,
}

/// Convert `/users/:id?` into the matchit patterns it stands for
///
/// Optional segments produce a pattern with and one without the segment;
/// `*` becomes a catch-all.
pub fn to_patterns(path: &str) -> Vec<String> {
    let mut patterns = vec![String::new()];
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let (segment, optional) = match segment.strip_prefix(':') {
            Some(name) => match name.strip_suffix('?') {
                Some(name) => (format!("{{{}}}", name), true),
                None => (format!("{{{}}}", name), false),
            },
            None if segment == "*" => ("{*wildcard}".to_string(), false),
            None => (segment.to_string(), false),
        };

        let extended: Vec<String> = patterns
            .iter()
            .map(|p| format!("{}/{}", p, segment))
            .collect();
        if optional {
            patterns.extend(extended);
        } else {
            patterns = extended;
        }
    }

    patterns
        .into_iter()
        .map(|p| if p.is_empty() { "/".to_string() } else { p })
        .collect()
}

/// Dispatches requests over a resolved [`RouteTable`]
///
/// Each method has its own matchit tree. When several routes match, the
/// one earliest in the table wins.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<RouteEntry>>,
    params: HashMap<String, Vec<BoxedMiddleware>>,
    status: Option<StatusHandlers>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            params: HashMap::new(),
            status: None,
        }
    }

    pub fn from_table(table: RouteTable) -> Self {
        let mut router = Self::new();
        router.status = table.status;

        for (index, route) in table.routes.into_iter().enumerate() {
            let handlers: Arc<[BoxedMiddleware]> = route.handlers.into();
            let methods: Vec<Method> = match route.method {
                RouteMethod::Param => {
                    router
                        .params
                        .entry(route.path)
                        .or_default()
                        .extend(handlers.iter().cloned());
                    continue;
                }
                RouteMethod::Get | RouteMethod::Render | RouteMethod::Redirect => vec![Method::GET],
                RouteMethod::Post => vec![Method::POST],
                RouteMethod::Put => vec![Method::PUT],
                RouteMethod::Delete => vec![Method::DELETE],
                RouteMethod::Options => vec![Method::OPTIONS],
                RouteMethod::All => ALL_METHODS.to_vec(),
            };

            for pattern in to_patterns(&route.path) {
                for method in &methods {
                    let entry = RouteEntry {
                        index,
                        handlers: Arc::clone(&handlers),
                    };
                    if let Err(e) = router
                        .routes
                        .entry(method.clone())
                        .or_insert_with(MatchitRouter::new)
                        .insert(pattern.clone(), entry)
                    {
                        tracing::warn!(
                            method = %method,
                            path = %route.path,
                            error = %e,
                            "route shadowed by an earlier route"
                        );
                    }
                }
            }
        }

        router
    }

    /// Match a request and return the handlers with extracted params
    pub fn match_route(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(Arc<[BoxedMiddleware]>, HashMap<String, String>)> {
        let lookup = |method: &Method| {
            let matched = self.routes.get(method)?.at(path).ok()?;
            let params: HashMap<String, String> = matched
                .params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            Some((matched.value.clone(), params))
        };

        let found = lookup(method).or_else(|| {
            if *method == Method::HEAD {
                lookup(&Method::GET)
            } else {
                None
            }
        });
        found.map(|(entry, params)| {
            tracing::trace!(route = entry.index, "route matched");
            (entry.handlers, params)
        })
    }

    /// Run the matched route, falling through to the 404 handler
    pub async fn dispatch(&self, mut request: Request) -> Response {
        let fallback = self.not_found();
        let Some((handlers, params)) = self.match_route(request.method(), request.path()) else {
            return fallback(request).await;
        };

        let mut chain = MiddlewareChain::new();
        let mut names: Vec<&String> = params.keys().collect();
        names.sort();
        for name in names {
            if let Some(preprocessors) = self.params.get(name.as_str()) {
                chain.extend(preprocessors.iter().cloned());
            }
        }
        chain.extend(handlers.iter().cloned());

        request.set_params(params);
        chain.execute(request, fallback).await
    }

    /// Flatten a response, normalizing failures when status handlers are on
    pub fn finish(&self, response: Response) -> HttpResponse {
        match (response, &self.status) {
            (Ok(response), _) => response,
            (Err(response), Some(status)) => (status.error)(response),
            (Err(response), None) => response,
        }
    }

    fn not_found(&self) -> Endpoint {
        match &self.status {
            Some(status) => {
                let handler = status.not_found.clone();
                endpoint(move |request| {
                    let handler = handler.clone();
                    async move {
                        let mut chain = MiddlewareChain::new();
                        chain.push(handler);
                        chain.execute(request, endpoint(|_req| async { Err(not_found_response()) })).await
                    }
                })
            }
            None => endpoint(|_request| async { Err(not_found_response()) }),
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found_response() -> HttpResponse {
    HttpResponse::json(json!({ "error": "Not Found" })).status(404)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{handler_fn, middleware_fn};
    use crate::registry::Registry;
    use crate::routing::{RouteMap, RouteResolver};
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn echo(label: &'static str) -> BoxedMiddleware {
        handler_fn(move |req| async move {
            let mut params: Vec<String> = req
                .params()
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            params.sort();
            Ok(HttpResponse::text(format!("{} {}", label, params.join(","))))
        })
    }

    fn router() -> Router {
        let mut registry = Registry::new();
        registry
            .controller("Users.show", echo("show"))
            .controller("Users.profile", echo("profile"))
            .controller("Posts.list", echo("posts"))
            .controller("Any.ping", echo("ping"))
            .controller("Home.index", echo("home"))
            .controller(
                "Users.load",
                middleware_fn(|mut req, next| async move {
                    let id = req.params().get("id").cloned().unwrap_or_default();
                    req.set_local("user", format!("user-{}", id));
                    next.run(req).await
                }),
            )
            .controller(
                "Users.whoami",
                handler_fn(|req| async move {
                    Ok(HttpResponse::text(
                        req.local("user").and_then(Value::as_str).unwrap_or("nobody").to_string(),
                    ))
                }),
            );

        let map = RouteMap::new()
            .route("/", "Home.index")
            .route("get /users/:id", "Users.show")
            .route("get /users/profile", "Users.profile")
            .route("get /users/:id/posts/:page?", "Posts.list")
            .route("all /ping", "Any.ping")
            .route("get /whoami/:id", "Users.whoami")
            .route("param id", "Users.load");

        Router::from_table(RouteResolver::new(&registry).resolve(map, "layout"))
    }

    async fn get(router: &Router, method: Method, uri: &str) -> HttpResponse {
        router.finish(router.dispatch(Request::new(method, uri)).await)
    }

    #[test]
    fn test_to_patterns() {
        assert_eq!(to_patterns("/"), vec!["/"]);
        assert_eq!(to_patterns("/users/:id"), vec!["/users/{id}"]);
        assert_eq!(
            to_patterns("/users/:id/posts/:page?"),
            vec!["/users/{id}/posts", "/users/{id}/posts/{page}"]
        );
        assert_eq!(to_patterns("/files/*"), vec!["/files/{*wildcard}"]);
    }

    #[tokio::test]
    async fn test_static_segment_beats_parameter() {
        let router = router();
        assert_eq!(get(&router, Method::GET, "/users/profile").await.body_str(), "profile ");
        assert_eq!(get(&router, Method::GET, "/users/42").await.body_str(), "show id=42");
    }

    #[tokio::test]
    async fn test_optional_parameter() {
        let router = router();
        assert_eq!(get(&router, Method::GET, "/users/7/posts").await.body_str(), "posts id=7");
        assert_eq!(
            get(&router, Method::GET, "/users/7/posts/2").await.body_str(),
            "posts id=7,page=2"
        );
    }

    #[tokio::test]
    async fn test_all_and_head() {
        let router = router();
        assert_eq!(get(&router, Method::DELETE, "/ping").await.body_str(), "ping ");
        assert_eq!(get(&router, Method::HEAD, "/users/1").await.body_str(), "show id=1");
    }

    #[tokio::test]
    async fn test_param_preprocessor_runs_first() {
        let router = router();
        assert_eq!(get(&router, Method::GET, "/whoami/9").await.body_str(), "user-9");
    }

    #[tokio::test]
    async fn test_not_found() {
        let router = router();
        let response = get(&router, Method::GET, "/nowhere").await;
        assert_eq!(response.status_code(), 404);
        assert_eq!(response.body_str(), r#"{"error":"Not Found","path":"/nowhere"}"#);

        let response = get(&router, Method::POST, "/users/1").await;
        assert_eq!(response.status_code(), 404);
    }
}
