use trellis::RouteMap;

/// Application routes; `routes` in configuration overrides same-key entries
pub fn routes() -> RouteMap {
    let mut routes = RouteMap::new()
        .route("get /health", "HomeController.health")
        .route("get /users", "UserController.index")
        .route("post /users", "UserController.store")
        .route("redirect /people", "/users");
    routes.insert(
        "get /users/:id",
        vec!["isLoggedIn".into(), "UserController.show".into()],
    );
    routes
}
