//! Named implementations the boot pipeline resolves references against
//!
//! The registry replaces ambient lookups with four explicit namespaces:
//! - `modules`: installable middleware (`"session"`, `"cookie-parser"`)
//! - `instance`: framework-internal middleware, by dot-notation path
//!   (`"middleware.poweredBy"`)
//! - `controllers`: route actions (`"UserController.show"`)
//! - `security`: policies usable as route actions (`"isLoggedIn"`)
//!
//! Middleware references check `modules` then `instance`; route actions
//! check `controllers` then `security`. The first match wins.
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis::{handler_fn, Registry, text};
//!
//! let mut registry = Registry::with_builtins();
//! registry.controller("HomeController.index", handler_fn(|_req| async { text("hi") }));
//! ```

use crate::middleware::{builtin, BoxedMiddleware, MiddlewareImpl};
use std::collections::HashMap;

#[derive(Clone, Default)]
pub struct Registry {
    modules: HashMap<String, MiddlewareImpl>,
    instance: HashMap<String, MiddlewareImpl>,
    controllers: HashMap<String, BoxedMiddleware>,
    security: HashMap<String, BoxedMiddleware>,
}

impl Registry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in middleware
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register(&mut registry);
        registry
    }

    /// Register an installable middleware module
    pub fn module(&mut self, name: impl Into<String>, implementation: MiddlewareImpl) -> &mut Self {
        self.modules.insert(name.into(), implementation);
        self
    }

    /// Register an internal middleware under a dot-notation path
    pub fn instance(&mut self, path: impl Into<String>, implementation: MiddlewareImpl) -> &mut Self {
        self.instance.insert(path.into(), implementation);
        self
    }

    pub fn controller(&mut self, name: impl Into<String>, handler: BoxedMiddleware) -> &mut Self {
        self.controllers.insert(name.into(), handler);
        self
    }

    pub fn security(&mut self, name: impl Into<String>, handler: BoxedMiddleware) -> &mut Self {
        self.security.insert(name.into(), handler);
        self
    }

    /// Look up a middleware reference: modules first, then the instance
    pub fn resolve_middleware(&self, reference: &str) -> Option<MiddlewareImpl> {
        self.modules
            .get(reference)
            .or_else(|| self.instance.get(reference))
            .cloned()
    }

    /// Look up a route action: controllers first, then security handlers
    pub fn resolve_action(&self, reference: &str) -> Option<BoxedMiddleware> {
        self.controllers
            .get(reference)
            .or_else(|| self.security.get(reference))
            .cloned()
    }
}
