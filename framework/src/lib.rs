//! Trellis: a configuration-driven web application framework
//!
//! An application is assembled from layered configuration at boot: the
//! merged tree decides which middleware run, in which order, and how routes
//! bind to controllers. See [`boot`] for the phases.

pub mod app;
pub mod boot;
pub mod config;
pub mod error;
pub mod http;
pub mod middleware;
pub mod registry;
pub mod routing;
pub mod server;

pub use app::{Application, Cli, Commands};
pub use boot::{boot, BootContext, BootMode, BootPlan, Phase};
pub use error::{AppError, FrameworkError};
pub use http::{json, text, HttpResponse, Redirect, Request, Response};
pub use middleware::{
    handler_fn, middleware_fn, BoxedMiddleware, Middleware, MiddlewareDescriptor, MiddlewareImpl,
    Next,
};
pub use registry::Registry;
pub use routing::{RouteMap, Router};
pub use server::{Pipeline, Server};

// Re-export for controllers that build JSON bodies
pub use serde_json;
