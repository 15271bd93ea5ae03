//! Route maps, their resolution, and dispatch
//!
//! A [`RouteMap`] holds routes as written (`"post /users": "UserController.store"`).
//! [`RouteResolver`] binds each action through the [`crate::Registry`] and
//! orders the result into a [`RouteTable`]; [`Router`] serves that table.

mod resolver;
mod route;
mod router;

pub use resolver::{
    normalize_error, render_view, ErrorNormalizer, ResolvedRoute, RouteResolver, RouteTable,
    StatusHandlers,
};
pub use route::{path_keys, split_key, ActionRef, PathKey, RouteMap, RouteMethod};
pub use router::{to_patterns, Router};
