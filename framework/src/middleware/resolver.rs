use super::descriptor::{MiddlewareDescriptor, MiddlewareOptions, OptionsDone, UseRef};
use super::{BoxedMiddleware, MiddlewareChain, MiddlewareImpl};
use crate::config::LogConfig;
use crate::error::FrameworkError;
use crate::registry::Registry;
use serde_json::Value;
use tokio::sync::oneshot;

/// Order given to custom middleware that declares none
pub const DEFAULT_CUSTOM_ORDER: u32 = 9999;

const LOGGER: &str = "logger";
const SESSION: &str = "session";

/// How default and custom middleware are interleaved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderingMode {
    /// Every default runs before every custom entry, whatever their orders
    #[default]
    DefaultsFirst,
    /// One stable sort over all entries (defaults win ties)
    Global,
}

impl OrderingMode {
    /// Read `framework.middleware_ordering`
    pub fn from_config(tree: &Value) -> Self {
        match tree
            .pointer("/framework/middleware_ordering")
            .and_then(Value::as_str)
        {
            Some("global") => Self::Global,
            Some("defaults-first") | None => Self::DefaultsFirst,
            Some(other) => {
                tracing::warn!(mode = other, "unknown middleware ordering, using defaults-first");
                Self::DefaultsFirst
            }
        }
    }
}

/// A middleware attached to the plan
#[derive(Clone)]
pub struct ResolvedMiddleware {
    pub name: String,
    pub order: u32,
    pub middleware: BoxedMiddleware,
}

/// The ordered middleware list produced at boot
#[derive(Clone, Default)]
pub struct MiddlewarePlan {
    entries: Vec<ResolvedMiddleware>,
}

impl MiddlewarePlan {
    pub fn entries(&self) -> &[ResolvedMiddleware] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_chain(self) -> MiddlewareChain {
        let mut chain = MiddlewareChain::new();
        chain.extend(self.entries.into_iter().map(|e| e.middleware));
        chain
    }
}

enum PendingOptions {
    Ready(Option<Value>),
    Deferred(oneshot::Receiver<Value>),
}

struct Pending {
    name: String,
    order: u32,
    implementation: MiddlewareImpl,
    options: PendingOptions,
}

/// Turns the merged `middleware` section into a [`MiddlewarePlan`]
pub struct MiddlewareResolver<'a> {
    registry: &'a Registry,
    ordering: OrderingMode,
    log: LogConfig,
}

impl<'a> MiddlewareResolver<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            ordering: OrderingMode::default(),
            log: LogConfig::default(),
        }
    }

    /// Resolver configured from a resolved tree (`framework` and `log` sections)
    pub fn from_config(registry: &'a Registry, tree: &Value) -> Self {
        Self {
            registry,
            ordering: OrderingMode::from_config(tree),
            log: LogConfig::from_tree(tree),
        }
    }

    pub fn ordering(mut self, ordering: OrderingMode) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// Final execution order with each entry's order number
    ///
    /// A custom entry named like a default replaces it in place. Defaults
    /// without an explicit order are numbered 0, 1, 2, ... in key order;
    /// customs without one get [`DEFAULT_CUSTOM_ORDER`].
    pub fn order(
        &self,
        defaults: Vec<MiddlewareDescriptor>,
        custom: Vec<MiddlewareDescriptor>,
    ) -> Vec<(MiddlewareDescriptor, u32)> {
        let mut defaults = defaults;
        let mut customs = Vec::new();
        for descriptor in custom {
            match defaults.iter_mut().find(|d| d.name == descriptor.name) {
                Some(slot) => *slot = descriptor,
                None => customs.push(descriptor),
            }
        }

        let mut counter = 0;
        let mut defaults: Vec<(MiddlewareDescriptor, u32)> = defaults
            .into_iter()
            .map(|d| {
                let order = d.order.unwrap_or_else(|| {
                    let next = counter;
                    counter += 1;
                    next
                });
                (d, order)
            })
            .collect();
        defaults.sort_by_key(|(_, order)| *order);

        let mut customs: Vec<(MiddlewareDescriptor, u32)> = customs
            .into_iter()
            .map(|d| {
                let order = d.order.unwrap_or(DEFAULT_CUSTOM_ORDER);
                (d, order)
            })
            .collect();
        customs.sort_by_key(|(_, order)| *order);

        defaults.extend(customs);
        if self.ordering == OrderingMode::Global {
            defaults.sort_by_key(|(_, order)| *order);
        }
        defaults
    }

    /// Resolve, order and attach every enabled entry
    ///
    /// Deferred option providers are all started before any is awaited. An
    /// entry whose provider drops its [`OptionsDone`] is left out.
    pub async fn resolve(
        &self,
        defaults: Vec<MiddlewareDescriptor>,
        custom: Vec<MiddlewareDescriptor>,
    ) -> Result<MiddlewarePlan, FrameworkError> {
        let mut pending = Vec::new();

        for (descriptor, order) in self.order(defaults, custom) {
            if descriptor.is_empty() {
                continue;
            }
            let descriptor = self.normalize(descriptor)?;
            if !descriptor.is_enabled() {
                tracing::debug!(middleware = %descriptor.name, "middleware disabled");
                continue;
            }

            let implementation = self.lookup(&descriptor)?;
            let options = match &descriptor.options {
                MiddlewareOptions::None => PendingOptions::Ready(None),
                MiddlewareOptions::Value(value) => PendingOptions::Ready(Some(value.clone())),
                MiddlewareOptions::Deferred(provider) => {
                    let (done, rx) = OptionsDone::channel();
                    provider(&descriptor, done);
                    PendingOptions::Deferred(rx)
                }
            };

            pending.push(Pending {
                name: descriptor.name,
                order,
                implementation,
                options,
            });
        }

        let mut entries = Vec::with_capacity(pending.len());
        for entry in pending {
            let options = match entry.options {
                PendingOptions::Ready(options) => options,
                PendingOptions::Deferred(rx) => match rx.await {
                    Ok(options) => Some(options),
                    Err(_) => {
                        tracing::debug!(
                            middleware = %entry.name,
                            "options provider finished without options, not attached"
                        );
                        continue;
                    }
                },
            };

            let middleware = attach(&entry.name, &entry.implementation, options)?;
            tracing::debug!(middleware = %entry.name, order = entry.order, "middleware attached");
            entries.push(ResolvedMiddleware {
                name: entry.name,
                order: entry.order,
                middleware,
            });
        }

        Ok(MiddlewarePlan { entries })
    }

    fn normalize(
        &self,
        mut descriptor: MiddlewareDescriptor,
    ) -> Result<MiddlewareDescriptor, FrameworkError> {
        match descriptor.name.as_str() {
            LOGGER => {
                if !self.log.requests {
                    descriptor.enabled = Some(false);
                }
                if descriptor.options.is_none() {
                    descriptor.options = MiddlewareOptions::Value(Value::String(self.log.format.clone()));
                }
            }
            SESSION if descriptor.is_enabled() => {
                if let MiddlewareOptions::Value(options) = &descriptor.options {
                    let has = |field: &str| {
                        options
                            .get(field)
                            .and_then(Value::as_str)
                            .is_some_and(|s| !s.is_empty())
                    };
                    if !has("key") || !has("secret") {
                        return Err(FrameworkError::invalid_middleware(
                            SESSION,
                            "enabled session requires options.key and options.secret",
                        ));
                    }
                }
            }
            _ => {}
        }

        if let MiddlewareOptions::Value(Value::String(single)) = &descriptor.options {
            descriptor.options = MiddlewareOptions::Value(Value::Array(vec![Value::String(single.clone())]));
        }
        Ok(descriptor)
    }

    fn lookup(&self, descriptor: &MiddlewareDescriptor) -> Result<MiddlewareImpl, FrameworkError> {
        if let Some(UseRef::Impl(implementation)) = &descriptor.use_ref {
            return Ok(implementation.clone());
        }
        let reference = descriptor.reference();
        self.registry
            .resolve_middleware(reference)
            .ok_or_else(|| FrameworkError::MiddlewareNotFound {
                name: descriptor.name.clone(),
                reference: reference.to_string(),
            })
    }
}

fn attach(
    name: &str,
    implementation: &MiddlewareImpl,
    options: Option<Value>,
) -> Result<BoxedMiddleware, FrameworkError> {
    match implementation {
        MiddlewareImpl::Handler(handler) => Ok(handler.clone()),
        MiddlewareImpl::Factory(factory) => {
            let args = match options {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(list)) => list,
                Some(other) => vec![other],
            };
            factory(args).map_err(|e| match e {
                FrameworkError::InvalidMiddleware { .. } => e,
                other => FrameworkError::invalid_middleware(name, other.to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, Request};
    use crate::middleware::{endpoint, middleware_fn};
    use http::Method;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn noop() -> MiddlewareImpl {
        MiddlewareImpl::handler(middleware_fn(|req, next| async move { next.run(req).await }))
    }

    /// Factory that records the arguments it was built with
    fn recording(seen: Arc<Mutex<Vec<Vec<Value>>>>) -> MiddlewareImpl {
        MiddlewareImpl::factory(move |args| {
            seen.lock().unwrap().push(args);
            Ok(middleware_fn(|req, next| async move { next.run(req).await }))
        })
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        for name in ["a", "b", "c", "y", "z"] {
            registry.module(name, noop());
        }
        registry
    }

    fn named(names: &[&str]) -> Vec<MiddlewareDescriptor> {
        names.iter().map(|n| MiddlewareDescriptor::new(*n).uses(*n)).collect()
    }

    #[tokio::test]
    async fn test_defaults_precede_customs() {
        let registry = registry();
        let resolver = MiddlewareResolver::new(&registry);
        let custom = vec![
            MiddlewareDescriptor::new("z").uses("z").order(1),
            MiddlewareDescriptor::new("y").uses("y"),
        ];

        let plan = resolver.resolve(named(&["a", "b", "c"]), custom).await.unwrap();

        assert_eq!(plan.names(), vec!["a", "b", "c", "z", "y"]);
        let orders: Vec<u32> = plan.entries().iter().map(|e| e.order).collect();
        assert_eq!(orders, vec![0, 1, 2, 1, DEFAULT_CUSTOM_ORDER]);
    }

    #[tokio::test]
    async fn test_global_ordering_interleaves() {
        let registry = registry();
        let resolver = MiddlewareResolver::new(&registry).ordering(OrderingMode::Global);
        let custom = vec![
            MiddlewareDescriptor::new("z").uses("z").order(1),
            MiddlewareDescriptor::new("y").uses("y"),
        ];

        let plan = resolver.resolve(named(&["a", "b", "c"]), custom).await.unwrap();

        assert_eq!(plan.names(), vec!["a", "b", "z", "c", "y"]);
    }

    #[test]
    fn test_ordering_mode_from_config() {
        assert_eq!(
            OrderingMode::from_config(&json!({ "framework": { "middleware_ordering": "global" } })),
            OrderingMode::Global
        );
        assert_eq!(OrderingMode::from_config(&json!({})), OrderingMode::DefaultsFirst);
    }

    #[test]
    fn test_custom_replaces_default_in_place() {
        let registry = registry();
        let resolver = MiddlewareResolver::new(&registry);
        let custom = vec![MiddlewareDescriptor::new("b").uses("z")];

        let ordered = resolver.order(named(&["a", "b", "c"]), custom);
        let names: Vec<(&str, &str, u32)> = ordered
            .iter()
            .map(|(d, o)| (d.name.as_str(), d.reference(), *o))
            .collect();

        assert_eq!(names, vec![("a", "a", 0), ("b", "z", 1), ("c", "c", 2)]);
    }

    #[test]
    fn test_explicit_default_orders_do_not_consume_the_counter() {
        let registry = registry();
        let resolver = MiddlewareResolver::new(&registry);
        let defaults = vec![
            MiddlewareDescriptor::new("a").uses("a").order(5),
            MiddlewareDescriptor::new("b").uses("b"),
            MiddlewareDescriptor::new("c").uses("c"),
        ];

        let ordered: Vec<(String, u32)> = resolver
            .order(defaults, Vec::new())
            .into_iter()
            .map(|(d, o)| (d.name, o))
            .collect();

        assert_eq!(
            ordered,
            vec![("b".to_string(), 0), ("c".to_string(), 1), ("a".to_string(), 5)]
        );
    }

    #[tokio::test]
    async fn test_missing_module_is_fatal() {
        let registry = Registry::new();
        let resolver = MiddlewareResolver::new(&registry);

        let err = resolver
            .resolve(vec![MiddlewareDescriptor::new("compression").uses("compression")], Vec::new())
            .await
            .err()
            .unwrap();

        assert!(matches!(
            err,
            FrameworkError::MiddlewareNotFound { ref name, .. } if name == "compression"
        ));
    }

    #[tokio::test]
    async fn test_disabled_and_empty_entries_are_skipped() {
        let registry = Registry::new();
        let resolver = MiddlewareResolver::new(&registry);
        let defaults = vec![
            MiddlewareDescriptor::new("compression").uses("compression").enabled(false),
            MiddlewareDescriptor::new("placeholder"),
        ];

        let plan = resolver.resolve(defaults, Vec::new()).await.unwrap();
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn test_instance_namespace_is_the_fallback() {
        let mut registry = Registry::new();
        registry.instance("middleware.poweredBy", noop());
        let resolver = MiddlewareResolver::new(&registry);

        let plan = resolver
            .resolve(
                vec![MiddlewareDescriptor::new("poweredBy").uses("middleware.poweredBy")],
                Vec::new(),
            )
            .await
            .unwrap();
        assert_eq!(plan.names(), vec!["poweredBy"]);
    }

    #[tokio::test]
    async fn test_factory_arguments() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        registry.module("recorder", recording(seen.clone()));
        let resolver = MiddlewareResolver::new(&registry);

        let defaults = vec![
            MiddlewareDescriptor::new("object").uses("recorder").options(json!({ "a": 1 })),
            MiddlewareDescriptor::new("list").uses("recorder").options(json!([1, "two"])),
            MiddlewareDescriptor::new("string").uses("recorder").options(json!("secret")),
            MiddlewareDescriptor::new("none").uses("recorder"),
        ];
        resolver.resolve(defaults, Vec::new()).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                vec![json!({ "a": 1 })],
                vec![json!(1), json!("two")],
                vec![json!("secret")],
                vec![],
            ]
        );
    }

    #[tokio::test]
    async fn test_deferred_options() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        registry.module("recorder", recording(seen.clone()));
        let resolver = MiddlewareResolver::new(&registry);

        let defaults = vec![
            MiddlewareDescriptor::new("later")
                .uses("recorder")
                .deferred_options(|descriptor, done| {
                    let name = descriptor.name.clone();
                    tokio::spawn(async move {
                        tokio::task::yield_now().await;
                        done.done(json!({ "for": name }));
                    });
                }),
            MiddlewareDescriptor::new("never")
                .uses("recorder")
                .deferred_options(|_descriptor, done| drop(done)),
            MiddlewareDescriptor::new("now").uses("recorder").options(json!({ "x": true })),
        ];

        let plan = resolver.resolve(defaults, Vec::new()).await.unwrap();

        assert_eq!(plan.names(), vec!["later", "now"]);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![vec![json!({ "for": "later" })], vec![json!({ "x": true })]]
        );
    }

    #[tokio::test]
    async fn test_logger_follows_log_config() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        registry.module("request-logger", recording(seen.clone()));
        let logger = || vec![MiddlewareDescriptor::new("logger").uses("request-logger")];

        let log = LogConfig {
            format: "combined".to_string(),
            ..LogConfig::default()
        };
        let resolver = MiddlewareResolver::new(&registry).log_config(log);
        let plan = resolver.resolve(logger(), Vec::new()).await.unwrap();
        assert_eq!(plan.names(), vec!["logger"]);
        assert_eq!(*seen.lock().unwrap(), vec![vec![json!("combined")]]);

        let quiet = LogConfig {
            requests: false,
            ..LogConfig::default()
        };
        let resolver = MiddlewareResolver::new(&registry).log_config(quiet);
        let plan = resolver.resolve(logger(), Vec::new()).await.unwrap();
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn test_session_requires_key_and_secret() {
        let mut registry = Registry::new();
        registry.module("session", noop());
        let resolver = MiddlewareResolver::new(&registry);

        let err = resolver
            .resolve(
                vec![MiddlewareDescriptor::new("session")
                    .uses("session")
                    .options(json!({ "key": "demo.sid" }))],
                Vec::new(),
            )
            .await
            .err()
            .unwrap();
        assert!(matches!(err, FrameworkError::InvalidMiddleware { .. }));
    }

    #[tokio::test]
    async fn test_plan_runs_as_chain() {
        let mut registry = Registry::new();
        registry.module(
            "stamp",
            MiddlewareImpl::handler(middleware_fn(|mut req, next| async move {
                req.set_local("stamped", true);
                next.run(req).await
            })),
        );
        let resolver = MiddlewareResolver::new(&registry);
        let plan = resolver
            .resolve(vec![MiddlewareDescriptor::new("stamp").uses("stamp")], Vec::new())
            .await
            .unwrap();

        let response = plan
            .into_chain()
            .execute(
                Request::new(Method::GET, "/"),
                endpoint(|req| async move {
                    Ok(HttpResponse::text(req.local("stamped").map(Value::to_string).unwrap_or_default()))
                }),
            )
            .await
            .unwrap();
        assert_eq!(response.body_str(), "true");
    }
}
