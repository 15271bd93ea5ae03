//! The boot pipeline
//!
//! Boot runs a fixed list of phases in order, each reading the immutable
//! [`BootContext`] and filling in the [`BootState`]:
//!
//! `options → paths → loggers → modules → middleware → routes → ready`
//!
//! The first error aborts the boot. Nothing is kept in process globals, so
//! several boots can run in one process (tests do).

use crate::config::{
    unresolved_placeholders, ConfigLoader, Environment, Flags, LogConfig, PathRoots, ServerConfig,
};
use crate::error::FrameworkError;
use crate::middleware::{MiddlewareDescriptor, MiddlewarePlan, MiddlewareResolver};
use crate::registry::Registry;
use crate::routing::{RouteMap, RouteResolver, RouteTable};
use crate::server::Pipeline;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Whether the boot may write snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootMode {
    /// Serving: snapshots are written and write failures are fatal
    #[default]
    Full,
    /// One-off commands: nothing is written
    Minimal,
}

/// Everything a boot needs, fixed before the first phase runs
pub struct BootContext {
    pub app_name: String,
    pub environment: Environment,
    pub roots: PathRoots,
    pub config_dir: Option<PathBuf>,
    pub mode: BootMode,
    pub defaults: Option<Value>,
    pub overrides: Value,
    pub flags: Flags,
    pub save_flags: bool,
    pub registry: Registry,
    pub custom_middleware: Vec<MiddlewareDescriptor>,
    pub routes: RouteMap,
    /// Install a tracing subscriber during the `loggers` phase
    pub init_logging: bool,
}

impl BootContext {
    pub fn new(app_name: impl Into<String>, roots: PathRoots) -> Self {
        Self {
            app_name: app_name.into(),
            environment: Environment::Local,
            roots,
            config_dir: None,
            mode: BootMode::Full,
            defaults: None,
            overrides: Value::Null,
            flags: Flags::new(),
            save_flags: false,
            registry: Registry::with_builtins(),
            custom_middleware: Vec::new(),
            routes: RouteMap::new(),
            init_logging: true,
        }
    }

    fn loader(&self) -> ConfigLoader {
        let mut loader = ConfigLoader::new(self.app_name.clone(), self.roots.clone())
            .environment(self.environment.clone())
            .overrides(self.overrides.clone())
            .flags(self.flags.clone())
            .save_flags(self.save_flags)
            .persist(self.mode == BootMode::Full);
        if let Some(dir) = &self.config_dir {
            loader = loader.config_dir(dir.clone());
        }
        if let Some(defaults) = &self.defaults {
            loader = loader.defaults(defaults.clone());
        }
        loader
    }
}

/// Results accumulated by the phases
#[derive(Default)]
pub struct BootState {
    config: Option<Value>,
    default_middleware: Vec<MiddlewareDescriptor>,
    middleware: Option<MiddlewarePlan>,
    routes: Option<RouteTable>,
    completed: Vec<Phase>,
}

impl BootState {
    pub fn config(&self) -> Option<&Value> {
        self.config.as_ref()
    }

    pub fn completed(&self) -> &[Phase] {
        &self.completed
    }

    fn require_config(&self) -> Result<&Value, FrameworkError> {
        self.config
            .as_ref()
            .ok_or_else(|| FrameworkError::internal("configuration was not resolved before use"))
    }

    fn into_plan(self) -> Result<BootPlan, FrameworkError> {
        let missing = |what: &str| FrameworkError::internal(format!("boot finished without {}", what));
        Ok(BootPlan {
            config: self.config.ok_or_else(|| missing("a configuration"))?,
            middleware: self.middleware.ok_or_else(|| missing("a middleware plan"))?,
            routes: self.routes.ok_or_else(|| missing("a route table"))?,
        })
    }
}

/// Boot phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Options,
    Paths,
    Loggers,
    Modules,
    Middleware,
    Routes,
    Ready,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::Options,
        Phase::Paths,
        Phase::Loggers,
        Phase::Modules,
        Phase::Middleware,
        Phase::Routes,
        Phase::Ready,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Options => "options",
            Phase::Paths => "paths",
            Phase::Loggers => "loggers",
            Phase::Modules => "modules",
            Phase::Middleware => "middleware",
            Phase::Routes => "routes",
            Phase::Ready => "ready",
        }
    }

    pub async fn run(self, ctx: &BootContext, state: &mut BootState) -> Result<(), FrameworkError> {
        match self {
            Phase::Options => {
                state.config = Some(ctx.loader().resolve()?);
            }
            Phase::Paths => {
                for value in unresolved_placeholders(state.require_config()?) {
                    tracing::warn!(%value, "configuration value has an unresolved placeholder");
                }
            }
            Phase::Loggers => {
                if ctx.init_logging {
                    init_logging(&LogConfig::from_tree(state.require_config()?));
                }
            }
            Phase::Modules => {
                let config = state.require_config()?;
                let section = config.get("middleware").cloned().unwrap_or(Value::Null);
                state.default_middleware = MiddlewareDescriptor::from_section(&section)?;
                tracing::debug!(
                    defaults = state.default_middleware.len(),
                    custom = ctx.custom_middleware.len(),
                    "middleware descriptors loaded"
                );
            }
            Phase::Middleware => {
                let defaults = std::mem::take(&mut state.default_middleware);
                let config = state.require_config()?;
                let plan = MiddlewareResolver::from_config(&ctx.registry, config)
                    .resolve(defaults, ctx.custom_middleware.clone())
                    .await?;
                tracing::debug!(middleware = ?plan.names(), "middleware resolved");
                state.middleware = Some(plan);
            }
            Phase::Routes => {
                let config = state.require_config()?;
                let mut routes = ctx.routes.clone();
                routes.extend(RouteMap::from_config(
                    config.get("routes").unwrap_or(&Value::Null),
                )?);
                let layout = config
                    .pointer("/framework/layout")
                    .and_then(Value::as_str)
                    .unwrap_or("layout");
                let table = RouteResolver::from_config(&ctx.registry, config).resolve(routes, layout);
                tracing::debug!(routes = table.routes.len(), "routes resolved");
                state.routes = Some(table);
            }
            Phase::Ready => {
                tracing::info!(
                    app = %ctx.app_name,
                    environment = %ctx.environment,
                    middleware = state.middleware.as_ref().map_or(0, MiddlewarePlan::len),
                    routes = state.routes.as_ref().map_or(0, |t| t.routes.len()),
                    "boot complete"
                );
            }
        }
        Ok(())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Install the fmt subscriber; `RUST_LOG` wins over `log.level`
fn init_logging(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // A subscriber installed by an earlier boot (or by the host) stays
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// What a successful boot hands to the server
pub struct BootPlan {
    pub config: Value,
    pub middleware: MiddlewarePlan,
    pub routes: RouteTable,
}

impl BootPlan {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::from_tree(&self.config)
    }

    pub fn into_pipeline(self) -> Pipeline {
        Pipeline::new(self.middleware, self.routes)
    }
}

/// Run every phase in order
pub async fn boot(ctx: &BootContext) -> Result<BootPlan, FrameworkError> {
    let mut state = BootState::default();
    for phase in Phase::ALL {
        tracing::debug!(%phase, "boot phase");
        phase.run(ctx, &mut state).await?;
        state.completed.push(phase);
    }
    state.into_plan()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, Request};
    use crate::middleware::{handler_fn, middleware_fn, MiddlewareImpl};
    use crate::routing::RouteMethod;
    use http::Method;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn context(dir: &std::path::Path) -> BootContext {
        let mut ctx = BootContext::new("demo", PathRoots::new(dir).with_internal("/opt/trellis/lib"));
        ctx.init_logging = false;
        ctx
    }

    #[tokio::test]
    async fn test_full_boot_produces_a_plan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("views")).unwrap();
        std::fs::write(dir.path().join("views").join("layout.html"), "<h1>demo</h1>").unwrap();

        let mut ctx = context(dir.path());
        ctx.registry.controller(
            "UserController.show",
            handler_fn(|req| async move { HttpResponse::text(format!("user {}", req.param("id")?)).ok() }),
        );
        ctx.routes = RouteMap::new().route("get /users/:id", "UserController.show");
        ctx.custom_middleware.push(
            MiddlewareDescriptor::new("requestId")
                .implementation(MiddlewareImpl::handler(middleware_fn(|mut req, next| async move {
                    req.set_local("requestId", "r-1");
                    next.run(req).await
                })))
                .order(1),
        );

        let plan = boot(&ctx).await.unwrap();

        assert_eq!(
            plan.middleware.names(),
            vec!["poweredBy", "logger", "cookieParser", "session", "requestId"]
        );
        assert_eq!(
            plan.routes.summary(),
            vec![(RouteMethod::Get, "/"), (RouteMethod::Get, "/users/:id")]
        );
        assert!(dir.path().join("config").join("local.json").exists());
        assert!(dir.path().join("config").join(".active.json").exists());

        let pipeline = plan.into_pipeline();
        let home = pipeline.handle(Request::new(Method::GET, "/")).await;
        assert_eq!(home.body_str(), "<h1>demo</h1>");
        assert_eq!(home.header_value("x-powered-by"), Some("Trellis"));
        assert!(home.header_value("set-cookie").unwrap().starts_with("demo.sid="));

        let user = pipeline.handle(Request::new(Method::GET, "/users/7")).await;
        assert_eq!(user.body_str(), "user 7");
    }

    #[tokio::test]
    async fn test_repeated_boots_keep_the_named_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let named = dir.path().join("config").join("local.json");

        let first = boot(&ctx).await.unwrap();
        let written = std::fs::read(&named).unwrap();
        let second = boot(&ctx).await.unwrap();

        assert_eq!(std::fs::read(&named).unwrap(), written);
        assert_eq!(first.config["paths"]["internal"], json!("/opt/trellis/lib"));
        assert_eq!(second.config["paths"]["internal"], json!("/opt/trellis/lib"));
        assert_eq!(
            second.config["middleware"]["session"]["options"]["secret"],
            first.config["middleware"]["session"]["options"]["secret"]
        );
    }

    #[tokio::test]
    async fn test_minimal_boot_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        ctx.mode = BootMode::Minimal;

        let plan = boot(&ctx).await.unwrap();

        assert!(plan.config["middleware"]["session"]["options"]["secret"].is_string());
        assert!(!dir.path().join("config").exists());
    }

    #[tokio::test]
    async fn test_missing_middleware_aborts_boot() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        ctx.overrides = json!({ "middleware": { "compression": { "use": "compression" } } });

        let err = boot(&ctx).await.err().unwrap();
        assert!(matches!(err, FrameworkError::MiddlewareNotFound { .. }));
    }

    #[tokio::test]
    async fn test_config_routes_and_global_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        ctx.registry.controller("Home.index", handler_fn(|_req| async { Ok(HttpResponse::text("home")) }));
        ctx.overrides = json!({
            "framework": { "middleware_ordering": "global" },
            "routes": { "/": "Home.index", "redirect /old": "/" }
        });
        ctx.custom_middleware.push(
            MiddlewareDescriptor::new("early")
                .implementation(MiddlewareImpl::handler(middleware_fn(|req, next| async move {
                    next.run(req).await
                })))
                .order(1),
        );

        let plan = boot(&ctx).await.unwrap();

        assert_eq!(
            plan.middleware.names(),
            vec!["poweredBy", "logger", "early", "cookieParser", "session"]
        );
        let pipeline = plan.into_pipeline();
        let old = pipeline.handle(Request::new(Method::GET, "/old")).await;
        assert_eq!(old.status_code(), 302);
    }

    #[test]
    fn test_phase_order() {
        let names: Vec<&str> = Phase::ALL.iter().map(Phase::name).collect();
        assert_eq!(
            names,
            vec!["options", "paths", "loggers", "modules", "middleware", "routes", "ready"]
        );
    }
}
