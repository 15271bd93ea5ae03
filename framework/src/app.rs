//! Application builder for Trellis
//!
//! Provides a fluent builder API to register controllers, middleware and
//! routes, then boot and run the application from the command line.
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis::Application;
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     Application::new("demo")
//!         .controller("HomeController.index", controllers::home::index())
//!         .route("get /", "HomeController.index")
//!         .run()
//!         .await
//! }
//! ```

use crate::boot::{boot, BootContext, BootMode, BootPlan};
use crate::config::{deep_merge, load_dotenv, store, Environment, Flags, PathRoots};
use crate::error::FrameworkError;
use crate::middleware::{BoxedMiddleware, MiddlewareDescriptor, MiddlewareImpl};
use crate::registry::Registry;
use crate::routing::{ActionRef, RouteMap};
use crate::server::Server;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;

/// CLI structure for Trellis applications
#[derive(Parser, Debug)]
#[command(name = "app")]
#[command(about = "Trellis application server and utilities")]
pub struct Cli {
    /// Named configuration to load (`config/<env>.json`); defaults to APP_ENV
    #[arg(long, global = true)]
    pub env: Option<String>,

    /// Override a configuration value, e.g. `--set log.level=debug`
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    pub set: Vec<String>,

    /// Persist `--set` values into the named configuration
    #[arg(long, global = true)]
    pub save_config: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the web server (default command)
    Serve,
    /// Print the resolved configuration
    #[command(name = "config:show")]
    ConfigShow,
    /// List middleware in execution order
    #[command(name = "middleware:list")]
    MiddlewareList,
    /// List routes in dispatch order
    #[command(name = "routes:list")]
    RoutesList,
}

impl Commands {
    /// One-off commands never write configuration snapshots
    fn boot_mode(&self) -> BootMode {
        match self {
            Commands::Serve => BootMode::Full,
            _ => BootMode::Minimal,
        }
    }
}

/// Application builder for Trellis
pub struct Application {
    name: String,
    root: Option<PathBuf>,
    defaults: Option<Value>,
    overrides: Value,
    registry: Registry,
    custom_middleware: Vec<MiddlewareDescriptor>,
    routes: RouteMap,
}

impl Application {
    /// Create a new application builder with the built-in middleware registered
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: None,
            defaults: None,
            overrides: Value::Null,
            registry: Registry::with_builtins(),
            custom_middleware: Vec::new(),
            routes: RouteMap::new(),
        }
    }

    /// Project directory (default: the process working directory)
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Replace the built-in default configuration
    pub fn defaults(mut self, defaults: Value) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Configuration overrides, merged above the persisted snapshot
    ///
    /// Repeated calls merge into each other.
    pub fn config(mut self, overrides: Value) -> Self {
        deep_merge(&mut self.overrides, overrides);
        self
    }

    /// Add custom middleware, ordered after the configured defaults
    pub fn middleware(mut self, descriptor: MiddlewareDescriptor) -> Self {
        self.custom_middleware.push(descriptor);
        self
    }

    /// Register an installable middleware module
    pub fn module(mut self, name: &str, implementation: MiddlewareImpl) -> Self {
        self.registry.module(name, implementation);
        self
    }

    pub fn controller(mut self, name: &str, handler: BoxedMiddleware) -> Self {
        self.registry.controller(name, handler);
        self
    }

    pub fn security(mut self, name: &str, handler: BoxedMiddleware) -> Self {
        self.registry.security(name, handler);
        self
    }

    /// Add routes; configuration routes with the same key win
    pub fn routes(mut self, routes: RouteMap) -> Self {
        self.routes.extend(routes);
        self
    }

    pub fn route(mut self, key: &str, action: impl Into<ActionRef>) -> Self {
        self.routes.insert(key, vec![action.into()]);
        self
    }

    /// Build the boot context for `cli`
    pub fn context(self, cli: &Cli) -> Result<BootContext, FrameworkError> {
        let roots = match &self.root {
            Some(root) => PathRoots::new(root.clone()),
            None => PathRoots::detect()?,
        };
        let detected = load_dotenv(&roots.cwd);
        let environment = cli
            .env
            .as_deref()
            .map(Environment::from_name)
            .unwrap_or(detected);
        let mode = cli.command.unwrap_or(Commands::Serve).boot_mode();

        let mut ctx = BootContext::new(self.name, roots);
        ctx.environment = environment;
        ctx.mode = mode;
        ctx.defaults = self.defaults;
        ctx.overrides = self.overrides;
        ctx.flags = Flags::from_args(&cli.set)?;
        ctx.save_flags = cli.save_config;
        ctx.registry = self.registry;
        ctx.custom_middleware = self.custom_middleware;
        ctx.routes = self.routes;
        Ok(ctx)
    }

    /// Parse the command line and run
    pub async fn run(self) -> ExitCode {
        self.run_with(Cli::parse()).await
    }

    /// Run with already-parsed arguments; fatal errors exit with status 1
    pub async fn run_with(self, cli: Cli) -> ExitCode {
        match self.execute(cli).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "boot failed");
                eprintln!("Error: {}", e);
                ExitCode::from(1)
            }
        }
    }

    async fn execute(self, cli: Cli) -> Result<(), FrameworkError> {
        let command = cli.command.unwrap_or(Commands::Serve);
        let ctx = self.context(&cli)?;
        let plan = boot(&ctx).await?;

        match command {
            Commands::Serve => {
                let server_config = plan.server_config();
                Server::from_config(plan.into_pipeline(), &server_config)
                    .run()
                    .await
            }
            Commands::ConfigShow => {
                println!("{}", store::to_pretty_json(&plan.config)?);
                Ok(())
            }
            Commands::MiddlewareList => {
                print!("{}", middleware_listing(&plan));
                Ok(())
            }
            Commands::RoutesList => {
                print!("{}", route_listing(&plan));
                Ok(())
            }
        }
    }
}

fn middleware_listing(plan: &BootPlan) -> String {
    plan.middleware
        .entries()
        .iter()
        .map(|entry| format!("{:>5}  {}\n", entry.order, entry.name))
        .collect()
}

fn route_listing(plan: &BootPlan) -> String {
    plan.routes
        .summary()
        .into_iter()
        .map(|(method, path)| format!("{:<8} {}\n", method.as_str().to_uppercase(), path))
        .collect()
}
