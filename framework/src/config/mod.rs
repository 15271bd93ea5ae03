//! Layered configuration for Trellis applications
//!
//! Configuration is resolved from four layers, lowest precedence first:
//! 1. Built-in defaults ([`default_config`])
//! 2. The persisted snapshot for the active environment (`config/<env>.json`)
//! 3. Programmatic overrides passed by the application
//! 4. Command-line flags
//!
//! Objects merge key by key; arrays and scalars replace. After merging,
//! placeholders are resolved and session/security defaults are generated,
//! then two snapshots are written: the named configuration (everything but
//! unsaved flags, including generated secrets) and `config/.active.json`
//! (the final tree).
//!
//! # Example
//!
//! ```rust,no_run
//! use trellis::config::{ConfigLoader, Flags, PathRoots};
//!
//! let roots = PathRoots::detect().unwrap();
//! let config = ConfigLoader::new("demo", roots)
//!     .flags(Flags::new().set("log.level", "debug"))
//!     .resolve()
//!     .unwrap();
//! println!("{}", config["middleware"]["session"]["options"]["key"]);
//! ```

pub mod defaults;
pub mod env;
pub mod merge;
pub mod paths;
pub mod providers;
pub mod security;
pub mod store;

pub use defaults::default_config;
pub use env::{env, load_dotenv, Environment};
pub use merge::{coerce, deep_merge, Flags};
pub use paths::{unresolved_placeholders, PathResolver, PathRoots};
pub use providers::{LogConfig, ServerConfig, ServerConfigBuilder};
pub use security::{apply_defaults, DefaultingReport, SessionStoreKind};

use crate::error::FrameworkError;
use serde_json::{json, Value};
use std::path::PathBuf;

/// Subtrees that hold filesystem paths and get fully anchored
const PATH_SECTIONS: &[&str] = &["paths"];

/// Subtrees left untouched by placeholder substitution
const LITERAL_SECTIONS: &[&str] = &["routes"];

/// Apply placeholder and path resolution to a whole configuration tree
///
/// Placeholders are substituted everywhere except route tables; values in
/// the `paths` section are additionally anchored at the working directory.
pub fn resolve_paths(tree: &mut Value, resolver: &PathResolver) {
    let Some(root) = tree.as_object_mut() else {
        return;
    };
    for (key, value) in root.iter_mut() {
        if PATH_SECTIONS.contains(&key.as_str()) {
            resolver.resolve(value);
        } else if !LITERAL_SECTIONS.contains(&key.as_str()) {
            resolver.substitute(value);
        }
    }
}

/// The session values `report` says were generated, shaped for merging
/// into a snapshot
fn generated_session(tree: &Value, report: &DefaultingReport) -> Value {
    let options = tree.pointer("/middleware/session/options");
    let mut generated = serde_json::Map::new();
    for (name, was_generated) in [("key", report.generated_key), ("secret", report.generated_secret)] {
        if let Some(value) = options.and_then(|o| o.get(name)).filter(|_| was_generated) {
            generated.insert(name.to_string(), value.clone());
        }
    }
    json!({ "middleware": { "session": { "options": generated } } })
}

/// Resolves the layered configuration for one boot
pub struct ConfigLoader {
    app_name: String,
    environment: Environment,
    roots: PathRoots,
    config_dir: PathBuf,
    defaults: Option<Value>,
    overrides: Value,
    flags: Flags,
    save_flags: bool,
    persist: bool,
}

impl ConfigLoader {
    /// Create a loader for `app_name` rooted at `roots.cwd`
    pub fn new(app_name: impl Into<String>, roots: PathRoots) -> Self {
        let config_dir = roots.cwd.join("config");
        Self {
            app_name: app_name.into(),
            environment: Environment::Local,
            roots,
            config_dir,
            defaults: None,
            overrides: Value::Null,
            flags: Flags::new(),
            save_flags: false,
            persist: true,
        }
    }

    /// Select the named configuration
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Directory holding the snapshots (default: `<cwd>/config`)
    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    /// Replace the built-in defaults
    pub fn defaults(mut self, defaults: Value) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Programmatic overrides, above the persisted snapshot
    pub fn overrides(mut self, overrides: Value) -> Self {
        self.overrides = overrides;
        self
    }

    /// Command-line flags, the highest-precedence layer
    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// Persist flags into the named snapshot
    pub fn save_flags(mut self, save: bool) -> Self {
        self.save_flags = save;
        self
    }

    /// Write snapshots (disabled for one-off commands)
    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Path of the named snapshot for the selected environment
    pub fn named_path(&self) -> PathBuf {
        self.config_dir.join(self.environment.config_file_name())
    }

    /// Path of the snapshot holding the final merged tree
    pub fn active_path(&self) -> PathBuf {
        self.config_dir.join(store::ACTIVE_SNAPSHOT)
    }

    /// Merge all layers, generate defaults and write the snapshots
    pub fn resolve(&self) -> Result<Value, FrameworkError> {
        let resolver = PathResolver::new(&self.roots);

        let mut tree = self
            .defaults
            .clone()
            .unwrap_or_else(|| default_config(&self.app_name));
        if let Some(root) = tree.as_object_mut() {
            root.entry("name".to_string())
                .or_insert_with(|| Value::String(self.app_name.clone()));
        }

        let named_path = self.named_path();
        if let Some(persisted) = store::read_snapshot(&named_path) {
            tracing::debug!(path = %named_path.display(), "merging persisted configuration");
            deep_merge(&mut tree, persisted);
        }

        if !self.overrides.is_null() {
            deep_merge(&mut tree, self.overrides.clone());
        }

        let flag_tree = self.flags.to_tree();
        if self.save_flags {
            deep_merge(&mut tree, flag_tree.clone());
        }

        let report = apply_defaults(&mut tree, &self.app_name)?;
        resolve_paths(&mut tree, &resolver);
        if report.generated() {
            tracing::debug!(?report, "session defaults generated");
        }

        let mut named = tree.clone();

        if !self.save_flags && !self.flags.is_empty() {
            deep_merge(&mut tree, flag_tree);
            // Flags may enable middleware the first pass saw disabled
            let flag_report = apply_defaults(&mut tree, &self.app_name)?;
            resolve_paths(&mut tree, &resolver);
            if flag_report.generated() {
                tracing::debug!(report = ?flag_report, "session defaults generated for flag-enabled session");
                deep_merge(&mut named, generated_session(&tree, &flag_report));
            }
        }

        if self.persist {
            store::write_snapshot(&named_path, &named)?;
            store::write_snapshot(&self.active_path(), &tree)?;
        }

        Ok(tree)
    }
}
