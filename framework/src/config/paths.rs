//! Placeholder and relative-path resolution inside configuration trees
//!
//! Recognized placeholders:
//! - `{{rootdir}}` - the framework install root
//! - `{{cwd}}` - the application working directory
//! - `{{internal}}` - the framework's internal middleware library

use crate::error::FrameworkError;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// The named roots placeholders resolve against
#[derive(Debug, Clone, PartialEq)]
pub struct PathRoots {
    pub root_dir: PathBuf,
    pub cwd: PathBuf,
    pub internal: PathBuf,
}

impl PathRoots {
    /// Roots for an application living at `cwd`
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        let root_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let internal = root_dir.join("src").join("middleware");
        Self {
            root_dir,
            cwd: cwd.into(),
            internal,
        }
    }

    /// Roots for the process working directory
    pub fn detect() -> Result<Self, FrameworkError> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn with_internal(mut self, internal: impl Into<PathBuf>) -> Self {
        self.internal = internal.into();
        self
    }
}

/// Rewrites placeholder tokens and separator-prefixed paths to absolute paths
#[derive(Debug, Clone)]
pub struct PathResolver {
    cwd: String,
    replacements: Vec<(String, String)>,
}

fn path_string(path: &Path) -> String {
    let s = path.to_string_lossy().into_owned();
    match s.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => s,
    }
}

impl PathResolver {
    pub fn new(roots: &PathRoots) -> Self {
        let cwd = path_string(&roots.cwd);
        Self {
            replacements: vec![
                ("rootdir".to_string(), path_string(&roots.root_dir)),
                ("cwd".to_string(), cwd.clone()),
                ("internal".to_string(), path_string(&roots.internal)),
            ],
            cwd,
        }
    }

    /// Register an extra `{{name}}` placeholder
    pub fn with_root(mut self, name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        self.replacements
            .push((name.into(), path_string(path.as_ref())));
        self
    }

    /// Rewrite every string leaf in place: placeholders are substituted and
    /// separator-prefixed values are anchored at the working directory
    pub fn resolve(&self, tree: &mut Value) {
        walk_strings(tree, &mut |s| self.resolve_str(s));
    }

    /// Substitute placeholders only, leaving separator-prefixed values alone
    pub fn substitute(&self, tree: &mut Value) {
        walk_strings(tree, &mut |s| {
            let (value, substituted) = self.replace_placeholders(s);
            substituted.then_some(value)
        });
    }

    /// Resolve a single value; `None` when it is left untouched
    pub fn resolve_str(&self, value: &str) -> Option<String> {
        let original = value;
        let mut value = value.to_string();

        // A working directory embedded twice collapses to one
        let doubled = format!("{}{}", self.cwd, self.cwd);
        while value.starts_with(&doubled) {
            value.replace_range(..self.cwd.len(), "");
        }

        let (mut value, substituted) = self.replace_placeholders(&value);

        if !substituted && value.starts_with('/') && !self.is_under_root(&value) {
            value = format!("{}{}", self.cwd, value);
        }

        (value != original).then_some(value)
    }

    /// Already anchored at the working directory or another known root
    fn is_under_root(&self, value: &str) -> bool {
        let under = |root: &str| {
            value == root
                || value
                    .strip_prefix(root)
                    .is_some_and(|rest| rest.starts_with('/'))
        };
        under(&self.cwd) || self.replacements.iter().any(|(_, root)| under(root))
    }

    fn replace_placeholders(&self, value: &str) -> (String, bool) {
        let mut value = value.to_string();
        let mut substituted = false;
        for (name, root) in &self.replacements {
            let token = format!("{{{{{}}}}}", name);
            if value.contains(&token) {
                value = value.replace(&token, root);
                substituted = true;
            }
        }
        (value, substituted)
    }
}

fn walk_strings<F>(value: &mut Value, rewrite: &mut F)
where
    F: FnMut(&str) -> Option<String>,
{
    match value {
        Value::String(s) => {
            if let Some(resolved) = rewrite(s) {
                *s = resolved;
            }
        }
        Value::Object(map) => {
            for child in map.values_mut() {
                walk_strings(child, rewrite);
            }
        }
        Value::Array(items) => {
            for child in items {
                walk_strings(child, rewrite);
            }
        }
        _ => {}
    }
}

/// Collect string values still carrying a `{{...}}` token
pub fn unresolved_placeholders(tree: &Value) -> Vec<String> {
    fn collect(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(s) => {
                if let Some(start) = s.find("{{") {
                    if s[start..].contains("}}") {
                        out.push(s.clone());
                    }
                }
            }
            Value::Object(map) => map.values().for_each(|v| collect(v, out)),
            Value::Array(items) => items.iter().for_each(|v| collect(v, out)),
            _ => {}
        }
    }

    let mut out = Vec::new();
    collect(tree, &mut out);
    out
}
