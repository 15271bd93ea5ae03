use serde::Deserialize;
use serde_json::Value;

/// Logging configuration, read from the `log` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default `tracing` filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Whether the request-logger middleware runs
    pub requests: bool,
    /// Request log line format: `dev`, `combined` or `json`
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            requests: true,
            format: "dev".to_string(),
        }
    }
}

impl LogConfig {
    /// Read the `log` section of a resolved configuration tree
    pub fn from_tree(tree: &Value) -> Self {
        match tree.get("log") {
            None | Some(Value::Null) => Self::default(),
            Some(section) => serde_json::from_value(section.clone()).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "invalid log configuration, using defaults");
                Self::default()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config = LogConfig::from_tree(&json!({ "log": { "requests": false } }));
        assert!(!config.requests);
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "dev");
    }
}
