//! Built-in default configuration
//!
//! The lowest-precedence layer. Middleware keys appear in the order the
//! pipeline runs them unless an entry declares an explicit `order`.

use serde_json::{json, Value};

/// The framework's default configuration tree
pub fn default_config(app_name: &str) -> Value {
    json!({
        "name": app_name,
        "paths": {
            "root": "{{cwd}}",
            "config": "/config",
            "views": "/views",
            "public": "/public",
            "locales": "/locales",
            "internal": "{{internal}}"
        },
        "log": {
            "level": "info",
            "requests": true,
            "format": "dev"
        },
        "server": {
            "host": "127.0.0.1",
            "port": 8080
        },
        "db": {},
        "framework": {
            "middleware_ordering": "defaults-first",
            "status_errors": true,
            "layout": "layout"
        },
        "middleware": {
            "poweredBy": {
                "use": "middleware.poweredBy",
                "options": "Trellis"
            },
            "logger": {
                "use": "request-logger"
            },
            "cookieParser": {
                "use": "cookie-parser"
            },
            "session": {
                "use": "session",
                "enabled": true,
                "options": {
                    "store": { "module": "memory" }
                }
            },
            "cors": {
                "use": "cors",
                "enabled": false
            },
            "csrf": {
                "use": "csrf",
                "enabled": false
            },
            "i18n": {
                "use": "i18n",
                "enabled": false
            }
        },
        "routes": {}
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_middleware_order_is_declaration_order() {
        let config = default_config("demo");
        let keys: Vec<&str> = config["middleware"]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(
            keys,
            vec!["poweredBy", "logger", "cookieParser", "session", "cors", "csrf", "i18n"]
        );
        assert_eq!(config["name"], json!("demo"));
    }
}
