//! Session, cookie, CORS and i18n defaults
//!
//! Runs once on the merged configuration before it is persisted. Values
//! generated here (session key and secret) are written back with the named
//! snapshot, so the next boot reads them instead of generating new ones.

use super::merge::{deep_merge, ensure_object, root_object};
use crate::error::FrameworkError;
use rand::Rng;
use serde_json::{json, Map, Value};

/// Number of random bytes in a generated session secret (hex-encoded to 32 chars)
pub const SECRET_BYTES: usize = 16;

/// Backing store for the session middleware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStoreKind {
    Memory,
    Redis,
    Mongo,
    Sql,
}

impl SessionStoreKind {
    /// Parse a declared store module name
    pub fn parse(module: &str) -> Option<Self> {
        match module {
            "memory" | "memorystore" => Some(Self::Memory),
            "redis" | "connect-redis" => Some(Self::Redis),
            "mongo" | "mongodb" | "connect-mongo" => Some(Self::Mongo),
            "sql" | "sequelize" | "connect-session-sequelize" => Some(Self::Sql),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
            Self::Mongo => "mongo",
            Self::Sql => "sql",
        }
    }

    /// Whether the store needs a username and password
    pub fn requires_credentials(&self) -> bool {
        matches!(self, Self::Mongo | Self::Sql)
    }

    /// Connection defaults, merged beneath user-supplied store options
    pub fn defaults(&self, app_name: &str) -> Value {
        match self {
            Self::Memory => json!({}),
            Self::Redis => json!({
                "host": "127.0.0.1",
                "port": 6379,
                "db": 0,
                "prefix": format!("{}:sess:", app_name),
            }),
            Self::Mongo => json!({
                "host": "127.0.0.1",
                "port": 27017,
                "database": format!("{}-sessions", app_name),
                "collection": "sessions",
            }),
            Self::Sql => json!({
                "dialect": "postgres",
                "host": "127.0.0.1",
                "port": 5432,
                "database": app_name,
                "table": "sessions",
            }),
        }
    }

    /// Whether a `db.type` value names a connection this store can reuse
    fn reuses(&self, db_type: &str) -> bool {
        SessionStoreKind::parse(db_type).is_some_and(|kind| kind == *self)
            || matches!(
                (self, db_type),
                (Self::Sql, "postgres" | "mysql" | "sqlite" | "mariadb")
            )
    }
}

/// What [`apply_defaults`] generated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultingReport {
    pub generated_key: bool,
    pub generated_secret: bool,
    pub cookie_secret: bool,
    pub cors: bool,
    pub i18n: bool,
}

impl DefaultingReport {
    /// Whether anything was generated that must be persisted
    pub fn generated(&self) -> bool {
        self.generated_key || self.generated_secret
    }
}

/// Generate a fresh hex-encoded session secret
pub fn generate_secret() -> String {
    let bytes: [u8; SECRET_BYTES] = rand::thread_rng().gen();
    hex::encode(bytes)
}

fn is_enabled(entry: &Map<String, Value>) -> bool {
    entry.get("enabled").and_then(Value::as_bool).unwrap_or(true)
}

fn has_options(entry: &Map<String, Value>) -> bool {
    match entry.get("options") {
        None | Some(Value::Null) => false,
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

fn non_empty_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Fill in session, cookie-parser, CORS and i18n defaults
///
/// Never overwrites a value that is already present.
pub fn apply_defaults(tree: &mut Value, app_name: &str) -> Result<DefaultingReport, FrameworkError> {
    let mut report = DefaultingReport::default();
    let root = root_object(tree);

    let db_type = root
        .get("db")
        .and_then(|db| db.get("type"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let Some(Value::Object(middleware)) = root.get_mut("middleware") else {
        return Ok(report);
    };

    let secret = match middleware.get_mut("session") {
        Some(Value::Object(session)) if is_enabled(session) => {
            let options = ensure_object(session, "options");
            resolve_store(options, app_name, db_type.as_deref())?;

            if non_empty_str(options, "key").is_none() {
                options.insert("key".to_string(), json!(format!("{}.sid", app_name)));
                report.generated_key = true;
            }
            if non_empty_str(options, "secret").is_none() {
                options.insert("secret".to_string(), json!(generate_secret()));
                report.generated_secret = true;
                tracing::info!("generated a new session secret");
            }
            non_empty_str(options, "secret").map(str::to_string)
        }
        _ => None,
    };

    if let Some(secret) = secret {
        let created = !middleware.contains_key("cookieParser");
        let cookie_parser = ensure_object(middleware, "cookieParser");
        if created {
            cookie_parser.insert("use".to_string(), json!("cookie-parser"));
        }
        if matches!(cookie_parser.get("options"), None | Some(Value::Null)) {
            cookie_parser.insert("options".to_string(), json!(secret));
            report.cookie_secret = true;
        }
    }

    if let Some(Value::Object(cors)) = middleware.get_mut("cors") {
        if is_enabled(cors) && !has_options(cors) {
            cors.insert(
                "options".to_string(),
                json!({
                    "origin": true,
                    "credentials": true,
                    "methods": ["GET", "HEAD", "PUT", "PATCH", "POST", "DELETE", "OPTIONS"],
                    "allowedHeaders": ["Content-Type", "Authorization", "X-Requested-With", "Accept"],
                }),
            );
            report.cors = true;
        }
    }

    if let Some(Value::Object(i18n)) = middleware.get_mut("i18n") {
        if is_enabled(i18n) && !has_options(i18n) {
            i18n.insert(
                "options".to_string(),
                json!({
                    "locales": ["en", "es"],
                    "defaultLocale": "en",
                    "directory": "{{cwd}}/locales",
                }),
            );
            report.i18n = true;
        }
    }

    Ok(report)
}

/// Normalize `options.store` to an object and merge the store's defaults beneath it
fn resolve_store(
    options: &mut Map<String, Value>,
    app_name: &str,
    db_type: Option<&str>,
) -> Result<(), FrameworkError> {
    let declared = match options.remove("store") {
        None | Some(Value::Null) => json!({ "module": "memory" }),
        Some(Value::String(module)) => json!({ "module": module }),
        Some(store @ Value::Object(_)) => store,
        Some(other) => {
            return Err(FrameworkError::config(format!(
                "session store must be a module name or an object, got {}",
                other
            )))
        }
    };

    let module = declared
        .get("module")
        .and_then(Value::as_str)
        .unwrap_or("memory")
        .to_string();
    let kind = SessionStoreKind::parse(&module)
        .ok_or_else(|| FrameworkError::UnsupportedSessionStore { store: module.clone() })?;

    let mut store = kind.defaults(app_name);
    deep_merge(&mut store, declared);
    let store_map = root_object(&mut store);
    store_map.insert("module".to_string(), json!(module));

    if kind.requires_credentials()
        && (non_empty_str(store_map, "username").is_none()
            || non_empty_str(store_map, "password").is_none())
    {
        match db_type {
            Some(db_type) if kind.reuses(db_type) => {
                store_map.insert("reuseConnection".to_string(), json!(true));
            }
            _ => return Err(FrameworkError::MissingCredentials { store: module }),
        }
    }

    tracing::debug!(store = kind.as_str(), "session store resolved");
    options.insert("store".to_string(), store);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_session_key_and_secret_generated() {
        let mut tree = json!({
            "middleware": { "session": { "enabled": true, "options": {} } },
            "db": {}
        });
        let report = apply_defaults(&mut tree, "demo").unwrap();

        assert!(report.generated());
        let options = &tree["middleware"]["session"]["options"];
        assert_eq!(options["key"], json!("demo.sid"));
        let secret = options["secret"].as_str().unwrap();
        assert_eq!(secret.len(), 32);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(tree["middleware"]["cookieParser"]["options"], json!(secret));
        assert_eq!(tree["middleware"]["cookieParser"]["use"], json!("cookie-parser"));
        assert_eq!(options["store"], json!({ "module": "memory" }));
    }

    #[test]
    fn test_existing_secret_is_kept() {
        let mut tree = json!({
            "middleware": {
                "session": { "options": { "key": "k.sid", "secret": "abc" } },
                "cookieParser": { "use": "cookie-parser", "options": "other" }
            }
        });
        let report = apply_defaults(&mut tree, "demo").unwrap();

        assert!(!report.generated());
        assert!(!report.cookie_secret);
        assert_eq!(tree["middleware"]["session"]["options"]["secret"], json!("abc"));
        assert_eq!(tree["middleware"]["cookieParser"]["options"], json!("other"));
    }

    #[test]
    fn test_disabled_session_is_left_alone() {
        let mut tree = json!({ "middleware": { "session": { "enabled": false } } });
        let report = apply_defaults(&mut tree, "demo").unwrap();
        assert_eq!(report, DefaultingReport::default());
        assert_eq!(tree, json!({ "middleware": { "session": { "enabled": false } } }));
    }

    #[test]
    fn test_redis_store_defaults_beneath_user_options() {
        let mut tree = json!({
            "middleware": { "session": { "options": { "store": { "module": "connect-redis", "port": 6380 } } } }
        });
        apply_defaults(&mut tree, "demo").unwrap();

        assert_eq!(
            tree["middleware"]["session"]["options"]["store"],
            json!({
                "host": "127.0.0.1",
                "port": 6380,
                "db": 0,
                "prefix": "demo:sess:",
                "module": "connect-redis"
            })
        );
    }

    #[test]
    fn test_unsupported_store_is_fatal() {
        let mut tree = json!({ "middleware": { "session": { "options": { "store": "couchdb" } } } });
        let err = apply_defaults(&mut tree, "demo").unwrap_err();
        assert!(matches!(err, FrameworkError::UnsupportedSessionStore { store } if store == "couchdb"));
    }

    #[test]
    fn test_credentialed_store_requires_credentials_or_connection() {
        let mut tree = json!({ "middleware": { "session": { "options": { "store": "mongo" } } } });
        let err = apply_defaults(&mut tree, "demo").unwrap_err();
        assert!(matches!(err, FrameworkError::MissingCredentials { .. }));

        let mut tree = json!({
            "db": { "type": "mongodb" },
            "middleware": { "session": { "options": { "store": "mongo" } } }
        });
        apply_defaults(&mut tree, "demo").unwrap();
        let store = &tree["middleware"]["session"]["options"]["store"];
        assert_eq!(store["reuseConnection"], json!(true));
        assert_eq!(store["database"], json!("demo-sessions"));

        let mut tree = json!({
            "middleware": { "session": { "options": {
                "store": { "module": "sql", "username": "app", "password": "pw" }
            } } }
        });
        apply_defaults(&mut tree, "demo").unwrap();
        assert_eq!(tree["middleware"]["session"]["options"]["store"]["port"], json!(5432));
    }

    #[test]
    fn test_cors_and_i18n_defaults_only_when_enabled_without_options() {
        let mut tree = json!({
            "middleware": {
                "cors": { "use": "cors", "enabled": true },
                "i18n": { "use": "i18n" },
                "csrf": { "use": "csrf", "enabled": false }
            }
        });
        let report = apply_defaults(&mut tree, "demo").unwrap();

        assert!(report.cors && report.i18n);
        assert_eq!(tree["middleware"]["cors"]["options"]["origin"], json!(true));
        assert_eq!(tree["middleware"]["cors"]["options"]["credentials"], json!(true));
        assert_eq!(tree["middleware"]["i18n"]["options"]["locales"], json!(["en", "es"]));

        let mut tree = json!({
            "middleware": {
                "cors": { "enabled": false },
                "i18n": { "options": { "locales": ["de"] } }
            }
        });
        let report = apply_defaults(&mut tree, "demo").unwrap();
        assert!(!report.cors && !report.i18n);
        assert_eq!(tree["middleware"]["cors"].get("options"), None);
        assert_eq!(tree["middleware"]["i18n"]["options"], json!({ "locales": ["de"] }));
    }
}
