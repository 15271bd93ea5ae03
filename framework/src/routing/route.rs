use crate::error::FrameworkError;
use crate::middleware::BoxedMiddleware;
use serde_json::Value;
use std::fmt;

/// Verbs accepted in a route key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    Get,
    Put,
    Post,
    Delete,
    /// Every HTTP method
    All,
    /// GET that renders a view
    Render,
    /// GET that redirects (normalized to `Get` on resolution)
    Redirect,
    Options,
    /// Pre-processor run when the named route parameter matched
    Param,
}

impl RouteMethod {
    /// Parse a key's method token (case-insensitive)
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "get" => Some(Self::Get),
            "put" => Some(Self::Put),
            "post" => Some(Self::Post),
            "delete" | "del" => Some(Self::Delete),
            "all" => Some(Self::All),
            "render" | "view" => Some(Self::Render),
            "redirect" => Some(Self::Redirect),
            "options" => Some(Self::Options),
            "param" => Some(Self::Param),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Put => "put",
            Self::Post => "post",
            Self::Delete => "delete",
            Self::All => "all",
            Self::Render => "render",
            Self::Redirect => "redirect",
            Self::Options => "options",
            Self::Param => "param",
        }
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split a route key into its method token and path
///
/// `"post /users"` gives `("post", "/users")`; a bare `"/users"` is a GET.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    let mut tokens = key.split_whitespace();
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(path), None, None) => Some(("get", path)),
        (Some(method), Some(path), None) => Some((method, path)),
        _ => None,
    }
}

/// A `:name` or `:name?` path segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathKey {
    pub name: String,
    pub optional: bool,
}

/// Parameters declared by a route path, in order
pub fn path_keys(path: &str) -> Vec<PathKey> {
    path.split('/')
        .filter_map(|segment| segment.strip_prefix(':'))
        .filter(|name| !name.is_empty())
        .map(|name| match name.strip_suffix('?') {
            Some(name) => PathKey {
                name: name.to_string(),
                optional: true,
            },
            None => PathKey {
                name: name.to_string(),
                optional: false,
            },
        })
        .collect()
}

/// A route action: a registry reference or a handler
#[derive(Clone)]
pub enum ActionRef {
    Name(String),
    Handler(BoxedMiddleware),
}

impl fmt::Debug for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "Name({:?})", name),
            Self::Handler(_) => write!(f, "Handler(..)"),
        }
    }
}

impl From<&str> for ActionRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ActionRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<BoxedMiddleware> for ActionRef {
    fn from(handler: BoxedMiddleware) -> Self {
        Self::Handler(handler)
    }
}

/// Raw route map: keys as written, actions not yet resolved
#[derive(Clone, Debug, Default)]
pub struct RouteMap {
    entries: Vec<(String, Vec<ActionRef>)>,
}

impl RouteMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a route; replacing keeps the original position
    pub fn insert(&mut self, key: impl Into<String>, actions: Vec<ActionRef>) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = actions,
            None => self.entries.push((key, actions)),
        }
    }

    /// Builder form of [`RouteMap::insert`] for a single action
    pub fn route(mut self, key: impl Into<String>, action: impl Into<ActionRef>) -> Self {
        self.insert(key, vec![action.into()]);
        self
    }

    /// Parse `{"[METHOD ]/path": "Action.ref" | ["a", "b"]}`
    pub fn from_config(section: &Value) -> Result<Self, FrameworkError> {
        let mut map = Self::new();
        let entries = match section {
            Value::Null => return Ok(map),
            Value::Object(entries) => entries,
            other => {
                return Err(FrameworkError::config(format!(
                    "`routes` must be an object, found {}",
                    other
                )))
            }
        };

        for (key, value) in entries {
            let actions = match value {
                Value::String(action) => vec![ActionRef::from(action.as_str())],
                Value::Array(items) => items
                    .iter()
                    .map(|item| {
                        item.as_str().map(ActionRef::from).ok_or_else(|| {
                            FrameworkError::config(format!(
                                "route '{}' has a non-string action {}",
                                key, item
                            ))
                        })
                    })
                    .collect::<Result<_, _>>()?,
                other => {
                    return Err(FrameworkError::config(format!(
                        "route '{}' must map to a string or a list, found {}",
                        key, other
                    )))
                }
            };
            map.insert(key.clone(), actions);
        }
        Ok(map)
    }

    /// Merge another map over this one
    pub fn extend(&mut self, other: RouteMap) {
        for (key, actions) in other.entries {
            self.insert(key, actions);
        }
    }

    /// Whether a `"/"` or `"get /"` entry exists
    pub fn has_root(&self) -> bool {
        self.entries.iter().any(|(key, _)| {
            matches!(split_key(key), Some((method, "/")) if method.eq_ignore_ascii_case("get"))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ActionRef])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub(crate) fn into_entries(self) -> Vec<(String, Vec<ActionRef>)> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_method_aliases() {
        assert_eq!(RouteMethod::parse("DEL"), Some(RouteMethod::Delete));
        assert_eq!(RouteMethod::parse("view"), Some(RouteMethod::Render));
        assert_eq!(RouteMethod::parse("Post"), Some(RouteMethod::Post));
        assert_eq!(RouteMethod::parse("patch"), None);
    }

    #[test]
    fn test_split_key() {
        assert_eq!(split_key("/users"), Some(("get", "/users")));
        assert_eq!(split_key("post   /users"), Some(("post", "/users")));
        assert_eq!(split_key("a b c"), None);
        assert_eq!(split_key("  "), None);
    }

    #[test]
    fn test_path_keys() {
        assert_eq!(
            path_keys("/users/:id/posts/:slug?"),
            vec![
                PathKey { name: "id".to_string(), optional: false },
                PathKey { name: "slug".to_string(), optional: true },
            ]
        );
        assert!(path_keys("/users/profile").is_empty());
    }

    #[test]
    fn test_from_config_and_root_detection() {
        let map = RouteMap::from_config(&json!({
            "get /users": "UserController.index",
            "post /users": ["isLoggedIn", "UserController.store"]
        }))
        .unwrap();
        assert_eq!(map.len(), 2);
        assert!(!map.has_root());

        let map = RouteMap::new().route("GET /", "HomeController.index");
        assert!(map.has_root());
        assert!(RouteMap::new().route("/", "HomeController.index").has_root());
    }

    #[test]
    fn test_from_config_rejects_non_string_actions() {
        assert!(RouteMap::from_config(&json!({ "/": [1] })).is_err());
    }

    #[test]
    fn test_extend_replaces_in_place() {
        let mut map = RouteMap::new().route("/a", "A.one").route("/b", "B.one");
        map.extend(RouteMap::new().route("/a", "A.two").route("/c", "C.one"));

        let keys: Vec<(&str, String)> = map
            .iter()
            .map(|(k, actions)| (k, format!("{:?}", actions)))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("/a", "[Name(\"A.two\")]".to_string()),
                ("/b", "[Name(\"B.one\")]".to_string()),
                ("/c", "[Name(\"C.one\")]".to_string()),
            ]
        );
    }
}
