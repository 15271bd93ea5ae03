use super::{object_arg, string_list};
use crate::error::FrameworkError;
use crate::http::{map_response, Request, Response};
use crate::middleware::{BoxedMiddleware, Middleware, Next};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Picks a locale per request from `?lang=` or `Accept-Language`
///
/// The chosen locale is exposed as the `locale` local. When the locale
/// directory holds `<locale>.json` catalogs, the matching one is exposed as
/// the `messages` local.
pub struct I18n {
    locales: Vec<String>,
    default_locale: String,
    catalogs: HashMap<String, Value>,
}

impl I18n {
    pub fn new(locales: Vec<String>, default_locale: impl Into<String>) -> Self {
        Self {
            locales,
            default_locale: default_locale.into(),
            catalogs: HashMap::new(),
        }
    }

    pub fn from_args(args: Vec<Value>) -> Result<BoxedMiddleware, FrameworkError> {
        let options = object_arg("i18n", &args)?;
        let locales = string_list(options.get("locales")).unwrap_or_else(|| vec!["en".to_string()]);
        let default_locale = options
            .get("defaultLocale")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| locales.first().cloned())
            .unwrap_or_else(|| "en".to_string());
        if !locales.contains(&default_locale) {
            return Err(FrameworkError::invalid_middleware(
                "i18n",
                format!("defaultLocale '{}' is not one of the locales", default_locale),
            ));
        }

        let mut i18n = Self::new(locales, default_locale);
        if let Some(directory) = options.get("directory").and_then(Value::as_str) {
            i18n.load_catalogs(Path::new(directory));
        }
        Ok(Arc::new(i18n))
    }

    fn load_catalogs(&mut self, directory: &Path) {
        for locale in &self.locales {
            let path = directory.join(format!("{}.json", locale));
            let Ok(contents) = std::fs::read_to_string(&path) else {
                tracing::debug!(path = %path.display(), "no catalog for locale");
                continue;
            };
            match serde_json::from_str::<Value>(&contents) {
                Ok(catalog) => {
                    self.catalogs.insert(locale.clone(), catalog);
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "ignoring invalid locale catalog"),
            }
        }
    }

    /// Best supported locale for the request
    pub fn negotiate(&self, request: &Request) -> String {
        if let Some(lang) = request.query("lang").and_then(|l| self.supported(l)) {
            return lang;
        }

        let mut ranges: Vec<(&str, f32)> = request
            .header("accept-language")
            .unwrap_or_default()
            .split(',')
            .filter_map(|range| {
                let mut parts = range.trim().split(';');
                let tag = parts.next()?.trim();
                if tag.is_empty() {
                    return None;
                }
                let quality = parts
                    .find_map(|p| p.trim().strip_prefix("q="))
                    .and_then(|q| q.parse::<f32>().ok())
                    .unwrap_or(1.0);
                Some((tag, quality))
            })
            .collect();
        ranges.sort_by(|a, b| b.1.total_cmp(&a.1));

        ranges
            .into_iter()
            .find_map(|(tag, _)| self.supported(tag))
            .unwrap_or_else(|| self.default_locale.clone())
    }

    fn supported(&self, tag: &str) -> Option<String> {
        let primary = tag.split('-').next().unwrap_or(tag);
        self.locales
            .iter()
            .find(|l| l.eq_ignore_ascii_case(tag))
            .or_else(|| self.locales.iter().find(|l| l.eq_ignore_ascii_case(primary)))
            .cloned()
    }
}

#[async_trait]
impl Middleware for I18n {
    async fn handle(&self, mut request: Request, next: Next) -> Response {
        let locale = self.negotiate(&request);
        if let Some(catalog) = self.catalogs.get(&locale) {
            request.set_local("messages", catalog.clone());
        } else {
            request.set_local("messages", Value::Object(Map::new()));
        }
        request.set_local("locale", locale.as_str());

        map_response(next.run(request).await, |r| r.header("Content-Language", locale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn i18n() -> I18n {
        I18n::new(vec!["en".to_string(), "es".to_string()], "en")
    }

    #[test]
    fn test_negotiates_by_quality() {
        let request = Request::new(Method::GET, "/")
            .with_header("accept-language", "fr;q=1.0, es-MX;q=0.8, en;q=0.5");
        assert_eq!(i18n().negotiate(&request), "es");
    }

    #[test]
    fn test_query_wins_and_default_is_fallback() {
        let request = Request::new(Method::GET, "/?lang=es").with_header("accept-language", "en");
        assert_eq!(i18n().negotiate(&request), "es");

        let request = Request::new(Method::GET, "/").with_header("accept-language", "de");
        assert_eq!(i18n().negotiate(&request), "en");
    }

    #[test]
    fn test_loads_catalogs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("es.json"), r#"{"hello":"hola"}"#).unwrap();

        let mut i18n = i18n();
        i18n.load_catalogs(dir.path());
        assert_eq!(i18n.catalogs.get("es"), Some(&serde_json::json!({ "hello": "hola" })));
        assert!(!i18n.catalogs.contains_key("en"));
    }
}
