//! Middleware shipped with the framework
//!
//! Each is registered as a factory, so the configuration entry's `options`
//! become its constructor arguments.

mod cookie_parser;
mod cors;
mod csrf;
mod i18n;
mod powered_by;
mod request_logger;
mod session;

pub use cookie_parser::{parse_cookie_header, CookieParser};
pub use cors::Cors;
pub use csrf::Csrf;
pub use i18n::I18n;
pub use powered_by::PoweredBy;
pub use request_logger::{LogFormat, RequestLogger};
pub use session::Session;

use super::MiddlewareImpl;
use crate::error::FrameworkError;
use crate::registry::Registry;
use serde_json::{Map, Value};

/// Register every built-in with its conventional reference
pub fn register(registry: &mut Registry) {
    registry
        .instance("middleware.poweredBy", MiddlewareImpl::factory(PoweredBy::from_args))
        .module("request-logger", MiddlewareImpl::factory(RequestLogger::from_args))
        .module("cookie-parser", MiddlewareImpl::factory(CookieParser::from_args))
        .module("session", MiddlewareImpl::factory(Session::from_args))
        .module("cors", MiddlewareImpl::factory(Cors::from_args))
        .module("csrf", MiddlewareImpl::factory(Csrf::from_args))
        .module("i18n", MiddlewareImpl::factory(I18n::from_args));
}

fn string_arg(args: &[Value], index: usize) -> Option<&str> {
    args.get(index).and_then(Value::as_str)
}

/// First argument as an object; absent means empty
fn object_arg<'a>(
    name: &str,
    args: &'a [Value],
) -> Result<std::borrow::Cow<'a, Map<String, Value>>, FrameworkError> {
    match args.first() {
        None | Some(Value::Null) => Ok(std::borrow::Cow::Owned(Map::new())),
        Some(Value::Object(options)) => Ok(std::borrow::Cow::Borrowed(options)),
        Some(other) => Err(FrameworkError::invalid_middleware(
            name,
            format!("expected an options object, found {}", other),
        )),
    }
}

/// A string or list of strings
fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    match value? {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    }
}
