use super::MiddlewareImpl;
use crate::error::FrameworkError;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Where a middleware's implementation comes from
#[derive(Clone, Debug)]
pub enum UseRef {
    /// Module name or dot-notation instance path, looked up in the registry
    Name(String),
    /// Already-resolved implementation
    Impl(MiddlewareImpl),
}

/// Completion handle passed to a deferred options provider
///
/// Dropping it without calling [`OptionsDone::done`] leaves the entry
/// unattached.
pub struct OptionsDone(oneshot::Sender<Value>);

impl OptionsDone {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    pub fn done(self, options: Value) {
        if self.0.send(options).is_err() {
            tracing::debug!("options resolved after the boot stopped waiting");
        }
    }
}

/// Computes options asynchronously, reporting them through `done`
pub type OptionsProvider = Arc<dyn Fn(&MiddlewareDescriptor, OptionsDone) + Send + Sync>;

#[derive(Clone, Default)]
pub enum MiddlewareOptions {
    #[default]
    None,
    Value(Value),
    Deferred(OptionsProvider),
}

impl MiddlewareOptions {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for MiddlewareOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Value(value) => write!(f, "Value({})", value),
            Self::Deferred(_) => write!(f, "Deferred(..)"),
        }
    }
}

/// One entry of the `middleware` configuration section
#[derive(Clone, Debug)]
pub struct MiddlewareDescriptor {
    pub name: String,
    pub use_ref: Option<UseRef>,
    pub enabled: Option<bool>,
    pub order: Option<u32>,
    pub options: MiddlewareOptions,
}

impl MiddlewareDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            use_ref: None,
            enabled: None,
            order: None,
            options: MiddlewareOptions::None,
        }
    }

    pub fn uses(mut self, reference: impl Into<String>) -> Self {
        self.use_ref = Some(UseRef::Name(reference.into()));
        self
    }

    pub fn implementation(mut self, implementation: MiddlewareImpl) -> Self {
        self.use_ref = Some(UseRef::Impl(implementation));
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn order(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn options(mut self, options: Value) -> Self {
        self.options = MiddlewareOptions::Value(options);
        self
    }

    pub fn deferred_options<F>(mut self, provider: F) -> Self
    where
        F: Fn(&MiddlewareDescriptor, OptionsDone) + Send + Sync + 'static,
    {
        self.options = MiddlewareOptions::Deferred(Arc::new(provider));
        self
    }

    /// Parse `{use, enabled?, order?, options?}`
    pub fn from_config(name: &str, value: &Value) -> Result<Self, FrameworkError> {
        let mut descriptor = Self::new(name);
        let entry = match value {
            Value::Null => return Ok(descriptor),
            Value::Object(entry) => entry,
            other => {
                return Err(FrameworkError::invalid_middleware(
                    name,
                    format!("expected an object, found {}", other),
                ))
            }
        };

        match entry.get("use") {
            None | Some(Value::Null) => {}
            Some(Value::String(reference)) => {
                descriptor.use_ref = Some(UseRef::Name(reference.clone()))
            }
            Some(other) => {
                return Err(FrameworkError::invalid_middleware(
                    name,
                    format!("`use` must be a string, found {}", other),
                ))
            }
        }

        match entry.get("enabled") {
            None | Some(Value::Null) => {}
            Some(Value::Bool(enabled)) => descriptor.enabled = Some(*enabled),
            Some(other) => {
                return Err(FrameworkError::invalid_middleware(
                    name,
                    format!("`enabled` must be a boolean, found {}", other),
                ))
            }
        }

        match entry.get("order") {
            None | Some(Value::Null) => {}
            Some(order) => {
                let order = order
                    .as_u64()
                    .and_then(|o| u32::try_from(o).ok())
                    .ok_or_else(|| {
                        FrameworkError::invalid_middleware(
                            name,
                            format!("`order` must be a non-negative integer, found {}", order),
                        )
                    })?;
                descriptor.order = Some(order);
            }
        }

        if let Some(options) = entry.get("options").filter(|o| !o.is_null()) {
            descriptor.options = MiddlewareOptions::Value(options.clone());
        }

        Ok(descriptor)
    }

    /// Parse every entry of a `middleware` section, keeping its key order
    pub fn from_section(section: &Value) -> Result<Vec<Self>, FrameworkError> {
        match section {
            Value::Null => Ok(Vec::new()),
            Value::Object(entries) => entries
                .iter()
                .map(|(name, value)| Self::from_config(name, value))
                .collect(),
            other => Err(FrameworkError::config(format!(
                "`middleware` must be an object, found {}",
                other
            ))),
        }
    }

    /// Nothing was declared for this entry
    pub fn is_empty(&self) -> bool {
        self.use_ref.is_none()
            && self.enabled.is_none()
            && self.order.is_none()
            && self.options.is_none()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Registry reference: `use`, falling back to the entry name
    pub fn reference(&self) -> &str {
        match &self.use_ref {
            Some(UseRef::Name(reference)) => reference,
            _ => &self.name,
        }
    }
}
