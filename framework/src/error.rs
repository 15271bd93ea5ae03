//! Framework-wide error types
//!
//! Boot-time failures (bad configuration, unwritable snapshots, missing
//! middleware) surface as [`FrameworkError`] and abort the boot pipeline.
//! Request-time failures use [`AppError`], which carries an HTTP status and
//! converts into a response.

use std::path::PathBuf;
use thiserror::Error;

/// Simple wrapper for creating one-off request errors
///
/// # Example
///
/// ```rust,ignore
/// use trellis::{AppError, HttpResponse};
///
/// let response: HttpResponse = AppError::not_found("No such user").into();
/// assert_eq!(response.status_code(), 404);
/// ```
#[derive(Debug, Clone)]
pub struct AppError {
    message: String,
    status_code: u16,
}

impl AppError {
    /// Create a new AppError with status 500 (Internal Server Error)
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: 500,
        }
    }

    /// Set the HTTP status code
    pub fn status(mut self, code: u16) -> Self {
        self.status_code = code;
        self
    }

    /// Create a 404 Not Found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message).status(404)
    }

    /// Create a 400 Bad Request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(message).status(400)
    }

    /// Create a 401 Unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(message).status(401)
    }

    /// Create a 403 Forbidden error
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(message).status(403)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl From<AppError> for FrameworkError {
    fn from(e: AppError) -> Self {
        FrameworkError::Domain {
            message: e.message,
            status_code: e.status_code,
        }
    }
}

/// Framework-wide error type
///
/// Every variant except [`FrameworkError::Domain`] is a boot-time failure.
/// The boot pipeline stops at the first one; nothing is retried.
#[derive(Debug, Error)]
pub enum FrameworkError {
    /// The session entry names a store module the framework does not know
    #[error("Unsupported session store '{store}'")]
    UnsupportedSessionStore {
        /// The declared store module name
        store: String,
    },

    /// A credentialed session store has neither credentials nor a reusable connection
    #[error("Session store '{store}' requires a username and password (or a matching `db` connection to reuse)")]
    MissingCredentials {
        /// The declared store module name
        store: String,
    },

    /// An enabled middleware entry does not resolve to an implementation
    #[error("Middleware '{name}' could not be resolved from '{reference}'")]
    MiddlewareNotFound {
        /// Middleware key in the configuration
        name: String,
        /// The `use` reference that failed to resolve
        reference: String,
    },

    /// A middleware factory rejected its options, or a descriptor is malformed
    #[error("Invalid middleware '{name}': {message}")]
    InvalidMiddleware {
        /// Middleware key in the configuration
        name: String,
        /// What was wrong
        message: String,
    },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading or writing a configuration snapshot failed
    #[error("Failed to {action} configuration file {}: {source}", path.display())]
    ConfigIo {
        /// "read" or "write"
        action: &'static str,
        /// The snapshot path
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization error
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Other I/O failures (binding the listener, resolving the working directory)
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic internal server error
    #[error("Internal server error: {message}")]
    Internal {
        /// The error message
        message: String,
    },

    /// Request-time error with a custom status code
    #[error("{message}")]
    Domain {
        /// The error message
        message: String,
        /// HTTP status code
        status_code: u16,
    },
}

impl FrameworkError {
    /// Create a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an InvalidMiddleware error
    pub fn invalid_middleware(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidMiddleware {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a Domain error with custom status code
    pub fn domain(message: impl Into<String>, status_code: u16) -> Self {
        Self::Domain {
            message: message.into(),
            status_code,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Domain { status_code, .. } => *status_code,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_converts_with_status() {
        let err: FrameworkError = AppError::forbidden("nope").into();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.to_string(), "nope");
    }

    #[test]
    fn test_configuration_errors_name_the_culprit() {
        let err = FrameworkError::MiddlewareNotFound {
            name: "compression".to_string(),
            reference: "compression".to_string(),
        };
        assert!(err.to_string().contains("'compression'"));
        assert_eq!(err.status_code(), 500);

        let err = FrameworkError::UnsupportedSessionStore {
            store: "couchdb".to_string(),
        };
        assert_eq!(err.to_string(), "Unsupported session store 'couchdb'");
    }
}
