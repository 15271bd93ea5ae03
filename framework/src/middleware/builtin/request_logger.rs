use super::string_arg;
use crate::error::FrameworkError;
use crate::http::{Request, Response};
use crate::middleware::{BoxedMiddleware, Middleware, Next};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Request log line layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// `GET /users 200 1.2ms`
    Dev,
    /// Apache-style line with user agent and referrer
    Combined,
    /// Structured fields only
    Json,
}

impl LogFormat {
    pub fn parse(format: &str) -> Option<Self> {
        match format {
            "dev" | "tiny" | "short" => Some(Self::Dev),
            "combined" | "common" => Some(Self::Combined),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logs one line per request through `tracing`
pub struct RequestLogger {
    format: LogFormat,
}

impl RequestLogger {
    pub fn new(format: LogFormat) -> Self {
        Self { format }
    }

    pub fn from_args(args: Vec<Value>) -> Result<BoxedMiddleware, FrameworkError> {
        let format = match string_arg(&args, 0) {
            None => LogFormat::Dev,
            Some(name) => LogFormat::parse(name).ok_or_else(|| {
                FrameworkError::invalid_middleware("logger", format!("unknown log format '{}'", name))
            })?,
        };
        Ok(Arc::new(Self::new(format)))
    }
}

#[async_trait]
impl Middleware for RequestLogger {
    async fn handle(&self, request: Request, next: Next) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.path().to_string();
        let user_agent = request.header("user-agent").unwrap_or("-").to_string();
        let referrer = request.header("referer").unwrap_or("-").to_string();

        let response = next.run(request).await;
        let status = match &response {
            Ok(r) | Err(r) => r.status_code(),
        };
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        match self.format {
            LogFormat::Dev => {
                tracing::info!("{} {} {} {:.1}ms", method, path, status, elapsed_ms)
            }
            LogFormat::Combined => tracing::info!(
                "\"{} {}\" {} \"{}\" \"{}\" {:.1}ms",
                method,
                path,
                status,
                referrer,
                user_agent,
                elapsed_ms
            ),
            LogFormat::Json => tracing::info!(
                method = %method,
                path = %path,
                status,
                elapsed_ms,
                user_agent = %user_agent,
                "request"
            ),
        }

        response
    }
}
