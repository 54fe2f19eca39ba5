//! Error types for the tool gateway.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use unrelated_http_tools::TransportError;
use unrelated_openapi_tools::OpenApiToolsError;

/// Main error type for registry, resolver and invocation operations.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// Malformed specification source.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Malformed descriptor or call, or a missing required argument.
    #[error("Validation error: {message}")]
    Validation { message: String, details: Value },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool already exists: {0}")]
    ToolAlreadyExists(String),

    #[error("API configuration not found: {0}")]
    ConfigurationNotFound(String),

    /// A required credential could not be found.
    #[error("Auth configuration error: {0}")]
    AuthConfiguration(String),

    #[error("Circuit breaker open, retry after {}ms", retry_after.as_millis())]
    CircuitOpen { retry_after: Duration },

    #[error("Upstream HTTP error: status {status}")]
    UpstreamHttp { status: u16, body: String },

    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Transport error: {message}")]
    Transport { message: String, transient: bool },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Call cancelled: {0}")]
    Cancelled(String),
}

/// Stable, client-facing error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ParseError,
    ValidationError,
    ToolNotFound,
    ToolAlreadyExists,
    ConfigurationNotFound,
    AuthConfigurationError,
    CircuitOpen,
    UpstreamHttpError,
    Timeout,
    TransportError,
    PersistenceError,
    Cancelled,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::ToolNotFound => "TOOL_NOT_FOUND",
            ErrorCode::ToolAlreadyExists => "TOOL_ALREADY_EXISTS",
            ErrorCode::ConfigurationNotFound => "CONFIGURATION_NOT_FOUND",
            ErrorCode::AuthConfigurationError => "AUTH_CONFIGURATION_ERROR",
            ErrorCode::CircuitOpen => "CIRCUIT_OPEN",
            ErrorCode::UpstreamHttpError => "UPSTREAM_HTTP_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::TransportError => "TRANSPORT_ERROR",
            ErrorCode::PersistenceError => "PERSISTENCE_ERROR",
            ErrorCode::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        GatewayError::Validation {
            message: message.into(),
            details: Value::Null,
        }
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayError::Parse(_) => ErrorCode::ParseError,
            GatewayError::Validation { .. } => ErrorCode::ValidationError,
            GatewayError::ToolNotFound(_) => ErrorCode::ToolNotFound,
            GatewayError::ToolAlreadyExists(_) => ErrorCode::ToolAlreadyExists,
            GatewayError::ConfigurationNotFound(_) => ErrorCode::ConfigurationNotFound,
            GatewayError::AuthConfiguration(_) => ErrorCode::AuthConfigurationError,
            GatewayError::CircuitOpen { .. } => ErrorCode::CircuitOpen,
            GatewayError::UpstreamHttp { .. } => ErrorCode::UpstreamHttpError,
            GatewayError::Timeout(_) => ErrorCode::Timeout,
            GatewayError::Transport { .. } => ErrorCode::TransportError,
            GatewayError::Persistence(_) => ErrorCode::PersistenceError,
            GatewayError::Cancelled(_) => ErrorCode::Cancelled,
        }
    }

    /// Whether the shared retry policy may try the call again.
    ///
    /// Upstream HTTP errors are retried for 5xx, 408 and 429 only; other 4xx responses
    /// are deterministic.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::UpstreamHttp { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            GatewayError::Timeout(_) => true,
            GatewayError::Transport { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Structured details for error results.
    #[must_use]
    pub fn details(&self) -> Value {
        match self {
            GatewayError::Validation { details, .. } => details.clone(),
            GatewayError::UpstreamHttp { status, body } => {
                let body = serde_json::from_str::<Value>(body)
                    .unwrap_or_else(|_| Value::String(body.clone()));
                json!({ "status": status, "body": body })
            }
            GatewayError::CircuitOpen { retry_after } => {
                json!({ "retryAfterMs": u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX) })
            }
            GatewayError::Timeout(d) => {
                json!({ "timeoutMs": u64::try_from(d.as_millis()).unwrap_or(u64::MAX) })
            }
            GatewayError::ToolNotFound(name) | GatewayError::ToolAlreadyExists(name) => {
                json!({ "tool": name })
            }
            GatewayError::ConfigurationNotFound(id) => json!({ "configId": id }),
            _ => Value::Null,
        }
    }
}

impl From<OpenApiToolsError> for GatewayError {
    fn from(e: OpenApiToolsError) -> Self {
        if e.is_parse_error() {
            return GatewayError::Parse(e.to_string());
        }
        match e {
            OpenApiToolsError::Reference(_) => GatewayError::Parse(e.to_string()),
            _ => GatewayError::validation(e.to_string()),
        }
    }
}

impl From<TransportError> for GatewayError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout(d) => GatewayError::Timeout(d),
            other => GatewayError::Transport {
                transient: other.is_transient(),
                message: other.to_string(),
            },
        }
    }
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_as_screaming_snake_case() {
        assert_eq!(
            serde_json::to_value(ErrorCode::AuthConfigurationError).unwrap(),
            json!("AUTH_CONFIGURATION_ERROR")
        );
        assert_eq!(
            GatewayError::ToolNotFound("x".into()).code().as_str(),
            "TOOL_NOT_FOUND"
        );
    }

    #[test]
    fn retryability() {
        let upstream = |status| GatewayError::UpstreamHttp {
            status,
            body: String::new(),
        };
        assert!(upstream(503).is_retryable());
        assert!(upstream(429).is_retryable());
        assert!(!upstream(404).is_retryable());
        assert!(GatewayError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!GatewayError::validation("bad").is_retryable());
        assert!(!GatewayError::AuthConfiguration("missing".into()).is_retryable());
        assert!(
            !GatewayError::CircuitOpen {
                retry_after: Duration::ZERO
            }
            .is_retryable()
        );

        let blocked: GatewayError = TransportError::Blocked("private ip".into()).into();
        assert!(!blocked.is_retryable());
        let refused: GatewayError = TransportError::Connect("refused".into()).into();
        assert!(refused.is_retryable());
    }

    #[test]
    fn upstream_details_embed_json_bodies() {
        let e = GatewayError::UpstreamHttp {
            status: 422,
            body: r#"{"error":"bad"}"#.to_string(),
        };
        assert_eq!(e.details(), json!({"status": 422, "body": {"error": "bad"}}));
    }
}
