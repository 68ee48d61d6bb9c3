//! Error type shared by the monitor core and its HTTP handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    Configuration,
    Query,
    ExportFormat,
    BadRequest,
    NotFound,
    Internal,
}

impl ClientCode {
    /// String representation used in JSON error bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::Configuration => "CONFIGURATION_ERROR",
            ClientCode::Query => "QUERY_ERROR",
            ClientCode::ExportFormat => "EXPORT_FORMAT_ERROR",
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::NotFound => "NOT_FOUND",
            ClientCode::Internal => "INTERNAL",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            ClientCode::NotFound => StatusCode::NOT_FOUND,
            ClientCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Unknown threshold key, non-numeric value or an invalid config file.
    #[error("invalid configuration `{key}`: {message}")]
    Configuration { key: String, message: String },

    /// Malformed filter parameters on a query.
    #[error("invalid query: {0}")]
    Query(String),

    #[error("unsupported export format `{0}` (expected json or csv)")]
    ExportFormat(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Failures inside background loops, Prometheus encoding or probes.
    #[error("internal: {0}")]
    Internal(String),
}

impl MonitorError {
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn client_code(&self) -> ClientCode {
        match self {
            Self::Configuration { .. } => ClientCode::Configuration,
            Self::Query(_) => ClientCode::Query,
            Self::ExportFormat(_) => ClientCode::ExportFormat,
            Self::BadRequest(_) => ClientCode::BadRequest,
            Self::NotFound(_) => ClientCode::NotFound,
            Self::Internal(_) => ClientCode::Internal,
        }
    }
}

impl From<prometheus::Error> for MonitorError {
    fn from(e: prometheus::Error) -> Self {
        Self::Internal(format!("prometheus: {e}"))
    }
}

impl From<redis::RedisError> for MonitorError {
    fn from(e: redis::RedisError) -> Self {
        Self::Internal(format!("redis: {e}"))
    }
}

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        let code = self.client_code();
        let status = code.status();

        let body = serde_json::json!({
            "error":   code.as_str(),
            "message": self.to_string(),
            "status":  status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
