pub mod admin;
pub mod metrics;
pub mod stream;
pub mod vitals;

use axum::body::Bytes;
use serde_json::{Map, Value};
use serde::Deserialize;

use crate::error::{MonitorError, Result};

/// `?format=` on summary and export routes.
#[derive(Debug, Default, Deserialize)]
pub struct FormatParams {
    pub format: Option<String>,
}

/// Parses a request body as a JSON object, reporting failures in the
/// monitor's own error shape instead of axum's rejection text.
fn json_object(body: &Bytes) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| MonitorError::BadRequest(format!("body must be valid JSON: {e}")))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(MonitorError::BadRequest("body must be a JSON object".into())),
    }
}
