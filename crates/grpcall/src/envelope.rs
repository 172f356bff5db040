//! Uniform result envelope for every terminal outcome of a call.
//!
//! Success and failure both carry elapsed time, so callers can tell a
//! fast validation failure from a slow network one.

use crate::error::{CallError, ErrorCode, Stage};
use crate::request::Target;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Structured error rendered to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredError {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl From<&CallError> for StructuredError {
    fn from(err: &CallError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            retryable: err.retryable(),
            suggestion: err.suggestion(),
        }
    }
}

/// Echoed identity of the call that produced a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMetadata {
    pub address: String,
    pub service: String,
    pub method: String,
}

impl CallMetadata {
    pub fn new(target: &Target, service: &str, method: &str) -> Self {
        Self {
            address: target.address.clone(),
            service: service.to_string(),
            method: method.to_string(),
        }
    }
}

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    pub success: bool,
    /// Decoded response, present on success.
    pub payload: Option<Value>,
    pub error: Option<StructuredError>,
    /// Stage that failed, present on failure.
    pub failed_stage: Option<Stage>,
    pub metadata: Option<CallMetadata>,
    pub elapsed: Duration,
}

impl InvocationResult {
    pub fn success(payload: Value, metadata: CallMetadata, elapsed: Duration) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
            failed_stage: None,
            metadata: Some(metadata),
            elapsed,
        }
    }

    pub fn failure(err: &CallError, elapsed: Duration) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(StructuredError::from(err)),
            failed_stage: Some(err.stage()),
            metadata: None,
            elapsed,
        }
    }

    /// Error code, if the call failed.
    pub fn code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }

    pub fn retryable(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.retryable)
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }

    /// Render the outbound record for the tool edge.
    ///
    /// Success: `{success, data: {response, service, method}, metadata, execution_time_ms}`.
    /// Failure: `{success, error: {code, message, retryable, suggestion?}, execution_time_ms}`.
    pub fn to_json(&self) -> Value {
        let mut out = json!({
            "success": self.success,
            "execution_time_ms": self.elapsed_ms(),
        });

        if let Some(ref metadata) = self.metadata {
            out["data"] = json!({
                "response": self.payload.clone().unwrap_or(Value::Null),
                "service": metadata.service,
                "method": metadata.method,
            });
            out["metadata"] = serde_json::to_value(metadata).unwrap_or(Value::Null);
        }

        if let Some(ref error) = self.error {
            out["error"] = serde_json::to_value(error).unwrap_or_else(|e| {
                json!({
                    "code": error.code,
                    "message": format!("{} (error rendering failed: {})", error.message, e),
                    "retryable": error.retryable,
                })
            });
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn success_shape() {
        let target = Target::new("localhost:9090", false);
        let result = InvocationResult::success(
            json!({"name": "loom"}),
            CallMetadata::new(&target, "pkg.Echo", "Echo"),
            Duration::from_millis(12),
        );

        assert_eq!(
            result.to_json(),
            json!({
                "success": true,
                "data": {
                    "response": {"name": "loom"},
                    "service": "pkg.Echo",
                    "method": "Echo",
                },
                "metadata": {
                    "address": "localhost:9090",
                    "service": "pkg.Echo",
                    "method": "Echo",
                },
                "execution_time_ms": 12,
            })
        );
    }

    #[test]
    fn failure_shape() {
        let err = CallError::connection_failed("127.0.0.1:1", "connection refused");
        let result = InvocationResult::failure(&err, Duration::from_millis(3));

        assert!(!result.success);
        assert!(result.retryable());
        assert_eq!(result.failed_stage, Some(Stage::Connecting));
        assert_eq!(
            result.to_json(),
            json!({
                "success": false,
                "error": {
                    "code": "CONNECTION_FAILED",
                    "message": "Failed to connect to 127.0.0.1:1: connection refused",
                    "retryable": true,
                    "suggestion": "Check that the gRPC server is running and accessible",
                },
                "execution_time_ms": 3,
            })
        );
    }

    #[test]
    fn failure_without_suggestion_omits_field() {
        let err = CallError::InvalidRequest("bad field".to_string());
        let json = InvocationResult::failure(&err, Duration::ZERO).to_json();
        assert!(json["error"].get("suggestion").is_none());
        assert_eq!(json["error"]["retryable"], json!(false));
    }
}
