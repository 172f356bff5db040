//! Stage-scoped failure taxonomy.
//!
//! Every failure the pipeline can produce belongs to exactly one stage and
//! carries one stable code. Retryability is a property of the code.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable error codes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidParams,
    ConnectionFailed,
    ServiceNotFound,
    MethodNotFound,
    InvalidRequest,
    CallFailed,
    ResponseTypeError,
    ResponseMarshalFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::ConnectionFailed => "CONNECTION_FAILED",
            ErrorCode::ServiceNotFound => "SERVICE_NOT_FOUND",
            ErrorCode::MethodNotFound => "METHOD_NOT_FOUND",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::CallFailed => "CALL_FAILED",
            ErrorCode::ResponseTypeError => "RESPONSE_TYPE_ERROR",
            ErrorCode::ResponseMarshalFailed => "RESPONSE_MARSHAL_FAILED",
        }
    }

    /// Only network-bound stages are worth resubmitting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::ConnectionFailed | ErrorCode::CallFailed)
    }

    /// The pipeline stage that owns this code.
    pub fn stage(&self) -> Stage {
        match self {
            ErrorCode::InvalidParams => Stage::Validating,
            ErrorCode::ConnectionFailed => Stage::Connecting,
            ErrorCode::ServiceNotFound | ErrorCode::MethodNotFound => Stage::ResolvingSchema,
            ErrorCode::InvalidRequest => Stage::Encoding,
            ErrorCode::CallFailed => Stage::Invoking,
            ErrorCode::ResponseTypeError | ErrorCode::ResponseMarshalFailed => Stage::Decoding,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validating,
    Connecting,
    ResolvingSchema,
    Encoding,
    Invoking,
    Decoding,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validating => "validating",
            Stage::Connecting => "connecting",
            Stage::ResolvingSchema => "resolving_schema",
            Stage::Encoding => "encoding",
            Stage::Invoking => "invoking",
            Stage::Decoding => "decoding",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error("{message}")]
    InvalidParams {
        message: String,
        suggestion: Option<String>,
    },

    #[error("Failed to connect to {address}: {message}")]
    ConnectionFailed { address: String, message: String },

    #[error("Service '{service}' not found: {message}")]
    ServiceNotFound { service: String, message: String },

    #[error("Method '{method}' not found in service '{service}'")]
    MethodNotFound { service: String, method: String },

    #[error("{0}")]
    InvalidRequest(String),

    #[error("gRPC call failed: {0}")]
    CallFailed(String),

    #[error("{0}")]
    ResponseTypeError(String),

    #[error("Failed to marshal response: {0}")]
    ResponseMarshalFailed(String),
}

impl CallError {
    pub fn invalid_params(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    pub fn connection_failed(address: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::ConnectionFailed {
            address: address.into(),
            message: message.to_string(),
        }
    }

    pub fn service_not_found(service: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::ServiceNotFound {
            service: service.into(),
            message: message.to_string(),
        }
    }

    pub fn method_not_found(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            service: service.into(),
            method: method.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidParams { .. } => ErrorCode::InvalidParams,
            Self::ConnectionFailed { .. } => ErrorCode::ConnectionFailed,
            Self::ServiceNotFound { .. } => ErrorCode::ServiceNotFound,
            Self::MethodNotFound { .. } => ErrorCode::MethodNotFound,
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::CallFailed(_) => ErrorCode::CallFailed,
            Self::ResponseTypeError(_) => ErrorCode::ResponseTypeError,
            Self::ResponseMarshalFailed(_) => ErrorCode::ResponseMarshalFailed,
        }
    }

    pub fn stage(&self) -> Stage {
        self.code().stage()
    }

    pub fn retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Troubleshooting hint shown to the caller, if the stage has one.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::InvalidParams { suggestion, .. } => suggestion.clone(),
            Self::ConnectionFailed { .. } => {
                Some("Check that the gRPC server is running and accessible".to_string())
            }
            Self::ServiceNotFound { .. } => {
                Some("Check service name spelling and ensure reflection is enabled".to_string())
            }
            Self::MethodNotFound { .. } => None,
            Self::InvalidRequest(_) => None,
            Self::CallFailed(_) => {
                Some("Check request parameters and service availability".to_string())
            }
            Self::ResponseTypeError(_) | Self::ResponseMarshalFailed(_) => None,
        }
    }
}
