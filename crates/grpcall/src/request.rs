//! Inbound request types and parameter validation.
//!
//! This is the JSON boundary: a schema-less parameter record comes in and a
//! validated `InvocationRequest` comes out.

use crate::error::CallError;
use grpcallconf::DefaultsConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Timeout applied when a call specifies none, or a non-positive one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A network endpoint. `address` is the pooling key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub address: String,
    pub use_tls: bool,
}

impl Target {
    pub fn new(address: impl Into<String>, use_tls: bool) -> Self {
        Self {
            address: address.into(),
            use_tls,
        }
    }

    /// URI handed to the transport: `http://host:port` or `https://host:port`.
    pub fn uri(&self) -> String {
        if self.address.starts_with("http://") || self.address.starts_with("https://") {
            return self.address.clone();
        }
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{}://{}", scheme, self.address)
    }
}

/// One unit of work submitted by a caller.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub target: Target,
    pub service: String,
    pub method: String,
    pub payload: Value,
    pub timeout: Duration,
}

impl InvocationRequest {
    pub fn new(
        address: impl Into<String>,
        service: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            target: Target::new(address, false),
            service: service.into(),
            method: method.into(),
            payload: Value::Object(Map::new()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.target.use_tls = use_tls;
        self
    }

    /// Reject requests missing any of address, service, or method.
    pub fn validate(&self) -> Result<(), CallError> {
        if self.target.address.trim().is_empty() {
            return Err(CallError::invalid_params(
                "address is required",
                "Provide gRPC server address (e.g., 'localhost:9090')",
            ));
        }
        if self.service.trim().is_empty() {
            return Err(CallError::invalid_params(
                "service is required",
                "Provide service name (e.g., 'loom.v1.LoomService')",
            ));
        }
        if self.method.trim().is_empty() {
            return Err(CallError::invalid_params(
                "method is required",
                "Provide method name (e.g., 'Weave')",
            ));
        }
        Ok(())
    }

    /// Timeout actually applied to the invoke stage.
    pub fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            self.timeout
        }
    }
}

/// Parameters for a gRPC call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct GrpcCallParams {
    /// gRPC server address (e.g., 'localhost:9090')
    pub address: Option<String>,

    /// Service name (e.g., 'loom.v1.LoomService')
    pub service: Option<String>,

    /// Method name (e.g., 'Weave' or 'GetHealth')
    pub method: Option<String>,

    /// Request parameters as JSON object
    #[schemars(with = "Option<Map<String, Value>>")]
    pub request: Option<Value>,

    /// Call timeout in seconds (default: 30)
    pub timeout_seconds: Option<f64>,

    /// Use TLS connection (default: false)
    pub tls: Option<bool>,
}

impl GrpcCallParams {
    /// Parse a raw parameter record. Type mismatches are `INVALID_PARAMS`.
    pub fn from_value(params: &Value) -> Result<Self, CallError> {
        if !params.is_object() {
            return Err(CallError::invalid_params(
                "parameters must be a JSON object",
                "Provide an object with address, service and method",
            ));
        }
        serde_json::from_value(params.clone()).map_err(|e| {
            CallError::invalid_params(
                format!("invalid parameters: {}", e),
                "address, service and method are strings; timeout_seconds is a number; tls is a boolean",
            )
        })
    }

    /// Resolve into a validated request, filling omitted fields from `defaults`.
    pub fn into_request(self, defaults: &DefaultsConfig) -> Result<InvocationRequest, CallError> {
        let request = InvocationRequest {
            target: Target::new(
                self.address.unwrap_or_default(),
                self.tls.unwrap_or(defaults.tls),
            ),
            service: self.service.unwrap_or_default(),
            method: self.method.unwrap_or_default(),
            // Absent or null request means an empty message
            payload: match self.request {
                None | Some(Value::Null) => Value::Object(Map::new()),
                Some(v) => v,
            },
            timeout: resolve_timeout(self.timeout_seconds, defaults.timeout_seconds),
        };
        request.validate()?;
        Ok(request)
    }
}

/// Turn fractional seconds into a duration; non-positive or non-finite values fall back.
fn resolve_timeout(requested: Option<f64>, fallback_secs: f64) -> Duration {
    let positive = |s: f64| s.is_finite() && s > 0.0;
    match requested {
        Some(s) if positive(s) => Duration::from_secs_f64(s),
        _ if positive(fallback_secs) => Duration::from_secs_f64(fallback_secs),
        _ => DEFAULT_TIMEOUT,
    }
}
