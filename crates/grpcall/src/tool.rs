//! The `grpc_call` tool: the gateway behind a name, a description and a
//! JSON Schema, so it can be registered with any tool dispatcher.

use crate::envelope::InvocationResult;
use crate::gateway::Gateway;
use crate::request::GrpcCallParams;
use grpcallconf::GrpcallConfig;
use serde_json::{json, Value};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub const TOOL_NAME: &str = "grpc_call";

const DESCRIPTION: &str = "Calls gRPC services using server reflection. No proto files needed!
Automatically discovers service methods and constructs requests.

Use this tool to:
- Call other microservices
- Query gRPC APIs
- Integrate with gRPC-based systems
- Test gRPC endpoints

The tool uses gRPC reflection to automatically understand the service schema.";

pub struct GrpcCallTool {
    gateway: Gateway,
}

impl Default for GrpcCallTool {
    fn default() -> Self {
        Self::from_gateway(Gateway::default())
    }
}

impl GrpcCallTool {
    pub fn new(config: &GrpcallConfig) -> Self {
        Self::from_gateway(Gateway::new(config))
    }

    pub fn from_gateway(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub fn name(&self) -> &'static str {
        TOOL_NAME
    }

    pub fn description(&self) -> &'static str {
        DESCRIPTION
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// JSON Schema of the parameter record.
    ///
    /// `address`, `service` and `method` are required; the rest are optional.
    pub fn input_schema(&self) -> Value {
        let schema = schemars::schema_for!(GrpcCallParams);
        let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| json!({"type": "object"}));

        if let Some(obj) = value.as_object_mut() {
            obj.insert("description".into(), json!("Parameters for gRPC call"));
            obj.insert("required".into(), json!(["address", "service", "method"]));
        }
        set_default(&mut value, "timeout_seconds", json!(30));
        set_default(&mut value, "tls", json!(false));
        value
    }

    pub async fn execute(&self, params: &Value) -> InvocationResult {
        self.execute_with_cancel(params, &CancellationToken::new()).await
    }

    /// Parse `params` and run the call. Never fails outright: every problem
    /// is reported inside the returned result.
    pub async fn execute_with_cancel(&self, params: &Value, cancel: &CancellationToken) -> InvocationResult {
        let start = Instant::now();
        let parsed = GrpcCallParams::from_value(params)
            .and_then(|p| p.into_request(self.gateway.defaults()));

        match parsed {
            Ok(request) => {
                let mut result = self.gateway.invoke_with_cancel(&request, cancel).await;
                result.elapsed = start.elapsed();
                result
            }
            Err(err) => InvocationResult::failure(&err, start.elapsed()),
        }
    }

    /// Release all pooled connections.
    pub async fn close(&self) {
        self.gateway.close().await;
    }
}

fn set_default(schema: &mut Value, property: &str, default: Value) {
    let pointer = format!("/properties/{}", property);
    if let Some(prop) = schema.pointer_mut(&pointer).and_then(Value::as_object_mut) {
        prop.insert("default".into(), default);
    }
}
