//! Unary invocation over a pooled channel.

use crate::codec::DynamicCodec;
use crate::error::CallError;
use crate::pool::Connection;
use crate::reflection::MethodSchema;
use prost_reflect::DynamicMessage;
use std::time::Duration;
use tonic::client::Grpc;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::{Request, Status};
use tracing::debug;

/// Performs exactly one remote call per `invoke`.
#[derive(Debug, Clone)]
pub struct Invoker {
    max_decoding_message_size: usize,
}

impl Invoker {
    pub fn new(max_decoding_message_size: usize) -> Self {
        Self {
            max_decoding_message_size,
        }
    }

    /// Call `method` with `request`, bounded by `timeout`.
    ///
    /// The deadline is enforced locally and also sent to the server as
    /// `grpc-timeout`. Streaming methods are rejected without contacting the server.
    #[tracing::instrument(skip(self, conn, method, request), fields(address = %conn.address(), path = %method.path()))]
    pub async fn invoke(
        &self,
        conn: &Connection,
        method: &MethodSchema,
        request: DynamicMessage,
        timeout: Duration,
    ) -> Result<DynamicMessage, CallError> {
        if !method.is_unary() {
            return Err(CallError::CallFailed(format!(
                "{} is a streaming method; only unary calls are supported",
                method.path()
            )));
        }

        let path: PathAndQuery = method
            .path()
            .parse()
            .map_err(|e| CallError::CallFailed(format!("invalid method path: {}", e)))?;

        let mut request = Request::new(request);
        request.set_timeout(timeout);

        let mut grpc = Grpc::new(conn.channel()).max_decoding_message_size(self.max_decoding_message_size);
        let codec = DynamicCodec::new(method.output_type());

        let call = async {
            grpc.ready()
                .await
                .map_err(|e| Status::unknown(format!("Service was not ready: {}", e)))?;
            grpc.unary(request, path, codec).await
        };

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(response)) => {
                debug!("Call completed");
                Ok(response.into_inner())
            }
            Ok(Err(status)) => Err(CallError::CallFailed(format_status(&status))),
            Err(_) => Err(CallError::CallFailed(format!(
                "deadline exceeded after {:?}",
                timeout
            ))),
        }
    }
}

fn format_status(status: &Status) -> String {
    if status.message().is_empty() {
        format!("{:?}", status.code())
    } else {
        format!("{:?}: {}", status.code(), status.message())
    }
}
