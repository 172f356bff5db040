//! grpcall - a reflection-driven dynamic gRPC gateway.
//!
//! Callers hand over a server address, a fully qualified service name, a
//! method name and a JSON request. The gateway discovers the method's schema
//! through server reflection, encodes the request, performs one unary call
//! and returns the response as JSON, all without compiled stubs.
//!
//! ```text
//! GrpcCallTool ──► Gateway ──► ConnectionPool (one channel per address)
//!                     │
//!                     ├─► SchemaResolver (reflection, per call)
//!                     ├─► RequestEncoder / ResponseDecoder (JSON <-> message)
//!                     └─► Invoker (unary call under a deadline)
//! ```
//!
//! Every outcome is an [`InvocationResult`]: failures carry a stable
//! [`ErrorCode`], a retryable flag and, where one exists, a suggestion.

pub mod codec;
pub mod commands;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod invoker;
pub mod pool;
pub mod reflection;
pub mod request;
pub mod telemetry;
pub mod tool;
pub mod transcode;

#[cfg(test)]
mod testing;

pub use envelope::{CallMetadata, InvocationResult, StructuredError};
pub use error::{CallError, ErrorCode, Stage};
pub use gateway::Gateway;
pub use pool::{Connection, ConnectionPool, Connector, TonicConnector};
pub use reflection::{MethodSchema, ReflectionError, ReflectionSession, SchemaResolver};
pub use request::{GrpcCallParams, InvocationRequest, Target, DEFAULT_TIMEOUT};
pub use tool::{GrpcCallTool, TOOL_NAME};
pub use transcode::{DynamicValue, RequestEncoder, ResponseDecoder};
