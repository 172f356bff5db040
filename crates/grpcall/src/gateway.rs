//! The invocation pipeline.
//!
//! One call walks Validating, Connecting, ResolvingSchema, Encoding,
//! Invoking and Decoding, stopping at the first failure. Every outcome,
//! success or failure, carries the wall-clock time spent.

use crate::envelope::{CallMetadata, InvocationResult};
use crate::error::{CallError, Stage};
use crate::invoker::Invoker;
use crate::pool::{Connection, ConnectionPool, Connector};
use crate::reflection::SchemaResolver;
use crate::request::InvocationRequest;
use crate::transcode::{DynamicValue, RequestEncoder, ResponseDecoder};
use grpcallconf::{DefaultsConfig, GrpcallConfig};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Connection pool plus the per-call stages. Shared by all concurrent calls.
pub struct Gateway {
    pool: ConnectionPool,
    resolver: SchemaResolver,
    invoker: Invoker,
    decoder: ResponseDecoder,
    defaults: DefaultsConfig,
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new(&GrpcallConfig::default())
    }
}

impl Gateway {
    pub fn new(config: &GrpcallConfig) -> Self {
        Self::with_pool(config, ConnectionPool::new(config.infra.dial.clone()))
    }

    /// Build a gateway whose pool dials through `connector`.
    pub fn with_connector(config: &GrpcallConfig, connector: Arc<dyn Connector>) -> Self {
        Self::with_pool(config, ConnectionPool::with_connector(connector))
    }

    fn with_pool(config: &GrpcallConfig, pool: ConnectionPool) -> Self {
        let dial = &config.infra.dial;
        let resolve_timeout =
            (dial.resolve_timeout_ms > 0).then(|| Duration::from_millis(dial.resolve_timeout_ms));
        Self {
            pool,
            resolver: SchemaResolver::new(resolve_timeout),
            invoker: Invoker::new(dial.max_recv_message_bytes),
            decoder: ResponseDecoder::new(&config.defaults),
            defaults: config.defaults.clone(),
        }
    }

    pub fn defaults(&self) -> &DefaultsConfig {
        &self.defaults
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn resolver(&self) -> &SchemaResolver {
        &self.resolver
    }

    /// Run one call to completion.
    pub async fn invoke(&self, request: &InvocationRequest) -> InvocationResult {
        self.invoke_with_cancel(request, &CancellationToken::new()).await
    }

    /// Run one call, abandoning it if `cancel` fires.
    ///
    /// A cancelled call fails with the error code of the stage it was in.
    #[tracing::instrument(
        skip_all,
        fields(address = %request.target.address, service = %request.service, method = %request.method)
    )]
    pub async fn invoke_with_cancel(
        &self,
        request: &InvocationRequest,
        cancel: &CancellationToken,
    ) -> InvocationResult {
        let start = Instant::now();
        match self.run(request, cancel).await {
            Ok(payload) => {
                let elapsed = start.elapsed();
                info!("Call succeeded in {:?}", elapsed);
                let metadata = CallMetadata::new(&request.target, &request.service, &request.method);
                InvocationResult::success(payload, metadata, elapsed)
            }
            Err(err) => {
                let elapsed = start.elapsed();
                warn!(
                    stage = %err.stage(),
                    code = %err.code(),
                    "Call failed after {:?}: {}",
                    elapsed,
                    err
                );
                InvocationResult::failure(&err, elapsed)
            }
        }
    }

    async fn run(
        &self,
        request: &InvocationRequest,
        cancel: &CancellationToken,
    ) -> Result<DynamicValue, CallError> {
        debug!(stage = %Stage::Validating, "Entering stage");
        request.validate()?;

        debug!(stage = %Stage::Connecting, "Entering stage");
        let address = &request.target.address;
        let conn = guarded(
            cancel,
            None,
            self.pool.acquire(&request.target),
            || CallError::connection_failed(address, "cancelled while connecting"),
        )
        .await?;

        debug!(stage = %Stage::ResolvingSchema, connection = conn.id(), "Entering stage");
        let schema = guarded(
            cancel,
            Some(conn.as_ref()),
            self.resolver.resolve(&conn, &request.service, &request.method),
            || CallError::service_not_found(&request.service, "cancelled while resolving schema"),
        )
        .await?;

        debug!(stage = %Stage::Encoding, "Entering stage");
        let message = RequestEncoder::encode(&schema.input_type(), &request.payload)?;

        debug!(stage = %Stage::Invoking, timeout = ?request.effective_timeout(), "Entering stage");
        let response = guarded(
            cancel,
            Some(conn.as_ref()),
            self.invoker
                .invoke(&conn, &schema, message, request.effective_timeout()),
            || CallError::CallFailed("call cancelled".to_string()),
        )
        .await?;

        debug!(stage = %Stage::Decoding, "Entering stage");
        self.decoder.decode(&schema.output_type(), &response)
    }

    /// Close every pooled connection. In-flight calls on them fail with
    /// `CONNECTION_FAILED`; later calls dial afresh.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Drive `stage` unless the caller cancels or the pool closes `conn` first.
///
/// The stage is always polled once, so a call cancelled before it starts
/// still begins its stage and then fails immediately.
async fn guarded<T, F>(
    cancel: &CancellationToken,
    conn: Option<&Connection>,
    stage: F,
    on_cancel: impl FnOnce() -> CallError,
) -> Result<T, CallError>
where
    F: Future<Output = Result<T, CallError>>,
{
    let closed = async {
        match conn {
            Some(conn) => conn.closed().await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        result = stage => result,
        _ = cancel.cancelled() => Err(on_cancel()),
        _ = closed => {
            let address = conn.map(Connection::address).unwrap_or_default();
            Err(CallError::connection_failed(address, "connection closed"))
        }
    }
}
