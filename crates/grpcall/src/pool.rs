//! Connection pool: one long-lived transport channel per address.
//!
//! The address map is the only state shared between calls. Lookup-or-insert
//! happens under one lock; the dial itself runs outside it, behind a
//! per-address `OnceCell`, so concurrent acquires for the same address share
//! a single dial while other addresses are not blocked.

use crate::error::CallError;
use crate::request::Target;
use anyhow::{Context, Result};
use async_trait::async_trait;
use grpcallconf::DialConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, info, warn};

/// Establishes transport channels. The seam between the pool and the network.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, target: &Target) -> Result<Channel>;
}

/// Dials real HTTP/2 channels with tonic.
#[derive(Debug, Clone, Default)]
pub struct TonicConnector {
    dial: DialConfig,
}

impl TonicConnector {
    pub fn new(dial: DialConfig) -> Self {
        Self { dial }
    }
}

#[async_trait]
impl Connector for TonicConnector {
    async fn connect(&self, target: &Target) -> Result<Channel> {
        let uri = target.uri();
        let mut endpoint = Endpoint::from_shared(uri.clone())
            .with_context(|| format!("Invalid address '{}'", target.address))?;

        if self.dial.connect_timeout_ms > 0 {
            endpoint = endpoint.connect_timeout(Duration::from_millis(self.dial.connect_timeout_ms));
        }
        if self.dial.tcp_keepalive_secs > 0 {
            endpoint = endpoint.tcp_keepalive(Some(Duration::from_secs(self.dial.tcp_keepalive_secs)));
        }
        if target.use_tls {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .context("Failed to configure TLS")?;
        }

        // Eager dial: an absent listener fails here rather than on first call
        endpoint
            .connect()
            .await
            .with_context(|| format!("Failed to dial {}", uri))
    }
}

/// A pooled, long-lived channel bound to one target.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    target: Target,
    channel: Channel,
    created_at: Instant,
    closed: CancellationToken,
}

impl Connection {
    /// Identity of this connection within its pool.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn address(&self) -> &str {
        &self.target.address
    }

    /// A handle to the underlying channel. Clones share the same HTTP/2 connection.
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the owning pool has been closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

type Slot = Arc<OnceCell<Arc<Connection>>>;

/// Owns one connection per distinct address.
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    slots: Mutex<HashMap<String, Slot>>,
    next_id: AtomicU64,
}

impl ConnectionPool {
    pub fn new(dial: DialConfig) -> Self {
        Self::with_connector(Arc::new(TonicConnector::new(dial)))
    }

    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Return the pooled connection for `target.address`, dialing on first use.
    ///
    /// The TLS choice of the first successful acquire for an address sticks.
    /// Failed dials are not remembered; the next acquire dials again.
    #[tracing::instrument(skip(self, target), fields(address = %target.address, tls = target.use_tls))]
    pub async fn acquire(&self, target: &Target) -> Result<Arc<Connection>, CallError> {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(target.address.clone()).or_default().clone()
        };

        let result = slot
            .get_or_try_init(|| async {
                let channel = self.connector.connect(target).await?;
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                info!("Connected to {} (connection {})", target.address, id);
                Ok::<_, anyhow::Error>(Arc::new(Connection {
                    id,
                    target: target.clone(),
                    channel,
                    created_at: Instant::now(),
                    closed: CancellationToken::new(),
                }))
            })
            .await;

        let conn = match result {
            Ok(conn) => conn.clone(),
            Err(e) => {
                // The slot stays mapped: a waiter may already be dialing through it
                warn!("Dial to {} failed: {:#}", target.address, e);
                return Err(CallError::connection_failed(&target.address, format!("{:#}", e)));
            }
        };

        // A close() that ran during the dial has already drained this slot
        let still_pooled = {
            let slots = self.slots.lock().await;
            slots.get(&target.address).is_some_and(|current| Arc::ptr_eq(current, &slot))
        };
        if !still_pooled {
            conn.closed.cancel();
            return Err(CallError::connection_failed(
                &target.address,
                "pool closed while connecting",
            ));
        }

        if conn.target.use_tls != target.use_tls {
            debug!(
                "Reusing connection {} for {} with tls={} (requested tls={})",
                conn.id, target.address, conn.target.use_tls, target.use_tls
            );
        }
        Ok(conn)
    }

    /// Release every pooled connection and empty the pool.
    ///
    /// Calls still holding a connection observe it as closed.
    pub async fn close(&self) {
        let drained: Vec<Slot> = {
            let mut slots = self.slots.lock().await;
            slots.drain().map(|(_, slot)| slot).collect()
        };

        let mut closed = 0;
        for slot in drained {
            if let Some(conn) = slot.get() {
                conn.closed.cancel();
                closed += 1;
            }
        }
        info!("Connection pool closed ({} connections released)", closed);
    }

    /// Number of live connections.
    pub async fn len(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.values().filter(|slot| slot.get().is_some()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Addresses with a live connection, sorted.
    pub async fn addresses(&self) -> Vec<String> {
        let slots = self.slots.lock().await;
        let mut addresses: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(address, _)| address.clone())
            .collect();
        addresses.sort();
        addresses
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(DialConfig::default())
    }
}
