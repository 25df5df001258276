//! Relay server
//!
//! Binds the reader and writer listeners and runs the read side and the
//! write side until shut down.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ListenerRole, Result};
use crate::queue::TransferQueue;
use crate::registry::ConnectionRegistry;
use crate::server::config::RelayConfig;
use crate::server::dispatcher::WriteDispatcher;
use crate::server::reader::ReadIngestor;
use crate::stats::RelayStats;
use crate::transform::{Identity, Transform};

/// TCP fan-out relay
///
/// Owns the transfer queue, the connection registry and the stats; the
/// read side and write side get them by `Arc`.
///
/// # Example
/// ```no_run
/// use splitter::{RelayConfig, RelayServer};
///
/// # async fn example() -> splitter::Result<()> {
/// let config = RelayConfig::with_ports(7000, 7001).default_writers(["10.0.0.5:9000"]);
/// let server = RelayServer::bind(config).await?;
/// server.run_until(async {
///     let _ = tokio::signal::ctrl_c().await;
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub struct RelayServer {
    config: RelayConfig,
    reader_listener: TcpListener,
    writer_listener: TcpListener,
    queue: Arc<TransferQueue>,
    registry: Arc<ConnectionRegistry>,
    stats: Arc<RelayStats>,
    transform: Arc<dyn Transform>,
}

impl RelayServer {
    /// Bind both listeners
    ///
    /// A bind failure on either port is returned and the relay does not
    /// start; there is no retry.
    pub async fn bind(config: RelayConfig) -> Result<Self> {
        let reader_listener = bind_listener(ListenerRole::Reader, config.reader_addr()).await?;
        let writer_listener = bind_listener(ListenerRole::Writer, config.writer_addr()).await?;

        Ok(Self {
            queue: Arc::new(TransferQueue::with_capacity(config.queue_capacity)),
            registry: Arc::new(ConnectionRegistry::new()),
            stats: Arc::new(RelayStats::new()),
            transform: Arc::new(Identity),
            config,
            reader_listener,
            writer_listener,
        })
    }

    /// Replace the per-chunk transform (identity by default)
    pub fn with_transform<T: Transform>(mut self, transform: T) -> Self {
        self.transform = Arc::new(transform);
        self
    }

    /// Bound address of the reader listener
    pub fn reader_addr(&self) -> std::io::Result<SocketAddr> {
        self.reader_listener.local_addr()
    }

    /// Bound address of the writer listener
    pub fn writer_addr(&self) -> std::io::Result<SocketAddr> {
        self.writer_listener.local_addr()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Get a reference to the connection registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get a reference to the transfer queue
    pub fn queue(&self) -> &Arc<TransferQueue> {
        &self.queue
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Run the relay
    ///
    /// This method never returns unless a task of the relay panics.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the relay until `shutdown` resolves
    ///
    /// On shutdown every accept, read and dispatch loop is cancelled and all
    /// writer connections are closed.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let RelayServer {
            config,
            reader_listener,
            writer_listener,
            queue,
            registry,
            stats,
            transform,
        } = self;

        let cancel = CancellationToken::new();
        let ingestor = Arc::new(ReadIngestor::new(
            &config,
            Arc::clone(&queue),
            transform,
            Arc::clone(&stats),
        ));
        let dispatcher = Arc::new(WriteDispatcher::new(
            &config,
            Arc::clone(&registry),
            queue,
            Arc::clone(&stats),
        ));

        tracing::info!(
            reader = ?reader_listener.local_addr().ok(),
            writer = ?writer_listener.local_addr().ok(),
            default_writers = config.default_writers.len(),
            "Relay listening"
        );

        let mut tasks = JoinSet::new();

        tasks.spawn(Arc::clone(&ingestor).run(reader_listener, cancel.clone()));

        {
            let dispatcher = Arc::clone(&dispatcher);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = dispatcher.connect_default_writers() => {}
                }
            });
        }

        {
            let dispatcher = Arc::clone(&dispatcher);
            let cancel = cancel.clone();
            tasks.spawn(async move { dispatcher.accept_writers(writer_listener, cancel).await });
        }

        {
            let dispatcher = Arc::clone(&dispatcher);
            let cancel = cancel.clone();
            tasks.spawn(async move { dispatcher.dispatch(cancel).await });
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
                // Dialing finishes on its own; only a panicked task stops the relay.
                Some(result) = tasks.join_next() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Relay task failed");
                        break;
                    }
                }
            }
        }

        cancel.cancel();
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Relay task failed");
            }
        }

        let closed = registry.clear().await;
        let snapshot = stats.snapshot();
        tracing::info!(
            closed_writers = closed,
            chunks = snapshot.chunks_enqueued,
            bytes = snapshot.bytes_enqueued,
            bitrate = snapshot.ingest_bitrate(),
            pruned = snapshot.writers_pruned,
            "Relay stopped"
        );

        Ok(())
    }
}

async fn bind_listener(role: ListenerRole, addr: SocketAddr) -> Result<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(source) => {
            tracing::error!(role = %role, addr = %addr, error = %source, "Failed to bind listener");
            Err(Error::Bind { role, addr, source })
        }
    }
}
