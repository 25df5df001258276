//! Write side of the relay
//!
//! Dials the configured default writers, registers subscribers that
//! connect to the writer port, and runs the single dispatch loop that
//! drains the transfer queue into [`ConnectionRegistry::broadcast`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::queue::TransferQueue;
use crate::registry::{ConnectionRegistry, WriterOrigin};
use crate::server::config::RelayConfig;
use crate::stats::RelayStats;

/// Registers writer connections and broadcasts queued chunks to them
pub struct WriteDispatcher {
    registry: Arc<ConnectionRegistry>,
    queue: Arc<TransferQueue>,
    stats: Arc<RelayStats>,
    default_writers: Vec<String>,
    dial_timeout: Duration,
    tcp_nodelay: bool,
    dispatching: AtomicBool,
}

impl WriteDispatcher {
    pub fn new(
        config: &RelayConfig,
        registry: Arc<ConnectionRegistry>,
        queue: Arc<TransferQueue>,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            registry,
            queue,
            stats,
            default_writers: config.default_writers.clone(),
            dial_timeout: config.dial_timeout,
            tcp_nodelay: config.tcp_nodelay,
            dispatching: AtomicBool::new(false),
        }
    }

    /// Dial every default writer in order and register the ones that answer
    ///
    /// A failed or timed-out dial is logged and skipped. Returns the number
    /// of writers registered.
    pub async fn connect_default_writers(&self) -> usize {
        let mut connected = 0;

        for addr in &self.default_writers {
            tracing::debug!(addr = %addr, "Dialing default writer");

            match self.dial(addr).await {
                Ok(stream) => {
                    self.register(stream, WriterOrigin::Dialed).await;
                    connected += 1;
                }
                Err(e) => {
                    self.stats.dial_failed();
                    tracing::error!(addr = %addr, error = %e, "Failed to connect default writer");
                }
            }
        }

        tracing::info!(
            connected = connected,
            configured = self.default_writers.len(),
            "Default writers resolved"
        );

        connected
    }

    /// Open a connection to one writer address
    pub async fn dial(&self, addr: &str) -> Result<TcpStream> {
        match tokio::time::timeout(self.dial_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(Error::Dial {
                addr: addr.to_string(),
                source,
            }),
            Err(_) => Err(Error::DialTimeout {
                addr: addr.to_string(),
                timeout: self.dial_timeout,
            }),
        }
    }

    /// Register subscribers connecting to the writer port until cancelled
    pub async fn accept_writers(&self, listener: TcpListener, cancel: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((socket, _peer)) => {
                    self.register(socket, WriterOrigin::Accepted).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept writer connection");
                }
            }
        }

        tracing::debug!("Writer accept loop stopped");
    }

    /// Drain the transfer queue, broadcasting each chunk, until cancelled
    ///
    /// Only one dispatch loop may run per dispatcher: a second call returns
    /// immediately. Chunks dequeued while no writer is registered are
    /// discarded.
    pub async fn dispatch(&self, cancel: CancellationToken) {
        if self.dispatching.swap(true, Ordering::AcqRel) {
            tracing::warn!("Dispatch loop already running");
            return;
        }
        let _running = DispatchGuard(&self.dispatching);

        tracing::debug!("Dispatch loop started");

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => break,
                chunk = self.queue.dequeue() => chunk,
            };

            let report = tokio::select! {
                _ = cancel.cancelled() => break,
                report = self.registry.broadcast(&chunk) => report,
            };

            self.stats.record_broadcast(&report);

            if report.attempted() == 0 {
                tracing::trace!(
                    reader_id = chunk.reader_id,
                    len = chunk.len(),
                    "No writers registered, chunk discarded"
                );
            }
        }

        tracing::debug!("Dispatch loop stopped");
    }

    /// Whether a dispatch loop is currently running
    pub fn is_dispatching(&self) -> bool {
        self.dispatching.load(Ordering::Acquire)
    }

    async fn register(&self, socket: TcpStream, origin: WriterOrigin) -> u64 {
        if self.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::warn!(error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let peer = socket.peer_addr().ok();
        let id = self.registry.add(socket, peer, origin).await;
        self.stats.writer_registered();
        id
    }
}

/// Clears the dispatching flag however the loop ends, including when the
/// dispatch future is dropped mid-await
struct DispatchGuard<'a>(&'a AtomicBool);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
