//! Connection registry implementation
//!
//! The central set of live writer connections. Every chunk leaving the
//! transfer queue is broadcast to all of them under a single lock.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use super::entry::{WriteOutcome, WriterConnection, WriterOrigin, WriterSink};
use crate::queue::Chunk;

/// Summary of one broadcast call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections that received the whole chunk
    pub delivered: usize,
    /// Connections that failed midway and were kept
    pub partial: usize,
    /// Connections found dead and removed
    pub pruned: usize,
}

impl BroadcastReport {
    /// Number of connections the chunk was offered to
    pub fn attempted(&self) -> usize {
        self.delivered + self.partial + self.pruned
    }
}

/// Registry of live writer connections
///
/// `add` and `broadcast` both take the same async mutex, so a connection is
/// never added while a broadcast is iterating. The lock is held across the
/// writes of one broadcast: every connection sees chunks in the same order.
pub struct ConnectionRegistry {
    connections: Mutex<Vec<WriterConnection>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a connection; returns its id
    ///
    /// The registry takes ownership of the sink, so the same socket can
    /// never be registered twice.
    pub async fn add<S>(&self, sink: S, peer: Option<SocketAddr>, origin: WriterOrigin) -> u64
    where
        S: WriterSink + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let connection = WriterConnection::new(id, Box::new(sink), peer, origin);

        let mut connections = self.connections.lock().await;
        connections.push(connection);

        tracing::info!(
            conn_id = id,
            peer = ?peer,
            origin = %origin,
            writers = connections.len(),
            "Writer connection registered"
        );

        id
    }

    /// Write a chunk to every registered connection, in registration order
    ///
    /// Connections whose write reports zero bytes are closed and removed
    /// after the loop. A write that fails after some bytes went out is only
    /// logged. With no connections registered the chunk is simply dropped.
    pub async fn broadcast(&self, chunk: &Chunk) -> BroadcastReport {
        let mut connections = self.connections.lock().await;
        let mut report = BroadcastReport::default();
        let mut dead = Vec::new();

        for (index, connection) in connections.iter_mut().enumerate() {
            match connection.write_chunk(&chunk.data).await {
                WriteOutcome::Delivered => report.delivered += 1,
                WriteOutcome::Partial { written, error } => {
                    report.partial += 1;
                    tracing::warn!(
                        conn_id = connection.id,
                        written = written,
                        len = chunk.len(),
                        error = %error,
                        "Partial write to writer connection"
                    );
                }
                WriteOutcome::Dead(error) => {
                    tracing::debug!(
                        conn_id = connection.id,
                        error = %error,
                        "Writer connection failed"
                    );
                    dead.push(index);
                }
            }
        }

        // Highest index first so earlier indices stay valid.
        for index in dead.into_iter().rev() {
            let connection = connections.remove(index);
            report.pruned += 1;

            tracing::info!(
                conn_id = connection.id,
                peer = ?connection.peer,
                origin = %connection.origin,
                bytes_sent = connection.bytes_sent,
                "Writer connection removed"
            );
        }

        report
    }

    /// Number of registered connections
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    /// Ids of registered connections, in registration order
    pub async fn connection_ids(&self) -> Vec<u64> {
        self.connections.lock().await.iter().map(|c| c.id).collect()
    }

    /// Close and remove every connection
    pub async fn clear(&self) -> usize {
        let mut connections = self.connections.lock().await;
        let count = connections.len();
        connections.clear();
        count
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
