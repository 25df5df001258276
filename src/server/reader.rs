//! Read side of the relay
//!
//! Accepts reader connections and turns every read into a queued chunk.
//! Each connection runs in its own task; the transfer queue is the only
//! state they share.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::queue::{Chunk, TransferQueue};
use crate::server::config::RelayConfig;
use crate::stats::RelayStats;
use crate::transform::Transform;

/// Why a reader loop ended
#[derive(Debug)]
pub enum ReaderExit {
    /// Peer closed its side of the stream
    EndOfStream,
    /// Read failed; the connection is not retried
    Failed(io::Error),
    /// Relay is shutting down
    Cancelled,
}

/// Accepts reader connections and feeds the transfer queue
pub struct ReadIngestor {
    queue: Arc<TransferQueue>,
    transform: Arc<dyn Transform>,
    stats: Arc<RelayStats>,
    read_buffer_size: usize,
    tcp_nodelay: bool,
    next_reader_id: AtomicU64,
}

impl ReadIngestor {
    pub fn new(
        config: &RelayConfig,
        queue: Arc<TransferQueue>,
        transform: Arc<dyn Transform>,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            queue,
            transform,
            stats,
            read_buffer_size: config.read_buffer_size.max(1),
            tcp_nodelay: config.tcp_nodelay,
            next_reader_id: AtomicU64::new(1),
        }
    }

    /// Accept reader connections until cancelled
    ///
    /// Accept errors are logged and the loop keeps going.
    pub async fn run(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((socket, peer)) => self.spawn_reader(socket, peer, &cancel),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept reader connection");
                }
            }
        }

        tracing::debug!("Reader accept loop stopped");
    }

    fn spawn_reader(
        self: &Arc<Self>,
        socket: TcpStream,
        peer: SocketAddr,
        cancel: &CancellationToken,
    ) {
        let reader_id = self.next_reader_id.fetch_add(1, Ordering::Relaxed);
        self.stats.reader_accepted();

        if self.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::warn!(reader_id = reader_id, error = %e, "Failed to set TCP_NODELAY");
            }
        }

        tracing::info!(reader_id = reader_id, peer = %peer, "Reader connected");

        let ingestor = Arc::clone(self);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let exit = ingestor.handle_reader(reader_id, socket, &cancel).await;
            tracing::debug!(reader_id = reader_id, exit = ?exit, "Reader connection closed");
        });
    }

    /// Read chunks from one connection until it ends
    ///
    /// The reader is dropped (closing the socket) when this returns.
    pub async fn handle_reader<R>(
        &self,
        reader_id: u64,
        mut reader: R,
        cancel: &CancellationToken,
    ) -> ReaderExit
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; self.read_buffer_size];

        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => return ReaderExit::Cancelled,
                read = reader.read(&mut buf) => read,
            };

            match read {
                Ok(0) => {
                    tracing::info!(reader_id = reader_id, "End of transmission");
                    return ReaderExit::EndOfStream;
                }
                Ok(n) => self.ingest(reader_id, Bytes::copy_from_slice(&buf[..n])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!(reader_id = reader_id, error = %e, "Reader connection failed");
                    return ReaderExit::Failed(e);
                }
            }
        }
    }

    /// Transform one read and push it onto the queue
    fn ingest(&self, reader_id: u64, data: Bytes) {
        let data = self.transform.apply(data);
        if data.is_empty() {
            tracing::trace!(reader_id = reader_id, "Transform produced an empty chunk");
            return;
        }

        tracing::debug!(
            reader_id = reader_id,
            len = data.len(),
            content = %String::from_utf8_lossy(&data),
            "Chunk read"
        );

        let len = data.len();
        match self.queue.enqueue(Chunk::new(reader_id, data)) {
            Ok(()) => self.stats.chunk_enqueued(len),
            Err(e) => {
                self.stats.chunk_rejected();
                tracing::warn!(reader_id = reader_id, error = %e, "Dropping chunk");
            }
        }
    }
}
