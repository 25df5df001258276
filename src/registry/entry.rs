//! Writer connection entries
//!
//! This module defines the per-connection state stored in the registry and
//! the classification of a single write attempt.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Any byte sink a chunk can be written to
///
/// `TcpStream` in production; in-memory mocks in tests.
pub trait WriterSink: AsyncWrite + Send + Unpin {}

impl<T: AsyncWrite + Send + Unpin> WriterSink for T {}

/// How a writer connection came to be registered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterOrigin {
    /// Dialed by the relay from the default writer list
    Dialed,
    /// Subscriber that connected to the writer port
    Accepted,
}

impl fmt::Display for WriterOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriterOrigin::Dialed => write!(f, "dialed"),
            WriterOrigin::Accepted => write!(f, "accepted"),
        }
    }
}

/// Result of writing one chunk to one connection
#[derive(Debug)]
pub enum WriteOutcome {
    /// Every byte was handed to the socket
    Delivered,
    /// Some bytes went out before the error; the connection is kept
    Partial { written: usize, error: io::Error },
    /// Nothing could be written; the connection is pruned
    Dead(io::Error),
}

/// A live outbound connection owned by the registry
///
/// Dropping the entry closes the underlying socket.
pub struct WriterConnection {
    /// Registry-assigned id, unique for the lifetime of the registry
    pub id: u64,
    /// Remote address, when the socket could report it
    pub peer: Option<SocketAddr>,
    /// Dialed or accepted
    pub origin: WriterOrigin,
    /// Bytes successfully written so far
    pub bytes_sent: u64,
    sink: Box<dyn WriterSink>,
}

impl WriterConnection {
    pub(super) fn new(
        id: u64,
        sink: Box<dyn WriterSink>,
        peer: Option<SocketAddr>,
        origin: WriterOrigin,
    ) -> Self {
        Self {
            id,
            peer,
            origin,
            bytes_sent: 0,
            sink,
        }
    }

    /// Write a whole chunk, classifying the result
    ///
    /// A failure before the first byte (an error or `Ok(0)`) means the peer
    /// is gone. A failure after some bytes went out is reported as partial.
    pub(super) async fn write_chunk(&mut self, data: &[u8]) -> WriteOutcome {
        let mut written = 0;

        while written < data.len() {
            match self.sink.write(&data[written..]).await {
                Ok(0) => {
                    let error = io::Error::from(io::ErrorKind::WriteZero);
                    return self.fail(written, error);
                }
                Ok(n) => {
                    written += n;
                    self.bytes_sent += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return self.fail(written, e),
            }
        }

        if let Err(error) = self.sink.flush().await {
            return self.fail(written, error);
        }

        WriteOutcome::Delivered
    }

    fn fail(&self, written: usize, error: io::Error) -> WriteOutcome {
        if written == 0 {
            WriteOutcome::Dead(error)
        } else {
            WriteOutcome::Partial { written, error }
        }
    }
}

impl fmt::Debug for WriterConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterConnection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("origin", &self.origin)
            .field("bytes_sent", &self.bytes_sent)
            .finish_non_exhaustive()
    }
}
