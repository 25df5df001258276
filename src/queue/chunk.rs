//! Chunk type
//!
//! A chunk is one OS-level read from a reader connection. It carries no
//! message boundary; it is exactly what a single `read` returned, after the
//! transform ran over it.

use bytes::Bytes;

/// One relayed byte fragment
///
/// Cheap to clone: `Bytes` is reference counted, so every writer shares the
/// same allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Id of the reader connection that produced the bytes
    pub reader_id: u64,
    /// Payload
    pub data: Bytes,
}

impl Chunk {
    /// Create a new chunk
    pub fn new(reader_id: u64, data: Bytes) -> Self {
        Self { reader_id, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
