//! Per-chunk transform
//!
//! The transform runs once on every chunk read from a reader connection,
//! before the chunk is queued. Its output is what writers receive.

use bytes::Bytes;

/// Maps one chunk to another
///
/// Implementations must be stateless with respect to chunk boundaries: a
/// chunk is one OS read, not a message, so a sender's logical unit may be
/// split across calls.
///
/// Any `Fn(Bytes) -> Bytes + Send + Sync` closure is a transform.
///
/// # Example
/// ```
/// use bytes::Bytes;
/// use splitter::transform::Transform;
///
/// let upper = |chunk: Bytes| Bytes::from(chunk.to_ascii_uppercase());
/// assert_eq!(upper.apply(Bytes::from_static(b"abc")), Bytes::from_static(b"ABC"));
/// ```
pub trait Transform: Send + Sync + 'static {
    fn apply(&self, chunk: Bytes) -> Bytes;
}

/// Passes chunks through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Transform for Identity {
    fn apply(&self, chunk: Bytes) -> Bytes {
        chunk
    }
}

impl<F> Transform for F
where
    F: Fn(Bytes) -> Bytes + Send + Sync + 'static,
{
    fn apply(&self, chunk: Bytes) -> Bytes {
        self(chunk)
    }
}
