//! Transfer queue between the read side and the write side
//!
//! Producers (one task per reader connection) push without waiting; the
//! dispatch loop is the single consumer and suspends until a chunk arrives.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use super::chunk::Chunk;
use crate::error::{Error, Result};

/// FIFO of chunks shared by all readers and the dispatcher
///
/// The deque is guarded by a std mutex that is never held across an await;
/// `Notify` stores a permit when nobody is waiting, so a push that races
/// with the consumer going to sleep is never lost.
pub struct TransferQueue {
    items: Mutex<VecDeque<Chunk>>,
    available: Notify,
    /// Maximum queued chunks (0 = unbounded)
    capacity: usize,
}

impl TransferQueue {
    /// Create an unbounded queue
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a queue that holds at most `capacity` chunks (0 = unbounded)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            capacity,
        }
    }

    /// Configured capacity (0 = unbounded)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a chunk to the tail
    ///
    /// Never waits. Fails only when a capacity is configured and reached, in
    /// which case the chunk is dropped.
    pub fn enqueue(&self, chunk: Chunk) -> Result<()> {
        {
            let mut items = self.lock();
            if self.capacity > 0 && items.len() >= self.capacity {
                return Err(Error::QueueFull {
                    capacity: self.capacity,
                });
            }
            items.push_back(chunk);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Remove and return the head, waiting until one is available
    ///
    /// Cancel-safe: if the returned future is dropped before it completes,
    /// no chunk is lost.
    pub async fn dequeue(&self) -> Chunk {
        loop {
            if let Some(chunk) = self.try_dequeue() {
                return chunk;
            }
            self.available.notified().await;
        }
    }

    /// Remove and return the head if there is one
    pub fn try_dequeue(&self) -> Option<Chunk> {
        self.lock().pop_front()
    }

    /// Number of queued chunks
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Chunk>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for TransferQueue {
    fn default() -> Self {
        Self::new()
    }
}
