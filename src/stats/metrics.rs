//! Statistics for the relay

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::registry::BroadcastReport;

/// Live relay counters
///
/// Updated from many tasks at once, so every field is an atomic. Use
/// [`RelayStats::snapshot`] to read a consistent-enough copy.
#[derive(Debug)]
pub struct RelayStats {
    started_at: Instant,
    reader_connections: AtomicU64,
    writer_connections: AtomicU64,
    dial_failures: AtomicU64,
    chunks_enqueued: AtomicU64,
    bytes_enqueued: AtomicU64,
    chunks_rejected: AtomicU64,
    chunks_broadcast: AtomicU64,
    chunks_discarded: AtomicU64,
    writers_pruned: AtomicU64,
    partial_writes: AtomicU64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            reader_connections: AtomicU64::new(0),
            writer_connections: AtomicU64::new(0),
            dial_failures: AtomicU64::new(0),
            chunks_enqueued: AtomicU64::new(0),
            bytes_enqueued: AtomicU64::new(0),
            chunks_rejected: AtomicU64::new(0),
            chunks_broadcast: AtomicU64::new(0),
            chunks_discarded: AtomicU64::new(0),
            writers_pruned: AtomicU64::new(0),
            partial_writes: AtomicU64::new(0),
        }
    }

    pub fn reader_accepted(&self) {
        self.reader_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn writer_registered(&self) {
        self.writer_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dial_failed(&self) {
        self.dial_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunk_enqueued(&self, len: usize) {
        self.chunks_enqueued.fetch_add(1, Ordering::Relaxed);
        self.bytes_enqueued.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn chunk_rejected(&self) {
        self.chunks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one broadcast
    ///
    /// A broadcast that found no connection at all counts as discarded.
    pub fn record_broadcast(&self, report: &BroadcastReport) {
        if report.attempted() == 0 {
            self.chunks_discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.chunks_broadcast.fetch_add(1, Ordering::Relaxed);
        self.writers_pruned
            .fetch_add(report.pruned as u64, Ordering::Relaxed);
        self.partial_writes
            .fetch_add(report.partial as u64, Ordering::Relaxed);
    }

    /// Copy the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime: self.started_at.elapsed(),
            reader_connections: self.reader_connections.load(Ordering::Relaxed),
            writer_connections: self.writer_connections.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            chunks_enqueued: self.chunks_enqueued.load(Ordering::Relaxed),
            bytes_enqueued: self.bytes_enqueued.load(Ordering::Relaxed),
            chunks_rejected: self.chunks_rejected.load(Ordering::Relaxed),
            chunks_broadcast: self.chunks_broadcast.load(Ordering::Relaxed),
            chunks_discarded: self.chunks_discarded.load(Ordering::Relaxed),
            writers_pruned: self.writers_pruned.load(Ordering::Relaxed),
            partial_writes: self.partial_writes.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Time since the stats were created
    pub uptime: Duration,
    /// Reader connections accepted
    pub reader_connections: u64,
    /// Writer connections registered (dialed + accepted)
    pub writer_connections: u64,
    /// Default writer dials that failed or timed out
    pub dial_failures: u64,
    /// Chunks pushed onto the transfer queue
    pub chunks_enqueued: u64,
    /// Payload bytes pushed onto the transfer queue
    pub bytes_enqueued: u64,
    /// Chunks refused by a full queue
    pub chunks_rejected: u64,
    /// Chunks offered to at least one writer
    pub chunks_broadcast: u64,
    /// Chunks dequeued while no writer was registered
    pub chunks_discarded: u64,
    /// Writer connections removed after a failed write
    pub writers_pruned: u64,
    /// Writes that failed midway
    pub partial_writes: u64,
}

impl StatsSnapshot {
    /// Average ingest rate in bits per second
    pub fn ingest_bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.bytes_enqueued * 8) / secs
        } else {
            0
        }
    }
}
