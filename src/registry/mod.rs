//! Registry of live writer connections
//!
//! Every chunk drained from the transfer queue is written to each registered
//! connection. Dead connections are pruned by the broadcast that finds them.
//!
//! # Architecture
//!
//! ```text
//!                     Arc<ConnectionRegistry>
//!                  ┌───────────────────────────┐
//!                  │ connections: Mutex<Vec<   │
//!                  │   WriterConnection {      │
//!                  │     id, peer, origin,     │
//!                  │     sink: Box<dyn ..>,    │
//!                  │   }                       │
//!                  │ >                         │
//!                  └─────────────┬─────────────┘
//!                                │ broadcast(chunk)
//!         ┌──────────────────────┼──────────────────────┐
//!         ▼                      ▼                      ▼
//!   [dialed writer]       [subscriber]            [subscriber]
//! ```
//!
//! # Pruning
//!
//! A write that moves zero bytes marks the connection dead. Dead indices are
//! collected during the pass and removed afterwards, so no live entry is
//! skipped or visited twice.

pub mod entry;
pub mod store;

pub use entry::{WriteOutcome, WriterConnection, WriterOrigin, WriterSink};
pub use store::{BroadcastReport, ConnectionRegistry};
