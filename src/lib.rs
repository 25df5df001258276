//! TCP fan-out relay
//!
//! Reads raw byte streams from any number of reader connections, optionally
//! transforms each chunk, and writes every chunk to all registered writer
//! connections. Writers are either dialed at startup (the configured default
//! writers) or subscribers that connect to the writer port.
//!
//! ```text
//!   readers ──► ReadIngestor ──► TransferQueue ──► WriteDispatcher ──► ConnectionRegistry ──► writers
//! ```
//!
//! The wire format is raw bytes: no framing, no acknowledgement. A chunk
//! dequeued while no writer is registered is dropped.

pub mod error;
pub mod queue;
pub mod registry;
pub mod server;
pub mod stats;
pub mod transform;

pub use error::{Error, Result};
pub use server::{RelayConfig, RelayServer};
pub use transform::{Identity, Transform};

/// Crate version, logged at startup
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
