//! Relay server
//!
//! - [`listener`]: binds both ports and runs everything until shutdown.
//! - [`reader`]: read side, one task per reader connection.
//! - [`dispatcher`]: write side, default writer dials, subscriber accept
//!   loop and the single dispatch loop.
//! - [`config`]: relay configuration.

pub mod config;
pub mod dispatcher;
pub mod listener;
pub mod reader;

pub use config::{parse_writer_list, RelayConfig, DEFAULT_READ_BUFFER_SIZE};
pub use dispatcher::WriteDispatcher;
pub use listener::RelayServer;
pub use reader::{ReadIngestor, ReaderExit};
