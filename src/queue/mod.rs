//! Transfer queue decoupling readers from writers
//!
//! ```text
//!   [reader task] ──┐
//!   [reader task] ──┼──► TransferQueue ──► dispatch loop ──► ConnectionRegistry::broadcast
//!   [reader task] ──┘
//! ```

pub mod chunk;
pub mod transfer;

pub use chunk::Chunk;
pub use transfer::TransferQueue;
