//! Error types
//!
//! Only bind failures ever reach the caller of [`RelayServer`](crate::RelayServer).
//! Every other variant is produced and handled inside the relay: it is logged
//! and the affected connection (or chunk) is dropped.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Which listener an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerRole {
    /// Inbound byte sources
    Reader,
    /// Inbound subscribers that receive the broadcast
    Writer,
}

impl fmt::Display for ListenerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerRole::Reader => write!(f, "reader"),
            ListenerRole::Writer => write!(f, "writer"),
        }
    }
}

/// Relay error
#[derive(Debug)]
pub enum Error {
    /// A listener could not be bound; fatal for the relay
    Bind {
        role: ListenerRole,
        addr: SocketAddr,
        source: io::Error,
    },
    /// A default writer address refused or failed the connection
    Dial { addr: String, source: io::Error },
    /// A default writer did not answer within the dial timeout
    DialTimeout { addr: String, timeout: Duration },
    /// The transfer queue is capped and full
    QueueFull { capacity: usize },
}

impl Error {
    /// Whether the error terminates the whole relay rather than one connection
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Bind { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bind { role, addr, source } => {
                write!(f, "failed to bind {} listener on {}: {}", role, addr, source)
            }
            Error::Dial { addr, source } => {
                write!(f, "failed to dial writer {}: {}", addr, source)
            }
            Error::DialTimeout { addr, timeout } => {
                write!(f, "dialing writer {} timed out after {:?}", addr, timeout)
            }
            Error::QueueFull { capacity } => {
                write!(f, "transfer queue full ({} chunks)", capacity)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Bind { source, .. } | Error::Dial { source, .. } => Some(source),
            Error::DialTimeout { .. } | Error::QueueFull { .. } => None,
        }
    }
}
