//! Relay configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Read buffer size, and so the largest possible chunk
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Relay configuration options
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address both listeners bind on
    pub bind_host: IpAddr,

    /// Port accepting reader connections (0 = ephemeral)
    pub listener_port: u16,

    /// Port accepting subscriber connections (0 = ephemeral)
    pub writer_port: u16,

    /// `host:port` addresses dialed at startup
    pub default_writers: Vec<String>,

    /// Bytes requested per read; upper bound of a chunk
    pub read_buffer_size: usize,

    /// Maximum queued chunks (0 = unlimited)
    pub queue_capacity: usize,

    /// Enable TCP_NODELAY on every relay socket
    pub tcp_nodelay: bool,

    /// Upper bound on each default writer dial
    pub dial_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listener_port: 7000,
            writer_port: 7001,
            default_writers: Vec::new(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            queue_capacity: 0, // Unlimited
            tcp_nodelay: true,
            dial_timeout: Duration::from_secs(10),
        }
    }
}

impl RelayConfig {
    /// Create a config with the given reader and writer ports
    pub fn with_ports(listener_port: u16, writer_port: u16) -> Self {
        Self {
            listener_port,
            writer_port,
            ..Default::default()
        }
    }

    /// Set the bind host
    pub fn bind_host(mut self, host: IpAddr) -> Self {
        self.bind_host = host;
        self
    }

    /// Set the reader port
    pub fn listener_port(mut self, port: u16) -> Self {
        self.listener_port = port;
        self
    }

    /// Set the writer port
    pub fn writer_port(mut self, port: u16) -> Self {
        self.writer_port = port;
        self
    }

    /// Set the addresses dialed at startup
    pub fn default_writers<I, S>(mut self, writers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_writers = writers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the read buffer size (at least one byte)
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Cap the transfer queue
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    /// Set the dial timeout for default writers
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Address the reader listener binds to
    pub fn reader_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.listener_port)
    }

    /// Address the writer listener binds to
    pub fn writer_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.writer_port)
    }
}

/// Split a comma-delimited writer list into `host:port` entries
///
/// Whitespace around entries is trimmed and empty entries are skipped, so
/// `""` yields no writers.
pub fn parse_writer_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
