//! Client configuration.

use std::time::Duration;

use thrift_wire::ProtocolConfig;

/// Configuration for a [`Connection`](crate::Connection).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for a whole call (send and receive). `None` waits forever.
    pub timeout: Option<Duration>,
    /// Deadline for establishing a TCP connection in [`connect`](crate::connect).
    pub connect_timeout: Option<Duration>,
    /// Initial capacity of the outgoing message buffer.
    pub buffer_size: usize,
    /// Binary protocol options.
    pub protocol: ProtocolConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: Some(Duration::from_secs(10)),
            buffer_size: 4 * 1024,
            protocol: ProtocolConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Sets the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disables the per-call timeout.
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the outgoing buffer capacity.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Sets the binary protocol options.
    pub fn with_protocol(mut self, protocol: ProtocolConfig) -> Self {
        self.protocol = protocol;
        self
    }
}
