//! Client configuration

use std::net::SocketAddr;
use std::time::Duration;

use oscsync_core::MASTER_PORT;

/// Sync client configuration
#[derive(Clone, Debug)]
pub struct SyncClientConfig {
    /// Master host name or address
    pub master_host: String,
    /// Master UDP port
    pub master_port: u16,
    /// Host the master should send pulses to
    pub announce_host: String,
    /// Local address to receive pulses on
    pub bind_addr: SocketAddr,
    /// How long to wait for the master's first pulse
    pub first_pulse_timeout: Duration,
    /// Capacity of the raw datagram buffer
    pub packet_buffer: usize,
}

impl Default for SyncClientConfig {
    fn default() -> Self {
        SyncClientConfig {
            master_host: "127.0.0.1".to_owned(),
            master_port: MASTER_PORT,
            announce_host: "127.0.0.1".to_owned(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            first_pulse_timeout: Duration::from_secs(1),
            packet_buffer: 16,
        }
    }
}

impl SyncClientConfig {
    pub fn with_master(mut self, host: impl Into<String>, port: u16) -> Self {
        self.master_host = host.into();
        self.master_port = port;
        self
    }

    pub fn with_announce_host(mut self, host: impl Into<String>) -> Self {
        self.announce_host = host.into();
        self
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_first_pulse_timeout(mut self, timeout: Duration) -> Self {
        self.first_pulse_timeout = timeout;
        self
    }
}
