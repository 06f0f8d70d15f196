//! Master configuration

use oscsync_core::{Tempo, MASTER_PORT};

/// Master configuration
#[derive(Clone, Debug)]
pub struct MasterConfig {
    /// Host or address to listen on
    pub listen_host: String,
    /// UDP port to listen on
    pub port: u16,
    /// Starting tempo
    pub tempo: Tempo,
    /// Capacity of the control event queue between dispatch and the clock loop
    pub queue_capacity: usize,
    /// Capacity of the raw datagram buffer
    pub packet_buffer: usize,
}

impl Default for MasterConfig {
    fn default() -> Self {
        MasterConfig {
            listen_host: "0.0.0.0".to_owned(),
            port: MASTER_PORT,
            tempo: Tempo::DEFAULT,
            queue_capacity: 8,
            packet_buffer: 64,
        }
    }
}

impl MasterConfig {
    pub fn with_listen_host(mut self, host: impl Into<String>) -> Self {
        self.listen_host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_tempo(mut self, tempo: Tempo) -> Self {
        self.tempo = tempo;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}
