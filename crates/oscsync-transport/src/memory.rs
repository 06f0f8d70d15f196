//! In-memory datagram network
//!
//! Messages are encoded to bytes exactly as on UDP and delivered into the
//! receiving endpoint's packet channel. A full channel drops the datagram,
//! an unbound destination is a send error.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use oscsync_core::{SyncError, SyncResult};
use oscsync_wire::SyncMessage;

use crate::{MessageSender, PacketReceiver, PacketSender};

/// Shared routing table of bound in-memory endpoints
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    routes: Arc<RwLock<HashMap<SocketAddr, PacketSender>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        MemoryNetwork::default()
    }

    /// Bind an endpoint; rebinding an address replaces the previous endpoint
    pub fn bind(&self, addr: SocketAddr, buffer_size: usize) -> (MemoryTransport, PacketReceiver) {
        let (tx, rx) = mpsc::channel(buffer_size);
        self.routes.write().insert(addr, tx);
        (
            MemoryTransport {
                local_addr: addr,
                network: self.clone(),
            },
            rx,
        )
    }

    /// Remove an endpoint; later sends to it fail
    pub fn unbind(&self, addr: SocketAddr) {
        self.routes.write().remove(&addr);
    }

    /// Deliver raw bytes as if they arrived from `from`
    pub fn deliver(&self, from: SocketAddr, dest: SocketAddr, bytes: Vec<u8>) -> SyncResult<()> {
        let route = self
            .routes
            .read()
            .get(&dest)
            .cloned()
            .ok_or_else(|| SyncError::TransportError(format!("{} unreachable", dest)))?;

        match route.try_send((bytes, from)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(%dest, "memory endpoint full, datagram dropped");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(SyncError::TransportError(format!("{} closed", dest)))
            }
        }
    }
}

/// Sending half of an in-memory endpoint
#[derive(Clone)]
pub struct MemoryTransport {
    local_addr: SocketAddr,
    network: MemoryNetwork,
}

impl MemoryTransport {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl MessageSender for MemoryTransport {
    async fn send(&self, dest: SocketAddr, msg: &SyncMessage) -> SyncResult<()> {
        let bytes = msg.encode()?;
        self.network.deliver(self.local_addr, dest, bytes.to_vec())
    }
}
