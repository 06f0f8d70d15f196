//! UDP transport implementation

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use oscsync_core::{SyncError, SyncResult};
use oscsync_wire::{SyncMessage, MAX_PACKET_SIZE};

use crate::MessageSender;

/// UDP transport for oscsync
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to a local address
    pub async fn bind(addr: SocketAddr) -> SyncResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| SyncError::TransportError(e.to_string()))?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| SyncError::TransportError(e.to_string()))?;

        Ok(UdpTransport {
            socket: Arc::new(socket),
            local_addr,
        })
    }

    /// Get local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send a message to a destination
    pub async fn send_to(&self, msg: &SyncMessage, dest: SocketAddr) -> SyncResult<()> {
        let bytes = msg.encode()?;
        self.socket
            .send_to(&bytes, dest)
            .await
            .map_err(|e| SyncError::TransportError(format!("sending to {}: {}", dest, e)))?;
        Ok(())
    }

    /// Get a clone of the socket for concurrent operations
    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }
}

impl MessageSender for UdpTransport {
    async fn send(&self, dest: SocketAddr, msg: &SyncMessage) -> SyncResult<()> {
        self.send_to(msg, dest).await
    }
}

/// Packet receiver channel
pub type PacketReceiver = mpsc::Receiver<(Vec<u8>, SocketAddr)>;

/// Packet sender channel
pub type PacketSender = mpsc::Sender<(Vec<u8>, SocketAddr)>;

/// Start a background receive loop
///
/// The loop ends when the receiver is dropped. Socket errors are logged and
/// do not end the loop; on some platforms an ICMP port-unreachable from a
/// departed slave surfaces here as a receive error.
pub fn start_receive_loop(socket: Arc<UdpSocket>, buffer_size: usize) -> PacketReceiver {
    let (tx, rx) = mpsc::channel(buffer_size);

    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                res = socket.recv_from(&mut buf) => match res {
                    Ok((len, addr)) => {
                        let packet = buf[..len].to_vec();
                        if tx.send((packet, addr)).await.is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "UDP receive error");
                    }
                },
            }
        }
    });

    rx
}
