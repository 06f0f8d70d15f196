//! Slave endpoint identity

use std::fmt;
use std::net::SocketAddr;

use crate::{SyncError, SyncResult};

/// Address a slave listens on for pulse messages
///
/// Two endpoints are the same slave iff their resolved host and port match,
/// which is what gives registry add/remove their set semantics.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlaveEndpoint(pub SocketAddr);

impl SlaveEndpoint {
    #[inline]
    pub fn new(addr: SocketAddr) -> Self {
        SlaveEndpoint(addr)
    }

    #[inline]
    pub fn addr(self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for SlaveEndpoint {
    fn from(addr: SocketAddr) -> Self {
        SlaveEndpoint(addr)
    }
}

impl fmt::Debug for SlaveEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slave({})", self.0)
    }
}

impl fmt::Display for SlaveEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Convert an int32 wire port into a UDP port
pub fn port_from_wire(raw: i32) -> SyncResult<u16> {
    u16::try_from(raw)
        .ok()
        .filter(|p| *p != 0)
        .ok_or(SyncError::InvalidPort(raw))
}
