//! Outbound message seam and address resolution

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use oscsync_core::{SyncError, SyncResult};
use oscsync_wire::SyncMessage;

/// Anything that can deliver a protocol message to an address
///
/// A failed send only reports that one delivery; implementations must not
/// close or poison themselves on error.
pub trait MessageSender: Send + Sync {
    fn send(
        &self,
        dest: SocketAddr,
        msg: &SyncMessage,
    ) -> impl Future<Output = SyncResult<()>> + Send;
}

impl<S: MessageSender> MessageSender for Arc<S> {
    fn send(
        &self,
        dest: SocketAddr,
        msg: &SyncMessage,
    ) -> impl Future<Output = SyncResult<()>> + Send {
        (**self).send(dest, msg)
    }
}

/// Resolve host:port to a socket address, preferring IPv4
pub async fn resolve(host: &str, port: u16) -> SyncResult<SocketAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| SyncError::TransportError(format!("resolving {}:{}: {}", host, port, e)))?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| SyncError::ResolveFailed {
            host: host.to_owned(),
            port,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_literal() {
        let addr = resolve("127.0.0.1", 5776).await.unwrap();
        assert_eq!(addr, "127.0.0.1:5776".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_resolve_garbage_fails() {
        assert!(resolve("not a host name", 5776).await.is_err());
    }
}
