//! One-shot control requests against a master

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::time;
use tracing::debug;

use oscsync_core::{port_from_wire, SyncError, SyncResult, Tempo};
use oscsync_transport::{start_receive_loop, MessageSender, PacketReceiver, UdpTransport};
use oscsync_wire::{
    slaves_from_reply, tempo_from_reply, OscArg, SyncMessage, ADDRESS_SLAVE_LIST, ADDRESS_TEMPO,
};

/// Default wait for a master's reply
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Control connection to one master
pub struct ControlClient<S> {
    sender: S,
    replies: PacketReceiver,
    master: SocketAddr,
    timeout: Duration,
}

impl ControlClient<UdpTransport> {
    /// Bind an ephemeral socket of the master's address family
    pub async fn bind(master: SocketAddr) -> SyncResult<Self> {
        let local = match master.ip() {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let transport = UdpTransport::bind(local).await?;
        let replies = start_receive_loop(transport.socket(), 8);
        Ok(ControlClient::with_transport(transport, replies, master))
    }
}

impl<S: MessageSender> ControlClient<S> {
    pub fn with_transport(sender: S, replies: PacketReceiver, master: SocketAddr) -> Self {
        ControlClient {
            sender,
            replies,
            master,
            timeout: REPLY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ask the master for its current tempo
    pub async fn query_tempo(&mut self) -> SyncResult<Tempo> {
        let args = self.request(SyncMessage::TempoQuery, ADDRESS_TEMPO).await?;
        tempo_from_reply(&args)
    }

    /// Ask the master to change tempo; the master does not acknowledge
    pub async fn set_tempo(&self, bpm: f32) -> SyncResult<()> {
        let tempo = Tempo::new(bpm)?;
        self.sender
            .send(self.master, &SyncMessage::TempoSet(tempo.bpm()))
            .await
    }

    /// Ask the master for its registered slaves
    pub async fn list_slaves(&mut self) -> SyncResult<Vec<SocketAddr>> {
        let args = self.request(SyncMessage::SlaveList, ADDRESS_SLAVE_LIST).await?;
        slaves_from_reply(&args)?
            .into_iter()
            .map(|(host, port)| {
                let ip = host.parse::<IpAddr>().map_err(|_| {
                    SyncError::InvalidWireFormat(format!("Slave host {:?} is not an address", host))
                })?;
                Ok(SocketAddr::new(ip, port_from_wire(port)?))
            })
            .collect()
    }

    /// Send `msg` and wait for the reply to `address`, skipping anything else
    async fn request(
        &mut self,
        msg: SyncMessage,
        address: &'static str,
    ) -> SyncResult<Vec<OscArg>> {
        self.sender.send(self.master, &msg).await?;

        let replies = &mut self.replies;
        let wait = async {
            loop {
                let (bytes, from) = replies
                    .recv()
                    .await
                    .ok_or(SyncError::ChannelClosed("replies"))?;
                match SyncMessage::decode(&bytes) {
                    Ok(SyncMessage::Reply { address: a, args }) if a == address => return Ok(args),
                    Ok(other) => debug!(%from, address = other.address(), "ignoring message"),
                    Err(e) => debug!(%from, error = %e, "dropping malformed message"),
                }
            }
        };

        time::timeout(self.timeout, wait)
            .await
            .map_err(|_| SyncError::ReplyTimeout { address })?
    }
}

/// Query a master's tempo over UDP
pub async fn query_tempo(master: SocketAddr, timeout: Duration) -> SyncResult<Tempo> {
    ControlClient::bind(master)
        .await?
        .with_timeout(timeout)
        .query_tempo()
        .await
}

/// Set a master's tempo over UDP
pub async fn set_tempo(master: SocketAddr, bpm: f32) -> SyncResult<()> {
    ControlClient::bind(master).await?.set_tempo(bpm).await
}

/// List a master's slaves over UDP
pub async fn list_slaves(master: SocketAddr, timeout: Duration) -> SyncResult<Vec<SocketAddr>> {
    ControlClient::bind(master)
        .await?
        .with_timeout(timeout)
        .list_slaves()
        .await
}
