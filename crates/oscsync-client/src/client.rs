//! Sync client session - announce, receive, tick

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use oscsync_core::{Pulse, SyncError, SyncResult};
use oscsync_transport::{resolve, start_receive_loop, MessageSender, PacketReceiver, UdpTransport};
use oscsync_wire::SyncMessage;

use crate::{PulseHandler, SyncClientConfig, SyncTicker, TickerStats};

/// One slave session against a master
pub struct SyncClient<S> {
    config: SyncClientConfig,
    sender: Arc<S>,
    packets: PacketReceiver,
    local_addr: SocketAddr,
    master: SocketAddr,
}

impl SyncClient<UdpTransport> {
    /// Bind a local socket and resolve the master
    pub async fn bind(config: SyncClientConfig) -> SyncResult<Self> {
        let master = resolve(&config.master_host, config.master_port).await?;
        let transport = UdpTransport::bind(config.bind_addr).await?;
        let packets = start_receive_loop(transport.socket(), config.packet_buffer);
        let local_addr = transport.local_addr();

        Ok(SyncClient {
            config,
            sender: Arc::new(transport),
            packets,
            local_addr,
            master,
        })
    }

    /// Bind, announce and run until shutdown or a fatal error
    pub async fn connect<H: PulseHandler>(
        config: SyncClientConfig,
        handler: H,
        shutdown: watch::Receiver<bool>,
    ) -> SyncResult<TickerStats> {
        Self::bind(config).await?.run(handler, shutdown).await
    }
}

impl<S: MessageSender> SyncClient<S> {
    /// Use an already bound transport and its packet stream
    pub fn with_transport(
        config: SyncClientConfig,
        sender: S,
        packets: PacketReceiver,
        local_addr: SocketAddr,
        master: SocketAddr,
    ) -> Self {
        SyncClient {
            config,
            sender: Arc::new(sender),
            packets,
            local_addr,
            master,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Announce to the master and drive `handler` from its pulses
    ///
    /// On every exit path the client asks the master to drop it.
    pub async fn run<H: PulseHandler>(
        self,
        handler: H,
        shutdown: watch::Receiver<bool>,
    ) -> SyncResult<TickerStats> {
        let SyncClient {
            config,
            sender,
            packets,
            local_addr,
            master,
        } = self;

        let (pulse_tx, pulse_rx) = watch::channel(None);
        let ticker = SyncTicker::new(handler, pulse_rx, config.first_pulse_timeout);

        sender
            .send(master, &membership(&config, local_addr, true))
            .await?;
        info!(%master, local = %local_addr, "announced to master");

        let result = tokio::try_join!(
            ticker.run(shutdown.clone()),
            receive_pulses(packets, pulse_tx, shutdown),
        )
        .map(|(stats, ())| stats);

        if let Err(e) = &result {
            warn!(error = %e, "sync session ended");
        }

        // Best effort
        if let Err(e) = sender
            .send(master, &membership(&config, local_addr, false))
            .await
        {
            debug!(error = %e, "failed to send slave removal");
        }
        result
    }
}

/// Announce or withdraw this client
fn membership(config: &SyncClientConfig, local_addr: SocketAddr, add: bool) -> SyncMessage {
    let host = config.announce_host.clone();
    let port = local_addr.port() as i32;
    if add {
        SyncMessage::SlaveAdd { host, port }
    } else {
        SyncMessage::SlaveRemove { host, port }
    }
}

/// Decode incoming datagrams; only the latest pulse is kept
async fn receive_pulses(
    mut packets: PacketReceiver,
    pulses: watch::Sender<Option<Pulse>>,
    mut shutdown: watch::Receiver<bool>,
) -> SyncResult<()> {
    loop {
        if *shutdown.borrow() {
            return Ok(());
        }
        let (bytes, from) = tokio::select! {
            biased;
            _ = shutdown.changed() => return Ok(()),
            packet = packets.recv() => packet.ok_or(SyncError::ChannelClosed("packets"))?,
        };

        match SyncMessage::decode(&bytes) {
            Ok(SyncMessage::Pulse(pulse)) => {
                trace!(%from, tempo = %pulse.tempo, pulse = %pulse.count, "pulse received");
                pulses.send_replace(Some(pulse));
            }
            Ok(other) => debug!(%from, address = other.address(), "ignoring message"),
            Err(e) => debug!(%from, error = %e, "dropping malformed message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use oscsync_core::{PulseCount, Tempo};
    use oscsync_master::{MasterConfig, MasterServer, MasterStats};
    use oscsync_transport::{MemoryNetwork, MemoryTransport};
    use oscsync_wire::{slaves_from_reply, ADDRESS_SLAVE_LIST};
    use tokio::task::JoinHandle;
    use tokio::time::{self, Instant};

    const MASTER: u16 = 5776;

    type Log = Arc<Mutex<Vec<(Pulse, Instant)>>>;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    type MasterHandle = JoinHandle<SyncResult<MasterStats>>;

    fn start_master(net: &MemoryNetwork) -> (watch::Sender<bool>, MasterHandle) {
        let (transport, packets) = net.bind(addr(MASTER), 64);
        let server =
            MasterServer::with_transport(MasterConfig::default(), transport, packets, addr(MASTER));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (shutdown_tx, tokio::spawn(server.run(shutdown_rx)))
    }

    fn start_client(
        net: &MemoryNetwork,
        port: u16,
    ) -> (Log, watch::Sender<bool>, JoinHandle<SyncResult<TickerStats>>) {
        let (transport, packets) = net.bind(addr(port), 16);
        let client = SyncClient::with_transport(
            SyncClientConfig::default(),
            transport,
            packets,
            addr(port),
            addr(MASTER),
        );

        let log: Log = Arc::default();
        let sink = Arc::clone(&log);
        let handler = move |p: Pulse| -> SyncResult<()> {
            sink.lock().unwrap().push((p, Instant::now()));
            Ok(())
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (log, shutdown_tx, tokio::spawn(client.run(handler, shutdown_rx)))
    }

    fn assert_consecutive(log: &[(Pulse, Instant)]) {
        for pair in log.windows(2) {
            assert_eq!(
                pair[1].0.count,
                pair[0].0.count.next(),
                "pulse {} followed by {}",
                pair[0].0.count,
                pair[1].0.count
            );
        }
    }

    async fn list_slaves(control: &MemoryTransport, rx: &mut PacketReceiver) -> Vec<(String, i32)> {
        control.send(addr(MASTER), &SyncMessage::SlaveList).await.unwrap();
        let (bytes, _) = rx.recv().await.unwrap();
        match SyncMessage::decode(&bytes).unwrap() {
            SyncMessage::Reply { address, args } if address == ADDRESS_SLAVE_LIST => {
                slaves_from_reply(&args).unwrap()
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slave_follows_master() {
        let net = MemoryNetwork::new();
        let (master_shutdown, master) = start_master(&net);
        let (log, shutdown, client) = start_client(&net, 7000);

        time::sleep(Duration::from_secs(3)).await;

        let log = log.lock().unwrap().clone();
        assert!(log.len() > 130, "only {} pulses in 3s", log.len());
        assert_eq!(log[0].0.count, PulseCount::new(2));
        assert!(log.iter().all(|(p, _)| p.tempo == Tempo::DEFAULT));
        assert_consecutive(&log);

        shutdown.send(true).unwrap();
        let stats = client.await.unwrap().unwrap();
        assert!(stats.resyncs >= 2);

        master_shutdown.send(true).unwrap();
        let stats = master.await.unwrap().unwrap();
        assert_eq!(stats.direct_sends, 1);
        assert!(stats.broadcasts >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tempo_change_reaches_slave() {
        let net = MemoryNetwork::new();
        let (master_shutdown, _master) = start_master(&net);
        let (log, shutdown, client) = start_client(&net, 7000);
        let (control, _control_rx) = net.bind(addr(7100), 8);

        time::sleep(Duration::from_millis(1000)).await;
        control
            .send(addr(MASTER), &SyncMessage::TempoSet(90.0))
            .await
            .unwrap();
        time::sleep(Duration::from_secs(5)).await;

        let log = log.lock().unwrap().clone();
        assert_consecutive(&log);

        let slow = Tempo::new(90.0).unwrap();
        let first_slow = log
            .iter()
            .position(|(p, _)| p.tempo == slow)
            .expect("tempo change never arrived");
        assert!(log[..first_slow].iter().all(|(p, _)| p.tempo == Tempo::DEFAULT));
        assert!(log[first_slow..].iter().all(|(p, _)| p.tempo == slow));

        for pair in log[first_slow..].windows(2) {
            let gap = pair[1].1 - pair[0].1;
            let diff = if gap > slow.pulse_interval() {
                gap - slow.pulse_interval()
            } else {
                slow.pulse_interval() - gap
            };
            assert!(diff < Duration::from_millis(2), "gap {:?} after tempo change", gap);
        }

        shutdown.send(true).unwrap();
        client.await.unwrap().unwrap();
        master_shutdown.send(true).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_end_removes_slave() {
        let net = MemoryNetwork::new();
        let (master_shutdown, _master) = start_master(&net);
        let (_log, shutdown, client) = start_client(&net, 7000);
        let (control, mut control_rx) = net.bind(addr(7100), 8);

        time::sleep(Duration::from_millis(100)).await;
        let listed = list_slaves(&control, &mut control_rx).await;
        assert_eq!(listed, vec![("127.0.0.1".to_owned(), 7000)]);

        shutdown.send(true).unwrap();
        client.await.unwrap().unwrap();
        time::sleep(Duration::from_millis(100)).await;
        assert!(list_slaves(&control, &mut control_rx).await.is_empty());

        master_shutdown.send(true).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_master_times_out() {
        let net = MemoryNetwork::new();
        // Bound but never answers
        let (_master, _packets) = net.bind(addr(MASTER), 8);
        let (log, _shutdown, client) = start_client(&net, 7000);

        let err = client.await.unwrap().unwrap_err();
        assert!(matches!(err, SyncError::FirstPulseTimeout(_)));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_udp_loopback_session() {
        let config = MasterConfig::default()
            .with_listen_host("127.0.0.1")
            .with_port(0);
        let master = MasterServer::bind(config).await.unwrap();
        let master_port = master.local_addr().port();
        let (master_shutdown, master_rx) = watch::channel(false);
        let master = tokio::spawn(master.run(master_rx));

        let config = SyncClientConfig::default()
            .with_master("127.0.0.1", master_port)
            .with_bind_addr(addr(0));
        let log: Log = Arc::default();
        let sink = Arc::clone(&log);
        let handler = move |p: Pulse| -> SyncResult<()> {
            sink.lock().unwrap().push((p, Instant::now()));
            Ok(())
        };
        let (shutdown, shutdown_rx) = watch::channel(false);
        let client = tokio::spawn(SyncClient::connect(config, handler, shutdown_rx));

        time::sleep(Duration::from_millis(500)).await;
        shutdown.send(true).unwrap();
        client.await.unwrap().unwrap();

        let log = log.lock().unwrap().clone();
        assert!(log.len() > 5, "only {} pulses over loopback", log.len());
        assert_consecutive(&log);

        master_shutdown.send(true).unwrap();
        let stats = master.await.unwrap().unwrap();
        assert_eq!(stats.direct_sends, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_master_fails_announce() {
        let net = MemoryNetwork::new();
        let (_log, _shutdown, client) = start_client(&net, 7000);
        let err = client.await.unwrap().unwrap_err();
        assert!(matches!(err, SyncError::TransportError(_)));
    }
}
