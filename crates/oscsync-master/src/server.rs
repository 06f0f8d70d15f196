//! Master server - dispatch activity plus clock loop

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use oscsync_core::{port_from_wire, SlaveEndpoint, SyncError, SyncResult, Tempo};
use oscsync_transport::{resolve, start_receive_loop, MessageSender, PacketReceiver, UdpTransport};
use oscsync_wire::{OscArg, SyncMessage, ADDRESS_SLAVE_LIST};

use crate::{ClockDriver, ControlEvent, MasterConfig, MasterStats, MasterStatus, TempoClock};

/// A bound master, ready to run
pub struct MasterServer<S> {
    config: MasterConfig,
    sender: Arc<S>,
    packets: PacketReceiver,
    local_addr: SocketAddr,
}

impl MasterServer<UdpTransport> {
    /// Bind the UDP listening socket
    pub async fn bind(config: MasterConfig) -> SyncResult<Self> {
        let addr = resolve(&config.listen_host, config.port).await?;
        let transport = UdpTransport::bind(addr).await?;
        let packets = start_receive_loop(transport.socket(), config.packet_buffer);
        let local_addr = transport.local_addr();
        info!(%local_addr, "master listening");

        Ok(MasterServer {
            config,
            sender: Arc::new(transport),
            packets,
            local_addr,
        })
    }
}

impl<S: MessageSender> MasterServer<S> {
    /// Use an already bound transport and its packet stream
    pub fn with_transport(
        config: MasterConfig,
        sender: S,
        packets: PacketReceiver,
        local_addr: SocketAddr,
    ) -> Self {
        MasterServer {
            config,
            sender: Arc::new(sender),
            packets,
            local_addr,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run dispatch and the clock loop until shutdown or a fatal error
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> SyncResult<MasterStats> {
        let (events_tx, events_rx) = mpsc::channel(self.config.queue_capacity);
        let clock = TempoClock::new(self.config.tempo);
        let (status_tx, status_rx) = watch::channel(MasterStatus::of(&clock));

        let driver = ClockDriver::new(clock, events_rx, Arc::clone(&self.sender), status_tx);
        let dispatcher = Dispatcher {
            sender: self.sender,
            events: events_tx,
            status: status_rx,
        };

        let (clock, ()) = tokio::try_join!(
            driver.run(shutdown.clone()),
            dispatcher.run(self.packets, shutdown),
        )?;

        Ok(clock.stats().clone())
    }
}

/// Decodes datagrams into control events and answers queries
struct Dispatcher<S> {
    sender: Arc<S>,
    events: mpsc::Sender<ControlEvent>,
    status: watch::Receiver<MasterStatus>,
}

impl<S: MessageSender> Dispatcher<S> {
    async fn run(
        self,
        mut packets: PacketReceiver,
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

            let msg = match SyncMessage::decode(&bytes) {
                Ok(msg) => msg,
                Err(e) => {
                    debug!(%from, error = %e, "dropping malformed message");
                    continue;
                }
            };

            if let Some(event) = self.handle(msg, from).await {
                // Full queue blocks dispatch rather than dropping membership changes
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => return Ok(()),
                    sent = self.events.send(event) => {
                        sent.map_err(|_| SyncError::ChannelClosed("control events"))?
                    }
                }
            }
        }
    }

    /// Answer queries inline; turn mutations into events
    async fn handle(&self, msg: SyncMessage, from: SocketAddr) -> Option<ControlEvent> {
        match msg {
            SyncMessage::TempoQuery => {
                let tempo = self.status.borrow().tempo;
                self.reply(from, SyncMessage::tempo_reply(tempo)).await;
                None
            }
            SyncMessage::SlaveList => {
                let args = self
                    .status
                    .borrow()
                    .slaves
                    .iter()
                    .flat_map(|s| {
                        [
                            OscArg::Str(s.addr().ip().to_string()),
                            OscArg::Int(s.addr().port() as i32),
                        ]
                    })
                    .collect();
                let reply = SyncMessage::Reply {
                    address: ADDRESS_SLAVE_LIST.to_owned(),
                    args,
                };
                self.reply(from, reply).await;
                None
            }
            SyncMessage::TempoSet(bpm) => match Tempo::new(bpm) {
                Ok(tempo) => Some(ControlEvent::TempoSet(tempo)),
                Err(e) => {
                    warn!(%from, error = %e, "rejected tempo");
                    None
                }
            },
            SyncMessage::SlaveAdd { host, port } => self
                .endpoint(&host, port)
                .await
                .map(ControlEvent::SlaveAdd),
            SyncMessage::SlaveRemove { host, port } => self
                .endpoint(&host, port)
                .await
                .map(ControlEvent::SlaveRemove),
            other => {
                debug!(%from, address = other.address(), "ignoring message");
                None
            }
        }
    }

    async fn endpoint(&self, host: &str, port: i32) -> Option<SlaveEndpoint> {
        let resolved = match port_from_wire(port) {
            Ok(port) => resolve(host, port).await,
            Err(e) => Err(e),
        };
        match resolved {
            Ok(addr) => Some(SlaveEndpoint::new(addr)),
            Err(e) => {
                warn!(host, port, error = %e, "rejected slave address");
                None
            }
        }
    }

    async fn reply(&self, dest: SocketAddr, msg: SyncMessage) {
        if let Err(e) = self.sender.send(dest, &msg).await {
            warn!(%dest, error = %e, "failed to send reply");
        }
    }
}
