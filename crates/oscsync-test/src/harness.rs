//! In-memory master plus slaves harness
//!
//! One master and any number of slaves on a `MemoryNetwork`. The master's
//! outbound traffic goes through a `ChaosSender`; slaves announce over a
//! clean link. Every slave records the pulses its handler sees so tests can
//! compare them against the master's ideal timeline.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

use oscsync_client::{PulseHandler, SyncClient, SyncClientConfig, TickerStats};
use oscsync_core::{Pulse, SyncError, SyncResult, Tempo};
use oscsync_master::{MasterConfig, MasterServer, MasterStats};
use oscsync_transport::{MemoryNetwork, MemoryTransport};

use crate::{ChaosConfig, ChaosSender, ChaosStats};

/// Base port for harness slaves
const SLAVE_BASE_PORT: u16 = 9000;

/// A pulse as seen by a slave's handler
#[derive(Clone, Copy, Debug)]
pub struct RecordedPulse {
    pub pulse: Pulse,
    pub at: Instant,
}

/// `PulseHandler` that records every call
#[derive(Clone, Default)]
pub struct PulseRecorder {
    log: Arc<Mutex<Vec<RecordedPulse>>>,
}

impl PulseRecorder {
    pub fn new() -> Self {
        PulseRecorder::default()
    }

    pub fn snapshot(&self) -> Vec<RecordedPulse> {
        self.log.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }
}

impl PulseHandler for PulseRecorder {
    fn on_pulse(&mut self, pulse: Pulse) -> SyncResult<()> {
        self.log.lock().push(RecordedPulse {
            pulse,
            at: Instant::now(),
        });
        Ok(())
    }
}

/// Harness configuration
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    pub tempo: Tempo,
    /// Conditions on the master-to-slave link
    pub chaos: ChaosConfig,
    pub seed: u64,
    pub first_pulse_timeout: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            tempo: Tempo::DEFAULT,
            chaos: ChaosConfig::perfect(),
            seed: 0,
            first_pulse_timeout: Duration::from_secs(1),
        }
    }
}

struct HarnessSlave {
    addr: SocketAddr,
    recorder: PulseRecorder,
    handle: JoinHandle<SyncResult<TickerStats>>,
}

/// Results collected at shutdown
#[derive(Debug)]
pub struct HarnessReport {
    pub master: SyncResult<MasterStats>,
    pub slaves: Vec<SyncResult<TickerStats>>,
    pub chaos: ChaosStats,
}

/// Running master with attached slaves
pub struct SyncHarness {
    config: HarnessConfig,
    net: MemoryNetwork,
    master_addr: SocketAddr,
    link: ChaosSender<MemoryTransport>,
    started: Instant,
    shutdown: watch::Sender<bool>,
    master: JoinHandle<SyncResult<MasterStats>>,
    slaves: Vec<HarnessSlave>,
}

impl SyncHarness {
    /// Start the master; must be called inside a tokio runtime
    pub fn start(config: HarnessConfig) -> Self {
        let net = MemoryNetwork::new();
        let master_addr = SocketAddr::from(([127, 0, 0, 1], oscsync_core::MASTER_PORT));
        let (transport, packets) = net.bind(master_addr, 64);
        let link = ChaosSender::new(transport, config.chaos.clone(), config.seed);

        let server = MasterServer::with_transport(
            MasterConfig::default().with_tempo(config.tempo),
            link.clone(),
            packets,
            master_addr,
        );
        let (shutdown, shutdown_rx) = watch::channel(false);
        let started = Instant::now();
        let master = tokio::spawn(server.run(shutdown_rx));
        info!(tempo = %config.tempo, chaos = ?config.chaos, "harness started");

        SyncHarness {
            config,
            net,
            master_addr,
            link,
            started,
            shutdown,
            master,
            slaves: Vec::new(),
        }
    }

    /// Attach a new slave; returns its index
    pub fn add_slave(&mut self) -> usize {
        let index = self.slaves.len();
        let addr = SocketAddr::from(([127, 0, 0, 1], SLAVE_BASE_PORT + index as u16));
        let (transport, packets) = self.net.bind(addr, 16);

        let config = SyncClientConfig::default()
            .with_first_pulse_timeout(self.config.first_pulse_timeout);
        let client = SyncClient::with_transport(config, transport, packets, addr, self.master_addr);
        let recorder = PulseRecorder::new();
        let handle = tokio::spawn(client.run(recorder.clone(), self.shutdown.subscribe()));

        self.slaves.push(HarnessSlave {
            addr,
            recorder,
            handle,
        });
        index
    }

    pub fn network(&self) -> &MemoryNetwork {
        &self.net
    }

    pub fn master_addr(&self) -> SocketAddr {
        self.master_addr
    }

    pub fn slave_addr(&self, index: usize) -> Option<SocketAddr> {
        self.slaves.get(index).map(|s| s.addr)
    }

    /// Pulses recorded by one slave so far
    pub fn recorded(&self, index: usize) -> Vec<RecordedPulse> {
        self.slaves
            .get(index)
            .map(|s| s.recorder.snapshot())
            .unwrap_or_default()
    }

    /// Count the master has reached at `at`, assuming a constant tempo
    pub fn master_count_at(&self, at: Instant) -> u64 {
        let elapsed = at.saturating_duration_since(self.started).as_nanos();
        let interval = self.config.tempo.pulse_interval().as_nanos().max(1);
        (elapsed / interval) as u64
    }

    /// Largest (ahead, behind) distance in pulses between a slave and the master
    pub fn drift(&self, index: usize) -> (u64, u64) {
        self.recorded(index)
            .iter()
            .fold((0, 0), |(ahead, behind), r| {
                let master = self.master_count_at(r.at);
                let local = r.pulse.count.value();
                (
                    ahead.max(local.saturating_sub(master)),
                    behind.max(master.saturating_sub(local)),
                )
            })
    }

    pub fn chaos_stats(&self) -> ChaosStats {
        self.link.stats()
    }

    /// Stop everything and collect results
    pub async fn shutdown(self) -> HarnessReport {
        let _ = self.shutdown.send(true);

        let mut slaves = Vec::with_capacity(self.slaves.len());
        for slave in self.slaves {
            slaves.push(flatten(slave.handle.await));
        }
        let master = flatten(self.master.await);

        HarnessReport {
            master,
            slaves,
            chaos: self.link.stats(),
        }
    }
}

fn flatten<T>(joined: Result<SyncResult<T>, tokio::task::JoinError>) -> SyncResult<T> {
    joined.map_err(|e| SyncError::TaskFailed(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    use oscsync_core::PULSES_PER_BAR;
    use tokio::time;

    fn strictly_increasing(log: &[RecordedPulse]) -> bool {
        log.windows(2).all(|w| w[1].pulse.count > w[0].pulse.count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_link_slaves_stay_in_step() {
        let mut harness = SyncHarness::start(HarnessConfig::default());
        for _ in 0..3 {
            harness.add_slave();
        }

        time::sleep(Duration::from_secs(5)).await;

        for index in 0..3 {
            let log = harness.recorded(index);
            assert!(log.len() > 200, "slave {} saw {} pulses", index, log.len());
            assert!(log
                .windows(2)
                .all(|w| w[1].pulse.count == w[0].pulse.count.next()));

            let (ahead, behind) = harness.drift(index);
            assert!(ahead <= 1 && behind <= 1, "slave {} drift {:?}", index, (ahead, behind));
        }

        let report = harness.shutdown().await;
        assert!(report.slaves.iter().all(|s| s.is_ok()));
        let master = report.master.unwrap();
        assert_eq!(master.direct_sends, 3);
        assert_eq!(master.send_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drift_bounded_under_loss_and_jitter() {
        let config = HarnessConfig {
            chaos: ChaosConfig::poor().with_loss_rate(0.3),
            seed: 42,
            first_pulse_timeout: Duration::from_secs(30),
            ..HarnessConfig::default()
        };
        let mut harness = SyncHarness::start(config);
        harness.add_slave();
        harness.add_slave();

        time::sleep(Duration::from_secs(30)).await;

        for index in 0..2 {
            let log = harness.recorded(index);
            assert!(log.len() >= PULSES_PER_BAR as usize, "slave {} stalled", index);
            assert!(strictly_increasing(&log), "slave {} repeated a pulse", index);

            let (ahead, behind) = harness.drift(index);
            assert!(ahead <= PULSES_PER_BAR, "slave {} ran {} pulses ahead", index, ahead);
            assert!(behind <= 8, "slave {} fell {} pulses behind", index, behind);
        }

        let report = harness.shutdown().await;
        assert!(report.chaos.packets_lost > 0);
        assert!(report.slaves.iter().all(|s| s.is_ok()));
    }

    #[tokio::test]
    async fn test_panicked_task_is_reported_as_task_failure() {
        async fn blow_up() -> SyncResult<()> {
            panic!("slave task blew up")
        }

        let joined = tokio::spawn(blow_up()).await;
        assert!(matches!(flatten(joined), Err(SyncError::TaskFailed(_))));

        let ok: Result<SyncResult<u8>, tokio::task::JoinError> = Ok(Ok(3));
        assert_eq!(flatten(ok).unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_master_lists_harness_slaves() {
        use oscsync_client::ControlClient;

        let mut harness = SyncHarness::start(HarnessConfig::default());
        harness.add_slave();
        harness.add_slave();
        assert_eq!(harness.slave_addr(2), None);
        time::sleep(Duration::from_millis(200)).await;

        let control_addr = SocketAddr::from(([127, 0, 0, 1], 7100));
        let (transport, replies) = harness.network().bind(control_addr, 8);
        let mut control = ControlClient::with_transport(transport, replies, harness.master_addr());

        let mut listed = control.list_slaves().await.unwrap();
        listed.sort();
        let expected: Vec<_> = (0..2).filter_map(|i| harness.slave_addr(i)).collect();
        assert_eq!(listed, expected);

        harness.shutdown().await.master.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slave_joining_late_picks_up_count() {
        let mut harness = SyncHarness::start(HarnessConfig::default());
        time::sleep(Duration::from_secs(3)).await;

        let index = harness.add_slave();
        time::sleep(Duration::from_secs(1)).await;

        let log = harness.recorded(index);
        let first = log.first().map(|r| r.pulse.count.value()).unwrap_or(0);
        // Three seconds at 120 BPM is 144 pulses
        assert!(first >= 144, "late slave started at {}", first);

        let (ahead, behind) = harness.drift(index);
        assert!(ahead <= 1 && behind <= 1);
        harness.shutdown().await.master.unwrap();
    }
}
