//! Chaos link for oscsync protocol tests
//!
//! Wraps a real `MessageSender` and degrades what goes through it:
//! - Jitter
//! - Packet loss (random and burst)
//! - Duplication
//!
//! Reordering falls out of jitter: a delayed message can land after a later one.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use oscsync_core::SyncResult;
use oscsync_transport::MessageSender;
use oscsync_wire::SyncMessage;

/// Jitter distribution type
#[derive(Clone, Debug)]
pub enum JitterDistribution {
    /// No jitter
    None,
    /// Uniform distribution, inclusive bounds
    Uniform { min_ms: u32, max_ms: u32 },
    /// Normal distribution (mean, stddev), clamped at zero
    Normal { mean_ms: f64, stddev_ms: f64 },
}

impl JitterDistribution {
    /// Sample a jitter value
    pub fn sample(&self, rng: &mut StdRng) -> Duration {
        match self {
            JitterDistribution::None => Duration::ZERO,
            JitterDistribution::Uniform { min_ms, max_ms } => {
                Duration::from_millis(rng.gen_range(*min_ms..=(*max_ms).max(*min_ms)) as u64)
            }
            JitterDistribution::Normal { mean_ms, stddev_ms } => {
                // Box-Muller
                let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
                let u2: f64 = rng.gen();
                let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                let value = mean_ms + stddev_ms * z;
                Duration::from_micros((value.max(0.0) * 1000.0) as u64)
            }
        }
    }
}

/// Link chaos configuration
#[derive(Clone, Debug)]
pub struct ChaosConfig {
    /// Base latency
    pub base_latency: Duration,
    /// Jitter distribution
    pub jitter: JitterDistribution,
    /// Packet loss rate (0.0 - 1.0)
    pub loss_rate: f64,
    /// Burst loss probability
    pub burst_loss_prob: f64,
    /// Burst loss length range
    pub burst_length: (u32, u32),
    /// Duplicate probability
    pub duplicate_prob: f64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        ChaosConfig::perfect()
    }
}

impl ChaosConfig {
    /// Lossless, instant link
    pub fn perfect() -> Self {
        ChaosConfig {
            base_latency: Duration::ZERO,
            jitter: JitterDistribution::None,
            loss_rate: 0.0,
            burst_loss_prob: 0.0,
            burst_length: (0, 0),
            duplicate_prob: 0.0,
        }
    }

    /// Good LAN conditions
    pub fn good() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(1),
            jitter: JitterDistribution::Uniform { min_ms: 0, max_ms: 2 },
            loss_rate: 0.001,
            burst_loss_prob: 0.0,
            burst_length: (0, 0),
            duplicate_prob: 0.001,
        }
    }

    /// Congested wireless conditions
    pub fn poor() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(10),
            jitter: JitterDistribution::Normal {
                mean_ms: 10.0,
                stddev_ms: 5.0,
            },
            loss_rate: 0.1,
            burst_loss_prob: 0.02,
            burst_length: (2, 4),
            duplicate_prob: 0.02,
        }
    }

    pub fn with_loss_rate(mut self, loss_rate: f64) -> Self {
        self.loss_rate = loss_rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_jitter(mut self, jitter: JitterDistribution) -> Self {
        self.jitter = jitter;
        self
    }
}

/// Chaos link statistics
#[derive(Clone, Debug, Default)]
pub struct ChaosStats {
    pub packets_sent: u64,
    pub packets_delivered: u64,
    pub packets_lost: u64,
    pub packets_duplicated: u64,
    pub total_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl ChaosStats {
    pub fn loss_rate(&self) -> f64 {
        if self.packets_sent == 0 {
            0.0
        } else {
            self.packets_lost as f64 / self.packets_sent as f64
        }
    }
}

/// Fate of one outbound message
enum Fate {
    Drop,
    Deliver { delay: Duration, duplicate: Option<Duration> },
}

struct ChaosState {
    rng: StdRng,
    burst_remaining: u32,
    stats: ChaosStats,
}

/// `MessageSender` that passes messages through a degraded link
pub struct ChaosSender<S> {
    inner: Arc<S>,
    config: ChaosConfig,
    state: Arc<Mutex<ChaosState>>,
}

impl<S> Clone for ChaosSender<S> {
    fn clone(&self) -> Self {
        ChaosSender {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<S: MessageSender + 'static> ChaosSender<S> {
    /// Wrap `inner`; the same seed always produces the same fates
    pub fn new(inner: S, config: ChaosConfig, seed: u64) -> Self {
        ChaosSender {
            inner: Arc::new(inner),
            config,
            state: Arc::new(Mutex::new(ChaosState {
                rng: StdRng::seed_from_u64(seed),
                burst_remaining: 0,
                stats: ChaosStats::default(),
            })),
        }
    }

    /// Current statistics
    pub fn stats(&self) -> ChaosStats {
        self.state.lock().stats.clone()
    }

    fn decide(&self) -> Fate {
        let mut state = self.state.lock();
        let state = &mut *state;
        state.stats.packets_sent += 1;

        if self.should_drop(state) {
            state.stats.packets_lost += 1;
            return Fate::Drop;
        }

        let delay = self.config.base_latency + self.config.jitter.sample(&mut state.rng);
        let delay_ms = delay.as_millis() as u64;
        state.stats.packets_delivered += 1;
        state.stats.total_delay_ms += delay_ms;
        state.stats.max_delay_ms = state.stats.max_delay_ms.max(delay_ms);

        let duplicate = if state.rng.gen::<f64>() < self.config.duplicate_prob {
            state.stats.packets_duplicated += 1;
            Some(delay + self.config.jitter.sample(&mut state.rng))
        } else {
            None
        };

        Fate::Deliver { delay, duplicate }
    }

    fn should_drop(&self, state: &mut ChaosState) -> bool {
        if state.burst_remaining > 0 {
            state.burst_remaining -= 1;
            return true;
        }

        if state.rng.gen::<f64>() < self.config.burst_loss_prob {
            let (min, max) = self.config.burst_length;
            state.burst_remaining = state.rng.gen_range(min..=max.max(min)).saturating_sub(1);
            return true;
        }

        state.rng.gen::<f64>() < self.config.loss_rate
    }

    fn deliver_later(&self, dest: SocketAddr, msg: &SyncMessage, delay: Duration) {
        let inner = Arc::clone(&self.inner);
        let msg = msg.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Late deliveries have nobody to report to
            if let Err(e) = inner.send(dest, &msg).await {
                trace!(%dest, error = %e, "delayed delivery failed");
            }
        });
    }
}

impl<S: MessageSender + 'static> MessageSender for ChaosSender<S> {
    async fn send(&self, dest: SocketAddr, msg: &SyncMessage) -> SyncResult<()> {
        match self.decide() {
            Fate::Drop => {
                trace!(%dest, address = msg.address(), "chaos dropped message");
                Ok(())
            }
            Fate::Deliver { delay, duplicate } => {
                if let Some(dup_delay) = duplicate {
                    self.deliver_later(dest, msg, dup_delay);
                }
                if delay.is_zero() {
                    self.inner.send(dest, msg).await
                } else {
                    self.deliver_later(dest, msg, delay);
                    Ok(())
                }
            }
        }
    }
}
