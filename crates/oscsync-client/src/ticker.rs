//! Drift-bounded local pulse generation
//!
//! State machine:
//! - AwaitFirst: block for the master's first pulse, bounded by a timeout
//! - Ticking: local timer at the tempo-derived interval, one handler call per fire
//! - AwaitResync: after the bar boundary, block until the master confirms
//!
//! INVARIANT: the local count never runs past the first bar boundary after
//! the last authoritative pulse, so free-running drift is at most one bar.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, Instant, Interval};
use tracing::{debug, trace};

use oscsync_core::{Pulse, PulseCount, SyncError, SyncResult};

use crate::PulseHandler;

/// Latest authoritative pulse; `None` until the master has spoken
pub type PulseWatch = watch::Receiver<Option<Pulse>>;

/// Ticker counters
#[derive(Clone, Debug, Default)]
pub struct TickerStats {
    /// Handler calls made from the local timer
    pub local_ticks: u64,
    /// Authoritative pulses applied
    pub resyncs: u64,
    /// Resyncs that arrived while ticking, before the bar boundary
    pub mid_bar_resyncs: u64,
    /// Pulses the master delivered just ahead of the local timer
    pub caught_up: u64,
    /// Repeats of the last authoritative pulse, ignored
    pub duplicates: u64,
}

/// Periodic timer whose first expiry is one full period from now
fn pulse_timer(period: Duration) -> Interval {
    time::interval_at(Instant::now() + period, period)
}

/// Widen a wire-decoded count using the local count
fn rebase(pulse: Pulse, local: PulseCount) -> Pulse {
    Pulse::new(pulse.tempo, pulse.count.unwrap_near(local))
}

/// Local pulse generator slaved to authoritative pulses
pub struct SyncTicker<H> {
    handler: H,
    pulses: PulseWatch,
    first_pulse_timeout: Duration,
    stats: TickerStats,
}

impl<H: PulseHandler> SyncTicker<H> {
    pub fn new(handler: H, pulses: PulseWatch, first_pulse_timeout: Duration) -> Self {
        SyncTicker {
            handler,
            pulses,
            first_pulse_timeout,
            stats: TickerStats::default(),
        }
    }

    /// Run until shutdown, a handler error, or a missing first pulse
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SyncResult<TickerStats> {
        let first_pulse_timeout = self.first_pulse_timeout;
        let wait_first = self.next_pulse(&mut shutdown);
        let first = match time::timeout(first_pulse_timeout, wait_first).await {
            Err(_) => return Err(SyncError::FirstPulseTimeout(first_pulse_timeout)),
            Ok(pulse) => pulse?,
        };
        let Some(mut current) = first else {
            return Ok(self.stats);
        };
        debug!(tempo = %current.tempo, pulse = %current.count, "first pulse");
        self.stats.resyncs += 1;
        let mut authoritative = current;

        'resync: loop {
            let mut timer = pulse_timer(current.tempo.pulse_interval());
            let boundary = current.count.next_bar_boundary();

            loop {
                if *shutdown.borrow() {
                    return Ok(self.stats);
                }
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => return Ok(self.stats),
                    changed = self.pulses.changed() => {
                        changed.map_err(|_| SyncError::ChannelClosed("pulses"))?;
                        let latest = *self.pulses.borrow_and_update();
                        match latest.map(|p| rebase(p, current.count)) {
                            Some(pulse) if pulse == authoritative => self.stats.duplicates += 1,
                            Some(pulse) => {
                                self.stats.mid_bar_resyncs += 1;
                                current = self.apply(current.count, pulse)?;
                                authoritative = pulse;
                                continue 'resync;
                            }
                            None => {}
                        }
                    }
                    _ = timer.tick() => {
                        current.count = current.count.next();
                        self.stats.local_ticks += 1;
                        trace!(pulse = %current.count, "local pulse");
                        self.handler.on_pulse(current)?;
                    }
                }

                if current.count == boundary {
                    trace!(pulse = %current.count, "bar complete, awaiting master");
                    loop {
                        let next = self.next_pulse(&mut shutdown).await?;
                        match next.map(|p| rebase(p, current.count)) {
                            Some(pulse) if pulse == authoritative => self.stats.duplicates += 1,
                            Some(pulse) => {
                                current = self.apply(current.count, pulse)?;
                                authoritative = pulse;
                                continue 'resync;
                            }
                            None => return Ok(self.stats),
                        }
                    }
                }
            }
        }
    }

    /// Adopt an authoritative pulse. When it is exactly the pulse the local
    /// timer was about to produce, deliver it now so no pulse is skipped.
    fn apply(&mut self, local: PulseCount, pulse: Pulse) -> SyncResult<Pulse> {
        self.stats.resyncs += 1;
        if pulse.count == local.next() {
            self.stats.caught_up += 1;
            self.handler.on_pulse(pulse)?;
        }
        trace!(tempo = %pulse.tempo, pulse = %pulse.count, local = %local, "resync");
        Ok(pulse)
    }

    /// Wait for the next authoritative pulse; `None` on shutdown
    async fn next_pulse(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SyncResult<Option<Pulse>> {
        loop {
            if *shutdown.borrow() {
                return Ok(None);
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => return Ok(None),
                changed = self.pulses.changed() => {
                    changed.map_err(|_| SyncError::ChannelClosed("pulses"))?;
                    let latest = *self.pulses.borrow_and_update();
                    if let Some(pulse) = latest {
                        return Ok(Some(pulse));
                    }
                }
            }
        }
    }
}
