//! Timer-driven clock loop
//!
//! Owns the `TempoClock` for the lifetime of the master. The only way in is
//! the control event queue; the only way out is the published status and
//! the pulse messages it sends.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, Interval};
use tracing::{debug, info, trace, warn};

use oscsync_core::{SlaveEndpoint, SyncResult, Tempo};
use oscsync_transport::MessageSender;
use oscsync_wire::SyncMessage;

use crate::{ControlEvent, Delivery, TempoClock, TickOutcome};

/// State visible outside the clock loop, answered without touching the clock
#[derive(Clone, Debug, PartialEq)]
pub struct MasterStatus {
    pub tempo: Tempo,
    pub slaves: Vec<SlaveEndpoint>,
}

impl MasterStatus {
    pub fn of(clock: &TempoClock) -> Self {
        MasterStatus {
            tempo: clock.tempo(),
            slaves: clock.registry().snapshot(),
        }
    }
}

/// Periodic timer whose first expiry is one full period from now
pub fn pulse_timer(period: Duration) -> Interval {
    time::interval_at(Instant::now() + period, period)
}

/// Drives a `TempoClock` from a periodic timer
pub struct ClockDriver<S> {
    clock: TempoClock,
    events: mpsc::Receiver<ControlEvent>,
    sender: S,
    status: watch::Sender<MasterStatus>,
}

impl<S: MessageSender> ClockDriver<S> {
    pub fn new(
        clock: TempoClock,
        events: mpsc::Receiver<ControlEvent>,
        sender: S,
        status: watch::Sender<MasterStatus>,
    ) -> Self {
        status.send_replace(MasterStatus::of(&clock));
        ClockDriver {
            clock,
            events,
            sender,
            status,
        }
    }

    /// Run until shutdown; returns the clock for inspection
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SyncResult<TempoClock> {
        info!(
            tempo = %self.clock.tempo(),
            interval = ?self.clock.pulse_interval(),
            "clock loop started"
        );

        let mut timer = pulse_timer(self.clock.pulse_interval());
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = timer.tick() => {}
            }

            let event = self.next_event();
            let outcome = self.clock.tick(event);
            self.deliver(&outcome).await;

            if outcome.membership_changed || outcome.tempo_changed {
                self.status.send_replace(MasterStatus::of(&self.clock));
            }

            // The stale timer is dropped here; the next pass waits on the new one
            if outcome.tempo_changed {
                timer = pulse_timer(self.clock.pulse_interval());
                info!(
                    tempo = %self.clock.tempo(),
                    interval = ?self.clock.pulse_interval(),
                    pulse = %outcome.pulse.count,
                    "tempo changed"
                );
            }
        }

        info!(pulse = %self.clock.pulse_count(), "clock loop stopped");
        Ok(self.clock)
    }

    /// At most one pending event per tick so control bursts never starve the cadence
    fn next_event(&mut self) -> Option<ControlEvent> {
        match self.events.try_recv() {
            Ok(event) => {
                debug!(?event, "control event");
                Some(event)
            }
            Err(_) => None,
        }
    }

    async fn deliver(&mut self, outcome: &TickOutcome) {
        let targets = outcome.delivery.targets();
        if targets.is_empty() {
            return;
        }

        match &outcome.delivery {
            Delivery::All(_) => {
                trace!(pulse = %outcome.pulse.count, slaves = targets.len(), "broadcast")
            }
            Delivery::One(slave) => {
                debug!(pulse = %outcome.pulse.count, %slave, "greeting new slave")
            }
            Delivery::Silent => {}
        }

        let msg = SyncMessage::Pulse(outcome.pulse);
        for slave in targets {
            if let Err(e) = self.sender.send(slave.addr(), &msg).await {
                self.clock.stats_mut().send_failures += 1;
                warn!(%slave, error = %e, "failed to send pulse");
            }
        }
    }
}
