//! Tempo clock - the master's tick state machine
//!
//! Pure state: no timers and no I/O. The driver fires `tick` on every timer
//! expiry and performs the returned delivery.

use std::time::Duration;

use oscsync_core::{Pulse, PulseCount, SlaveEndpoint, Tempo};

use crate::{ControlEvent, SlaveRegistry};

/// Who receives the pulse message produced by a tick
#[derive(Clone, Debug, PartialEq)]
pub enum Delivery {
    /// Steady-state tick, slaves interpolate locally
    Silent,
    /// Every registered slave, in snapshot order
    All(Vec<SlaveEndpoint>),
    /// Only the slave added on this tick
    One(SlaveEndpoint),
}

impl Delivery {
    pub fn targets(&self) -> &[SlaveEndpoint] {
        match self {
            Delivery::Silent => &[],
            Delivery::All(slaves) => slaves,
            Delivery::One(slave) => std::slice::from_ref(slave),
        }
    }
}

/// Result of one tick
#[derive(Clone, Debug, PartialEq)]
pub struct TickOutcome {
    /// Snapshot to send
    pub pulse: Pulse,
    pub delivery: Delivery,
    /// The timer must be replaced at the new interval
    pub tempo_changed: bool,
    /// Registry membership differs from the previous tick
    pub membership_changed: bool,
}

/// Counters for the clock loop
#[derive(Clone, Debug, Default)]
pub struct MasterStats {
    pub ticks: u64,
    pub broadcasts: u64,
    pub direct_sends: u64,
    pub send_failures: u64,
    pub tempo_changes: u64,
}

/// Authoritative tempo and pulse count
pub struct TempoClock {
    tempo: Tempo,
    count: PulseCount,
    registry: SlaveRegistry,
    stats: MasterStats,
}

impl TempoClock {
    /// Create a clock at pulse zero
    pub fn new(tempo: Tempo) -> Self {
        TempoClock {
            tempo,
            count: PulseCount::ZERO,
            registry: SlaveRegistry::new(),
            stats: MasterStats::default(),
        }
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn pulse_count(&self) -> PulseCount {
        self.count
    }

    pub fn pulse_interval(&self) -> Duration {
        self.tempo.pulse_interval()
    }

    pub fn registry(&self) -> &SlaveRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &MasterStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut MasterStats {
        &mut self.stats
    }

    /// Current snapshot without advancing
    pub fn pulse(&self) -> Pulse {
        Pulse::new(self.tempo, self.count)
    }

    /// Advance by one pulse, applying at most one control event first
    pub fn tick(&mut self, event: Option<ControlEvent>) -> TickOutcome {
        self.stats.ticks += 1;

        let mut new_slave = None;
        let mut tempo_set = false;
        let mut tempo_changed = false;
        let mut membership_changed = false;

        match event {
            Some(ControlEvent::SlaveAdd(slave)) => {
                // A re-announcing slave is greeted again but not double-counted
                membership_changed = self.registry.add(slave);
                new_slave = Some(slave);
            }
            Some(ControlEvent::SlaveRemove(slave)) => {
                membership_changed = self.registry.remove(&slave);
            }
            Some(ControlEvent::TempoSet(tempo)) => {
                tempo_set = true;
                tempo_changed = tempo != self.tempo;
                self.tempo = tempo;
            }
            None => {}
        }

        self.count = self.count.next();

        let delivery = if tempo_set || self.count.is_bar_boundary() {
            Delivery::All(self.registry.snapshot())
        } else if let Some(slave) = new_slave {
            Delivery::One(slave)
        } else {
            Delivery::Silent
        };

        match &delivery {
            Delivery::All(_) => self.stats.broadcasts += 1,
            Delivery::One(_) => self.stats.direct_sends += 1,
            Delivery::Silent => {}
        }
        if tempo_changed {
            self.stats.tempo_changes += 1;
        }

        TickOutcome {
            pulse: self.pulse(),
            delivery,
            tempo_changed,
            membership_changed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slave(port: u16) -> SlaveEndpoint {
        SlaveEndpoint::new(([127, 0, 0, 1], port).into())
    }

    fn tempo(bpm: f32) -> Tempo {
        Tempo::new(bpm).unwrap()
    }

    #[test]
    fn test_count_advances_once_per_tick() {
        let mut clock = TempoClock::new(Tempo::DEFAULT);
        clock.tick(None);
        clock.tick(Some(ControlEvent::TempoSet(tempo(90.0))));
        clock.tick(Some(ControlEvent::SlaveAdd(slave(9000))));
        clock.tick(Some(ControlEvent::SlaveRemove(slave(9000))));
        assert_eq!(clock.pulse_count(), PulseCount::new(4));
    }

    #[test]
    fn test_one_broadcast_per_bar() {
        let mut clock = TempoClock::new(Tempo::DEFAULT);
        clock.tick(Some(ControlEvent::SlaveAdd(slave(9000))));

        let mut broadcasts = Vec::new();
        for _ in 1..96 {
            let outcome = clock.tick(None);
            if outcome.delivery != Delivery::Silent {
                broadcasts.push(outcome.pulse.count);
            }
        }

        assert_eq!(clock.pulse_count(), PulseCount::new(96));
        assert_eq!(broadcasts, vec![PulseCount::new(96)]);
    }

    #[test]
    fn test_bar_broadcast_reaches_all_slaves() {
        let mut clock = TempoClock::new(Tempo::DEFAULT);
        clock.tick(Some(ControlEvent::SlaveAdd(slave(9000))));
        clock.tick(Some(ControlEvent::SlaveAdd(slave(9001))));
        for _ in 2..95 {
            clock.tick(None);
        }

        let outcome = clock.tick(None);
        assert_eq!(outcome.pulse.count, PulseCount::new(96));
        assert_eq!(outcome.delivery, Delivery::All(vec![slave(9000), slave(9001)]));
    }

    #[test]
    fn test_tempo_set_broadcasts_immediately() {
        let mut clock = TempoClock::new(Tempo::DEFAULT);
        clock.tick(Some(ControlEvent::SlaveAdd(slave(9000))));
        for _ in 0..10 {
            clock.tick(None);
        }

        let outcome = clock.tick(Some(ControlEvent::TempoSet(tempo(90.0))));
        assert_eq!(outcome.pulse, Pulse::new(tempo(90.0), PulseCount::new(12)));
        assert_eq!(outcome.delivery, Delivery::All(vec![slave(9000)]));
        assert!(outcome.tempo_changed);
        assert_eq!(clock.pulse_interval(), tempo(90.0).pulse_interval());
    }

    #[test]
    fn test_same_tempo_broadcasts_without_timer_change() {
        let mut clock = TempoClock::new(Tempo::DEFAULT);
        let outcome = clock.tick(Some(ControlEvent::TempoSet(Tempo::DEFAULT)));
        assert!(matches!(outcome.delivery, Delivery::All(_)));
        assert!(!outcome.tempo_changed);
    }

    #[test]
    fn test_new_slave_greeted_alone() {
        let mut clock = TempoClock::new(Tempo::DEFAULT);
        clock.tick(Some(ControlEvent::SlaveAdd(slave(9000))));
        clock.tick(None);

        let outcome = clock.tick(Some(ControlEvent::SlaveAdd(slave(9001))));
        assert_eq!(outcome.delivery, Delivery::One(slave(9001)));
        assert_eq!(outcome.pulse, Pulse::new(Tempo::DEFAULT, PulseCount::new(3)));
        assert!(outcome.membership_changed);
    }

    #[test]
    fn test_new_slave_on_bar_gets_single_broadcast() {
        let mut clock = TempoClock::new(Tempo::DEFAULT);
        for _ in 0..95 {
            clock.tick(None);
        }

        let outcome = clock.tick(Some(ControlEvent::SlaveAdd(slave(9000))));
        assert_eq!(outcome.pulse.count, PulseCount::new(96));
        assert_eq!(outcome.delivery, Delivery::All(vec![slave(9000)]));
    }

    #[test]
    fn test_duplicate_add_keeps_one_entry() {
        let mut clock = TempoClock::new(Tempo::DEFAULT);
        clock.tick(Some(ControlEvent::SlaveAdd(slave(9000))));
        let outcome = clock.tick(Some(ControlEvent::SlaveAdd(slave(9000))));

        assert_eq!(clock.registry().len(), 1);
        assert!(!outcome.membership_changed);
        assert_eq!(outcome.delivery, Delivery::One(slave(9000)));
    }

    #[test]
    fn test_removed_slave_misses_bar_broadcast() {
        let mut clock = TempoClock::new(Tempo::DEFAULT);
        clock.tick(Some(ControlEvent::SlaveAdd(slave(9000))));
        clock.tick(Some(ControlEvent::SlaveRemove(slave(9000))));
        let outcome = clock.tick(Some(ControlEvent::SlaveRemove(slave(9000))));
        assert!(!outcome.membership_changed);

        for _ in 3..95 {
            clock.tick(None);
        }
        let outcome = clock.tick(None);
        assert_eq!(outcome.delivery, Delivery::All(Vec::new()));
    }
}
