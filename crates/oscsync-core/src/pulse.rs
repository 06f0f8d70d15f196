//! Pulse counters and bar arithmetic

use std::fmt;

use crate::Tempo;

/// Number of pulses in a bar (resynchronization boundary)
pub const PULSES_PER_BAR: u64 = 96;

/// Number of pulses in a beat (four beats per bar)
pub const PULSES_PER_BEAT: u64 = 24;

/// Period of the wire pulse count: the largest whole number of bars that fits
/// a non-negative int32, so wire counts stay bar aligned across the wrap
pub const WIRE_COUNT_PERIOD: u64 = (i32::MAX as u64 + 1) / PULSES_PER_BAR * PULSES_PER_BAR;

/// Monotonic pulse counter since master start
/// INVARIANT: advances by exactly one per fired tick, never moves backwards on the master
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PulseCount(pub u64);

impl PulseCount {
    pub const ZERO: PulseCount = PulseCount(0);

    #[inline]
    pub fn new(count: u64) -> Self {
        PulseCount(count)
    }

    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }

    /// The following pulse
    #[inline]
    pub fn next(self) -> Self {
        PulseCount(self.0.wrapping_add(1))
    }

    /// True when this pulse completes a bar
    #[inline]
    pub fn is_bar_boundary(self) -> bool {
        self.0 % PULSES_PER_BAR == 0
    }

    /// Index of the bar this pulse belongs to
    #[inline]
    pub fn bar(self) -> u64 {
        self.0 / PULSES_PER_BAR
    }

    /// Position within the current bar (0..96)
    #[inline]
    pub fn pulse_in_bar(self) -> u64 {
        self.0 % PULSES_PER_BAR
    }

    /// First bar boundary strictly after this pulse
    pub fn next_bar_boundary(self) -> Self {
        PulseCount((self.bar() + 1) * PULSES_PER_BAR)
    }

    /// Wire representation (int32, wrapping at `WIRE_COUNT_PERIOD`)
    #[inline]
    pub fn to_wire(self) -> i32 {
        (self.0 % WIRE_COUNT_PERIOD) as i32
    }

    /// Decode from the wire representation; the result is below `WIRE_COUNT_PERIOD`
    #[inline]
    pub fn from_wire(raw: i32) -> Self {
        PulseCount(raw as u32 as u64 % WIRE_COUNT_PERIOD)
    }

    /// Restore the wrapped high part of a wire count from a nearby full count.
    /// Picks the value congruent to `self` modulo `WIRE_COUNT_PERIOD` closest to `reference`.
    pub fn unwrap_near(self, reference: PulseCount) -> Self {
        let low = self.0 % WIRE_COUNT_PERIOD;
        let base = reference.0 - reference.0 % WIRE_COUNT_PERIOD;
        let candidate = base.saturating_add(low);
        let half = WIRE_COUNT_PERIOD / 2;

        if candidate.saturating_add(half) < reference.0 {
            PulseCount(candidate.saturating_add(WIRE_COUNT_PERIOD))
        } else if candidate > reference.0.saturating_add(half) && candidate >= WIRE_COUNT_PERIOD {
            PulseCount(candidate - WIRE_COUNT_PERIOD)
        } else {
            PulseCount(candidate)
        }
    }
}

impl fmt::Debug for PulseCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pulse#{}", self.0)
    }
}

impl fmt::Display for PulseCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of the master clock sent to slaves
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pulse {
    pub tempo: Tempo,
    pub count: PulseCount,
}

impl Pulse {
    pub fn new(tempo: Tempo, count: PulseCount) -> Self {
        Pulse { tempo, count }
    }
}
