//! Tempo and the tempo-to-interval mapping
//!
//! Master and slaves MUST derive the pulse interval from the same function.
//! Both ends call [`Tempo::pulse_interval`]; nothing else converts tempo to time.

use std::fmt;
use std::time::Duration;

use crate::{SyncError, SyncResult, PULSES_PER_BEAT};

/// Default tempo in beats per minute
pub const DEFAULT_TEMPO: f32 = 120.0;

/// Highest accepted tempo in beats per minute
pub const MAX_TEMPO: f32 = 6000.0;

/// Scaling constant K in nanoseconds·BPM: one minute split into `PULSES_PER_BEAT` pulses
pub const PULSE_INTERVAL_K_NANOS: f64 = 60_000_000_000.0 / PULSES_PER_BEAT as f64;

/// Tempo in beats per minute
/// INVARIANT: finite and within (0, MAX_TEMPO]
#[derive(Clone, Copy, PartialEq, PartialOrd)]
pub struct Tempo(f32);

impl Tempo {
    pub const DEFAULT: Tempo = Tempo(DEFAULT_TEMPO);

    /// Validate a raw BPM value
    pub fn new(bpm: f32) -> SyncResult<Self> {
        if bpm.is_finite() && bpm > 0.0 && bpm <= MAX_TEMPO {
            Ok(Tempo(bpm))
        } else {
            Err(SyncError::InvalidTempo(bpm))
        }
    }

    #[inline]
    pub fn bpm(self) -> f32 {
        self.0
    }

    /// Interval between two pulses at this tempo: `K / tempo`
    #[inline]
    pub fn pulse_interval(self) -> Duration {
        Duration::from_nanos((PULSE_INTERVAL_K_NANOS / self.0 as f64) as u64)
    }

    /// Duration of a full bar at this tempo
    pub fn bar_duration(self) -> Duration {
        self.pulse_interval() * crate::PULSES_PER_BAR as u32
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Tempo::DEFAULT
    }
}

impl TryFrom<f32> for Tempo {
    type Error = SyncError;

    fn try_from(bpm: f32) -> SyncResult<Self> {
        Tempo::new(bpm)
    }
}

impl fmt::Debug for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tempo({}bpm)", self.0)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
