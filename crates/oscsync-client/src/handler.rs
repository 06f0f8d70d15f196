//! Pulse consumer capability

use oscsync_core::{Pulse, SyncResult};

/// Receives one call per local pulse
///
/// An error ends the sync session; reconnecting is the caller's decision.
pub trait PulseHandler: Send {
    fn on_pulse(&mut self, pulse: Pulse) -> SyncResult<()>;
}

impl<F> PulseHandler for F
where
    F: FnMut(Pulse) -> SyncResult<()> + Send,
{
    fn on_pulse(&mut self, pulse: Pulse) -> SyncResult<()> {
        self(pulse)
    }
}
