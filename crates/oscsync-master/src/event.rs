//! Control events consumed by the clock loop

use oscsync_core::{SlaveEndpoint, Tempo};

/// A validated request to mutate master state
///
/// Produced by dispatch, consumed only by the clock loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlEvent {
    TempoSet(Tempo),
    SlaveAdd(SlaveEndpoint),
    SlaveRemove(SlaveEndpoint),
}
