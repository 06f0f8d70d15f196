//! Set of subscribed slaves

use std::collections::BTreeSet;

use oscsync_core::SlaveEndpoint;

/// Currently subscribed slave endpoints
///
/// Owned by the clock loop; there is no interior locking.
#[derive(Clone, Debug, Default)]
pub struct SlaveRegistry {
    slaves: BTreeSet<SlaveEndpoint>,
}

impl SlaveRegistry {
    pub fn new() -> Self {
        SlaveRegistry::default()
    }

    /// Add a slave. Returns false if it was already subscribed.
    pub fn add(&mut self, slave: SlaveEndpoint) -> bool {
        self.slaves.insert(slave)
    }

    /// Remove a slave. Returns false if it was not subscribed.
    pub fn remove(&mut self, slave: &SlaveEndpoint) -> bool {
        self.slaves.remove(slave)
    }

    pub fn contains(&self, slave: &SlaveEndpoint) -> bool {
        self.slaves.contains(slave)
    }

    pub fn len(&self) -> usize {
        self.slaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slaves.is_empty()
    }

    /// Fresh copy of the membership, detached from later mutation
    pub fn snapshot(&self) -> Vec<SlaveEndpoint> {
        self.slaves.iter().copied().collect()
    }
}
