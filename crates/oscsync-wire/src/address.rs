//! OSC addresses of the sync protocol

/// Tempo set (one float argument) or query (no arguments)
pub const ADDRESS_TEMPO: &str = "/sync/tempo";

/// Slave announcement: host, port
pub const ADDRESS_SLAVE_ADD: &str = "/sync/slave/add";

/// Slave departure: host, port
pub const ADDRESS_SLAVE_REMOVE: &str = "/sync/slave/remove";

/// Query the registered slaves
pub const ADDRESS_SLAVE_LIST: &str = "/sync/slave/list";

/// Master to slave pulse: tempo, count
pub const ADDRESS_PULSE: &str = "/sync/pulse";

/// Generic response envelope: original address, payload...
pub const ADDRESS_REPLY: &str = "/reply";
