//! oscsync Client - slave side of the sync protocol
//!
//! Turns sparse, jittery pulse messages from the master into a dense,
//! regular stream of `PulseHandler` calls:
//! - Announce to the master and wait for the first pulse
//! - Interpolate locally at the tempo-derived interval
//! - Stop at every bar boundary until the master confirms the count
//! - Restart the local timer whenever a pulse arrives mid-bar
//!
//! Also provides one-shot control operations (tempo query/set, slave list).

pub mod client;
pub mod config;
pub mod control;
pub mod handler;
pub mod ticker;

pub use client::*;
pub use config::*;
pub use control::*;
pub use handler::*;
pub use ticker::*;
