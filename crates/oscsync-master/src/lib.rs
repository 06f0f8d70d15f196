//! oscsync Master - authoritative tempo clock
//!
//! The master runs two activities that share one shutdown signal:
//! 1. Dispatch: decode datagrams, answer queries, queue control events
//! 2. Clock loop: the sole owner of tempo, pulse count and slave registry
//!
//! Per tick the clock loop:
//! 1. Takes at most one queued control event
//! 2. Applies its membership side effect
//! 3. Advances the pulse count
//! 4. Broadcasts on tempo change or bar boundary, else greets a new slave
//! 5. Replaces its timer when the tempo changed

pub mod clock;
pub mod config;
pub mod driver;
pub mod event;
pub mod registry;
pub mod server;

pub use clock::*;
pub use config::*;
pub use driver::*;
pub use event::*;
pub use registry::*;
pub use server::*;
