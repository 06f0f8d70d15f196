//! oscsync Core - Fundamental types and primitives
//!
//! This crate defines the types shared by master and slaves:
//! - Tempo and the tempo-to-interval mapping
//! - Pulse counters and bar arithmetic
//! - Slave endpoint identity
//! - Protocol constants and the common error type

pub mod endpoint;
pub mod error;
pub mod pulse;
pub mod tempo;

pub use endpoint::*;
pub use error::*;
pub use pulse::*;
pub use tempo::*;

/// Default UDP listening port of the master
pub const MASTER_PORT: u16 = 5776;
