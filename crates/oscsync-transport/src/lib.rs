//! oscsync Transport Layer - datagram delivery of protocol messages
//!
//! This crate provides:
//! - UDP transport
//! - Background receive loop
//! - The `MessageSender` seam used by the master loop and the client
//! - In-memory transport for tests and simulation

pub mod memory;
pub mod sender;
pub mod udp;

pub use memory::*;
pub use sender::*;
pub use udp::*;
