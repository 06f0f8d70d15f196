//! oscsync Wire Protocol - OSC message format
//!
//! This crate implements the wire format for oscsync datagrams:
//! - OSC 1.0 messages (padded address, type tags, big-endian arguments)
//! - Protocol addresses
//! - Translation between OSC messages and typed protocol messages

pub mod address;
pub mod message;
pub mod osc;

pub use address::*;
pub use message::*;
pub use osc::*;
