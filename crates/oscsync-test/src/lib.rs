//! oscsync Test Harness - protocol validation under hostile networks
//!
//! This crate provides:
//! - A chaos link that drops, delays and duplicates outbound messages
//! - An in-memory master plus slaves harness with pulse recording

pub mod chaos;
pub mod harness;

pub use chaos::*;
pub use harness::*;
