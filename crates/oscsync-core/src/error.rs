//! Error types for the oscsync protocol

use std::time::Duration;

use thiserror::Error;

/// Core oscsync errors
#[derive(Error, Debug)]
pub enum SyncError {
    // Wire errors
    #[error("Invalid wire format: {0}")]
    InvalidWireFormat(String),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Unknown address: {0}")]
    UnknownAddress(String),

    #[error("{address}: expected {expected} arguments, got {actual}")]
    ArgumentCount {
        address: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{address}: argument {index} must be {expected}")]
    ArgumentType {
        address: &'static str,
        index: usize,
        expected: &'static str,
    },

    // Protocol errors
    #[error("Invalid tempo: {0} bpm")]
    InvalidTempo(f32),

    #[error("Invalid port: {0}")]
    InvalidPort(i32),

    #[error("Timeout waiting for first pulse after {0:?}")]
    FirstPulseTimeout(Duration),

    #[error("Timeout waiting for reply to {address}")]
    ReplyTimeout { address: &'static str },

    #[error("Pulse handler failed: {0}")]
    Handler(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    // Transport errors
    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Cannot resolve {host}:{port}")]
    ResolveFailed { host: String, port: u16 },
}

/// Result type for oscsync operations
pub type SyncResult<T> = Result<T, SyncError>;
