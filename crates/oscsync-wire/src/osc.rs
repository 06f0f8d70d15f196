//! OSC 1.0 message encoding
//!
//! Message layout:
//! - Address pattern: ASCII, NUL-terminated, padded to a multiple of 4 bytes
//! - Type tag string: ',' followed by one tag per argument, NUL-terminated, padded
//! - Arguments in tag order, big-endian:
//!   - 'i': int32 (4 bytes)
//!   - 'f': float32 (4 bytes)
//!   - 's': string, NUL-terminated, padded
//!
//! Bundles are not part of the sync protocol and are rejected.

use bytes::{BufMut, Bytes, BytesMut};

use oscsync_core::{SyncError, SyncResult};

/// Maximum datagram size (MTU-friendly)
pub const MAX_PACKET_SIZE: usize = 1400;

/// A single typed OSC argument
#[derive(Clone, Debug, PartialEq)]
pub enum OscArg {
    Int(i32),
    Float(f32),
    Str(String),
}

impl OscArg {
    /// Type tag character
    pub fn tag(&self) -> u8 {
        match self {
            OscArg::Int(_) => b'i',
            OscArg::Float(_) => b'f',
            OscArg::Str(_) => b's',
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            OscArg::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            OscArg::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OscArg::Str(s) => Some(s),
            _ => None,
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            OscArg::Int(_) | OscArg::Float(_) => 4,
            OscArg::Str(s) => padded_len(s.len() + 1),
        }
    }
}

/// An OSC message: address pattern plus arguments
#[derive(Clone, Debug, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>) -> Self {
        OscMessage {
            address: address.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: OscArg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = OscArg>) -> Self {
        self.args.extend(args);
        self
    }

    /// Size of the encoded message in bytes
    pub fn encoded_len(&self) -> usize {
        padded_len(self.address.len() + 1)
            + padded_len(self.args.len() + 2)
            + self.args.iter().map(OscArg::encoded_len).sum::<usize>()
    }

    /// Serialize to an OSC datagram
    pub fn encode(&self) -> SyncResult<Bytes> {
        if !self.address.starts_with('/') {
            return Err(SyncError::InvalidWireFormat(format!(
                "Address must start with '/': {}",
                self.address
            )));
        }

        let total = self.encoded_len();
        if total > MAX_PACKET_SIZE {
            return Err(SyncError::InvalidWireFormat(format!(
                "Message too large: {} > {}",
                total, MAX_PACKET_SIZE
            )));
        }

        let mut buf = BytesMut::with_capacity(total);
        put_padded_str(&mut buf, &self.address)?;

        let mut tags = String::with_capacity(self.args.len() + 1);
        tags.push(',');
        tags.extend(self.args.iter().map(|a| a.tag() as char));
        put_padded_str(&mut buf, &tags)?;

        for arg in &self.args {
            match arg {
                OscArg::Int(v) => buf.put_i32(*v),
                OscArg::Float(v) => buf.put_f32(*v),
                OscArg::Str(s) => put_padded_str(&mut buf, s)?,
            }
        }

        debug_assert_eq!(buf.len(), total);
        Ok(buf.freeze())
    }

    /// Parse an OSC datagram
    pub fn parse(buf: &[u8]) -> SyncResult<Self> {
        if buf.len() % 4 != 0 {
            return Err(SyncError::InvalidWireFormat(format!(
                "Packet length {} is not a multiple of 4",
                buf.len()
            )));
        }

        let (address, mut offset) = read_padded_str(buf, 0)?;
        if address == "#bundle" {
            return Err(SyncError::InvalidWireFormat("OSC bundles are not supported".into()));
        }
        if !address.starts_with('/') {
            return Err(SyncError::InvalidWireFormat(format!("Bad address: {}", address)));
        }

        // A message with no type tag string carries no arguments
        if offset == buf.len() {
            return Ok(OscMessage::new(address));
        }

        let (tags, next) = read_padded_str(buf, offset)?;
        offset = next;
        let tags = tags
            .strip_prefix(',')
            .ok_or_else(|| SyncError::InvalidWireFormat("Type tags must start with ','".into()))?;

        let mut args = Vec::with_capacity(tags.len());
        for tag in tags.bytes() {
            match tag {
                b'i' => {
                    args.push(OscArg::Int(i32::from_be_bytes(read_word(buf, offset)?)));
                    offset += 4;
                }
                b'f' => {
                    args.push(OscArg::Float(f32::from_be_bytes(read_word(buf, offset)?)));
                    offset += 4;
                }
                b's' => {
                    let (s, next) = read_padded_str(buf, offset)?;
                    args.push(OscArg::Str(s));
                    offset = next;
                }
                other => {
                    return Err(SyncError::InvalidWireFormat(format!(
                        "Unsupported type tag '{}'",
                        other as char
                    )));
                }
            }
        }

        if offset != buf.len() {
            return Err(SyncError::InvalidWireFormat(format!(
                "{} trailing bytes after arguments",
                buf.len() - offset
            )));
        }

        Ok(OscMessage { address, args })
    }
}

/// Round up to the next multiple of 4
#[inline]
fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

fn put_padded_str(buf: &mut BytesMut, s: &str) -> SyncResult<()> {
    if s.as_bytes().contains(&0) {
        return Err(SyncError::InvalidWireFormat("String contains NUL".into()));
    }
    let padded = padded_len(s.len() + 1);
    buf.put_slice(s.as_bytes());
    buf.put_bytes(0, padded - s.len());
    Ok(())
}

fn read_word(buf: &[u8], offset: usize) -> SyncResult<[u8; 4]> {
    buf.get(offset..offset + 4)
        .and_then(|w| w.try_into().ok())
        .ok_or(SyncError::BufferTooShort {
            expected: offset + 4,
            actual: buf.len(),
        })
}

/// Read a NUL-terminated, 4-byte padded string; returns it with the offset past the padding
fn read_padded_str(buf: &[u8], offset: usize) -> SyncResult<(String, usize)> {
    let rest = buf.get(offset..).unwrap_or_default();
    let nul = rest.iter().position(|b| *b == 0).ok_or(SyncError::BufferTooShort {
        expected: buf.len() + 1,
        actual: buf.len(),
    })?;

    let s = std::str::from_utf8(&rest[..nul])
        .map_err(|e| SyncError::InvalidWireFormat(format!("Invalid UTF-8: {}", e)))?
        .to_owned();

    let end = offset + padded_len(nul + 1);
    if end > buf.len() {
        return Err(SyncError::BufferTooShort {
            expected: end,
            actual: buf.len(),
        });
    }
    if buf[offset + nul..end].iter().any(|b| *b != 0) {
        return Err(SyncError::InvalidWireFormat("Non-zero string padding".into()));
    }

    Ok((s, end))
}
