//! Typed protocol messages
//!
//! Translates between raw OSC messages and the events the master and slaves
//! act on. Argument validation happens here; semantic validation (tempo
//! range, host resolution) is left to the receiving side.

use bytes::Bytes;

use oscsync_core::{Pulse, PulseCount, SyncError, SyncResult, Tempo};

use crate::{
    OscArg, OscMessage, ADDRESS_PULSE, ADDRESS_REPLY, ADDRESS_SLAVE_ADD, ADDRESS_SLAVE_LIST,
    ADDRESS_SLAVE_REMOVE, ADDRESS_TEMPO,
};

/// A decoded protocol message
#[derive(Clone, Debug, PartialEq)]
pub enum SyncMessage {
    /// Request a tempo change; the raw value is validated by the master
    TempoSet(f32),
    /// Ask the master for its current tempo
    TempoQuery,
    /// Subscribe a slave listening on host:port
    SlaveAdd { host: String, port: i32 },
    /// Unsubscribe a slave
    SlaveRemove { host: String, port: i32 },
    /// Ask the master for its subscribed slaves
    SlaveList,
    /// Authoritative clock snapshot from the master
    Pulse(Pulse),
    /// Response envelope: original address plus payload
    Reply { address: String, args: Vec<OscArg> },
}

impl SyncMessage {
    /// OSC address this message travels on
    pub fn address(&self) -> &str {
        match self {
            SyncMessage::TempoSet(_) | SyncMessage::TempoQuery => ADDRESS_TEMPO,
            SyncMessage::SlaveAdd { .. } => ADDRESS_SLAVE_ADD,
            SyncMessage::SlaveRemove { .. } => ADDRESS_SLAVE_REMOVE,
            SyncMessage::SlaveList => ADDRESS_SLAVE_LIST,
            SyncMessage::Pulse(_) => ADDRESS_PULSE,
            SyncMessage::Reply { .. } => ADDRESS_REPLY,
        }
    }

    /// Build the reply to a tempo query
    pub fn tempo_reply(tempo: Tempo) -> Self {
        SyncMessage::Reply {
            address: ADDRESS_TEMPO.to_owned(),
            args: vec![OscArg::Float(tempo.bpm())],
        }
    }

    /// Convert to an OSC message
    pub fn to_osc(&self) -> OscMessage {
        let msg = OscMessage::new(self.address());
        match self {
            SyncMessage::TempoSet(bpm) => msg.with_arg(OscArg::Float(*bpm)),
            SyncMessage::TempoQuery | SyncMessage::SlaveList => msg,
            SyncMessage::SlaveAdd { host, port } | SyncMessage::SlaveRemove { host, port } => msg
                .with_arg(OscArg::Str(host.clone()))
                .with_arg(OscArg::Int(*port)),
            SyncMessage::Pulse(pulse) => msg
                .with_arg(OscArg::Float(pulse.tempo.bpm()))
                .with_arg(OscArg::Int(pulse.count.to_wire())),
            SyncMessage::Reply { address, args } => msg
                .with_arg(OscArg::Str(address.clone()))
                .with_args(args.iter().cloned()),
        }
    }

    /// Interpret an OSC message
    pub fn from_osc(msg: OscMessage) -> SyncResult<Self> {
        let args = msg.args;
        match msg.address.as_str() {
            ADDRESS_TEMPO => {
                if args.is_empty() {
                    Ok(SyncMessage::TempoQuery)
                } else {
                    expect_count(ADDRESS_TEMPO, &args, 1)?;
                    Ok(SyncMessage::TempoSet(float_arg(ADDRESS_TEMPO, &args, 0)?))
                }
            }
            ADDRESS_SLAVE_ADD => {
                let (host, port) = host_port(ADDRESS_SLAVE_ADD, &args)?;
                Ok(SyncMessage::SlaveAdd { host, port })
            }
            ADDRESS_SLAVE_REMOVE => {
                let (host, port) = host_port(ADDRESS_SLAVE_REMOVE, &args)?;
                Ok(SyncMessage::SlaveRemove { host, port })
            }
            ADDRESS_SLAVE_LIST => {
                expect_count(ADDRESS_SLAVE_LIST, &args, 0)?;
                Ok(SyncMessage::SlaveList)
            }
            ADDRESS_PULSE => {
                expect_count(ADDRESS_PULSE, &args, 2)?;
                let tempo = Tempo::new(float_arg(ADDRESS_PULSE, &args, 0)?)?;
                let count = PulseCount::from_wire(int_arg(ADDRESS_PULSE, &args, 1)?);
                Ok(SyncMessage::Pulse(Pulse::new(tempo, count)))
            }
            ADDRESS_REPLY => {
                if args.is_empty() {
                    return Err(SyncError::ArgumentCount {
                        address: ADDRESS_REPLY,
                        expected: 1,
                        actual: 0,
                    });
                }
                let mut args = args;
                let address = match args.remove(0) {
                    OscArg::Str(s) => s,
                    _ => {
                        return Err(SyncError::ArgumentType {
                            address: ADDRESS_REPLY,
                            index: 0,
                            expected: "string",
                        })
                    }
                };
                Ok(SyncMessage::Reply { address, args })
            }
            other => Err(SyncError::UnknownAddress(other.to_owned())),
        }
    }

    /// Encode to a datagram
    pub fn encode(&self) -> SyncResult<Bytes> {
        self.to_osc().encode()
    }

    /// Decode a datagram
    pub fn decode(buf: &[u8]) -> SyncResult<Self> {
        Self::from_osc(OscMessage::parse(buf)?)
    }
}

fn expect_count(address: &'static str, args: &[OscArg], expected: usize) -> SyncResult<()> {
    if args.len() != expected {
        return Err(SyncError::ArgumentCount {
            address,
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

fn float_arg(address: &'static str, args: &[OscArg], index: usize) -> SyncResult<f32> {
    args[index].as_float().ok_or(SyncError::ArgumentType {
        address,
        index,
        expected: "float32",
    })
}

fn int_arg(address: &'static str, args: &[OscArg], index: usize) -> SyncResult<i32> {
    args[index].as_int().ok_or(SyncError::ArgumentType {
        address,
        index,
        expected: "int32",
    })
}

fn host_port(address: &'static str, args: &[OscArg]) -> SyncResult<(String, i32)> {
    expect_count(address, args, 2)?;
    let host = args[0]
        .as_str()
        .ok_or(SyncError::ArgumentType {
            address,
            index: 0,
            expected: "string",
        })?
        .to_owned();
    let port = int_arg(address, args, 1)?;
    Ok((host, port))
}

/// Read the tempo out of a `/reply` to a tempo query
pub fn tempo_from_reply(args: &[OscArg]) -> SyncResult<Tempo> {
    expect_count(ADDRESS_REPLY, args, 1)?;
    Tempo::new(float_arg(ADDRESS_REPLY, args, 0)?)
}

/// Read host/port pairs out of a `/reply` to a slave list query
pub fn slaves_from_reply(args: &[OscArg]) -> SyncResult<Vec<(String, i32)>> {
    if args.len() % 2 != 0 {
        return Err(SyncError::InvalidWireFormat(
            "Slave list reply must hold host/port pairs".into(),
        ));
    }
    args.chunks(2)
        .map(|pair| host_port(ADDRESS_REPLY, pair))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo_query_has_no_arguments() {
        let bytes = SyncMessage::TempoQuery.encode().unwrap();
        assert_eq!(SyncMessage::decode(&bytes).unwrap(), SyncMessage::TempoQuery);
    }

    #[test]
    fn test_tempo_set_keeps_raw_value() {
        // The codec does not judge the tempo; the master does
        let bytes = SyncMessage::TempoSet(-3.0).encode().unwrap();
        assert_eq!(SyncMessage::decode(&bytes).unwrap(), SyncMessage::TempoSet(-3.0));
    }

    #[test]
    fn test_pulse_decode() {
        let pulse = Pulse::new(Tempo::new(90.0).unwrap(), PulseCount::new(192));
        let bytes = SyncMessage::Pulse(pulse).encode().unwrap();
        assert_eq!(SyncMessage::decode(&bytes).unwrap(), SyncMessage::Pulse(pulse));
    }

    #[test]
    fn test_slave_add_wrong_argument_count() {
        let osc = OscMessage::new(ADDRESS_SLAVE_ADD).with_arg(OscArg::Str("127.0.0.1".into()));
        let err = SyncMessage::from_osc(osc).unwrap_err();
        assert!(matches!(
            err,
            SyncError::ArgumentCount {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_slave_add_wrong_argument_type() {
        let osc = OscMessage::new(ADDRESS_SLAVE_ADD)
            .with_arg(OscArg::Int(127))
            .with_arg(OscArg::Int(9000));
        let err = SyncMessage::from_osc(osc).unwrap_err();
        assert!(matches!(err, SyncError::ArgumentType { index: 0, .. }));
    }

    #[test]
    fn test_tempo_set_with_int_is_rejected() {
        let osc = OscMessage::new(ADDRESS_TEMPO).with_arg(OscArg::Int(120));
        assert!(matches!(
            SyncMessage::from_osc(osc),
            Err(SyncError::ArgumentType { .. })
        ));
    }

    #[test]
    fn test_unknown_address() {
        let osc = OscMessage::new("/sync/nope");
        assert!(matches!(
            SyncMessage::from_osc(osc),
            Err(SyncError::UnknownAddress(_))
        ));
    }

    #[test]
    fn test_tempo_reply_envelope() {
        let reply = SyncMessage::tempo_reply(Tempo::new(133.0).unwrap());
        let osc = reply.to_osc();
        assert_eq!(osc.address, ADDRESS_REPLY);
        assert_eq!(osc.args[0], OscArg::Str(ADDRESS_TEMPO.into()));

        let decoded = SyncMessage::decode(&reply.encode().unwrap()).unwrap();
        match decoded {
            SyncMessage::Reply { address, args } => {
                assert_eq!(address, ADDRESS_TEMPO);
                assert_eq!(tempo_from_reply(&args).unwrap().bpm(), 133.0);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_slave_list_reply_pairs() {
        let args = vec![
            OscArg::Str("127.0.0.1".into()),
            OscArg::Int(9000),
            OscArg::Str("10.0.0.2".into()),
            OscArg::Int(9001),
        ];
        let slaves = slaves_from_reply(&args).unwrap();
        assert_eq!(slaves, vec![("127.0.0.1".into(), 9000), ("10.0.0.2".into(), 9001)]);

        assert!(slaves_from_reply(&args[..3]).is_err());
    }
}
