//! RPC wire shape shared by TCP and UDP sessions (spec.md §6).
//!
//! Grounded on `t51core::net::frame`'s `ConnectionToken`/payload
//! serialization style (explicit big-endian field-by-field decode with an
//! early bail on short buffers) but built on top of `hobgoblin_codec::Packet`
//! instead of a raw `byteorder` cursor, since the packet already gives us
//! the validity-latch semantics the teacher's `io::Result` unwinds emulate
//! by hand.

use hobgoblin_codec::Packet;

use crate::error::NetError;

/// `TypeTag` values for the UDP wire protocol (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UdpTypeTag {
    Hello = 1,
    Connect = 2,
    Disconnect = 3,
    Data = 4,
    UnsafeData = 5,
}

impl UdpTypeTag {
    pub fn from_u8(tag: u8) -> Result<UdpTypeTag, NetError> {
        match tag {
            1 => Ok(UdpTypeTag::Hello),
            2 => Ok(UdpTypeTag::Connect),
            3 => Ok(UdpTypeTag::Disconnect),
            4 => Ok(UdpTypeTag::Data),
            5 => Ok(UdpTypeTag::UnsafeData),
            other => Err(NetError::illegal(format!("unknown UDP type tag {other}"))),
        }
    }
}

/// A decoded UDP frame, one variant per `TypeTag` in spec.md §6.
#[derive(Debug, Clone, PartialEq)]
pub enum UdpFrame {
    Hello { passphrase: String },
    Connect { passphrase: String },
    Disconnect,
    Data { ordinal: u32, body: RpcBody },
    UnsafeData {
        ordinal: u32,
        acks: Vec<u32>,
        body: RpcBody,
    },
}

/// Marks the end of an `UNSAFE_DATA` ack list (spec.md §6).
const ACK_TERMINATOR: u32 = 0xFFFF_FFFF;

impl UdpFrame {
    pub fn encode(&self) -> Packet {
        let mut p = Packet::new();
        match self {
            UdpFrame::Hello { passphrase } => {
                p.append(UdpTypeTag::Hello as u8);
                p.append_string(passphrase);
            }
            UdpFrame::Connect { passphrase } => {
                p.append(UdpTypeTag::Connect as u8);
                p.append_string(passphrase);
            }
            UdpFrame::Disconnect => {
                p.append(UdpTypeTag::Disconnect as u8);
            }
            UdpFrame::Data { ordinal, body } => {
                p.append(UdpTypeTag::Data as u8);
                p.append(*ordinal);
                body.encode_into(&mut p);
            }
            UdpFrame::UnsafeData { ordinal, acks, body } => {
                p.append(UdpTypeTag::UnsafeData as u8);
                p.append(*ordinal);
                for ack in acks {
                    p.append(*ack);
                }
                p.append(ACK_TERMINATOR);
                body.encode_into(&mut p);
            }
        }
        p
    }

    pub fn decode(bytes: Vec<u8>) -> Result<UdpFrame, NetError> {
        let mut p = Packet::from_bytes(bytes);
        let tag = p
            .try_extract::<u8>()
            .map_err(|_| NetError::illegal("empty UDP frame"))?;
        let frame = match UdpTypeTag::from_u8(tag)? {
            UdpTypeTag::Hello => UdpFrame::Hello {
                passphrase: p
                    .try_extract_string()
                    .map_err(|_| NetError::illegal("HELLO missing passphrase"))?,
            },
            UdpTypeTag::Connect => UdpFrame::Connect {
                passphrase: p
                    .try_extract_string()
                    .map_err(|_| NetError::illegal("CONNECT missing passphrase"))?,
            },
            UdpTypeTag::Disconnect => UdpFrame::Disconnect,
            UdpTypeTag::Data => {
                let ordinal = p
                    .try_extract::<u32>()
                    .map_err(|_| NetError::illegal("DATA missing ordinal"))?;
                let body = RpcBody::decode_from(&mut p)?;
                UdpFrame::Data { ordinal, body }
            }
            UdpTypeTag::UnsafeData => {
                let ordinal = p
                    .try_extract::<u32>()
                    .map_err(|_| NetError::illegal("UNSAFE_DATA missing ordinal"))?;
                let mut acks = Vec::new();
                loop {
                    let value = p
                        .try_extract::<u32>()
                        .map_err(|_| NetError::illegal("UNSAFE_DATA ack list unterminated"))?;
                    if value == ACK_TERMINATOR {
                        break;
                    }
                    acks.push(value);
                }
                let body = RpcBody::decode_from(&mut p)?;
                UdpFrame::UnsafeData { ordinal, acks, body }
            }
        };
        Ok(frame)
    }
}

/// One tagged argument value, per the `TaggedArg` grammar in spec.md §6.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Str(String),
    Packet(Packet),
}

impl ArgValue {
    fn tag(&self) -> u8 {
        match self {
            ArgValue::I8(_) => 0,
            ArgValue::I16(_) => 1,
            ArgValue::I32(_) => 2,
            ArgValue::I64(_) => 3,
            ArgValue::U8(_) => 4,
            ArgValue::U16(_) => 5,
            ArgValue::U32(_) => 6,
            ArgValue::U64(_) => 7,
            ArgValue::F32(_) => 8,
            ArgValue::F64(_) => 9,
            ArgValue::Bool(_) => 10,
            ArgValue::Str(_) => 11,
            ArgValue::Packet(_) => 12,
        }
    }

    fn encode_into(&self, p: &mut Packet) {
        p.append(self.tag());
        match self {
            ArgValue::I8(v) => p.append(*v),
            ArgValue::I16(v) => p.append(*v),
            ArgValue::I32(v) => p.append(*v),
            ArgValue::I64(v) => p.append(*v),
            ArgValue::U8(v) => p.append(*v),
            ArgValue::U16(v) => p.append(*v),
            ArgValue::U32(v) => p.append(*v),
            ArgValue::U64(v) => p.append(*v),
            ArgValue::F32(v) => p.append(*v),
            ArgValue::F64(v) => p.append(*v),
            ArgValue::Bool(v) => p.append(*v),
            ArgValue::Str(v) => p.append_string(v),
            ArgValue::Packet(v) => p.append_packet(v),
        }
    }

    fn decode_from(p: &mut Packet) -> Result<ArgValue, NetError> {
        let bad = |what: &str| NetError::illegal(format!("truncated {what} argument"));
        let tag = p.try_extract::<u8>().map_err(|_| bad("type-tag"))?;
        let value = match tag {
            0 => ArgValue::I8(p.try_extract().map_err(|_| bad("i8"))?),
            1 => ArgValue::I16(p.try_extract().map_err(|_| bad("i16"))?),
            2 => ArgValue::I32(p.try_extract().map_err(|_| bad("i32"))?),
            3 => ArgValue::I64(p.try_extract().map_err(|_| bad("i64"))?),
            4 => ArgValue::U8(p.try_extract().map_err(|_| bad("u8"))?),
            5 => ArgValue::U16(p.try_extract().map_err(|_| bad("u16"))?),
            6 => ArgValue::U32(p.try_extract().map_err(|_| bad("u32"))?),
            7 => ArgValue::U64(p.try_extract().map_err(|_| bad("u64"))?),
            8 => ArgValue::F32(p.try_extract().map_err(|_| bad("f32"))?),
            9 => ArgValue::F64(p.try_extract().map_err(|_| bad("f64"))?),
            10 => ArgValue::Bool(p.try_extract().map_err(|_| bad("bool"))?),
            11 => ArgValue::Str(p.try_extract_string().map_err(|_| bad("string"))?),
            12 => ArgValue::Packet(p.try_extract_packet().map_err(|_| bad("packet"))?),
            other => return Err(NetError::illegal(format!("unknown arg type-tag {other}"))),
        };
        Ok(value)
    }
}

/// Frame-kind byte at the front of an `RpcBody`: whether this was composed
/// from the tiny zero/one-arg path or the full nested-packet path
/// (spec.md §4.3's "INT8 for tiny/zero-arg messages, PACKET for
/// length-prefixed nested payload"). Both encode identically past this byte;
/// it is carried for wire compatibility with the TCP framing tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RpcBodyKind {
    Int8 = 0,
    Packet = 1,
}

/// `RpcBody := u8(argTag) u16(handlerIndex) u16(argCount) (TaggedArg)*`
/// (spec.md §6).
#[derive(Debug, Clone, PartialEq)]
pub struct RpcBody {
    pub kind: RpcBodyKind,
    pub handler_index: u16,
    pub args: Vec<ArgValue>,
}

impl RpcBody {
    pub fn new(handler_index: u16, args: Vec<ArgValue>) -> RpcBody {
        let kind = if args.is_empty() {
            RpcBodyKind::Int8
        } else {
            RpcBodyKind::Packet
        };
        RpcBody {
            kind,
            handler_index,
            args,
        }
    }

    /// Stand-alone encoding used by the TCP session, which length-prefixes
    /// the whole packet itself rather than embedding an ordinal the way UDP
    /// `DATA`/`UNSAFE_DATA` frames do (spec.md §4.3).
    pub fn encode(&self) -> Packet {
        let mut p = Packet::new();
        self.encode_into(&mut p);
        p
    }

    pub fn decode(bytes: Vec<u8>) -> Result<RpcBody, NetError> {
        let mut p = Packet::from_bytes(bytes);
        RpcBody::decode_from(&mut p)
    }

    fn encode_into(&self, p: &mut Packet) {
        p.append(self.kind as u8);
        p.append(self.handler_index);
        p.append(self.args.len() as u16);
        for arg in &self.args {
            arg.encode_into(p);
        }
    }

    fn decode_from(p: &mut Packet) -> Result<RpcBody, NetError> {
        let bad = |what: &str| NetError::illegal(format!("truncated RpcBody {what}"));
        let kind_byte = p.try_extract::<u8>().map_err(|_| bad("kind"))?;
        let kind = match kind_byte {
            0 => RpcBodyKind::Int8,
            1 => RpcBodyKind::Packet,
            other => return Err(NetError::illegal(format!("unknown RpcBody kind {other}"))),
        };
        let handler_index = p.try_extract::<u16>().map_err(|_| bad("handler index"))?;
        let arg_count = p.try_extract::<u16>().map_err(|_| bad("arg count"))?;
        let mut args = Vec::with_capacity(arg_count as usize);
        for _ in 0..arg_count {
            args.push(ArgValue::decode_from(p)?);
        }
        Ok(RpcBody {
            kind,
            handler_index,
            args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: UdpFrame) {
        let encoded = frame.encode();
        let decoded = UdpFrame::decode(encoded.into_bytes()).expect("decode");
        assert_eq!(decoded, frame);
    }

    #[test]
    fn hello_and_connect_roundtrip_passphrase() {
        roundtrip(UdpFrame::Hello {
            passphrase: "pw".into(),
        });
        roundtrip(UdpFrame::Connect {
            passphrase: "wrong".into(),
        });
        roundtrip(UdpFrame::Disconnect);
    }

    #[test]
    fn data_frame_roundtrips_rpc_body_with_mixed_args() {
        let body = RpcBody::new(
            7,
            vec![
                ArgValue::I8(-1),
                ArgValue::U32(0xDEAD_BEEF),
                ArgValue::Str("čćšđž".into()),
                ArgValue::Bool(true),
            ],
        );
        roundtrip(UdpFrame::Data { ordinal: 42, body });
    }

    #[test]
    fn unsafe_data_frame_roundtrips_ack_list_with_terminator() {
        let body = RpcBody::new(0, vec![ArgValue::I8(1)]);
        roundtrip(UdpFrame::UnsafeData {
            ordinal: 9,
            acks: vec![1, 2, 3],
            body,
        });
    }

    #[test]
    fn unsafe_data_frame_roundtrips_empty_ack_list() {
        let body = RpcBody::new(0, vec![]);
        roundtrip(UdpFrame::UnsafeData {
            ordinal: 9,
            acks: vec![],
            body,
        });
    }

    #[test]
    fn decoding_unknown_type_tag_is_illegal_message() {
        let bytes = vec![99u8];
        assert!(UdpFrame::decode(bytes).is_err());
    }

    #[test]
    fn decoding_truncated_data_frame_is_illegal_message() {
        let bytes = vec![UdpTypeTag::Data as u8, 0, 0];
        assert!(UdpFrame::decode(bytes).is_err());
    }
}
