//! Frames exchanged with the CAEN HV wrapper bridge.
//!
//! Requests are `0xCA | opcode | len (u16 BE) | payload`. Replies are
//! `0xCA | opcode | return code (i32 BE) | len (u16 BE) | payload`, with a tagged payload.
//! Parameter and property names always travel in fixed 10 byte, NUL padded slots.

use core::fmt;

use strum_macros::{Display, EnumIter, IntoStaticStr};

use crate::error::{Error, Result};

/// Start of every frame in both directions.
pub const FRAME_MARKER: u8 = 0xCA;
/// Width of one parameter name slot, as used by the firmware name lists.
pub const NAME_SLOT_LEN: usize = 10;
/// Marker, opcode and payload length.
pub const REQUEST_HEADER_LEN: usize = 4;
/// Marker, opcode, return code and payload length.
pub const REPLY_HEADER_LEN: usize = 8;

/// `CAENHV_InitSystem` system type used for the R8033DM.
pub const SYSTEM_TYPE: u8 = 13;
/// `CAENHV_InitSystem` link type for TCP/IP.
pub const LINK_TCPIP: u8 = 0;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Init = 0x01,
    Deinit = 0x02,
    BoardParamInfo = 0x10,
    ChannelParamInfo = 0x11,
    BoardParamProp = 0x12,
    ChannelParamProp = 0x13,
    GetBoardParam = 0x20,
    SetBoardParam = 0x21,
    GetChannelParam = 0x22,
    SetChannelParam = 0x23,
}

impl TryFrom<u8> for OpCode {
    type Error = ();

    fn try_from(value: u8) -> core::result::Result<Self, Self::Error> {
        use OpCode as Op;
        match value {
            0x01 => Ok(Op::Init),
            0x02 => Ok(Op::Deinit),
            0x10 => Ok(Op::BoardParamInfo),
            0x11 => Ok(Op::ChannelParamInfo),
            0x12 => Ok(Op::BoardParamProp),
            0x13 => Ok(Op::ChannelParamProp),
            0x20 => Ok(Op::GetBoardParam),
            0x21 => Ok(Op::SetBoardParam),
            0x22 => Ok(Op::GetChannelParam),
            0x23 => Ok(Op::SetChannelParam),
            _ => Err(()),
        }
    }
}

/// Parameter sub-properties which can be queried by name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter, Display, IntoStaticStr)]
pub enum Property {
    Type,
    Mode,
    Minval,
    Maxval,
    Unit,
    Exp,
    Onstate,
    Offstate,
}

/// Register flavour used on the wire. Only `Float` parameters are transferred as floats.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    Float = 0x00,
    UInt = 0x01,
}

/// A value written to a parameter.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum WireValue {
    Float(f32),
    UInt(u32),
}

/// Firmware return code. Zero means success.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReturnCode(pub i32);

impl ReturnCode {
    pub const OK: ReturnCode = ReturnCode(0);

    pub fn is_ok(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// One call into the HV system.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Init {
        address: String,
        username: String,
        password: String,
    },
    Deinit,
    BoardParamInfo {
        slot: u16,
    },
    ChannelParamInfo {
        slot: u16,
        channel: u16,
    },
    BoardParamProp {
        slot: u16,
        param: String,
        property: Property,
    },
    ChannelParamProp {
        slot: u16,
        channel: u16,
        param: String,
        property: Property,
    },
    GetBoardParam {
        slot: u16,
        param: String,
        wire: WireType,
    },
    SetBoardParam {
        slot: u16,
        param: String,
        value: WireValue,
    },
    GetChannelParam {
        slot: u16,
        channel: u16,
        param: String,
        wire: WireType,
    },
    SetChannelParam {
        slot: u16,
        channel: u16,
        param: String,
        value: WireValue,
    },
}

impl Request {
    pub fn opcode(&self) -> OpCode {
        match self {
            Request::Init { .. } => OpCode::Init,
            Request::Deinit => OpCode::Deinit,
            Request::BoardParamInfo { .. } => OpCode::BoardParamInfo,
            Request::ChannelParamInfo { .. } => OpCode::ChannelParamInfo,
            Request::BoardParamProp { .. } => OpCode::BoardParamProp,
            Request::ChannelParamProp { .. } => OpCode::ChannelParamProp,
            Request::GetBoardParam { .. } => OpCode::GetBoardParam,
            Request::SetBoardParam { .. } => OpCode::SetBoardParam,
            Request::GetChannelParam { .. } => OpCode::GetChannelParam,
            Request::SetChannelParam { .. } => OpCode::SetChannelParam,
        }
    }

    /// Append the complete frame for this request to `buff`.
    pub fn encode<I: embedded_io::Error, const L: usize>(
        &self,
        buff: &mut heapless::Vec<u8, L>,
    ) -> Result<(), I> {
        let mut payload: heapless::Vec<u8, L> = heapless::Vec::new();
        match self {
            Request::Init {
                address,
                username,
                password,
            } => {
                put(&mut payload, &[SYSTEM_TYPE, LINK_TCPIP])?;
                put_text(&mut payload, address)?;
                put_text(&mut payload, username)?;
                put_text(&mut payload, password)?;
            }
            Request::Deinit => {}
            Request::BoardParamInfo { slot } => {
                put(&mut payload, &slot.to_be_bytes())?;
            }
            Request::ChannelParamInfo { slot, channel } => {
                put(&mut payload, &slot.to_be_bytes())?;
                put(&mut payload, &channel.to_be_bytes())?;
            }
            Request::BoardParamProp {
                slot,
                param,
                property,
            } => {
                put(&mut payload, &slot.to_be_bytes())?;
                put_name(&mut payload, param)?;
                put_name(&mut payload, <&'static str>::from(*property))?;
            }
            Request::ChannelParamProp {
                slot,
                channel,
                param,
                property,
            } => {
                put(&mut payload, &slot.to_be_bytes())?;
                put(&mut payload, &channel.to_be_bytes())?;
                put_name(&mut payload, param)?;
                put_name(&mut payload, <&'static str>::from(*property))?;
            }
            Request::GetBoardParam { slot, param, wire } => {
                put(&mut payload, &slot.to_be_bytes())?;
                put_name(&mut payload, param)?;
                put(&mut payload, &[*wire as u8])?;
            }
            Request::SetBoardParam { slot, param, value } => {
                put(&mut payload, &slot.to_be_bytes())?;
                put_name(&mut payload, param)?;
                put_value(&mut payload, value)?;
            }
            Request::GetChannelParam {
                slot,
                channel,
                param,
                wire,
            } => {
                put(&mut payload, &slot.to_be_bytes())?;
                put(&mut payload, &channel.to_be_bytes())?;
                put_name(&mut payload, param)?;
                put(&mut payload, &[*wire as u8])?;
            }
            Request::SetChannelParam {
                slot,
                channel,
                param,
                value,
            } => {
                put(&mut payload, &slot.to_be_bytes())?;
                put(&mut payload, &channel.to_be_bytes())?;
                put_name(&mut payload, param)?;
                put_value(&mut payload, value)?;
            }
        }

        let len = u16::try_from(payload.len()).map_err(|_| Error::BufferError)?;
        put(buff, &[FRAME_MARKER, self.opcode() as u8])?;
        put(buff, &len.to_be_bytes())?;
        put(buff, &payload)
    }
}

/// Output of a call, interpreted by the caller according to what it asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Float(f32),
    UInt(u32),
    Int(i32),
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    const TAG_EMPTY: u8 = 0;
    const TAG_FLOAT: u8 = 1;
    const TAG_UINT: u8 = 2;
    const TAG_INT: u8 = 3;
    const TAG_TEXT: u8 = 4;
    const TAG_BYTES: u8 = 5;

    fn decode<I: embedded_io::Error>(body: &[u8]) -> Result<Self, I> {
        let Some((&tag, rest)) = body.split_first() else {
            return Ok(Payload::Empty);
        };
        let payload = match tag {
            Self::TAG_EMPTY => Payload::Empty,
            Self::TAG_FLOAT => Payload::Float(f32::from_be_bytes(fixed(rest)?)),
            Self::TAG_UINT => Payload::UInt(u32::from_be_bytes(fixed(rest)?)),
            Self::TAG_INT => Payload::Int(i32::from_be_bytes(fixed(rest)?)),
            Self::TAG_TEXT => {
                let (&len, text) = rest.split_first().ok_or(Error::InvalidResponse)?;
                let text = text.get(..len as usize).ok_or(Error::InvalidResponse)?;
                let text = core::str::from_utf8(text).map_err(|_| Error::InvalidResponse)?;
                Payload::Text(text.to_owned())
            }
            Self::TAG_BYTES => Payload::Bytes(rest.to_vec()),
            _ => return Err(Error::InvalidResponse),
        };
        Ok(payload)
    }

    #[cfg(test)]
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Payload::Empty => out.push(Self::TAG_EMPTY),
            Payload::Float(v) => {
                out.push(Self::TAG_FLOAT);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Payload::UInt(v) => {
                out.push(Self::TAG_UINT);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Payload::Int(v) => {
                out.push(Self::TAG_INT);
                out.extend_from_slice(&v.to_be_bytes());
            }
            Payload::Text(text) => {
                out.push(Self::TAG_TEXT);
                out.push(text.len() as u8);
                out.extend_from_slice(text.as_bytes());
            }
            Payload::Bytes(bytes) => {
                out.push(Self::TAG_BYTES);
                out.extend_from_slice(bytes);
            }
        }
    }
}

/// The `(return code, outputs)` pair of a call.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub code: ReturnCode,
    pub payload: Payload,
}

impl Reply {
    pub fn ok(payload: Payload) -> Self {
        Self {
            code: ReturnCode::OK,
            payload,
        }
    }

    pub fn failed(code: i32) -> Self {
        Self {
            code: ReturnCode(code),
            payload: Payload::Empty,
        }
    }

    /// Check a reply header against the request it answers, returning the return code and the
    /// payload length still to be read.
    pub fn parse_header<I: embedded_io::Error>(
        header: &[u8; REPLY_HEADER_LEN],
        expected: OpCode,
    ) -> Result<(ReturnCode, usize), I> {
        if header[0] != FRAME_MARKER {
            return Err(Error::InvalidResponse);
        }
        let opcode = OpCode::try_from(header[1]).map_err(|_| Error::InvalidResponse)?;
        if opcode != expected {
            return Err(Error::InvalidResponse);
        }
        let code = i32::from_be_bytes([header[2], header[3], header[4], header[5]]);
        let len = u16::from_be_bytes([header[6], header[7]]) as usize;
        Ok((ReturnCode(code), len))
    }

    pub fn decode_body<I: embedded_io::Error>(code: ReturnCode, body: &[u8]) -> Result<Self, I> {
        Ok(Self {
            code,
            payload: Payload::decode(body)?,
        })
    }

    /// Produce the bytes a bridge would send for this reply.
    #[cfg(test)]
    pub fn to_frame(&self, opcode: OpCode) -> Vec<u8> {
        let mut body = Vec::new();
        self.payload.encode(&mut body);
        let mut frame = vec![FRAME_MARKER, opcode as u8];
        frame.extend_from_slice(&self.code.0.to_be_bytes());
        frame.extend_from_slice(&(body.len() as u16).to_be_bytes());
        frame.extend_from_slice(&body);
        frame
    }
}

/// Decode one 10 byte name slot. Content stops at the first NUL.
pub fn decode_name_slot(slot: &[u8]) -> Option<&str> {
    let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    core::str::from_utf8(&slot[..end]).ok()
}

fn fixed<I: embedded_io::Error, const N: usize>(bytes: &[u8]) -> Result<[u8; N], I> {
    bytes
        .get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or(Error::InvalidResponse)
}

fn put<I: embedded_io::Error, const L: usize>(
    buff: &mut heapless::Vec<u8, L>,
    bytes: &[u8],
) -> Result<(), I> {
    buff.extend_from_slice(bytes).map_err(|_| Error::BufferError)
}

fn put_name<I: embedded_io::Error, const L: usize>(
    buff: &mut heapless::Vec<u8, L>,
    name: &str,
) -> Result<(), I> {
    if name.len() > NAME_SLOT_LEN {
        return Err(Error::NameTooLong(name.to_owned()));
    }
    let mut slot = [0u8; NAME_SLOT_LEN];
    slot[..name.len()].copy_from_slice(name.as_bytes());
    put(buff, &slot)
}

fn put_text<I: embedded_io::Error, const L: usize>(
    buff: &mut heapless::Vec<u8, L>,
    text: &str,
) -> Result<(), I> {
    let len = u8::try_from(text.len()).map_err(|_| Error::BufferError)?;
    put(buff, &[len])?;
    put(buff, text.as_bytes())
}

fn put_value<I: embedded_io::Error, const L: usize>(
    buff: &mut heapless::Vec<u8, L>,
    value: &WireValue,
) -> Result<(), I> {
    match value {
        WireValue::Float(v) => {
            put(buff, &[WireType::Float as u8])?;
            put(buff, &v.to_be_bytes())
        }
        WireValue::UInt(v) => {
            put(buff, &[WireType::UInt as u8])?;
            put(buff, &v.to_be_bytes())
        }
    }
}
