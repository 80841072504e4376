//! VPA RPC wire contract.
//!
//! Every message is a fixed-size struct with a common header followed by
//! a status slot and a function-specific payload. Request and response
//! share one shape: the server overwrites fields in place and returns the
//! same number of bytes it received.
//!
//! Layout (packed, native byte order):
//! ```text
//! 0x00: version  (u32) - ProtocolVersion
//! 0x04: size     (u32) - must equal the concrete message's WIRE_SIZE
//! 0x08: func     (u32) - FuncCode
//! 0x0C: status   (i32) - Status
//! 0x10: payload        - per function, see messages.rs
//! ```
//!
//! No endianness conversion is performed. Client and server are expected
//! to run on the same architecture.

pub mod codec;
mod messages;

pub use messages::{AuthMsg, CredsMsg, Host2Ipv4Msg, LookupMsg, UrlsMsg, VersionMsg, NO_HANDLE};

use crate::error::{WireError, WireResult};
use crate::limits::MAX_MESSAGE_SIZE;
use codec::{Reader, Writer};

/// Bytes in the common header.
pub const HEADER_SIZE: usize = 12;

/// Offset of the status slot present in every message.
pub const STATUS_OFFSET: usize = HEADER_SIZE;

/// Header plus status slot.
pub const PREFIX_SIZE: usize = STATUS_OFFSET + 4;

/// Protocol revision carried in every header.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V1 = 1,
}

impl ProtocolVersion {
    pub const CURRENT: ProtocolVersion = ProtocolVersion::V1;

    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(ProtocolVersion::V1),
            _ => None,
        }
    }
}

/// Remote function selector.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuncCode {
    None = 0,
    GetAuth = 1,
    Version = 2,
    Lookup = 3,
    Creds = 4,
    Urls = 5,
    Host2Ipv4Addr = 6,
}

impl FuncCode {
    /// Number of function codes (for per-function counters).
    pub const COUNT: usize = 7;

    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(FuncCode::None),
            1 => Some(FuncCode::GetAuth),
            2 => Some(FuncCode::Version),
            3 => Some(FuncCode::Lookup),
            4 => Some(FuncCode::Creds),
            5 => Some(FuncCode::Urls),
            6 => Some(FuncCode::Host2Ipv4Addr),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FuncCode::None => "NONE",
            FuncCode::GetAuth => "GET_AUTH",
            FuncCode::Version => "VERSION",
            FuncCode::Lookup => "LOOKUP",
            FuncCode::Creds => "CREDS",
            FuncCode::Urls => "URLS",
            FuncCode::Host2Ipv4Addr => "HOST2IPV4ADDR",
        }
    }

    /// Wire size of the message shape for this code, if it has one.
    pub fn wire_size(&self) -> Option<usize> {
        match self {
            FuncCode::None => None,
            FuncCode::GetAuth => Some(AuthMsg::WIRE_SIZE),
            FuncCode::Version => Some(VersionMsg::WIRE_SIZE),
            FuncCode::Lookup => Some(LookupMsg::WIRE_SIZE),
            FuncCode::Creds => Some(CredsMsg::WIRE_SIZE),
            FuncCode::Urls => Some(UrlsMsg::WIRE_SIZE),
            FuncCode::Host2Ipv4Addr => Some(Host2Ipv4Msg::WIRE_SIZE),
        }
    }
}

/// Outcome carried in the status slot.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Not yet processed (requests are sent with this)
    #[default]
    Idle = 0,
    Ok = 1,
    AuthFailed = 2,
    Error = 3,
    UnknownRequest = 4,
    ProtocolError = 5,
}

impl Status {
    /// Unrecognised values decode as `Idle`; clients are not required to
    /// initialise the slot before sending.
    pub fn from_i32(v: i32) -> Self {
        match v {
            1 => Status::Ok,
            2 => Status::AuthFailed,
            3 => Status::Error,
            4 => Status::UnknownRequest,
            5 => Status::ProtocolError,
            _ => Status::Idle,
        }
    }
}

/// Raw header fields, before any validation beyond length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub size: u32,
    pub func: u32,
}

impl Header {
    /// Read the header from the front of `buf`.
    pub fn peek(buf: &[u8]) -> WireResult<Header> {
        if buf.len() < HEADER_SIZE {
            return Err(WireError::Truncated {
                needed: HEADER_SIZE,
                got: buf.len(),
            });
        }
        let mut r = Reader::new(buf);
        Ok(Header {
            version: r.u32(),
            size: r.u32(),
            func: r.u32(),
        })
    }

    /// Check version, declared size and function code, returning the
    /// function and its expected size. Does not look at the buffer length.
    pub fn validate(&self) -> WireResult<(FuncCode, usize)> {
        if ProtocolVersion::from_u32(self.version).is_none() {
            return Err(WireError::UnsupportedVersion(self.version));
        }
        if self.size as usize > MAX_MESSAGE_SIZE {
            return Err(WireError::Oversized(self.size));
        }
        let func = FuncCode::from_u32(self.func).ok_or(WireError::UnknownFunction(self.func))?;
        let expected = func
            .wire_size()
            .ok_or(WireError::UnknownFunction(self.func))?;
        if self.size as usize != expected {
            return Err(WireError::SizeMismatch {
                func,
                declared: self.size,
                expected,
            });
        }
        Ok((func, expected))
    }
}

/// A concrete fixed-size message shape.
pub trait WireMessage: Sized {
    /// Function code written into the header.
    const FUNC: FuncCode;

    /// Total encoded size, header included.
    const WIRE_SIZE: usize;

    fn status(&self) -> Status;

    fn set_status(&mut self, status: Status);

    /// Write the payload (everything after the status slot).
    fn encode_payload(&self, w: &mut Writer<'_>);

    /// Read the payload (everything after the status slot).
    fn decode_payload(r: &mut Reader<'_>, status: Status) -> Self;

    /// Write the fields a successful call produces into a `WIRE_SIZE`
    /// frame, at their fixed offsets.
    fn encode_outputs(&self, buf: &mut [u8]);

    /// Write the fields a failed call still produces. Most functions
    /// produce none.
    fn encode_failure_outputs(&self, _buf: &mut [u8]) {}

    /// Answer a received frame in place. Only the status slot and this
    /// function's output fields change; every other byte is left exactly
    /// as the client sent it.
    fn answer_in_place(&self, frame: &mut [u8]) {
        debug_assert_eq!(frame.len(), Self::WIRE_SIZE);
        Writer::at(frame, STATUS_OFFSET).i32(self.status() as i32);
        if self.status() == Status::Ok {
            self.encode_outputs(frame);
        } else {
            self.encode_failure_outputs(frame);
        }
    }

    /// Encode into a freshly allocated buffer of exactly `WIRE_SIZE` bytes.
    fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::WIRE_SIZE];
        let mut w = Writer::new(&mut buf);
        w.u32(ProtocolVersion::CURRENT as u32);
        w.u32(Self::WIRE_SIZE as u32);
        w.u32(Self::FUNC as u32);
        w.i32(self.status() as i32);
        self.encode_payload(&mut w);
        debug_assert_eq!(w.position(), Self::WIRE_SIZE);
        buf
    }

    /// Decode a buffer that must hold exactly this message shape.
    fn decode(buf: &[u8]) -> WireResult<Self> {
        let header = Header::peek(buf)?;
        let (func, expected) = header.validate()?;
        if func != Self::FUNC {
            return Err(WireError::UnexpectedFunction {
                expected: Self::FUNC,
                got: func,
            });
        }
        check_length(&header, buf.len())?;
        let mut r = Reader::at(buf, STATUS_OFFSET);
        let status = Status::from_i32(r.i32());
        Ok(Self::decode_payload(&mut r, status))
    }
}

fn check_length(header: &Header, actual: usize) -> WireResult<()> {
    if header.size as usize != actual {
        return Err(WireError::LengthMismatch {
            declared: header.size,
            actual,
        });
    }
    Ok(())
}

/// Tagged union over every message shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Auth(AuthMsg),
    Version(VersionMsg),
    Lookup(LookupMsg),
    Creds(CredsMsg),
    Urls(UrlsMsg),
    Host2Ipv4(Host2Ipv4Msg),
}

impl Message {
    pub fn func(&self) -> FuncCode {
        match self {
            Message::Auth(_) => FuncCode::GetAuth,
            Message::Version(_) => FuncCode::Version,
            Message::Lookup(_) => FuncCode::Lookup,
            Message::Creds(_) => FuncCode::Creds,
            Message::Urls(_) => FuncCode::Urls,
            Message::Host2Ipv4(_) => FuncCode::Host2Ipv4Addr,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Message::Auth(m) => m.status(),
            Message::Version(m) => m.status(),
            Message::Lookup(m) => m.status(),
            Message::Creds(m) => m.status(),
            Message::Urls(m) => m.status(),
            Message::Host2Ipv4(m) => m.status(),
        }
    }

    pub fn wire_size(&self) -> usize {
        match self {
            Message::Auth(_) => AuthMsg::WIRE_SIZE,
            Message::Version(_) => VersionMsg::WIRE_SIZE,
            Message::Lookup(_) => LookupMsg::WIRE_SIZE,
            Message::Creds(_) => CredsMsg::WIRE_SIZE,
            Message::Urls(_) => UrlsMsg::WIRE_SIZE,
            Message::Host2Ipv4(_) => Host2Ipv4Msg::WIRE_SIZE,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::Auth(m) => m.encode(),
            Message::Version(m) => m.encode(),
            Message::Lookup(m) => m.encode(),
            Message::Creds(m) => m.encode(),
            Message::Urls(m) => m.encode(),
            Message::Host2Ipv4(m) => m.encode(),
        }
    }

    /// Overwrite the status slot and output fields of `frame`, which must
    /// be the frame this message was decoded from.
    pub fn answer_in_place(&self, frame: &mut [u8]) {
        match self {
            Message::Auth(m) => m.answer_in_place(frame),
            Message::Version(m) => m.answer_in_place(frame),
            Message::Lookup(m) => m.answer_in_place(frame),
            Message::Creds(m) => m.answer_in_place(frame),
            Message::Urls(m) => m.answer_in_place(frame),
            Message::Host2Ipv4(m) => m.answer_in_place(frame),
        }
    }

    /// Decode any message. The function code selects the shape; the
    /// declared size must match that shape and the buffer length.
    pub fn decode(buf: &[u8]) -> WireResult<Message> {
        let header = Header::peek(buf)?;
        let (func, _) = header.validate()?;
        check_length(&header, buf.len())?;
        let msg = match func {
            FuncCode::GetAuth => Message::Auth(AuthMsg::decode(buf)?),
            FuncCode::Version => Message::Version(VersionMsg::decode(buf)?),
            FuncCode::Lookup => Message::Lookup(LookupMsg::decode(buf)?),
            FuncCode::Creds => Message::Creds(CredsMsg::decode(buf)?),
            FuncCode::Urls => Message::Urls(UrlsMsg::decode(buf)?),
            FuncCode::Host2Ipv4Addr => Message::Host2Ipv4(Host2Ipv4Msg::decode(buf)?),
            FuncCode::None => return Err(WireError::UnknownFunction(header.func)),
        };
        Ok(msg)
    }
}

/// Overwrite the status slot of a frame that could not be decoded.
///
/// Returns `false` if the frame is too short to carry a status slot, in
/// which case there is nothing meaningful to send back.
pub fn fail_in_place(buf: &mut [u8], status: Status) -> bool {
    if buf.len() < PREFIX_SIZE {
        return false;
    }
    Writer::at(buf, STATUS_OFFSET).i32(status as i32);
    true
}

/// Read the status slot of a raw frame.
pub fn peek_status(buf: &[u8]) -> Option<Status> {
    if buf.len() < PREFIX_SIZE {
        return None;
    }
    Some(Status::from_i32(Reader::at(buf, STATUS_OFFSET).i32()))
}

const _: () = assert!(UrlsMsg::WIRE_SIZE <= MAX_MESSAGE_SIZE);
const _: () = assert!(CredsMsg::WIRE_SIZE <= MAX_MESSAGE_SIZE);
