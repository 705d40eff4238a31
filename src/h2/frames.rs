//! HTTP/2 frame types and payload codecs
//!
//! This module defines the frame header and the frame types specified in
//! RFC 7540 Section 6. Every frame type has a `parse` function that turns a
//! header and its exact payload into a typed value, and a `to_binary`
//! function that produces header-inclusive wire bytes.

use super::error::{Error, ErrorCode, Result};
use super::settings::{Setting, Settings, SettingsParameter};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// Size of the fixed frame header
pub const FRAME_HEADER_SIZE: usize = 9;

/// Largest value of the 24-bit length field
pub const MAX_FRAME_LENGTH: u32 = 0x00FF_FFFF;

/// Mask for the 31 significant bits of stream identifiers and increments
const STREAM_ID_MASK: u32 = 0x7FFF_FFFF;

/// Reserved / exclusive bit of 32-bit stream identifier fields
const RESERVED_BIT: u32 = 0x8000_0000;

/// Frame types registered by RFC 7540 Section 6
///
/// Any other code on the wire is carried as [`UnknownFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Request or response body (0x0)
    Data = 0x0,
    /// Opens a stream with a header block fragment (0x1)
    Headers = 0x1,
    /// Stream dependency and weight (0x2)
    Priority = 0x2,
    /// Immediate termination of a stream (0x3)
    RstStream = 0x3,
    /// Connection parameters or their acknowledgement (0x4)
    Settings = 0x4,
    /// Reserves a server-initiated stream, server to client only (0x5)
    PushPromise = 0x5,
    /// Liveness check and round-trip measurement (0x6)
    Ping = 0x6,
    /// Connection shutdown notice (0x7)
    Goaway = 0x7,
    /// Flow-control credit (0x8)
    WindowUpdate = 0x8,
    /// Further fragments of a HEADERS or PUSH_PROMISE header block (0x9)
    Continuation = 0x9,
}

impl FrameType {
    /// Map a type code, `None` for unregistered codes
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(FrameType::Data),
            0x1 => Some(FrameType::Headers),
            0x2 => Some(FrameType::Priority),
            0x3 => Some(FrameType::RstStream),
            0x4 => Some(FrameType::Settings),
            0x5 => Some(FrameType::PushPromise),
            0x6 => Some(FrameType::Ping),
            0x7 => Some(FrameType::Goaway),
            0x8 => Some(FrameType::WindowUpdate),
            0x9 => Some(FrameType::Continuation),
            _ => None,
        }
    }

    /// Wire type code
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Registered name, e.g. `RST_STREAM`
    pub fn name(&self) -> &'static str {
        match self {
            FrameType::Data => "DATA",
            FrameType::Headers => "HEADERS",
            FrameType::Priority => "PRIORITY",
            FrameType::RstStream => "RST_STREAM",
            FrameType::Settings => "SETTINGS",
            FrameType::PushPromise => "PUSH_PROMISE",
            FrameType::Ping => "PING",
            FrameType::Goaway => "GOAWAY",
            FrameType::WindowUpdate => "WINDOW_UPDATE",
            FrameType::Continuation => "CONTINUATION",
        }
    }

    /// Frame types that only make sense on stream 0
    pub fn is_connection_scoped(&self) -> bool {
        matches!(self, FrameType::Settings | FrameType::Ping | FrameType::Goaway)
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Flag octet of a frame header
///
/// The meaning of each bit depends on the frame type; `ACK` and
/// `END_STREAM` share bit 0x1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// No flags
    pub fn empty() -> Self {
        FrameFlags(0)
    }

    /// Wrap a raw flag octet
    pub fn from_u8(flags: u8) -> Self {
        FrameFlags(flags)
    }

    /// Raw flag octet
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Turn on `flag`
    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    pub fn is_set(&self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    /// Last frame the sender will send on this stream
    pub const END_STREAM: u8 = 0x1;

    /// Acknowledgement, on SETTINGS and PING
    pub const ACK: u8 = 0x1;

    /// Header block complete, no CONTINUATION follows
    pub const END_HEADERS: u8 = 0x4;

    /// Payload starts with a pad length octet
    pub const PADDED: u8 = 0x8;

    /// HEADERS payload carries a priority block
    pub const PRIORITY: u8 = 0x20;

    pub fn is_end_stream(&self) -> bool {
        self.is_set(Self::END_STREAM)
    }

    pub fn is_ack(&self) -> bool {
        self.is_set(Self::ACK)
    }

    pub fn is_end_headers(&self) -> bool {
        self.is_set(Self::END_HEADERS)
    }

    pub fn is_padded(&self) -> bool {
        self.is_set(Self::PADDED)
    }

    pub fn is_priority(&self) -> bool {
        self.is_set(Self::PRIORITY)
    }
}

/// Fixed 9-byte frame header (RFC 7540 Section 4.1)
///
/// The type is kept as the raw code so that frames of unknown types survive
/// a parse/serialize cycle unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    length: u32,
    kind: u8,
    flags: FrameFlags,
    stream_id: u32,
}

impl FrameHeader {
    /// Create a header for a known frame type
    pub fn new(frame_type: FrameType, flags: FrameFlags, stream_id: u32, length: u32) -> Self {
        Self::with_kind(frame_type.as_u8(), flags, stream_id, length)
    }

    /// Create a header from a raw type code
    pub fn with_kind(kind: u8, flags: FrameFlags, stream_id: u32, length: u32) -> Self {
        FrameHeader {
            length: length & MAX_FRAME_LENGTH,
            kind,
            flags,
            stream_id: stream_id & STREAM_ID_MASK,
        }
    }

    /// Decode a frame header
    ///
    /// Only the first 9 bytes are looked at. The reserved bit in front of the
    /// stream identifier is discarded.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FRAME_HEADER_SIZE {
            return Err(Error::MalformedHeader(bytes.len()));
        }

        let length = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
        let stream_id = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);

        Ok(FrameHeader {
            length,
            kind: bytes[3],
            flags: FrameFlags::from_u8(bytes[4]),
            stream_id: stream_id & STREAM_ID_MASK,
        })
    }

    /// Encode the header; the reserved bit is always written as 0
    pub fn serialize(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        header[..3].copy_from_slice(&self.length.to_be_bytes()[1..]);
        header[3] = self.kind;
        header[4] = self.flags.as_u8();
        header[5..].copy_from_slice(&(self.stream_id & STREAM_ID_MASK).to_be_bytes());
        header
    }

    /// Payload length
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Raw frame type code
    pub fn kind(&self) -> u8 {
        self.kind
    }

    /// Frame type, if the code is one of RFC 7540's
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_u8(self.kind)
    }

    /// Frame flags
    pub fn flags(&self) -> FrameFlags {
        self.flags
    }

    /// Stream identifier
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }
}

/// Write a header followed by its payload
fn encode(frame_type: FrameType, flags: FrameFlags, stream_id: u32, payload: &[u8]) -> Bytes {
    let header = FrameHeader::new(frame_type, flags, stream_id, payload.len() as u32);
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_slice(&header.serialize());
    buf.put_slice(payload);
    buf.freeze()
}

/// Check a fixed payload size
fn expect_length(header: &FrameHeader, body: &Bytes, expected: usize) -> Result<()> {
    if body.len() != expected {
        return Err(Error::FrameSize(format!(
            "{} frame payload must be {} bytes, got {}",
            header.frame_type().map_or("UNKNOWN", |t| t.name()),
            expected,
            body.len()
        )));
    }
    Ok(())
}

/// Split off the pad length byte and trailing padding of a PADDED frame
fn strip_padding(header: &FrameHeader, mut body: Bytes) -> Result<(Bytes, Option<u8>)> {
    if !header.flags().is_padded() {
        return Ok((body, None));
    }
    if body.is_empty() {
        return Err(Error::FrameSize(
            "PADDED frame too short for pad length".to_string(),
        ));
    }

    let pad_len = body.get_u8();
    if pad_len as usize > body.len() {
        return Err(Error::Protocol(format!(
            "Padding of {} bytes exceeds remaining payload of {} bytes",
            pad_len,
            body.len()
        )));
    }
    body.truncate(body.len() - pad_len as usize);

    Ok((body, Some(pad_len)))
}

/// Stream dependency block of HEADERS and PRIORITY payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrioritySpec {
    /// Stream dependency
    pub stream_dependency: u32,
    /// Exclusive flag
    pub exclusive: bool,
    /// Weight (wire value, actual weight is weight + 1)
    pub weight: u8,
}

impl PrioritySpec {
    pub fn new(stream_dependency: u32, exclusive: bool, weight: u8) -> Self {
        PrioritySpec {
            stream_dependency: stream_dependency & STREAM_ID_MASK,
            exclusive,
            weight,
        }
    }

    fn decode(body: &mut Bytes) -> Self {
        let raw = body.get_u32();
        PrioritySpec {
            stream_dependency: raw & STREAM_ID_MASK,
            exclusive: raw & RESERVED_BIT != 0,
            weight: body.get_u8(),
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        let mut dep = self.stream_dependency & STREAM_ID_MASK;
        if self.exclusive {
            dep |= RESERVED_BIT;
        }
        buf.put_u32(dep);
        buf.put_u8(self.weight);
    }
}

/// DATA frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// Frame header
    pub header: FrameHeader,
    /// Data payload
    pub data: Bytes,
    /// END_STREAM flag
    pub end_stream: bool,
    /// Pad length octet, when PADDED was set
    pub padding: Option<u8>,
}

impl DataFrame {
    /// Unpadded DATA frame
    pub fn new(stream_id: u32, data: Bytes, end_stream: bool) -> Self {
        DataFrame {
            header: FrameHeader::new(FrameType::Data, FrameFlags::empty(), stream_id, 0),
            data,
            end_stream,
            padding: None,
        }
        .sealed()
    }

    /// Set padding
    pub fn with_padding(mut self, padding: u8) -> Self {
        self.padding = Some(padding);
        self.sealed()
    }

    /// Parse a DATA payload
    pub fn parse(header: FrameHeader, body: Bytes) -> Result<Self> {
        let (data, padding) = strip_padding(&header, body)?;
        Ok(DataFrame {
            header,
            data,
            end_stream: header.flags().is_end_stream(),
            padding,
        })
    }

    /// Stream ID
    pub fn stream_id(&self) -> u32 {
        self.header.stream_id()
    }

    fn flags(&self) -> FrameFlags {
        let mut flags = FrameFlags::empty();
        if self.end_stream {
            flags.set(FrameFlags::END_STREAM);
        }
        if self.padding.is_some() {
            flags.set(FrameFlags::PADDED);
        }
        flags
    }

    fn payload(&self) -> BytesMut {
        let mut payload = BytesMut::new();
        if let Some(pad_len) = self.padding {
            payload.put_u8(pad_len);
        }
        payload.put_slice(&self.data);
        if let Some(pad_len) = self.padding {
            payload.put_bytes(0, pad_len as usize);
        }
        payload
    }

    /// Recompute the header from the fields
    fn sealed(mut self) -> Self {
        let length = self.payload().len() as u32;
        self.header = FrameHeader::new(FrameType::Data, self.flags(), self.stream_id(), length);
        self
    }

    /// Encode to wire bytes
    pub fn to_binary(&self) -> Bytes {
        encode(FrameType::Data, self.flags(), self.stream_id(), &self.payload())
    }
}

/// HEADERS frame (RFC 7540 Section 6.2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersFrame {
    /// Frame header
    pub header: FrameHeader,
    /// Header block fragment, still HPACK encoded
    pub header_block: Bytes,
    /// END_STREAM flag
    pub end_stream: bool,
    /// END_HEADERS flag
    pub end_headers: bool,
    /// Present when the PRIORITY flag is set
    pub priority: Option<PrioritySpec>,
    /// Pad length octet, when PADDED was set
    pub padding: Option<u8>,
}

impl HeadersFrame {
    /// HEADERS frame without priority or padding
    pub fn new(stream_id: u32, header_block: Bytes, end_stream: bool, end_headers: bool) -> Self {
        HeadersFrame {
            header: FrameHeader::new(FrameType::Headers, FrameFlags::empty(), stream_id, 0),
            header_block,
            end_stream,
            end_headers,
            priority: None,
            padding: None,
        }
        .sealed()
    }

    /// Set priority
    pub fn with_priority(mut self, priority: PrioritySpec) -> Self {
        self.priority = Some(priority);
        self.sealed()
    }

    /// Set padding
    pub fn with_padding(mut self, padding: u8) -> Self {
        self.padding = Some(padding);
        self.sealed()
    }

    /// Parse a HEADERS payload
    ///
    /// Layout: [pad length] [E + stream dependency, weight] fragment [padding]
    pub fn parse(header: FrameHeader, body: Bytes) -> Result<Self> {
        let flags = header.flags();
        let (mut body, padding) = strip_padding(&header, body)?;

        let priority = if flags.is_priority() {
            if body.len() < 5 {
                return Err(Error::FrameSize(
                    "HEADERS frame too short for priority fields".to_string(),
                ));
            }
            Some(PrioritySpec::decode(&mut body))
        } else {
            None
        };

        Ok(HeadersFrame {
            header,
            header_block: body,
            end_stream: flags.is_end_stream(),
            end_headers: flags.is_end_headers(),
            priority,
            padding,
        })
    }

    /// Stream ID
    pub fn stream_id(&self) -> u32 {
        self.header.stream_id()
    }

    fn flags(&self) -> FrameFlags {
        let mut flags = FrameFlags::empty();
        if self.end_stream {
            flags.set(FrameFlags::END_STREAM);
        }
        if self.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }
        if self.padding.is_some() {
            flags.set(FrameFlags::PADDED);
        }
        if self.priority.is_some() {
            flags.set(FrameFlags::PRIORITY);
        }
        flags
    }

    fn payload(&self) -> BytesMut {
        let mut payload = BytesMut::new();
        if let Some(pad_len) = self.padding {
            payload.put_u8(pad_len);
        }
        if let Some(priority) = &self.priority {
            priority.encode(&mut payload);
        }
        payload.put_slice(&self.header_block);
        if let Some(pad_len) = self.padding {
            payload.put_bytes(0, pad_len as usize);
        }
        payload
    }

    fn sealed(mut self) -> Self {
        let length = self.payload().len() as u32;
        self.header = FrameHeader::new(FrameType::Headers, self.flags(), self.stream_id(), length);
        self
    }

    /// Encode to wire bytes
    pub fn to_binary(&self) -> Bytes {
        encode(FrameType::Headers, self.flags(), self.stream_id(), &self.payload())
    }
}

/// PRIORITY frame (RFC 7540 Section 6.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityFrame {
    /// Frame header
    pub header: FrameHeader,
    pub priority: PrioritySpec,
}

impl PriorityFrame {
    /// Create a new PRIORITY frame
    pub fn new(stream_id: u32, priority: PrioritySpec) -> Self {
        PriorityFrame {
            header: FrameHeader::new(FrameType::Priority, FrameFlags::empty(), stream_id, 5),
            priority,
        }
    }

    /// Parse a PRIORITY payload (exactly 5 bytes)
    pub fn parse(header: FrameHeader, mut body: Bytes) -> Result<Self> {
        expect_length(&header, &body, 5)?;
        Ok(PriorityFrame {
            header,
            priority: PrioritySpec::decode(&mut body),
        })
    }

    /// Encode to wire bytes
    pub fn to_binary(&self) -> Bytes {
        let mut payload = BytesMut::with_capacity(5);
        self.priority.encode(&mut payload);
        encode(FrameType::Priority, FrameFlags::empty(), self.header.stream_id(), &payload)
    }
}

/// RST_STREAM frame (RFC 7540 Section 6.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RstStreamFrame {
    /// Frame header
    pub header: FrameHeader,
    /// Error code
    pub error_code: ErrorCode,
}

impl RstStreamFrame {
    /// Create a new RST_STREAM frame
    pub fn new(stream_id: u32, error_code: ErrorCode) -> Self {
        RstStreamFrame {
            header: FrameHeader::new(FrameType::RstStream, FrameFlags::empty(), stream_id, 4),
            error_code,
        }
    }

    /// Parse a RST_STREAM payload (exactly 4 bytes)
    pub fn parse(header: FrameHeader, mut body: Bytes) -> Result<Self> {
        expect_length(&header, &body, 4)?;
        Ok(RstStreamFrame {
            header,
            error_code: ErrorCode::from_wire(body.get_u32()),
        })
    }

    /// Encode to wire bytes
    pub fn to_binary(&self) -> Bytes {
        encode(
            FrameType::RstStream,
            FrameFlags::empty(),
            self.header.stream_id(),
            &self.error_code.as_u32().to_be_bytes(),
        )
    }
}

/// SETTINGS frame (RFC 7540 Section 6.5)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsFrame {
    /// Frame header
    pub header: FrameHeader,
    /// ACK flag
    pub ack: bool,
    /// Parameters in the order they appeared on the wire
    pub params: Vec<Setting>,
}

impl SettingsFrame {
    /// Create a new SETTINGS frame
    pub fn new(params: Vec<Setting>) -> Self {
        let length = (params.len() * 6) as u32;
        SettingsFrame {
            header: FrameHeader::new(FrameType::Settings, FrameFlags::empty(), 0, length),
            ack: false,
            params,
        }
    }

    /// Create a SETTINGS frame advertising a whole table
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.to_params())
    }

    /// Create a SETTINGS ACK frame: no parameters, ACK flag set
    pub fn ack() -> Self {
        SettingsFrame {
            header: FrameHeader::new(
                FrameType::Settings,
                FrameFlags::from_u8(FrameFlags::ACK),
                0,
                0,
            ),
            ack: true,
            params: Vec::new(),
        }
    }

    /// Parse a SETTINGS payload of 6-byte entries
    ///
    /// Identifiers this endpoint does not know are skipped (RFC 7540
    /// Section 6.5.2).
    pub fn parse(header: FrameHeader, mut body: Bytes) -> Result<Self> {
        let ack = header.flags().is_ack();
        if ack && !body.is_empty() {
            return Err(Error::FrameSize(format!(
                "SETTINGS ACK with {} byte payload",
                body.len()
            )));
        }
        if body.len() % 6 != 0 {
            return Err(Error::MalformedSettings(body.len()));
        }

        let mut params = Vec::with_capacity(body.len() / 6);
        while body.has_remaining() {
            let id = body.get_u16();
            let value = body.get_u32();
            match SettingsParameter::from_u16(id) {
                Some(parameter) => params.push(Setting::new(parameter, value)),
                None => tracing::trace!(id, value, "ignoring unknown setting"),
            }
        }

        Ok(SettingsFrame { header, ack, params })
    }

    /// Encode to wire bytes
    pub fn to_binary(&self) -> Bytes {
        let flags = if self.ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };

        let mut payload = BytesMut::with_capacity(self.params.len() * 6);
        if !self.ack {
            for setting in &self.params {
                payload.put_u16(setting.parameter.as_u16());
                payload.put_u32(setting.value);
            }
        }

        encode(FrameType::Settings, flags, self.header.stream_id(), &payload)
    }
}

/// PUSH_PROMISE frame (RFC 7540 Section 6.6)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPromiseFrame {
    /// Frame header
    pub header: FrameHeader,
    /// Promised stream ID
    pub promised_stream_id: u32,
    /// Header block fragment
    pub header_block: Bytes,
    /// END_HEADERS flag
    pub end_headers: bool,
    /// Pad length octet, when PADDED was set
    pub padding: Option<u8>,
}

impl PushPromiseFrame {
    /// Parse a PUSH_PROMISE payload
    pub fn parse(header: FrameHeader, body: Bytes) -> Result<Self> {
        let (mut body, padding) = strip_padding(&header, body)?;
        if body.len() < 4 {
            return Err(Error::FrameSize(
                "PUSH_PROMISE frame too short for promised stream id".to_string(),
            ));
        }
        let promised_stream_id = body.get_u32() & STREAM_ID_MASK;

        Ok(PushPromiseFrame {
            header,
            promised_stream_id,
            header_block: body,
            end_headers: header.flags().is_end_headers(),
            padding,
        })
    }

    /// Encode to wire bytes
    pub fn to_binary(&self) -> Bytes {
        let mut flags = FrameFlags::empty();
        let mut payload = BytesMut::new();

        if self.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }
        if let Some(pad_len) = self.padding {
            flags.set(FrameFlags::PADDED);
            payload.put_u8(pad_len);
        }
        payload.put_u32(self.promised_stream_id & STREAM_ID_MASK);
        payload.put_slice(&self.header_block);
        if let Some(pad_len) = self.padding {
            payload.put_bytes(0, pad_len as usize);
        }

        encode(FrameType::PushPromise, flags, self.header.stream_id(), &payload)
    }
}

/// PING frame: 8 opaque bytes echoed back in the ACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingFrame {
    /// Frame header
    pub header: FrameHeader,
    /// ACK flag
    pub ack: bool,
    /// Opaque data (8 bytes)
    pub data: [u8; 8],
}

impl PingFrame {
    pub fn new(data: [u8; 8]) -> Self {
        PingFrame {
            header: FrameHeader::new(FrameType::Ping, FrameFlags::empty(), 0, 8),
            ack: false,
            data,
        }
    }

    /// Reply to a PING carrying `data`
    pub fn ack(data: [u8; 8]) -> Self {
        PingFrame {
            header: FrameHeader::new(FrameType::Ping, FrameFlags::from_u8(FrameFlags::ACK), 0, 8),
            ack: true,
            data,
        }
    }

    /// Parse a PING payload (exactly 8 bytes)
    pub fn parse(header: FrameHeader, mut body: Bytes) -> Result<Self> {
        expect_length(&header, &body, 8)?;
        let mut data = [0u8; 8];
        body.copy_to_slice(&mut data);
        Ok(PingFrame {
            header,
            ack: header.flags().is_ack(),
            data,
        })
    }

    /// Encode to wire bytes
    pub fn to_binary(&self) -> Bytes {
        let flags = if self.ack {
            FrameFlags::from_u8(FrameFlags::ACK)
        } else {
            FrameFlags::empty()
        };
        encode(FrameType::Ping, flags, self.header.stream_id(), &self.data)
    }
}

/// GOAWAY frame (RFC 7540 Section 6.8)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoawayFrame {
    /// Frame header
    pub header: FrameHeader,
    /// Last stream ID
    pub last_stream_id: u32,
    /// Error code
    pub error_code: ErrorCode,
    /// Debug data
    pub debug_data: Bytes,
}

impl GoawayFrame {
    pub fn new(last_stream_id: u32, error_code: ErrorCode, debug_data: Bytes) -> Self {
        let length = (8 + debug_data.len()) as u32;
        GoawayFrame {
            header: FrameHeader::new(FrameType::Goaway, FrameFlags::empty(), 0, length),
            last_stream_id: last_stream_id & STREAM_ID_MASK,
            error_code,
            debug_data,
        }
    }

    /// Parse a GOAWAY payload (at least 8 bytes)
    pub fn parse(header: FrameHeader, mut body: Bytes) -> Result<Self> {
        if body.len() < 8 {
            return Err(Error::FrameSize(format!(
                "GOAWAY payload must be at least 8 bytes, got {}",
                body.len()
            )));
        }
        let last_stream_id = body.get_u32() & STREAM_ID_MASK;
        let error_code = ErrorCode::from_wire(body.get_u32());

        Ok(GoawayFrame {
            header,
            last_stream_id,
            error_code,
            debug_data: body,
        })
    }

    /// Encode to wire bytes
    pub fn to_binary(&self) -> Bytes {
        let mut payload = BytesMut::with_capacity(8 + self.debug_data.len());
        payload.put_u32(self.last_stream_id & STREAM_ID_MASK);
        payload.put_u32(self.error_code.as_u32());
        payload.put_slice(&self.debug_data);
        encode(FrameType::Goaway, FrameFlags::empty(), self.header.stream_id(), &payload)
    }
}

/// WINDOW_UPDATE frame (RFC 7540 Section 6.9)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdateFrame {
    /// Frame header (stream 0 for connection-level)
    pub header: FrameHeader,
    /// Window size increment (1 to 2^31-1)
    pub size_increment: u32,
}

impl WindowUpdateFrame {
    pub fn new(stream_id: u32, size_increment: u32) -> Self {
        WindowUpdateFrame {
            header: FrameHeader::new(FrameType::WindowUpdate, FrameFlags::empty(), stream_id, 4),
            size_increment: size_increment & STREAM_ID_MASK,
        }
    }

    /// Parse a WINDOW_UPDATE payload (exactly 4 bytes, increment of at least 1)
    pub fn parse(header: FrameHeader, mut body: Bytes) -> Result<Self> {
        expect_length(&header, &body, 4)?;
        let size_increment = body.get_u32() & STREAM_ID_MASK;
        if size_increment == 0 {
            return Err(Error::FlowControl(format!(
                "WINDOW_UPDATE with zero increment on stream {}",
                header.stream_id()
            )));
        }
        Ok(WindowUpdateFrame {
            header,
            size_increment,
        })
    }

    /// Encode to wire bytes
    pub fn to_binary(&self) -> Bytes {
        encode(
            FrameType::WindowUpdate,
            FrameFlags::empty(),
            self.header.stream_id(),
            &(self.size_increment & STREAM_ID_MASK).to_be_bytes(),
        )
    }
}

/// CONTINUATION frame (RFC 7540 Section 6.10)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationFrame {
    /// Frame header
    pub header: FrameHeader,
    /// Header block fragment
    pub header_block: Bytes,
    /// END_HEADERS flag
    pub end_headers: bool,
}

impl ContinuationFrame {
    /// Create a new CONTINUATION frame
    pub fn new(stream_id: u32, header_block: Bytes, end_headers: bool) -> Self {
        let mut flags = FrameFlags::empty();
        if end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }
        ContinuationFrame {
            header: FrameHeader::new(
                FrameType::Continuation,
                flags,
                stream_id,
                header_block.len() as u32,
            ),
            header_block,
            end_headers,
        }
    }

    /// Parse a CONTINUATION payload
    pub fn parse(header: FrameHeader, body: Bytes) -> Result<Self> {
        Ok(ContinuationFrame {
            header,
            header_block: body,
            end_headers: header.flags().is_end_headers(),
        })
    }

    /// Encode to wire bytes
    pub fn to_binary(&self) -> Bytes {
        let mut flags = FrameFlags::empty();
        if self.end_headers {
            flags.set(FrameFlags::END_HEADERS);
        }
        encode(FrameType::Continuation, flags, self.header.stream_id(), &self.header_block)
    }
}

/// Frame with a type code outside RFC 7540, kept as raw payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFrame {
    /// Frame header
    pub header: FrameHeader,
    /// Raw payload
    pub payload: Bytes,
}

impl UnknownFrame {
    /// Encode to wire bytes
    pub fn to_binary(&self) -> Bytes {
        let header = FrameHeader::with_kind(
            self.header.kind(),
            self.header.flags(),
            self.header.stream_id(),
            self.payload.len() as u32,
        );
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        buf.put_slice(&header.serialize());
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// A decoded HTTP/2 frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// DATA
    Data(DataFrame),
    /// HEADERS
    Headers(HeadersFrame),
    /// PRIORITY
    Priority(PriorityFrame),
    /// RST_STREAM
    RstStream(RstStreamFrame),
    /// SETTINGS
    Settings(SettingsFrame),
    /// PUSH_PROMISE
    PushPromise(PushPromiseFrame),
    /// PING
    Ping(PingFrame),
    /// GOAWAY
    Goaway(GoawayFrame),
    /// WINDOW_UPDATE
    WindowUpdate(WindowUpdateFrame),
    /// CONTINUATION
    Continuation(ContinuationFrame),
    /// Any other type code
    Unknown(UnknownFrame),
}

impl Frame {
    /// Decode a payload according to the type in its header
    pub fn parse(header: FrameHeader, body: Bytes) -> Result<Self> {
        let frame = match header.frame_type() {
            Some(FrameType::Data) => Frame::Data(DataFrame::parse(header, body)?),
            Some(FrameType::Headers) => Frame::Headers(HeadersFrame::parse(header, body)?),
            Some(FrameType::Priority) => Frame::Priority(PriorityFrame::parse(header, body)?),
            Some(FrameType::RstStream) => Frame::RstStream(RstStreamFrame::parse(header, body)?),
            Some(FrameType::Settings) => Frame::Settings(SettingsFrame::parse(header, body)?),
            Some(FrameType::PushPromise) => {
                Frame::PushPromise(PushPromiseFrame::parse(header, body)?)
            }
            Some(FrameType::Ping) => Frame::Ping(PingFrame::parse(header, body)?),
            Some(FrameType::Goaway) => Frame::Goaway(GoawayFrame::parse(header, body)?),
            Some(FrameType::WindowUpdate) => {
                Frame::WindowUpdate(WindowUpdateFrame::parse(header, body)?)
            }
            Some(FrameType::Continuation) => {
                Frame::Continuation(ContinuationFrame::parse(header, body)?)
            }
            None => Frame::Unknown(UnknownFrame {
                header,
                payload: body,
            }),
        };
        Ok(frame)
    }

    /// Frame header
    pub fn header(&self) -> &FrameHeader {
        match self {
            Frame::Data(f) => &f.header,
            Frame::Headers(f) => &f.header,
            Frame::Priority(f) => &f.header,
            Frame::RstStream(f) => &f.header,
            Frame::Settings(f) => &f.header,
            Frame::PushPromise(f) => &f.header,
            Frame::Ping(f) => &f.header,
            Frame::Goaway(f) => &f.header,
            Frame::WindowUpdate(f) => &f.header,
            Frame::Continuation(f) => &f.header,
            Frame::Unknown(f) => &f.header,
        }
    }

    /// Stream ID the frame is addressed to
    pub fn stream_id(&self) -> u32 {
        self.header().stream_id()
    }

    /// Frame type, None for unknown type codes
    pub fn frame_type(&self) -> Option<FrameType> {
        self.header().frame_type()
    }

    /// Encode to wire bytes
    pub fn to_binary(&self) -> Bytes {
        match self {
            Frame::Data(f) => f.to_binary(),
            Frame::Headers(f) => f.to_binary(),
            Frame::Priority(f) => f.to_binary(),
            Frame::RstStream(f) => f.to_binary(),
            Frame::Settings(f) => f.to_binary(),
            Frame::PushPromise(f) => f.to_binary(),
            Frame::Ping(f) => f.to_binary(),
            Frame::Goaway(f) => f.to_binary(),
            Frame::WindowUpdate(f) => f.to_binary(),
            Frame::Continuation(f) => f.to_binary(),
            Frame::Unknown(f) => f.to_binary(),
        }
    }
}

macro_rules! impl_from_frame {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Frame {
                fn from(frame: $ty) -> Self {
                    Frame::$variant(frame)
                }
            }
        )*
    };
}

impl_from_frame! {
    Data => DataFrame,
    Headers => HeadersFrame,
    Priority => PriorityFrame,
    RstStream => RstStreamFrame,
    Settings => SettingsFrame,
    PushPromise => PushPromiseFrame,
    Ping => PingFrame,
    Goaway => GoawayFrame,
    WindowUpdate => WindowUpdateFrame,
    Continuation => ContinuationFrame,
    Unknown => UnknownFrame,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(frame_type: FrameType, flags: u8, stream_id: u32, length: usize) -> FrameHeader {
        FrameHeader::new(frame_type, FrameFlags::from_u8(flags), stream_id, length as u32)
    }

    #[test]
    fn test_frame_type_conversion() {
        assert_eq!(FrameType::Data.as_u8(), 0x0);
        assert_eq!(FrameType::Continuation.as_u8(), 0x9);

        assert_eq!(FrameType::from_u8(0x4), Some(FrameType::Settings));
        assert_eq!(FrameType::from_u8(0xff), None);
        assert_eq!(FrameType::WindowUpdate.name(), "WINDOW_UPDATE");

        // The code and name tables agree for every registered type
        let names: std::collections::HashSet<_> = (0x0..=0x9u8)
            .map(|code| {
                let kind = FrameType::from_u8(code).unwrap();
                assert_eq!(kind.as_u8(), code);
                kind.name()
            })
            .collect();
        assert_eq!(names.len(), 10);
        assert!((0xa..=0xffu8).all(|code| FrameType::from_u8(code).is_none()));
    }

    #[test]
    fn test_frame_flags() {
        let mut flags = FrameFlags::empty();
        assert!(!flags.is_end_stream());

        flags.set(FrameFlags::END_STREAM);
        flags.set(FrameFlags::END_HEADERS);
        assert!(flags.is_end_stream());
        assert!(flags.is_end_headers());
        assert!(!flags.is_padded());
    }

    #[test]
    fn test_header_parse() {
        let bytes = [0x00, 0x01, 0x02, 0x01, 0x25, 0x80, 0x00, 0x00, 0x07];
        let header = FrameHeader::parse(&bytes).unwrap();

        assert_eq!(header.length(), 0x0102);
        assert_eq!(header.frame_type(), Some(FrameType::Headers));
        assert_eq!(header.flags().as_u8(), 0x25);
        // reserved bit is dropped
        assert_eq!(header.stream_id(), 7);
    }

    #[test]
    fn test_header_parse_short_input() {
        let result = FrameHeader::parse(&[0, 0, 0, 4]);
        assert!(matches!(result, Err(Error::MalformedHeader(4))));
    }

    #[test]
    fn test_header_round_trip() {
        let lengths = [0u32, 1, 16_384, MAX_FRAME_LENGTH];
        let stream_ids = [0u32, 1, 2, 0x7FFF_FFFE, 0x7FFF_FFFF];
        // Every registered type plus unregistered codes at both ends
        let kinds = (0x0u8..=0x9).chain([0xa, 0x7f, 0xee, 0xff]);

        for kind in kinds {
            for flags in 0..=u8::MAX {
                for &length in &lengths {
                    for &stream_id in &stream_ids {
                        let header =
                            FrameHeader::with_kind(kind, FrameFlags::from_u8(flags), stream_id, length);
                        let bytes = header.serialize();
                        let parsed = FrameHeader::parse(&bytes).unwrap();

                        assert_eq!(parsed, header);
                        assert_eq!(parsed.serialize(), bytes);
                        assert_eq!(
                            (parsed.length(), parsed.kind(), parsed.flags().as_u8(), parsed.stream_id()),
                            (length, kind, flags, stream_id)
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_header_serialize_clears_reserved_bit() {
        let header = FrameHeader::new(FrameType::Data, FrameFlags::empty(), 0xFFFF_FFFF, 0);
        let bytes = header.serialize();
        assert_eq!(&bytes[5..9], &[0x7f, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_settings_parse() {
        let body = Bytes::from_static(&[0x00, 0x04, 0x00, 0x00, 0xff, 0xff, 0x00, 0x03, 0, 0, 0, 100]);
        let frame = SettingsFrame::parse(header(FrameType::Settings, 0, 0, 12), body).unwrap();

        assert!(!frame.ack);
        assert_eq!(
            frame.params,
            vec![
                Setting::new(SettingsParameter::InitialWindowSize, 65535),
                Setting::new(SettingsParameter::MaxConcurrentStreams, 100),
            ]
        );
    }

    #[test]
    fn test_settings_parse_skips_unknown_identifier() {
        let body = Bytes::from_static(&[0x00, 0x42, 0, 0, 0, 1, 0x00, 0x01, 0, 0, 0x10, 0]);
        let frame = SettingsFrame::parse(header(FrameType::Settings, 0, 0, 12), body).unwrap();
        assert_eq!(
            frame.params,
            vec![Setting::new(SettingsParameter::HeaderTableSize, 4096)]
        );
    }

    #[test]
    fn test_settings_parse_bad_length() {
        let body = Bytes::from_static(&[0x00, 0x04, 0x00, 0x00, 0xff]);
        let result = SettingsFrame::parse(header(FrameType::Settings, 0, 0, 5), body);
        assert!(matches!(result, Err(Error::MalformedSettings(5))));
    }

    #[test]
    fn test_settings_ack_with_payload() {
        let body = Bytes::from_static(&[0x00, 0x04, 0, 0, 0, 1]);
        let result = SettingsFrame::parse(header(FrameType::Settings, FrameFlags::ACK, 0, 6), body);
        assert!(matches!(result, Err(Error::FrameSize(_))));
    }

    #[test]
    fn test_settings_ack_encoding() {
        let encoded = SettingsFrame::ack().to_binary();
        assert_eq!(&encoded[..], &[0, 0, 0, 0x4, FrameFlags::ACK, 0, 0, 0, 0]);
    }

    #[test]
    fn test_settings_encoding() {
        let frame = SettingsFrame::new(vec![Setting::new(SettingsParameter::MaxFrameSize, 32_768)]);
        let encoded = frame.to_binary();

        assert_eq!(&encoded[..9], &[0, 0, 6, 0x4, 0, 0, 0, 0, 0]);
        assert_eq!(&encoded[9..], &[0x00, 0x05, 0x00, 0x00, 0x80, 0x00]);
        assert_eq!(frame.header.length(), 6);
    }

    #[test]
    fn test_window_update_parse() {
        let body = Bytes::from_static(&[0x80, 0x00, 0x10, 0x00]);
        let frame = WindowUpdateFrame::parse(header(FrameType::WindowUpdate, 0, 3, 4), body).unwrap();
        assert_eq!(frame.size_increment, 4096);
        assert_eq!(frame.header.stream_id(), 3);
    }

    #[test]
    fn test_window_update_zero_increment() {
        // Only the reserved bit set: increment is zero
        let body = Bytes::from_static(&[0x80, 0x00, 0x00, 0x00]);
        let result = WindowUpdateFrame::parse(header(FrameType::WindowUpdate, 0, 0, 4), body);
        assert!(matches!(result, Err(Error::FlowControl(_))));
    }

    #[test]
    fn test_window_update_bad_length() {
        let body = Bytes::from_static(&[0x00, 0x00, 0x01]);
        let result = WindowUpdateFrame::parse(header(FrameType::WindowUpdate, 0, 0, 3), body);
        assert!(matches!(result, Err(Error::FrameSize(_))));
    }

    #[test]
    fn test_headers_parse_plain() {
        let flags = FrameFlags::END_HEADERS | FrameFlags::END_STREAM;
        let body = Bytes::from_static(b"\x82\x86\x84");
        let frame = HeadersFrame::parse(header(FrameType::Headers, flags, 1, 3), body).unwrap();

        assert_eq!(&frame.header_block[..], b"\x82\x86\x84");
        assert!(frame.end_headers);
        assert!(frame.end_stream);
        assert_eq!(frame.priority, None);
        assert_eq!(frame.padding, None);
    }

    #[test]
    fn test_headers_parse_padded_with_priority() {
        let flags = FrameFlags::PADDED | FrameFlags::PRIORITY | FrameFlags::END_HEADERS;
        let body = Bytes::from_static(&[
            2, // pad length
            0x80, 0x00, 0x00, 0x03, // exclusive, depends on 3
            15,   // weight
            0x82, 0x84, // fragment
            0, 0, // padding
        ]);
        let frame = HeadersFrame::parse(header(FrameType::Headers, flags, 5, body.len()), body).unwrap();

        assert_eq!(frame.padding, Some(2));
        assert_eq!(frame.priority, Some(PrioritySpec::new(3, true, 15)));
        assert_eq!(&frame.header_block[..], &[0x82, 0x84]);
        assert!(!frame.end_stream);
    }

    #[test]
    fn test_headers_padding_too_long() {
        let body = Bytes::from_static(&[9, 0x82]);
        let result = HeadersFrame::parse(header(FrameType::Headers, FrameFlags::PADDED, 1, 2), body);
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn test_headers_encoding_matches_parse() {
        let frame = HeadersFrame::new(7, Bytes::from_static(b"\x82"), false, true)
            .with_priority(PrioritySpec::new(1, false, 200))
            .with_padding(3);
        let wire = frame.to_binary();

        let parsed_header = FrameHeader::parse(&wire).unwrap();
        assert_eq!(parsed_header, frame.header);
        assert_eq!(parsed_header.length(), 1 + 5 + 1 + 3);

        let parsed = HeadersFrame::parse(parsed_header, wire.slice(FRAME_HEADER_SIZE..)).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_data_frame_padding() {
        let frame = DataFrame::new(1, Bytes::from("Hi"), false).with_padding(10);
        // Pad length octet, data, padding
        assert_eq!(frame.header.length(), 13);
        assert!(frame.header.flags().is_padded());

        let encoded = frame.to_binary();
        assert_eq!(encoded[0..3], [0, 0, 13]);
        assert_eq!(encoded[4] & FrameFlags::PADDED, FrameFlags::PADDED);
        assert_eq!(encoded[9], 10);
        assert_eq!(&encoded[10..12], b"Hi");

        let parsed = DataFrame::parse(
            FrameHeader::parse(&encoded).unwrap(),
            encoded.slice(FRAME_HEADER_SIZE..),
        )
        .unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(&parsed.data[..], b"Hi");
        assert_eq!(parsed.padding, Some(10));
    }

    #[test]
    fn test_fixed_size_frames() {
        let rst = RstStreamFrame::parse(
            header(FrameType::RstStream, 0, 1, 4),
            Bytes::from_static(&[0, 0, 0, 0x8]),
        )
        .unwrap();
        assert_eq!(rst.error_code, ErrorCode::Cancel);

        let ping = PingFrame::parse(
            header(FrameType::Ping, FrameFlags::ACK, 0, 8),
            Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]),
        )
        .unwrap();
        assert!(ping.ack);
        assert_eq!(ping.data, [1, 2, 3, 4, 5, 6, 7, 8]);

        let short_ping = PingFrame::parse(header(FrameType::Ping, 0, 0, 4), Bytes::from_static(&[0; 4]));
        assert!(matches!(short_ping, Err(Error::FrameSize(_))));

        let priority = PriorityFrame::parse(
            header(FrameType::Priority, 0, 3, 5),
            Bytes::from_static(&[0, 0, 0, 1, 32]),
        )
        .unwrap();
        assert_eq!(priority.priority, PrioritySpec::new(1, false, 32));
    }

    #[test]
    fn test_goaway_parse() {
        let body = Bytes::from_static(&[0, 0, 0, 5, 0, 0, 0, 1, b'b', b'y', b'e']);
        let frame = GoawayFrame::parse(header(FrameType::Goaway, 0, 0, body.len()), body).unwrap();

        assert_eq!(frame.last_stream_id, 5);
        assert_eq!(frame.error_code, ErrorCode::ProtocolError);
        assert_eq!(&frame.debug_data[..], b"bye");
        assert_eq!(frame.to_binary().len(), FRAME_HEADER_SIZE + 11);
    }

    #[test]
    fn test_push_promise_parse() {
        let body = Bytes::from_static(&[0x80, 0, 0, 2, 0x82]);
        let frame = PushPromiseFrame::parse(
            header(FrameType::PushPromise, FrameFlags::END_HEADERS, 1, 5),
            body,
        )
        .unwrap();
        assert_eq!(frame.promised_stream_id, 2);
        assert_eq!(&frame.header_block[..], &[0x82]);
        assert!(frame.end_headers);
    }

    #[test]
    fn test_every_known_type_decodes() {
        let samples: [(FrameType, &'static [u8]); 10] = [
            (FrameType::Data, &[][..]),
            (FrameType::Headers, &[][..]),
            (FrameType::Priority, &[0, 0, 0, 0, 0][..]),
            (FrameType::RstStream, &[0, 0, 0, 0][..]),
            (FrameType::Settings, &[][..]),
            (FrameType::PushPromise, &[0, 0, 0, 2][..]),
            (FrameType::Ping, &[0; 8][..]),
            (FrameType::Goaway, &[0; 8][..]),
            (FrameType::WindowUpdate, &[0, 0, 0, 1][..]),
            (FrameType::Continuation, &[][..]),
        ];

        for (frame_type, body) in samples {
            let frame = Frame::parse(header(frame_type, 0, 1, body.len()), Bytes::from_static(body))
                .unwrap();
            assert_eq!(frame.frame_type(), Some(frame_type));
        }
    }

    #[test]
    fn test_unknown_type_is_kept() {
        let hdr = FrameHeader::with_kind(0x42, FrameFlags::from_u8(0x3), 9, 2);
        let frame = Frame::parse(hdr, Bytes::from_static(b"ok")).unwrap();

        assert!(matches!(frame, Frame::Unknown(_)));
        assert_eq!(frame.frame_type(), None);
        assert_eq!(frame.stream_id(), 9);

        let wire = frame.to_binary();
        assert_eq!(&wire[..FRAME_HEADER_SIZE], &hdr.serialize());
        assert_eq!(&wire[FRAME_HEADER_SIZE..], b"ok");
    }
}
