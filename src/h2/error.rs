//! HTTP/2 error types
//!
//! This module defines the error taxonomy of the protocol core and maps
//! every error onto the error codes defined in RFC 7540 Section 7, so a
//! caller can pick the right GOAWAY or RST_STREAM code.

use std::fmt;

/// HTTP/2 errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport failed or closed in the middle of a frame
    #[error("transport: {0}")]
    Io(#[from] std::io::Error),

    /// Frame header shorter than 9 bytes
    #[error("frame header needs 9 bytes, got {0}")]
    MalformedHeader(usize),

    /// SETTINGS payload that is not a multiple of 6 bytes
    #[error("SETTINGS payload length {0} is not a multiple of 6")]
    MalformedSettings(usize),

    /// Payload length wrong for the frame type, or above the negotiated maximum
    #[error("frame size: {0}")]
    FrameSize(String),

    /// Generic connection-level protocol violation
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Bad window increment or window size
    #[error("flow control: {0}")]
    FlowControl(String),

    /// Header block the HPACK decoder rejected
    #[error("header compression: {0}")]
    Compression(String),

    /// Error confined to a single stream
    #[error("stream {stream_id} reset with {code}: {reason}")]
    Stream {
        /// Stream that failed
        stream_id: u32,
        /// Code carried by the RST_STREAM frame
        code: ErrorCode,
        /// Human readable cause
        reason: String,
    },

    /// First 24 bytes were not the client preface
    #[error("client did not send the connection preface")]
    MissingPreface,

    /// Local configuration holds an out-of-range setting
    #[error("bad local settings: {0}")]
    InvalidSettings(String),
}

impl Error {
    /// Build a stream error
    pub fn stream(stream_id: u32, code: ErrorCode, reason: impl Into<String>) -> Self {
        Error::Stream {
            stream_id,
            code,
            reason: reason.into(),
        }
    }

    /// RFC 7540 error code that classifies this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Io(_) => ErrorCode::InternalError,
            Error::MalformedHeader(_) | Error::FrameSize(_) => ErrorCode::FrameSizeError,
            Error::MalformedSettings(_) => ErrorCode::FrameSizeError,
            Error::Protocol(_) | Error::MissingPreface => ErrorCode::ProtocolError,
            Error::FlowControl(_) => ErrorCode::FlowControlError,
            Error::Compression(_) => ErrorCode::CompressionError,
            Error::Stream { code, .. } => *code,
            Error::InvalidSettings(_) => ErrorCode::InternalError,
        }
    }

    /// True if only one stream is affected and the connection can go on
    pub fn is_stream_error(&self) -> bool {
        matches!(self, Error::Stream { .. })
    }
}

/// Error codes carried by RST_STREAM and GOAWAY (RFC 7540 Section 7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    /// Graceful shutdown, no error (0x0)
    NoError = 0x0,
    /// Generic protocol violation (0x1)
    ProtocolError = 0x1,
    /// Unexpected failure inside the endpoint (0x2)
    InternalError = 0x2,
    /// Flow-control limits were broken (0x3)
    FlowControlError = 0x3,
    /// SETTINGS were not acknowledged in time (0x4)
    SettingsTimeout = 0x4,
    /// Frame arrived after the stream was half-closed (0x5)
    StreamClosed = 0x5,
    /// Frame had an invalid length (0x6)
    FrameSizeError = 0x6,
    /// Stream was rejected before any application processing (0x7)
    RefusedStream = 0x7,
    /// Stream is no longer needed (0x8)
    Cancel = 0x8,
    /// HPACK state could not be kept in sync (0x9)
    CompressionError = 0x9,
    /// Tunnel for a CONNECT request was reset or closed (0xa)
    ConnectError = 0xa,
    /// Peer is generating excessive load (0xb)
    EnhanceYourCalm = 0xb,
    /// Transport security does not meet the minimum (0xc)
    InadequateSecurity = 0xc,
    /// HTTP/1.1 must be used for this request (0xd)
    Http11Required = 0xd,
}

impl ErrorCode {
    /// Wire value
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Look up a known code
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0x0 => Some(ErrorCode::NoError),
            0x1 => Some(ErrorCode::ProtocolError),
            0x2 => Some(ErrorCode::InternalError),
            0x3 => Some(ErrorCode::FlowControlError),
            0x4 => Some(ErrorCode::SettingsTimeout),
            0x5 => Some(ErrorCode::StreamClosed),
            0x6 => Some(ErrorCode::FrameSizeError),
            0x7 => Some(ErrorCode::RefusedStream),
            0x8 => Some(ErrorCode::Cancel),
            0x9 => Some(ErrorCode::CompressionError),
            0xa => Some(ErrorCode::ConnectError),
            0xb => Some(ErrorCode::EnhanceYourCalm),
            0xc => Some(ErrorCode::InadequateSecurity),
            0xd => Some(ErrorCode::Http11Required),
            _ => None,
        }
    }

    /// Decode a wire error code, treating unknown codes as INTERNAL_ERROR
    /// (RFC 7540 Section 7)
    pub fn from_wire(code: u32) -> Self {
        Self::from_u32(code).unwrap_or(ErrorCode::InternalError)
    }

    /// Registered name, e.g. `PROTOCOL_ERROR`
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::NoError => "NO_ERROR",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::FlowControlError => "FLOW_CONTROL_ERROR",
            ErrorCode::SettingsTimeout => "SETTINGS_TIMEOUT",
            ErrorCode::StreamClosed => "STREAM_CLOSED",
            ErrorCode::FrameSizeError => "FRAME_SIZE_ERROR",
            ErrorCode::RefusedStream => "REFUSED_STREAM",
            ErrorCode::Cancel => "CANCEL",
            ErrorCode::CompressionError => "COMPRESSION_ERROR",
            ErrorCode::ConnectError => "CONNECT_ERROR",
            ErrorCode::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            ErrorCode::InadequateSecurity => "INADEQUATE_SECURITY",
            ErrorCode::Http11Required => "HTTP_1_1_REQUIRED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#x})", self.name(), *self as u32)
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;
