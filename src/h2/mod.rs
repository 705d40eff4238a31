//! HTTP/2 server protocol core
//!
//! This module implements the server side of RFC 7540 framing: the client
//! connection preface, the frame codec, per-stream state and settings
//! negotiation.
//!
//! # Architecture
//!
//! Incoming bytes flow through three layers:
//!
//! - [`codec::FrameCodec`] reads one frame header plus exactly its payload
//!   and decodes it into a [`frames::Frame`] variant
//! - [`connection::Connection`] handles connection-level frames (stream 0)
//!   itself and routes the rest by stream ID, creating streams on demand
//! - [`stream::H2Stream`] runs the RFC 7540 Section 5.1 state machine and
//!   collects header block fragments
//!
//! Completed header blocks are decoded through a
//! [`header_block::HeaderBlockDecoder`] and handed to the application as
//! [`connection::StreamEvent`] messages. The application answers with
//! [`connection::StreamCommand`] messages, which the connection encodes and
//! writes from its own thread.
//!
//! # Examples
//!
//! ```no_run
//! use h2core::h2::{Connection, HeaderField, SettingsBuilder, StreamCommand, StreamEvent};
//! use std::io::{BufReader, BufWriter};
//! use std::net::TcpListener;
//! use std::sync::mpsc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let listener = TcpListener::bind("127.0.0.1:8080")?;
//! let (tcp_stream, _) = listener.accept()?;
//! // Lets queued responses go out while the client is quiet
//! tcp_stream.set_read_timeout(Some(std::time::Duration::from_millis(50)))?;
//!
//! let settings = SettingsBuilder::new().max_concurrent_streams(100).build()?;
//! let (events, events_rx) = mpsc::channel();
//! let (commands, commands_rx) = mpsc::channel();
//! let mut connection = Connection::with_settings(
//!     BufReader::new(tcp_stream.try_clone()?),
//!     BufWriter::new(tcp_stream),
//!     settings,
//! )
//! .with_events(events)
//! .with_commands(commands_rx);
//!
//! std::thread::spawn(move || {
//!     for event in events_rx {
//!         if let StreamEvent::Headers { stream_id, end_stream: true, .. } = event {
//!             let status = HeaderField::new(&b":status"[..], &b"204"[..]);
//!             let _ = commands.send(StreamCommand::Headers {
//!                 stream_id,
//!                 fields: vec![status],
//!                 end_stream: true,
//!             });
//!         }
//!     }
//! });
//! connection.serve()?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod connection;
pub mod error;
pub mod frames;
pub mod header_block;
pub mod server;
pub mod settings;
pub mod stream;

pub use codec::{FrameCodec, Polled};
pub use connection::{Connection, StreamCommand, StreamEvent};
pub use error::{Error, ErrorCode, Result};
pub use frames::{
    ContinuationFrame, DataFrame, Frame, FrameFlags, FrameHeader, FrameType, GoawayFrame,
    HeadersFrame, PingFrame, PriorityFrame, PrioritySpec, PushPromiseFrame, RstStreamFrame,
    SettingsFrame, UnknownFrame, WindowUpdateFrame,
};
pub use header_block::{
    HeaderBlockDecoder, HeaderBlockEncoder, HeaderField, HpackDecoder, HpackEncoder,
};
pub use server::{H2Server, H2ServerBuilder};
pub use settings::{Setting, Settings, SettingsBuilder, SettingsParameter};
pub use stream::{H2Stream, StreamId, StreamState};

/// HTTP/2 connection preface that must be sent by clients
///
/// From RFC 7540 Section 3.5:
/// "PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n"
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Default initial window size (65535 bytes)
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65535;

/// Default maximum frame size (16384 bytes)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;

/// Default header table size (4096 bytes)
pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;

/// Maximum stream ID value (2^31 - 1)
pub const MAX_STREAM_ID: u32 = 0x7FFFFFFF;

/// Stream ID 0 (connection-level)
pub const CONNECTION_STREAM_ID: u32 = 0;
