//! HTTP/2 stream state machine
//!
//! This module implements the stream life cycle of RFC 7540 Section 5.1 as
//! seen by a server. Frames received on a stream move the remote half of
//! the stream; the `send_*` methods move the local half.
//!
//! ```text
//!                  recv H
//!         idle  ----------->  open
//!                     recv ES /    \ send ES
//!                            v      v
//!               half closed (remote)  half closed (local)
//!                     send ES \    / recv ES
//!                              v  v
//!                             closed   <--- R (either side)
//! ```

use super::error::{Error, ErrorCode, Result};
use super::frames::{
    ContinuationFrame, DataFrame, Frame, HeadersFrame, PrioritySpec, RstStreamFrame,
    WindowUpdateFrame,
};
use bytes::{Bytes, BytesMut};

/// Stream ID type
pub type StreamId = u32;

/// Stream state as defined in RFC 7540 Section 5.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Idle: No frames have been sent/received
    Idle,
    /// Open: Both sides can send frames
    Open,
    /// Half-closed (local): We can't send, they can
    HalfClosedLocal,
    /// Half-closed (remote): They can't send, we can
    HalfClosedRemote,
    /// Closed: Stream is closed
    Closed,
}

impl StreamState {
    /// Check if stream can send data
    pub fn can_send(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }

    /// Check if stream can receive data
    pub fn can_receive(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal)
    }

    /// Check if stream is closed
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamState::Closed)
    }
}

/// What a received frame produced for the layer above the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A header block is complete and ready for HPACK decoding
    HeaderBlock {
        /// Concatenated fragments of HEADERS and CONTINUATION frames
        block: Bytes,
        /// The peer closed its side with this block
        end_stream: bool,
    },
    /// Request body bytes
    Data {
        /// Payload without padding
        data: Bytes,
        /// The peer closed its side with this frame
        end_stream: bool,
    },
    /// The peer reset the stream
    Reset(ErrorCode),
}

/// HTTP/2 stream
#[derive(Debug)]
pub struct H2Stream {
    /// Stream ID
    id: StreamId,
    /// Stream state
    state: StreamState,
    /// Priority information
    priority: Option<PrioritySpec>,
    /// Header block fragments waiting for END_HEADERS
    header_block: BytesMut,
    /// A header block has been started and not finished
    headers_open: bool,
    /// END_STREAM was set on the HEADERS frame of the open block
    block_end_stream: bool,
    /// At least one header block has been completed
    headers_complete: bool,
    /// Sum of WINDOW_UPDATE increments received
    window_credit: u64,
}

impl H2Stream {
    /// Create a new stream
    pub fn new(id: StreamId) -> Self {
        H2Stream {
            id,
            state: StreamState::Idle,
            priority: None,
            header_block: BytesMut::new(),
            headers_open: false,
            block_end_stream: false,
            headers_complete: false,
            window_credit: 0,
        }
    }

    /// Get stream ID
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Get stream state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Get priority
    pub fn priority(&self) -> Option<&PrioritySpec> {
        self.priority.as_ref()
    }

    /// Check if a complete header block has been received
    pub fn headers_complete(&self) -> bool {
        self.headers_complete
    }

    /// Check if a header block is waiting for CONTINUATION frames
    pub fn expects_continuation(&self) -> bool {
        self.headers_open
    }

    /// Check if the peer has closed its side
    pub fn remote_ended(&self) -> bool {
        matches!(self.state, StreamState::HalfClosedRemote | StreamState::Closed)
    }

    /// Header block fragments received so far for the open block
    pub fn header_block(&self) -> &[u8] {
        &self.header_block
    }

    /// Sum of WINDOW_UPDATE increments received on this stream
    pub fn window_credit(&self) -> u64 {
        self.window_credit
    }

    /// True once the stream can be dropped by its connection
    pub fn is_closed(&self) -> bool {
        self.state.is_closed() && !self.headers_open
    }

    /// Process a frame addressed to this stream
    ///
    /// Errors returned here are stream errors: they concern this stream only
    /// and the caller is expected to reset it.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<Option<Delivery>> {
        match frame {
            Frame::Headers(f) => self.receive_headers(f),
            Frame::Continuation(f) => self.receive_continuation(f),
            Frame::Data(f) => self.receive_data(f),
            Frame::RstStream(f) => self.receive_reset(f),
            Frame::Priority(f) => {
                self.set_priority(f.priority)?;
                Ok(None)
            }
            Frame::WindowUpdate(f) => self.receive_window_update(f),
            other => Err(self.error(
                ErrorCode::ProtocolError,
                format!(
                    "{} is not a stream frame",
                    other.frame_type().map_or("UNKNOWN", |t| t.name())
                ),
            )),
        }
    }

    /// Process incoming HEADERS frame
    pub fn receive_headers(&mut self, frame: &HeadersFrame) -> Result<Option<Delivery>> {
        if self.headers_open {
            return Err(self.error(
                ErrorCode::ProtocolError,
                "HEADERS while a header block is still open",
            ));
        }

        match self.state {
            StreamState::Idle => {
                self.state = StreamState::Open;
            }
            StreamState::Open | StreamState::HalfClosedLocal => {
                // Trailers must end the stream
                if !frame.end_stream {
                    return Err(self.error(
                        ErrorCode::ProtocolError,
                        "trailing HEADERS without END_STREAM",
                    ));
                }
            }
            StreamState::HalfClosedRemote | StreamState::Closed => {
                return Err(self.error(
                    ErrorCode::StreamClosed,
                    format!("HEADERS in state {:?}", self.state),
                ));
            }
        }

        if let Some(priority) = frame.priority {
            self.set_priority(priority)?;
        }

        self.headers_open = true;
        self.block_end_stream = frame.end_stream;
        self.header_block.extend_from_slice(&frame.header_block);

        if frame.end_headers {
            Ok(Some(self.finish_header_block()))
        } else {
            Ok(None)
        }
    }

    /// Process incoming CONTINUATION frame
    pub fn receive_continuation(&mut self, frame: &ContinuationFrame) -> Result<Option<Delivery>> {
        if !self.headers_open {
            return Err(self.error(
                ErrorCode::ProtocolError,
                "CONTINUATION without an open header block",
            ));
        }

        self.header_block.extend_from_slice(&frame.header_block);

        if frame.end_headers {
            Ok(Some(self.finish_header_block()))
        } else {
            Ok(None)
        }
    }

    /// Process incoming DATA frame
    pub fn receive_data(&mut self, frame: &DataFrame) -> Result<Option<Delivery>> {
        match self.state {
            _ if self.headers_open => {
                return Err(self.error(
                    ErrorCode::ProtocolError,
                    "DATA inside an open header block",
                ));
            }
            StreamState::Idle => {
                return Err(self.error(ErrorCode::ProtocolError, "DATA on idle stream"));
            }
            StreamState::HalfClosedRemote | StreamState::Closed => {
                return Err(self.error(
                    ErrorCode::StreamClosed,
                    format!("DATA in state {:?}", self.state),
                ));
            }
            StreamState::Open | StreamState::HalfClosedLocal => {}
        }

        if frame.end_stream {
            self.close_remote();
        }

        Ok(Some(Delivery::Data {
            data: frame.data.clone(),
            end_stream: frame.end_stream,
        }))
    }

    /// Process incoming RST_STREAM frame
    pub fn receive_reset(&mut self, frame: &RstStreamFrame) -> Result<Option<Delivery>> {
        match self.state {
            StreamState::Idle => Err(self.error(ErrorCode::ProtocolError, "RST_STREAM on idle stream")),
            StreamState::Closed => Ok(None),
            _ => {
                self.reset();
                Ok(Some(Delivery::Reset(frame.error_code)))
            }
        }
    }

    /// Process incoming WINDOW_UPDATE frame
    pub fn receive_window_update(&mut self, frame: &WindowUpdateFrame) -> Result<Option<Delivery>> {
        if self.state == StreamState::Idle {
            return Err(self.error(ErrorCode::ProtocolError, "WINDOW_UPDATE on idle stream"));
        }
        self.window_credit += u64::from(frame.size_increment);
        Ok(None)
    }

    /// Prepare to send HEADERS
    pub fn send_headers(&mut self, end_stream: bool) -> Result<()> {
        match self.state {
            StreamState::Idle => {
                self.state = if end_stream {
                    StreamState::HalfClosedLocal
                } else {
                    StreamState::Open
                };
            }
            StreamState::Open | StreamState::HalfClosedRemote => {
                if end_stream {
                    self.close_local();
                }
            }
            _ => {
                return Err(self.error(
                    ErrorCode::StreamClosed,
                    format!("Cannot send HEADERS in state {:?}", self.state),
                ));
            }
        }

        Ok(())
    }

    /// Prepare to send DATA
    pub fn send_data(&mut self, end_stream: bool) -> Result<()> {
        if !self.state.can_send() {
            return Err(self.error(
                ErrorCode::StreamClosed,
                format!("Cannot send DATA in state {:?}", self.state),
            ));
        }

        if end_stream {
            self.close_local();
        }

        Ok(())
    }

    /// Reset the stream
    pub fn reset(&mut self) {
        self.state = StreamState::Closed;
        self.header_block.clear();
        self.headers_open = false;
        self.block_end_stream = false;
    }

    fn finish_header_block(&mut self) -> Delivery {
        self.headers_open = false;
        self.headers_complete = true;

        let end_stream = std::mem::take(&mut self.block_end_stream);
        if end_stream {
            self.close_remote();
        }

        Delivery::HeaderBlock {
            block: self.header_block.split().freeze(),
            end_stream,
        }
    }

    fn set_priority(&mut self, priority: PrioritySpec) -> Result<()> {
        if priority.stream_dependency == self.id {
            return Err(self.error(ErrorCode::ProtocolError, "stream depends on itself"));
        }
        self.priority = Some(priority);
        Ok(())
    }

    fn close_remote(&mut self) {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedRemote,
            StreamState::HalfClosedLocal => StreamState::Closed,
            state => state,
        };
    }

    fn close_local(&mut self) {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote => StreamState::Closed,
            state => state,
        };
    }

    fn error(&self, code: ErrorCode, reason: impl Into<String>) -> Error {
        Error::stream(self.id, code, reason)
    }
}
