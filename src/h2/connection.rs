//! HTTP/2 server connection
//!
//! A `Connection` owns one transport for its whole life. It checks the
//! client preface, then reads frames strictly in arrival order, applies
//! connection-level frames itself and routes everything else to the
//! stream it belongs to.
//!
//! The stream table and both settings tables live inside the connection
//! and are only touched from its own thread. Whatever the application does
//! with a stream happens elsewhere: finished header blocks, body data and
//! resets are published as `StreamEvent` values over a channel, and the
//! application answers with `StreamCommand` values over another.

use super::codec::{read_full, FrameCodec, Polled};
use super::error::{Error, ErrorCode, Result};
use super::frames::{
    ContinuationFrame, DataFrame, Frame, GoawayFrame, HeadersFrame, PingFrame, PriorityFrame,
    RstStreamFrame, SettingsFrame,
};
use super::header_block::{
    HeaderBlockDecoder, HeaderBlockEncoder, HeaderField, HpackDecoder, HpackEncoder,
};
use super::settings::Settings;
use super::stream::{Delivery, H2Stream, StreamId, StreamState};
use super::{CONNECTION_PREFACE, CONNECTION_STREAM_ID};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::ops::ControlFlow;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Something that happened on a stream, for the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A complete, decoded header block (request headers or trailers)
    Headers {
        /// Stream ID
        stream_id: StreamId,
        /// Decoded fields in wire order
        fields: Vec<HeaderField>,
        /// No more frames follow from the peer on this stream
        end_stream: bool,
    },
    /// Request body data
    Data {
        /// Stream ID
        stream_id: StreamId,
        /// Payload without padding
        data: Bytes,
        /// No more frames follow from the peer on this stream
        end_stream: bool,
    },
    /// The peer reset the stream
    Reset {
        /// Stream ID
        stream_id: StreamId,
        /// Code from the RST_STREAM frame
        error_code: ErrorCode,
    },
}

impl StreamEvent {
    /// Stream the event belongs to
    pub fn stream_id(&self) -> StreamId {
        match self {
            StreamEvent::Headers { stream_id, .. }
            | StreamEvent::Data { stream_id, .. }
            | StreamEvent::Reset { stream_id, .. } => *stream_id,
        }
    }
}

/// Something the application wants sent on a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamCommand {
    /// Send a header block (response headers or trailers)
    Headers {
        stream_id: StreamId,
        fields: Vec<HeaderField>,
        end_stream: bool,
    },
    /// Send body data
    Data {
        stream_id: StreamId,
        data: Bytes,
        end_stream: bool,
    },
    /// Reset the stream
    Reset {
        stream_id: StreamId,
        error_code: ErrorCode,
    },
}

/// Server side of one HTTP/2 connection
pub struct Connection<R: Read, W: Write> {
    /// Byte source
    reader: R,
    /// Buffered byte sink, flushed after every frame
    writer: W,
    /// Frame decoder
    codec: FrameCodec,
    /// Streams that are open or half-closed
    streams: HashMap<StreamId, H2Stream>,
    /// Highest stream ID opened so far
    last_stream_id: StreamId,
    /// Settings advertised by the peer
    remote_settings: Settings,
    /// Settings advertised by us
    local_settings: Settings,
    /// Header block decoder shared by all streams
    decoder: Box<dyn HeaderBlockDecoder>,
    /// Header block encoder shared by all streams
    encoder: Box<dyn HeaderBlockEncoder>,
    /// Application side, inbound
    events: Option<Sender<StreamEvent>>,
    /// Application side, outbound
    commands: Option<Receiver<StreamCommand>>,
    /// Close a connection with no streams after this long without frames
    idle_timeout: Option<Duration>,
    /// Stream whose header block must be continued by the next frame
    continuation_stream: Option<StreamId>,
    /// Streams over the concurrency limit, reset once their headers are read
    refused: HashSet<StreamId>,
    /// Sum of connection-level WINDOW_UPDATE increments
    window_credit: u64,
    /// Number of SETTINGS ACKs received
    settings_acks: u64,
    /// GOAWAY sent by the peer, if any
    goaway: Option<GoawayFrame>,
}

impl<R: Read, W: Write> Connection<R, W> {
    /// Create a connection advertising default settings
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_settings(reader, writer, Settings::new())
    }

    /// Create a connection advertising `local_settings`
    pub fn with_settings(reader: R, writer: W, local_settings: Settings) -> Self {
        Connection {
            reader,
            writer,
            codec: FrameCodec::with_max_frame_size(local_settings.max_frame_size()),
            streams: HashMap::new(),
            last_stream_id: 0,
            remote_settings: Settings::new(),
            local_settings,
            decoder: Box::new(HpackDecoder::new()),
            encoder: Box::new(HpackEncoder::new()),
            events: None,
            commands: None,
            idle_timeout: None,
            continuation_stream: None,
            refused: HashSet::new(),
            window_credit: 0,
            settings_acks: 0,
            goaway: None,
        }
    }

    /// Publish stream events on `events`
    pub fn with_events(mut self, events: Sender<StreamEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Take outbound frames from `commands`
    ///
    /// Commands are applied after every frame. With a reader that times out
    /// (see `FrameCodec::poll_frame`) they are also applied while the peer is
    /// quiet. Once the peer is done, the connection keeps taking commands
    /// until every stream has been answered or all senders are gone.
    pub fn with_commands(mut self, commands: Receiver<StreamCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Close the connection after `timeout` without frames while no stream is open
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Replace the HPACK decoder
    pub fn with_decoder(mut self, decoder: Box<dyn HeaderBlockDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Replace the HPACK encoder
    pub fn with_encoder(mut self, encoder: Box<dyn HeaderBlockEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Settings advertised by the peer
    pub fn remote_settings(&self) -> &Settings {
        &self.remote_settings
    }

    /// Settings advertised by us
    pub fn local_settings(&self) -> &Settings {
        &self.local_settings
    }

    /// Highest stream ID opened so far
    pub fn last_stream_id(&self) -> StreamId {
        self.last_stream_id
    }

    /// Look up a stream that is not closed yet
    pub fn stream(&self, stream_id: StreamId) -> Option<&H2Stream> {
        self.streams.get(&stream_id)
    }

    /// Number of streams in the table
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Sum of connection-level WINDOW_UPDATE increments received
    pub fn window_credit(&self) -> u64 {
        self.window_credit
    }

    /// Number of SETTINGS ACKs received
    pub fn settings_acks(&self) -> u64 {
        self.settings_acks
    }

    /// GOAWAY received from the peer
    pub fn goaway(&self) -> Option<&GoawayFrame> {
        self.goaway.as_ref()
    }

    /// The byte sink
    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Give back the transport halves
    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Check the 24-byte client connection preface (RFC 7540 Section 3.5)
    ///
    /// A preface that differs in any byte yields `Ok(false)`. A transport
    /// that delivers fewer than 24 bytes yields an I/O error. The transport
    /// is left open either way.
    pub fn has_proper_preface(&mut self) -> Result<bool> {
        let mut preface = [0u8; 24];
        read_full(&mut self.reader, &mut preface)?;
        Ok(preface[..] == CONNECTION_PREFACE[..])
    }

    /// Run the whole server side of the connection
    ///
    /// Checks the preface, sends our SETTINGS and processes frames until the
    /// peer closes the transport or sends GOAWAY. On a connection error a
    /// GOAWAY carrying the error code is sent before the error is returned.
    pub fn serve(&mut self) -> Result<()> {
        if !self.has_proper_preface()? {
            return Err(Error::MissingPreface);
        }
        self.send_local_settings()?;

        match self.handle() {
            Ok(()) => Ok(()),
            Err(Error::Io(e)) => Err(Error::Io(e)),
            Err(err) => {
                warn!(error = %err, code = %err.code(), "connection error");
                if let Err(e) = self.send_goaway(err.code(), &err.to_string()) {
                    debug!(error = %e, "failed to send GOAWAY");
                }
                Err(err)
            }
        }
    }

    /// Read and process frames until the transport ends
    ///
    /// Returns `Ok(())` when the peer closes the transport on a frame boundary
    /// or sends GOAWAY, after the streams still open have been answered. Any
    /// connection error stops the loop and is returned; stream errors only
    /// reset the stream concerned.
    pub fn handle(&mut self) -> Result<()> {
        let mut last_frame = Instant::now();
        loop {
            match self.codec.poll_frame(&mut self.reader)? {
                Polled::Frame(frame) => {
                    last_frame = Instant::now();
                    if self.process_frame(frame)?.is_break() {
                        break;
                    }
                }
                Polled::Closed => break,
                Polled::Idle => {
                    let expired = self
                        .idle_timeout
                        .map_or(false, |timeout| last_frame.elapsed() >= timeout);
                    if expired && self.streams.is_empty() {
                        info!(last_stream_id = self.last_stream_id, "closing idle connection");
                        self.send_goaway(ErrorCode::NoError, "idle timeout")?;
                        break;
                    }
                }
            }
            self.apply_commands()?;
        }

        self.finish_streams()?;
        debug!(last_stream_id = self.last_stream_id, "connection finished");
        Ok(())
    }

    /// Merge a received SETTINGS frame into the remote settings table
    ///
    /// The frame must be on stream 0 (RFC 7540 Section 6.5) and every value
    /// must be in range; otherwise the table is left untouched.
    pub fn update_remote_settings(&mut self, frame: &SettingsFrame) -> Result<()> {
        let stream_id = frame.header.stream_id();
        if stream_id != CONNECTION_STREAM_ID {
            return Err(Error::Protocol(format!(
                "SETTINGS frame on stream {}",
                stream_id
            )));
        }

        for setting in &frame.params {
            setting.validate()?;
        }
        self.remote_settings.apply(&frame.params);

        for setting in &frame.params {
            debug!(parameter = %setting.parameter, value = setting.value, "remote setting");
        }
        Ok(())
    }

    /// Acknowledge the peer's SETTINGS
    pub fn send_ack_settings(&mut self) -> Result<()> {
        self.write_frame(SettingsFrame::ack())
    }

    /// Send our own SETTINGS frame
    pub fn send_local_settings(&mut self) -> Result<()> {
        let frame = SettingsFrame::from_settings(&self.local_settings);
        self.write_frame(frame)
    }

    /// Tell the peer we are shutting down
    pub fn send_goaway(&mut self, error_code: ErrorCode, debug_data: &str) -> Result<()> {
        let frame = GoawayFrame::new(
            self.last_stream_id,
            error_code,
            Bytes::copy_from_slice(debug_data.as_bytes()),
        );
        self.write_frame(frame)
    }

    /// Send a header block on a stream the peer opened
    ///
    /// The block is split into HEADERS and CONTINUATION frames no larger
    /// than the peer's SETTINGS_MAX_FRAME_SIZE. A stream that is closed for
    /// sending, or unknown, is a stream error and nothing is written.
    pub fn send_headers(
        &mut self,
        stream_id: StreamId,
        fields: &[HeaderField],
        end_stream: bool,
    ) -> Result<()> {
        self.open_for_sending(stream_id)?.send_headers(end_stream)?;

        let max = self.remote_settings.max_frame_size() as usize;
        let mut rest = self.encoder.encode(fields);
        let first = rest.split_to(rest.len().min(max));
        self.write_frame(HeadersFrame::new(stream_id, first, end_stream, rest.is_empty()))?;
        while !rest.is_empty() {
            let fragment = rest.split_to(rest.len().min(max));
            self.write_frame(ContinuationFrame::new(stream_id, fragment, rest.is_empty()))?;
        }

        self.settle(stream_id)
    }

    /// Send body data, split to the peer's SETTINGS_MAX_FRAME_SIZE
    ///
    /// Empty data with `end_stream` still produces one frame.
    pub fn send_data(&mut self, stream_id: StreamId, data: Bytes, end_stream: bool) -> Result<()> {
        self.open_for_sending(stream_id)?.send_data(end_stream)?;

        let max = self.remote_settings.max_frame_size() as usize;
        let mut rest = data;
        loop {
            let chunk = rest.split_to(rest.len().min(max));
            let last = rest.is_empty();
            self.write_frame(DataFrame::new(stream_id, chunk, end_stream && last))?;
            if last {
                break;
            }
        }

        self.settle(stream_id)
    }

    /// Reset a stream from our side
    pub fn send_reset(&mut self, stream_id: StreamId, error_code: ErrorCode) -> Result<()> {
        self.open_for_sending(stream_id)?.reset();
        debug!(stream_id, code = %error_code, "resetting stream");
        self.write_frame(RstStreamFrame::new(stream_id, error_code))?;
        self.settle(stream_id)
    }

    fn open_for_sending(&mut self, stream_id: StreamId) -> Result<&mut H2Stream> {
        if self.refused.contains(&stream_id) {
            return Err(Error::stream(stream_id, ErrorCode::RefusedStream, "stream was refused"));
        }
        self.streams
            .get_mut(&stream_id)
            .ok_or_else(|| Error::stream(stream_id, ErrorCode::StreamClosed, "stream is not open"))
    }

    /// Apply every command already queued
    fn apply_commands(&mut self) -> Result<()> {
        let Some(commands) = self.commands.take() else {
            return Ok(());
        };
        loop {
            match commands.try_recv() {
                Ok(command) => self.apply_command(command)?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
        self.commands = Some(commands);
        Ok(())
    }

    /// Wait for the application to answer the streams still open
    fn finish_streams(&mut self) -> Result<()> {
        // No more requests: lets the application see the end of its events
        self.events = None;
        let Some(commands) = self.commands.take() else {
            return Ok(());
        };
        while self.streams.values().any(|s| s.state().can_send()) {
            let next = match self.idle_timeout {
                Some(timeout) => commands.recv_timeout(timeout).ok(),
                None => commands.recv().ok(),
            };
            match next {
                Some(command) => self.apply_command(command)?,
                None => break,
            }
        }
        Ok(())
    }

    fn apply_command(&mut self, command: StreamCommand) -> Result<()> {
        let result = match command {
            StreamCommand::Headers {
                stream_id,
                fields,
                end_stream,
            } => self.send_headers(stream_id, &fields, end_stream),
            StreamCommand::Data {
                stream_id,
                data,
                end_stream,
            } => self.send_data(stream_id, data, end_stream),
            StreamCommand::Reset {
                stream_id,
                error_code,
            } => self.send_reset(stream_id, error_code),
        };

        match result {
            // The peer may have reset the stream in the meantime
            Err(err) if err.is_stream_error() => {
                debug!(error = %err, "dropping stream command");
                Ok(())
            }
            other => other,
        }
    }

    fn write_frame(&mut self, frame: impl Into<Frame>) -> Result<()> {
        let frame = frame.into();
        trace!(?frame, "write frame");
        FrameCodec::write_frame(&mut self.writer, &frame)
    }

    fn process_frame(&mut self, frame: Frame) -> Result<ControlFlow<()>> {
        let stream_id = frame.stream_id();
        trace!(?frame, "received frame");

        // A header block must not be interleaved with anything (RFC 7540 Section 6.10)
        match (self.continuation_stream, &frame) {
            (Some(expected), Frame::Continuation(_)) if expected == stream_id => {}
            (Some(expected), _) => {
                return Err(Error::Protocol(format!(
                    "expected CONTINUATION on stream {}, got {:?} on stream {}",
                    expected,
                    frame.frame_type(),
                    stream_id
                )));
            }
            (None, Frame::Continuation(_)) => {
                return Err(Error::Protocol(format!(
                    "CONTINUATION on stream {} without an open header block",
                    stream_id
                )));
            }
            (None, _) => {}
        }

        match frame {
            Frame::Settings(settings) if settings.ack => {
                if stream_id != CONNECTION_STREAM_ID {
                    return Err(Error::Protocol(format!(
                        "SETTINGS ACK on stream {}",
                        stream_id
                    )));
                }
                self.settings_acks += 1;
                debug!("peer acknowledged our SETTINGS");
            }
            Frame::Settings(settings) => {
                self.update_remote_settings(&settings)?;
                self.send_ack_settings()?;
            }
            Frame::Ping(ping) => {
                if stream_id != CONNECTION_STREAM_ID {
                    return Err(Error::Protocol(format!("PING on stream {}", stream_id)));
                }
                if !ping.ack {
                    self.write_frame(PingFrame::ack(ping.data))?;
                }
            }
            Frame::Goaway(goaway) => {
                if stream_id != CONNECTION_STREAM_ID {
                    return Err(Error::Protocol(format!("GOAWAY on stream {}", stream_id)));
                }
                info!(
                    last_stream_id = goaway.last_stream_id,
                    code = %goaway.error_code,
                    "peer sent GOAWAY"
                );
                self.goaway = Some(goaway);
                return Ok(ControlFlow::Break(()));
            }
            Frame::PushPromise(_) => {
                return Err(Error::Protocol("client sent PUSH_PROMISE".to_string()));
            }
            Frame::Unknown(unknown) => {
                trace!(kind = unknown.header.kind(), stream_id, "ignoring unknown frame type");
            }
            Frame::WindowUpdate(update) if stream_id == CONNECTION_STREAM_ID => {
                self.window_credit += u64::from(update.size_increment);
                trace!(increment = update.size_increment, "connection window update");
            }
            frame if stream_id == CONNECTION_STREAM_ID => {
                return Err(Error::Protocol(format!(
                    "{:?} frame on stream 0",
                    frame.frame_type()
                )));
            }
            frame => self.route(frame)?,
        }

        Ok(ControlFlow::Continue(()))
    }

    /// Hand a stream-scoped frame to its stream, creating the stream if the
    /// ID is new
    fn route(&mut self, frame: Frame) -> Result<()> {
        let stream_id = frame.stream_id();

        if !self.streams.contains_key(&stream_id) {
            if let Frame::Priority(priority) = &frame {
                return self.prioritize_unopened(priority);
            }
            self.open_stream(stream_id)?;
        }

        let (was_idle, result) = match self.streams.get_mut(&stream_id) {
            Some(stream) => (stream.state() == StreamState::Idle, stream.process_frame(&frame)),
            None => return Ok(()),
        };
        if was_idle {
            self.admit(stream_id);
        }

        match result {
            Ok(Some(delivery)) => self.deliver(stream_id, delivery)?,
            Ok(None) => {}
            Err(err) if err.is_stream_error() => {
                if let Frame::Headers(headers) = &frame {
                    if !headers.end_headers {
                        return Err(Error::Protocol(err.to_string()));
                    }
                    // Keep the decoder's dynamic table in step
                    self.decoder.decode(&headers.header_block)?;
                }
                self.reset_stream(stream_id, &err)?;
            }
            Err(err) => return Err(err),
        }

        self.continuation_stream = self
            .streams
            .get(&stream_id)
            .filter(|s| s.expects_continuation())
            .map(|_| stream_id);
        self.settle(stream_id)
    }

    /// Check an ID the peer has not used yet
    fn check_new_stream_id(&self, stream_id: StreamId) -> Result<()> {
        if stream_id <= self.last_stream_id {
            return Err(Error::Protocol(format!(
                "frame for stream {} which is not open and not above last stream {}",
                stream_id, self.last_stream_id
            )));
        }
        if stream_id % 2 == 0 {
            return Err(Error::Protocol(format!(
                "client opened even-numbered stream {}",
                stream_id
            )));
        }
        Ok(())
    }

    /// Register a stream for an ID not seen before
    ///
    /// Every lower ID that was never opened is implicitly closed by the
    /// watermark.
    fn open_stream(&mut self, stream_id: StreamId) -> Result<()> {
        self.check_new_stream_id(stream_id)?;
        self.last_stream_id = stream_id;
        self.streams.insert(stream_id, H2Stream::new(stream_id));
        debug!(stream_id, "stream created");
        Ok(())
    }

    /// PRIORITY for an ID that is not open
    ///
    /// Priority is advisory and idle streams hold nothing else, so no
    /// stream is created and the watermark stays put.
    fn prioritize_unopened(&mut self, frame: &PriorityFrame) -> Result<()> {
        let stream_id = frame.header.stream_id();
        self.check_new_stream_id(stream_id)?;

        if frame.priority.stream_dependency == stream_id {
            let err = Error::stream(
                stream_id,
                ErrorCode::ProtocolError,
                "stream depends on itself",
            );
            warn!(stream_id, error = %err, "resetting stream");
            return self.write_frame(RstStreamFrame::new(stream_id, err.code()));
        }
        trace!(stream_id, "priority for unopened stream");
        Ok(())
    }

    /// Apply our concurrency limit to a stream that has just left idle
    fn admit(&mut self, stream_id: StreamId) {
        let opened = self
            .streams
            .get(&stream_id)
            .map_or(false, |s| s.state() != StreamState::Idle);
        let Some(max) = self.local_settings.max_concurrent_streams() else {
            return;
        };
        // The stream being admitted is already counted
        if opened && self.active_stream_count() > max as usize {
            debug!(stream_id, max, "refusing stream over concurrency limit");
            self.refused.insert(stream_id);
        }
    }

    /// Streams that have started and are neither closed nor refused
    fn active_stream_count(&self) -> usize {
        self.streams
            .values()
            .filter(|s| !matches!(s.state(), StreamState::Idle | StreamState::Closed))
            .filter(|s| !self.refused.contains(&s.id()))
            .count()
    }

    fn deliver(&mut self, stream_id: StreamId, delivery: Delivery) -> Result<()> {
        let event = match delivery {
            Delivery::HeaderBlock { block, end_stream } => StreamEvent::Headers {
                stream_id,
                fields: self.decoder.decode(&block)?,
                end_stream,
            },
            Delivery::Data { data, end_stream } => StreamEvent::Data {
                stream_id,
                data,
                end_stream,
            },
            Delivery::Reset(error_code) => {
                debug!(stream_id, code = %error_code, "peer reset stream");
                StreamEvent::Reset {
                    stream_id,
                    error_code,
                }
            }
        };

        if self.refused.contains(&stream_id) {
            return Ok(());
        }
        if let Some(events) = &self.events {
            if events.send(event).is_err() {
                debug!("stream event receiver dropped");
                self.events = None;
            }
        }
        Ok(())
    }

    fn reset_stream(&mut self, stream_id: StreamId, err: &Error) -> Result<()> {
        warn!(stream_id, error = %err, "resetting stream");
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.reset();
        }
        self.write_frame(RstStreamFrame::new(stream_id, err.code()))
    }

    /// Finish refused streams and drop the ones that no longer need an entry
    fn settle(&mut self, stream_id: StreamId) -> Result<()> {
        let state = match self.streams.get(&stream_id) {
            Some(stream) if stream.expects_continuation() => return Ok(()),
            Some(stream) => stream.state(),
            None => return Ok(()),
        };

        if self.refused.remove(&stream_id) {
            self.streams.remove(&stream_id);
            if state != StreamState::Closed {
                self.write_frame(RstStreamFrame::new(stream_id, ErrorCode::RefusedStream))?;
            }
        } else if matches!(state, StreamState::Closed | StreamState::Idle) {
            self.streams.remove(&stream_id);
            debug!(stream_id, ?state, "stream removed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h2::frames::FrameType;
    use crate::h2::settings::{Setting, SettingsParameter};
    use std::io::Cursor;

    fn connection(input: Vec<u8>) -> Connection<Cursor<Vec<u8>>, Vec<u8>> {
        Connection::new(Cursor::new(input), Vec::new())
    }

    /// Connection that has already read a complete GET on stream 1
    fn with_open_request() -> Connection<Cursor<Vec<u8>>, Vec<u8>> {
        // :method GET, :scheme http, :path /
        let request = HeadersFrame::new(1, Bytes::from_static(&[0x82, 0x86, 0x84]), true, true);
        let mut conn = connection(Frame::from(request).to_binary().to_vec());
        conn.handle().unwrap();
        conn
    }

    fn written(conn: &Connection<Cursor<Vec<u8>>, Vec<u8>>) -> Vec<Frame> {
        let codec = FrameCodec::new();
        let mut source = Cursor::new(conn.writer().clone());
        let mut frames = Vec::new();
        while let Some(frame) = codec.deserialize(&mut source).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_response_closes_and_evicts_stream() {
        let mut conn = with_open_request();
        assert_eq!(conn.stream(1).unwrap().state(), StreamState::HalfClosedRemote);

        let status = [HeaderField::new(&b":status"[..], &b"200"[..])];
        conn.send_headers(1, &status, false).unwrap();
        conn.send_data(1, Bytes::from_static(b"hello"), true).unwrap();
        assert_eq!(conn.stream_count(), 0);

        let frames = written(&conn);
        assert_eq!(frames.len(), 2);
        match &frames[0] {
            Frame::Headers(h) => {
                assert!(h.end_headers && !h.end_stream);
                let fields = HpackDecoder::new().decode(&h.header_block).unwrap();
                assert_eq!(fields, status.to_vec());
            }
            other => panic!("expected HEADERS, got {:?}", other),
        }
        assert!(matches!(&frames[1], Frame::Data(d) if d.end_stream && d.data == "hello"));

        // Nothing more may be sent on the stream
        let err = conn.send_data(1, Bytes::new(), true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::StreamClosed);
    }

    #[test]
    fn test_send_splits_to_peer_frame_size() {
        let mut conn = with_open_request();
        conn.remote_settings
            .apply(&[Setting::new(SettingsParameter::MaxFrameSize, 16384)]);

        let big = HeaderField::new(&b"x-big"[..], Bytes::from(vec![b'a'; 20000]));
        conn.send_headers(1, &[big], false).unwrap();
        conn.send_data(1, Bytes::from(vec![0u8; 40000]), true).unwrap();

        let frames = written(&conn);
        let kinds: Vec<_> = frames.iter().filter_map(Frame::frame_type).collect();
        assert_eq!(
            kinds,
            vec![
                FrameType::Headers,
                FrameType::Continuation,
                FrameType::Data,
                FrameType::Data,
                FrameType::Data,
            ]
        );
        assert!(matches!(&frames[0], Frame::Headers(h) if !h.end_headers));
        assert!(matches!(&frames[1], Frame::Continuation(c) if c.end_headers));
        let ends: Vec<_> = frames[2..]
            .iter()
            .map(|f| matches!(f, Frame::Data(d) if d.end_stream))
            .collect();
        assert_eq!(ends, vec![false, false, true]);
    }

    #[test]
    fn test_send_on_unknown_stream() {
        let mut conn = connection(Vec::new());
        let err = conn.send_reset(7, ErrorCode::Cancel).unwrap_err();
        assert!(err.is_stream_error());
        assert!(conn.writer().is_empty());
    }

    #[test]
    fn test_commands_answer_streams_after_peer_finishes() {
        let request = HeadersFrame::new(1, Bytes::from_static(&[0x82, 0x86, 0x84]), true, true);
        let (tx, rx) = std::sync::mpsc::channel();
        tx.send(StreamCommand::Headers {
            stream_id: 1,
            fields: vec![HeaderField::new(&b":status"[..], &b"204"[..])],
            end_stream: true,
        })
        .unwrap();
        // Unknown stream: dropped, not fatal
        tx.send(StreamCommand::Reset {
            stream_id: 9,
            error_code: ErrorCode::Cancel,
        })
        .unwrap();

        let mut conn = connection(Frame::from(request).to_binary().to_vec()).with_commands(rx);
        conn.handle().unwrap();

        assert_eq!(conn.stream_count(), 0);
        let frames = written(&conn);
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], Frame::Headers(h) if h.end_stream));
    }

    #[test]
    fn test_ack_shape() {
        let mut conn = connection(Vec::new());
        conn.send_ack_settings().unwrap();
        assert_eq!(conn.writer().as_slice(), &[0, 0, 0, 0x4, 0x1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_update_remote_settings_rejects_nonzero_stream() {
        let mut conn = connection(Vec::new());
        let mut frame = SettingsFrame::new(vec![Setting::new(SettingsParameter::EnablePush, 0)]);
        frame.header = crate::h2::frames::FrameHeader::new(
            crate::h2::frames::FrameType::Settings,
            Default::default(),
            3,
            6,
        );

        let err = conn.update_remote_settings(&frame).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProtocolError);
        assert!(conn.remote_settings().is_empty());
    }

    #[test]
    fn test_update_remote_settings_validates_before_applying() {
        let mut conn = connection(Vec::new());
        let frame = SettingsFrame::new(vec![
            Setting::new(SettingsParameter::HeaderTableSize, 1024),
            Setting::new(SettingsParameter::InitialWindowSize, 0x8000_0000),
        ]);

        let err = conn.update_remote_settings(&frame).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FlowControlError);
        assert!(conn.remote_settings().is_empty());
    }

    #[test]
    fn test_send_local_settings() {
        let local = Settings::new();
        let mut conn = Connection::with_settings(Cursor::new(Vec::new()), Vec::new(), local);
        conn.send_local_settings().unwrap();
        // Empty table: a SETTINGS frame with no parameters and no ACK flag
        assert_eq!(conn.writer().as_slice(), &[0, 0, 0, 0x4, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_preface_short_input() {
        let mut conn = connection(b"PRI * HTTP/2.0".to_vec());
        assert!(matches!(conn.has_proper_preface(), Err(Error::Io(_))));
    }
}
