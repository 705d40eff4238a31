//! HTTP/2 frame reading and writing
//!
//! `FrameCodec` pulls one frame at a time off a blocking byte source: it
//! reads the 9-byte header, then exactly the announced payload, and hands
//! both to the frame decoder for that type.

use super::error::{Error, Result};
use super::frames::{Frame, FrameHeader, FRAME_HEADER_SIZE};
use super::DEFAULT_MAX_FRAME_SIZE;
use bytes::Bytes;
use std::io::{self, Read, Write};

/// Frame codec for decoding and encoding HTTP/2 frames
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Largest payload accepted (our SETTINGS_MAX_FRAME_SIZE)
    max_frame_size: u32,
}

impl FrameCodec {
    /// Create a codec that accepts payloads up to the RFC default of 16384 bytes
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a codec with a custom payload limit
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        FrameCodec { max_frame_size }
    }

    /// Largest payload accepted
    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    /// Change the payload limit
    pub fn set_max_frame_size(&mut self, max_frame_size: u32) {
        self.max_frame_size = max_frame_size;
    }

    /// Read one frame
    ///
    /// Returns `Ok(None)` when the source ends cleanly on a frame boundary.
    /// A source that ends anywhere inside a frame yields an I/O error of
    /// kind `UnexpectedEof`.
    pub fn deserialize<R: Read>(&self, source: &mut R) -> Result<Option<Frame>> {
        match self.poll_frame(source)? {
            Polled::Frame(frame) => Ok(Some(frame)),
            Polled::Closed => Ok(None),
            Polled::Idle => Err(io::Error::from(io::ErrorKind::WouldBlock).into()),
        }
    }

    /// Read one frame from a source that may time out
    ///
    /// A read timeout before the first byte of a frame is `Polled::Idle`.
    /// Once a frame has started, timeouts are retried up to
    /// `MAX_STALLED_READS` times in a row.
    pub fn poll_frame<R: Read>(&self, source: &mut R) -> Result<Polled> {
        let mut raw = [0u8; FRAME_HEADER_SIZE];
        match read_frame_start(source, &mut raw)? {
            Start::Ready => {}
            Start::Closed => return Ok(Polled::Closed),
            Start::Idle => return Ok(Polled::Idle),
        }

        let header = FrameHeader::parse(&raw)?;
        if header.length() > self.max_frame_size {
            return Err(Error::FrameSize(format!(
                "Frame payload of {} bytes exceeds maximum of {}",
                header.length(),
                self.max_frame_size
            )));
        }

        let mut body = vec![0u8; header.length() as usize];
        read_full(source, &mut body)?;

        tracing::trace!(
            kind = header.kind(),
            flags = header.flags().as_u8(),
            stream_id = header.stream_id(),
            length = header.length(),
            "read frame"
        );

        Frame::parse(header, Bytes::from(body)).map(Polled::Frame)
    }

    /// Encode a frame to wire bytes
    pub fn serialize(frame: &Frame) -> Bytes {
        frame.to_binary()
    }

    /// Write a frame and flush the writer
    pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<()> {
        writer.write_all(&Self::serialize(frame))?;
        writer.flush()?;
        Ok(())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Consecutive read timeouts tolerated once a frame has started arriving
pub const MAX_STALLED_READS: u32 = 100;

/// Result of `FrameCodec::poll_frame`
#[derive(Debug)]
pub enum Polled {
    /// A complete frame
    Frame(Frame),
    /// The source ended on a frame boundary
    Closed,
    /// The read timed out before a new frame started
    Idle,
}

enum Start {
    Ready,
    Closed,
    Idle,
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Read the first byte of a frame header, then the rest of it
fn read_frame_start<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<Start> {
    let first = loop {
        match source.read(buf) {
            Ok(0) => return Ok(Start::Closed),
            Ok(n) => break n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_timeout(&e) => return Ok(Start::Idle),
            Err(e) => return Err(e),
        }
    };
    read_full(source, &mut buf[first..])?;
    Ok(Start::Ready)
}

/// Fill `buf` completely, riding out short stalls
///
/// Running dry before `buf` is full is an `UnexpectedEof` error.
pub(crate) fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<()> {
    let mut read = 0;
    let mut stalls = 0;
    while read < buf.len() {
        match source.read(&mut buf[read..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("Connection closed after {} of {} bytes", read, buf.len()),
                ))
            }
            Ok(n) => {
                read += n;
                stalls = 0;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if is_timeout(&e) && stalls < MAX_STALLED_READS => stalls += 1,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h2::frames::{FrameType, SettingsFrame, WindowUpdateFrame};
    use std::io::Cursor;

    #[test]
    fn test_deserialize_settings() {
        let wire = [0, 0, 6, 0x4, 0, 0, 0, 0, 0, 0x00, 0x04, 0x00, 0x00, 0xff, 0xff];
        let mut source = Cursor::new(wire.to_vec());

        let frame = FrameCodec::new().deserialize(&mut source).unwrap().unwrap();
        match frame {
            Frame::Settings(settings) => {
                assert_eq!(settings.params.len(), 1);
                assert_eq!(settings.params[0].value, 65535);
            }
            other => panic!("expected SETTINGS, got {:?}", other),
        }

        // Nothing left: clean end
        assert!(FrameCodec::new().deserialize(&mut source).unwrap().is_none());
    }

    #[test]
    fn test_deserialize_empty_source_is_clean_end() {
        let mut source = Cursor::new(Vec::new());
        assert!(FrameCodec::new().deserialize(&mut source).unwrap().is_none());
    }

    #[test]
    fn test_deserialize_partial_header() {
        let mut source = Cursor::new(vec![0, 0, 4, 0x8]);
        let err = FrameCodec::new().deserialize(&mut source).unwrap_err();
        match err {
            Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected I/O error, got {:?}", other),
        }
    }

    #[test]
    fn test_deserialize_short_body() {
        // Announces 4 bytes, delivers 2
        let mut source = Cursor::new(vec![0, 0, 4, 0x8, 0, 0, 0, 0, 1, 0, 0]);
        let err = FrameCodec::new().deserialize(&mut source).unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn test_deserialize_oversized_frame() {
        let mut source = Cursor::new(vec![0, 0x40, 0x01, 0x0, 0, 0, 0, 0, 1]);
        let err = FrameCodec::new().deserialize(&mut source).unwrap_err();
        assert!(matches!(err, Error::FrameSize(_)));

        let codec = FrameCodec::with_max_frame_size(1 << 20);
        let mut wire = vec![0, 0x40, 0x01, 0x0, 0, 0, 0, 0, 1];
        wire.resize(9 + 0x4001, 0);
        let frame = codec.deserialize(&mut Cursor::new(wire)).unwrap().unwrap();
        assert_eq!(frame.frame_type(), Some(FrameType::Data));
    }

    #[test]
    fn test_write_frame() {
        let mut out = Vec::new();
        FrameCodec::write_frame(&mut out, &Frame::from(SettingsFrame::ack())).unwrap();
        FrameCodec::write_frame(&mut out, &Frame::from(WindowUpdateFrame::new(1, 100))).unwrap();

        let mut source = Cursor::new(out);
        let codec = FrameCodec::new();
        assert!(matches!(
            codec.deserialize(&mut source).unwrap(),
            Some(Frame::Settings(ref f)) if f.ack
        ));
        assert!(matches!(
            codec.deserialize(&mut source).unwrap(),
            Some(Frame::WindowUpdate(ref f)) if f.size_increment == 100
        ));
        assert!(codec.deserialize(&mut source).unwrap().is_none());
    }

    /// Yields its chunks in order, with a timeout before each one
    struct Stuttering {
        chunks: Vec<Vec<u8>>,
        timed_out: bool,
    }

    impl Read for Stuttering {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.timed_out {
                self.timed_out = true;
                return Err(io::ErrorKind::WouldBlock.into());
            }
            self.timed_out = false;
            if self.chunks.is_empty() {
                return Ok(0);
            }
            let chunk = self.chunks.remove(0);
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn test_poll_frame_idle_then_frame() {
        let wire = Frame::from(WindowUpdateFrame::new(3, 7)).to_binary().to_vec();
        let mut source = Stuttering {
            chunks: vec![wire[..2].to_vec(), wire[2..10].to_vec(), wire[10..].to_vec()],
            timed_out: false,
        };
        let codec = FrameCodec::new();

        // Nothing has arrived yet
        assert!(matches!(codec.poll_frame(&mut source).unwrap(), Polled::Idle));
        // Timeouts in the middle of the frame are ridden out
        match codec.poll_frame(&mut source).unwrap() {
            Polled::Frame(Frame::WindowUpdate(update)) => {
                assert_eq!(update.header.stream_id(), 3);
                assert_eq!(update.size_increment, 7);
            }
            other => panic!("expected WINDOW_UPDATE, got {:?}", other),
        }
        assert!(matches!(codec.poll_frame(&mut source).unwrap(), Polled::Idle));
        assert!(matches!(codec.poll_frame(&mut source).unwrap(), Polled::Closed));
    }

    #[test]
    fn test_deserialize_reports_timeout() {
        let mut source = Stuttering { chunks: Vec::new(), timed_out: false };
        let err = FrameCodec::new().deserialize(&mut source).unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::WouldBlock));
    }
}
