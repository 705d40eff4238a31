//! Header block coding
//!
//! The protocol core does not look inside header blocks. Once a stream has
//! collected a complete block, the connection passes it through a
//! `HeaderBlockDecoder`; responses go out through a `HeaderBlockEncoder`.
//! The default implementations are backed by the `hpack` crate.

use super::error::{Error, Result};
use bytes::Bytes;
use std::fmt;

/// A decoded header field
#[derive(Clone, PartialEq, Eq)]
pub struct HeaderField {
    /// Field name (lowercase on the wire for HTTP/2)
    pub name: Bytes,
    /// Field value
    pub value: Bytes,
}

impl HeaderField {
    /// Create a header field
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        HeaderField {
            name: name.into(),
            value: value.into(),
        }
    }

    /// True for `:method`, `:path` and the other pseudo-header fields
    pub fn is_pseudo(&self) -> bool {
        self.name.first() == Some(&b':')
    }
}

impl fmt::Debug for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            String::from_utf8_lossy(&self.name),
            String::from_utf8_lossy(&self.value)
        )
    }
}

/// Turns a complete header block into header fields
///
/// Decoders keep compression state across blocks, so a connection owns
/// exactly one and feeds it blocks in arrival order. Connections move to
/// their own thread, hence the `Send` bound.
pub trait HeaderBlockDecoder: Send {
    /// Decode one complete header block
    fn decode(&mut self, block: &[u8]) -> Result<Vec<HeaderField>>;
}

/// HPACK (RFC 7541) decoder
pub struct HpackDecoder {
    inner: ::hpack::Decoder<'static>,
}

impl HpackDecoder {
    /// Create a decoder with an empty dynamic table
    pub fn new() -> Self {
        HpackDecoder {
            inner: ::hpack::Decoder::new(),
        }
    }
}

impl Default for HpackDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderBlockDecoder for HpackDecoder {
    fn decode(&mut self, block: &[u8]) -> Result<Vec<HeaderField>> {
        let fields = self
            .inner
            .decode(block)
            .map_err(|e| Error::Compression(format!("HPACK decode error: {:?}", e)))?;

        Ok(fields
            .into_iter()
            .map(|(name, value)| HeaderField::new(name, value))
            .collect())
    }
}

/// Turns header fields into a header block
///
/// Like decoders, encoders carry compression state and are owned by one
/// connection.
pub trait HeaderBlockEncoder: Send {
    /// Encode the fields of one header block
    fn encode(&mut self, fields: &[HeaderField]) -> Bytes;
}

/// HPACK (RFC 7541) encoder
pub struct HpackEncoder {
    inner: ::hpack::Encoder<'static>,
}

impl HpackEncoder {
    pub fn new() -> Self {
        HpackEncoder {
            inner: ::hpack::Encoder::new(),
        }
    }
}

impl Default for HpackEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderBlockEncoder for HpackEncoder {
    fn encode(&mut self, fields: &[HeaderField]) -> Bytes {
        let block = self
            .inner
            .encode(fields.iter().map(|f| (&f.name[..], &f.value[..])));
        Bytes::from(block)
    }
}
