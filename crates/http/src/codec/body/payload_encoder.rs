//! Body encoder selected by the framing of the outgoing message.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;

use super::{ChunkedEncoder, ContentOutput, IdentityEncoder, LengthEncoder};
use crate::ensure;
use crate::protocol::{Headers, HttpError, PayloadItem, PayloadSize, ProtocolError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Identity(IdentityEncoder),
    Length(LengthEncoder),
    Chunked(ChunkedEncoder),
}

/// Writes one message body into the session output buffer or straight to the channel.
///
/// [`complete`](Self::complete) may be called more than once; only the first call has
/// an effect. Writing after completion fails with [`ProtocolError::StreamCompleted`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
    completed: bool,
}

impl PayloadEncoder {
    fn with_kind(kind: Kind) -> Self {
        Self { kind, completed: false }
    }

    pub fn identity(fragment_hint: usize) -> Self {
        Self::with_kind(Kind::Identity(IdentityEncoder::new(fragment_hint)))
    }

    pub fn length(length: u64, fragment_hint: usize) -> Self {
        Self::with_kind(Kind::Length(LengthEncoder::new(length, fragment_hint)))
    }

    pub fn chunked(fragment_hint: usize) -> Self {
        Self::with_kind(Kind::Chunked(ChunkedEncoder::new(fragment_hint)))
    }

    /// An encoder for `size`; an undefined size means the body ends by closing the connection.
    pub fn for_payload(size: PayloadSize, fragment_hint: usize) -> Self {
        match size {
            PayloadSize::Length(length) => Self::length(length, fragment_hint),
            PayloadSize::Chunked => Self::chunked(fragment_hint),
            PayloadSize::Undefined => Self::identity(fragment_hint),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    /// True when the body is delimited by closing the connection.
    pub fn is_identity(&self) -> bool {
        matches!(self.kind, Kind::Identity(_))
    }

    /// Writes as much of `src` as the channel and buffer accept, returning how many bytes were taken.
    pub fn write(&mut self, out: &mut ContentOutput<'_>, src: &[u8]) -> Result<usize, HttpError> {
        ensure!(!self.completed, ProtocolError::StreamCompleted.into());
        match &mut self.kind {
            Kind::Identity(encoder) => encoder.write(out, src),
            Kind::Length(encoder) => encoder.write(out, src),
            Kind::Chunked(encoder) => encoder.write(out, src),
        }
    }

    /// Ends the body. Trailers are only sent by the chunked encoder.
    pub fn complete(&mut self, out: &mut ContentOutput<'_>, trailers: Option<&Headers>) -> Result<(), HttpError> {
        if self.completed {
            return Ok(());
        }
        match &mut self.kind {
            Kind::Identity(_) => {}
            Kind::Length(encoder) => encoder.complete()?,
            Kind::Chunked(encoder) => encoder.complete(out, trailers)?,
        }
        self.completed = true;
        Ok(())
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = HttpError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.completed {
            return match item {
                PayloadItem::Eof => Ok(()),
                PayloadItem::Chunk(_) => Err(ProtocolError::StreamCompleted.into()),
            };
        }
        let eof = item.is_eof();
        match &mut self.kind {
            Kind::Identity(encoder) => encoder.encode(item, dst)?,
            Kind::Length(encoder) => encoder.encode(item, dst)?,
            Kind::Chunked(encoder) => encoder.encode(item, dst)?,
        }
        self.completed = eof;
        Ok(())
    }
}
