//! Body decoder selected by the framing of the incoming message.

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

use super::{ChunkedDecoder, ContentInput, Decoded, IdentityDecoder, LengthDecoder};
use crate::config::MessageConstraints;
use crate::io::{CharCodingConfig, Fill};
use crate::protocol::{Headers, HttpError, PayloadItem, PayloadSize};

#[derive(Debug)]
enum Kind {
    Identity(IdentityDecoder),
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
}

/// Reads one message body from the session input buffer, pulling from the channel as needed.
///
/// Once completed every read returns zero. An error hit after some bytes were already
/// produced is held back and returned by the next read, so no data is lost.
#[derive(Debug)]
pub struct PayloadDecoder {
    kind: Kind,
    end_of_stream: bool,
    completed: bool,
    pending_error: Option<HttpError>,
}

impl PayloadDecoder {
    fn with_kind(kind: Kind) -> Self {
        Self { kind, end_of_stream: false, completed: false, pending_error: None }
    }

    pub fn identity() -> Self {
        Self::with_kind(Kind::Identity(IdentityDecoder::new()))
    }

    pub fn length(length: u64) -> Self {
        Self::with_kind(Kind::Length(LengthDecoder::new(length)))
    }

    pub fn chunked(constraints: MessageConstraints, coding: CharCodingConfig) -> Self {
        Self::with_kind(Kind::Chunked(ChunkedDecoder::new(constraints, coding)))
    }

    /// A decoder for `size`; an undefined size means the body ends with the connection.
    pub fn for_payload(size: PayloadSize, constraints: MessageConstraints, coding: CharCodingConfig) -> Self {
        match size {
            PayloadSize::Length(length) => Self::length(length),
            PayloadSize::Chunked => Self::chunked(constraints, coding),
            PayloadSize::Undefined => Self::identity(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    /// True once the channel reported end of stream while this body was read.
    pub fn is_end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    /// Trailers of a completed chunk coded body.
    pub fn trailers(&self) -> Option<&Headers> {
        match &self.kind {
            Kind::Chunked(decoder) if decoder.is_completed() && !decoder.trailers().is_empty() => Some(decoder.trailers()),
            _ => None,
        }
    }

    pub fn take_trailers(&mut self) -> Option<Headers> {
        match &mut self.kind {
            Kind::Chunked(decoder) if decoder.is_completed() && !decoder.trailers().is_empty() => {
                Some(decoder.take_trailers())
            }
            _ => None,
        }
    }

    /// Moves up to `max` body bytes into `dst`, returning how many were moved.
    ///
    /// Zero with [`is_completed`](Self::is_completed) still false means the channel has
    /// nothing more right now.
    pub fn read(&mut self, input: &mut ContentInput<'_>, dst: &mut BytesMut, max: usize) -> Result<usize, HttpError> {
        if let Some(e) = self.pending_error.take() {
            return Err(e);
        }

        let mut total = 0;
        while !self.completed && total < max {
            let step = self.step(input.buffer.bytes_mut(), max - total);
            match step {
                Ok(Decoded::Data(bytes)) => {
                    total += bytes.len();
                    dst.extend_from_slice(&bytes);
                    if self.is_exhausted() {
                        trace!(total, "message body completed");
                        self.completed = true;
                    }
                }
                Ok(Decoded::Done) => {
                    trace!(total, "message body completed");
                    self.completed = true;
                }
                Ok(Decoded::Pending) if total > 0 => break,
                Ok(Decoded::Pending) => match input.buffer.fill(&mut *input.channel, input.metrics)? {
                    Fill::Data(0) => break,
                    Fill::Data(_) => {}
                    Fill::EndOfStream => self.end_of_stream = true,
                },
                Err(e) if total > 0 => {
                    self.pending_error = Some(e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    /// The declared length has been delivered in full.
    fn is_exhausted(&self) -> bool {
        matches!(&self.kind, Kind::Length(decoder) if decoder.remaining() == 0)
    }

    fn step(&mut self, src: &mut BytesMut, max: usize) -> Result<Decoded, HttpError> {
        let end_of_stream = self.end_of_stream;
        match &mut self.kind {
            Kind::Identity(decoder) => Ok(decoder.decode_step(src, end_of_stream, max)),
            Kind::Length(decoder) => decoder.decode_step(src, end_of_stream, max),
            Kind::Chunked(decoder) => decoder.decode_step(src, end_of_stream, max),
        }
    }

    fn decode_item(&mut self, src: &mut BytesMut, end_of_stream: bool) -> Result<Option<PayloadItem>, HttpError> {
        if self.completed {
            return Ok(Some(PayloadItem::Eof));
        }
        self.end_of_stream |= end_of_stream;
        let decoded = self.step(src, usize::MAX)?;
        if decoded == Decoded::Done {
            self.completed = true;
        }
        Ok(decoded.into_item())
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = HttpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_item(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_item(src, true)
    }
}
