//! Message body framing.
//!
//! Bodies are framed in one of three ways, chosen by a
//! [`ContentLengthStrategy`](crate::codec::ContentLengthStrategy):
//!
//! - identity: the body runs until the peer closes the connection
//! - length delimited: `Content-Length` bytes
//! - chunked: `Transfer-Encoding: chunked`, optionally followed by trailers
//!
//! [`PayloadDecoder`] and [`PayloadEncoder`] select the framing and drive it
//! against a non-blocking channel through the session buffers. Both also
//! implement the `tokio_util` codec traits for use over plain byte buffers.

mod chunked_decoder;
mod chunked_encoder;
mod identity_decoder;
mod identity_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

use std::fmt;
use std::io::{self, ErrorKind, Read, Write};

use bytes::Bytes;

use crate::io::{SessionInputBuffer, SessionOutputBuffer, TransportMetrics};
use crate::protocol::PayloadItem;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_encoder::ChunkedEncoder;
pub use identity_decoder::IdentityDecoder;
pub use identity_encoder::IdentityEncoder;
pub use length_decoder::LengthDecoder;
pub use length_encoder::LengthEncoder;
pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;

/// Result of one decoding step over buffered input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Decoded {
    Data(Bytes),
    /// More input is needed.
    Pending,
    Done,
}

impl Decoded {
    pub(crate) fn into_item(self) -> Option<PayloadItem> {
        match self {
            Decoded::Data(bytes) => Some(PayloadItem::Chunk(bytes)),
            Decoded::Pending => None,
            Decoded::Done => Some(PayloadItem::Eof),
        }
    }
}

/// Bytes that can be taken without exceeding `remaining`.
#[inline]
pub(crate) fn cap(remaining: u64, available: usize) -> usize {
    usize::try_from(remaining).map_or(available, |remaining| remaining.min(available))
}

/// The inbound side of a connection as seen by a body decoder.
pub struct ContentInput<'a> {
    pub channel: &'a mut dyn Read,
    pub buffer: &'a mut SessionInputBuffer,
    pub metrics: &'a mut TransportMetrics,
}

impl<'a> ContentInput<'a> {
    pub fn new(channel: &'a mut dyn Read, buffer: &'a mut SessionInputBuffer, metrics: &'a mut TransportMetrics) -> Self {
        Self { channel, buffer, metrics }
    }
}

impl fmt::Debug for ContentInput<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentInput").field("buffered", &self.buffer.len()).finish_non_exhaustive()
    }
}

/// The outbound side of a connection as seen by a body encoder.
pub struct ContentOutput<'a> {
    pub channel: &'a mut dyn Write,
    pub buffer: &'a mut SessionOutputBuffer,
    pub metrics: &'a mut TransportMetrics,
}

impl<'a> ContentOutput<'a> {
    pub fn new(channel: &'a mut dyn Write, buffer: &'a mut SessionOutputBuffer, metrics: &'a mut TransportMetrics) -> Self {
        Self { channel, buffer, metrics }
    }

    /// Drains the session buffer into the channel.
    pub(crate) fn flush(&mut self) -> io::Result<usize> {
        self.buffer.flush(&mut *self.channel, self.metrics)
    }

    /// Writes straight to the channel, bypassing the session buffer. `WouldBlock` is zero.
    pub(crate) fn write_direct(&mut self, src: &[u8]) -> io::Result<usize> {
        loop {
            match self.channel.write(src) {
                Ok(n) => {
                    self.metrics.increment(n);
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(0),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

impl fmt::Debug for ContentOutput<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentOutput").field("buffered", &self.buffer.len()).finish_non_exhaustive()
    }
}

/// Writes `src` buffering fragments up to `hint` bytes and sending larger ones directly.
///
/// Stops early when the channel stops accepting bytes; the return value is what was taken from `src`.
pub(crate) fn write_fragmented(out: &mut ContentOutput<'_>, mut src: &[u8], hint: usize) -> io::Result<usize> {
    let mut total = 0;
    while !src.is_empty() {
        if src.len() <= hint {
            let room = hint.saturating_sub(out.buffer.len());
            if room > 0 {
                let n = room.min(src.len());
                out.buffer.write(&src[..n]);
                src = &src[n..];
                total += n;
            }
        }
        if out.buffer.has_data() && (out.buffer.len() >= hint || !src.is_empty()) && out.flush()? == 0 {
            break;
        }
        if !out.buffer.has_data() && src.len() > hint {
            let n = out.write_direct(src)?;
            if n == 0 {
                break;
            }
            src = &src[n..];
            total += n;
        }
    }
    Ok(total)
}
