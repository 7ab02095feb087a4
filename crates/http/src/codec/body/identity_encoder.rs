//! Encoder for bodies sent as is and ended by closing the connection.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;

use super::{write_fragmented, ContentOutput};
use crate::protocol::{HttpError, PayloadItem};

/// Passes body bytes through, batching writes smaller than the fragment hint in the session buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityEncoder {
    fragment_hint: usize,
}

impl IdentityEncoder {
    pub fn new(fragment_hint: usize) -> Self {
        Self { fragment_hint }
    }

    pub fn write(&mut self, out: &mut ContentOutput<'_>, src: &[u8]) -> Result<usize, HttpError> {
        Ok(write_fragmented(out, src, self.fragment_hint)?)
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for IdentityEncoder {
    type Error = HttpError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if let PayloadItem::Chunk(mut bytes) = item {
            while bytes.has_remaining() {
                let chunk = bytes.chunk();
                let len = chunk.len();
                dst.extend_from_slice(chunk);
                bytes.advance(len);
            }
        }
        Ok(())
    }
}
