//! Encoder for bodies framed by `Content-Length`.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;

use super::{write_fragmented, ContentOutput};
use crate::ensure;
use crate::protocol::{HttpError, PayloadItem, ProtocolError};

/// Sends exactly the declared number of bytes.
///
/// Writing past the declared length, or completing before reaching it, is an error:
/// either would leave the peer out of sync with the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    length: u64,
    remaining: u64,
    fragment_hint: usize,
}

impl LengthEncoder {
    pub fn new(length: u64, fragment_hint: usize) -> Self {
        Self { length, remaining: length, fragment_hint }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn write(&mut self, out: &mut ContentOutput<'_>, src: &[u8]) -> Result<usize, HttpError> {
        self.reserve(src.len())?;
        let written = write_fragmented(out, src, self.fragment_hint)?;
        self.remaining -= written as u64;
        Ok(written)
    }

    pub fn complete(&mut self) -> Result<(), HttpError> {
        ensure!(
            self.remaining == 0,
            ProtocolError::ContentTooShort { declared: self.length, written: self.length - self.remaining }.into()
        );
        Ok(())
    }

    fn reserve(&self, len: usize) -> Result<(), HttpError> {
        ensure!(len as u64 <= self.remaining, ProtocolError::ContentTooLong { declared: self.length }.into());
        Ok(())
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = HttpError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(mut bytes) => {
                self.reserve(bytes.remaining())?;
                while bytes.has_remaining() {
                    let chunk = bytes.chunk();
                    let len = chunk.len();
                    dst.extend_from_slice(chunk);
                    bytes.advance(len);
                    self.remaining -= len as u64;
                }
                Ok(())
            }
            PayloadItem::Eof => self.complete(),
        }
    }
}
