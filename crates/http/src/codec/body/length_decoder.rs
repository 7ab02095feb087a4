//! Decoder for bodies framed by `Content-Length`.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use super::{cap, Decoded};
use crate::protocol::{HttpError, PayloadItem};

/// Delivers exactly `length` bytes.
///
/// Bytes buffered past the declared length are left in place: they belong to
/// the next pipelined message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    length: u64,
    remaining: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { length, remaining: length }
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub(crate) fn decode_step(&mut self, src: &mut BytesMut, end_of_stream: bool, max: usize) -> Result<Decoded, HttpError> {
        if self.remaining == 0 {
            return Ok(Decoded::Done);
        }

        if src.is_empty() {
            if end_of_stream {
                return Err(HttpError::connection_closed(format!(
                    "premature end of Content-Length delimited message body (expected: {}; received: {})",
                    self.length,
                    self.length - self.remaining
                )));
            }
            return Ok(Decoded::Pending);
        }

        let len = cap(self.remaining, src.len().min(max));
        let bytes = src.split_to(len).freeze();
        self.remaining -= bytes.len() as u64;
        Ok(Decoded::Data(bytes))
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = HttpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_step(src, false, usize::MAX).map(Decoded::into_item)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_step(src, true, usize::MAX).map(Decoded::into_item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        let mut buffer: BytesMut = BytesMut::from(&b"101234567890abcdef\r\n\r\n"[..]);

        let mut length_decoder = LengthDecoder::new(10);
        let payload = length_decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(payload.is_chunk());

        let bytes = payload.as_bytes().unwrap();
        assert_eq!(&bytes[..], b"1012345678");
        assert_eq!(&buffer[..], b"90abcdef\r\n\r\n");

        assert_eq!(length_decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Eof));
        assert_eq!(&buffer[..], b"90abcdef\r\n\r\n");
    }

    #[test]
    fn premature_end_of_stream() {
        let mut buffer = BytesMut::from(&b"abc"[..]);
        let mut decoder = LengthDecoder::new(5);

        assert!(decoder.decode_eof(&mut buffer).unwrap().unwrap().is_chunk());
        let err = decoder.decode_eof(&mut buffer).unwrap_err();
        assert!(matches!(err, HttpError::ConnectionClosed { .. }));
        assert!(err.to_string().contains("expected: 5; received: 3"));
    }

    #[test]
    fn empty_body_is_done_at_once() {
        let mut decoder = LengthDecoder::new(0);
        assert_eq!(decoder.decode(&mut BytesMut::new()).unwrap(), Some(PayloadItem::Eof));
    }
}
