//! Decoder for bodies delimited by the end of the connection.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use super::Decoded;
use crate::protocol::{HttpError, PayloadItem};

/// Passes every byte through until the peer closes its side of the connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityDecoder;

impl IdentityDecoder {
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn decode_step(&mut self, src: &mut BytesMut, end_of_stream: bool, max: usize) -> Decoded {
        if !src.is_empty() {
            let len = src.len().min(max);
            return Decoded::Data(src.split_to(len).freeze());
        }
        if end_of_stream { Decoded::Done } else { Decoded::Pending }
    }
}

impl Decoder for IdentityDecoder {
    type Item = PayloadItem;
    type Error = HttpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.decode_step(src, false, usize::MAX).into_item())
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.decode_step(src, true, usize::MAX).into_item())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ends_only_with_the_connection() {
        let mut decoder = IdentityDecoder::new();
        let mut src = BytesMut::from(&b"hello"[..]);

        assert_eq!(decoder.decode(&mut src).unwrap(), Some(PayloadItem::Chunk("hello".into())));
        assert_eq!(decoder.decode(&mut src).unwrap(), None);
        assert_eq!(decoder.decode_eof(&mut src).unwrap(), Some(PayloadItem::Eof));
    }
}
