//! Serializes a message head: head line, every header in insertion order, blank line.

use std::marker::PhantomData;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::io::{CharCodingConfig, SessionOutputBuffer};
use crate::protocol::{HttpError, MessageHead};

/// Initial buffer size reserved for head serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

#[derive(Debug)]
pub struct MessageWriter<H> {
    line: String,
    _head: PhantomData<fn(&H)>,
}

impl<H: MessageHead> MessageWriter<H> {
    pub fn new() -> Self {
        Self { line: String::with_capacity(128), _head: PhantomData }
    }

    pub fn write(&mut self, head: &H, out: &mut SessionOutputBuffer) -> Result<(), HttpError> {
        let coding = *out.coding();
        self.encode_head(head, out.bytes_mut(), &coding)
    }

    /// Nothing to reset; kept so writer and parser are driven the same way.
    pub fn reset(&mut self) {}

    fn encode_head(&mut self, head: &H, dst: &mut BytesMut, coding: &CharCodingConfig) -> Result<(), HttpError> {
        self.line.clear();
        head.write_head_line(&mut self.line)?;

        dst.reserve(INIT_HEADER_SIZE);
        coding.encode(&self.line, dst)?;
        dst.put_slice(b"\r\n");

        for (name, value) in head.headers() {
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

impl<H: MessageHead> Default for MessageWriter<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: MessageHead> Encoder<&H> for MessageWriter<H> {
    type Error = HttpError;

    fn encode(&mut self, item: &H, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_head(item, dst, &CharCodingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MessageParser;
    use crate::config::MessageConstraints;
    use crate::protocol::{HttpMessage, RequestHead, ResponseHead};
    use http::{header, HeaderValue, Method, StatusCode, Uri};
    use tokio_util::codec::Decoder;

    #[test]
    fn writes_headers_in_insertion_order() {
        let head = ResponseHead::new(StatusCode::OK)
            .with_header(header::SET_COOKIE, HeaderValue::from_static("a=1"))
            .with_header(header::CONTENT_LENGTH, HeaderValue::from_static("0"))
            .with_header(header::SET_COOKIE, HeaderValue::from_static("b=2"));

        let mut dst = BytesMut::new();
        MessageWriter::new().encode(&head, &mut dst).unwrap();

        assert_eq!(
            &dst[..],
            &b"HTTP/1.1 200 OK\r\nset-cookie: a=1\r\ncontent-length: 0\r\nset-cookie: b=2\r\n\r\n"[..]
        );
    }

    #[test]
    fn parser_reads_back_written_head() {
        let head = RequestHead::new(Method::PUT, Uri::from_static("/item/1"))
            .with_header(header::HOST, HeaderValue::from_static("example.com"))
            .with_header(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

        let mut out = SessionOutputBuffer::new(64, 1024, CharCodingConfig::default());
        MessageWriter::new().write(&head, &mut out).unwrap();

        let mut parser = MessageParser::<RequestHead>::new(MessageConstraints::default(), CharCodingConfig::default());
        let parsed = parser.decode(out.bytes_mut()).unwrap().unwrap();
        assert_eq!(parsed, head);
        assert!(parsed.headers().contains(&header::TRANSFER_ENCODING));
    }
}
