//! Decoder for `Transfer-Encoding: chunked` bodies.
//!
//! The decoder moves through `Size -> Data -> DataCrlf -> Size ... -> Trailers -> Completed`.
//! Chunk extensions after `;` are ignored. Trailer fields are tokenized with the
//! same folding rules and limits as message heads and are available once the
//! body is complete.
//!
//! A peer closing the connection inside a chunk, or on a chunk boundary before the
//! terminating zero sized chunk, yields [`ProtocolError::TruncatedChunk`] rather than
//! a generic malformed chunk error, so a lenient consumer can keep what it got.

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

use super::{cap, Decoded};
use crate::codec::header::HeaderLines;
use crate::config::MessageConstraints;
use crate::ensure;
use crate::io::{line, CharCodingConfig};
use crate::protocol::{Headers, HttpError, PayloadItem, ProtocolError};

use ChunkedState::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the chunk size line
    Size,
    /// Read chunk data
    Data,
    /// Read the CRLF that ends chunk data
    DataCrlf,
    /// Read trailer fields up to the final empty line
    Trailers,
    Completed,
}

#[derive(Debug)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    chunk_size: u64,
    remaining: u64,
    constraints: MessageConstraints,
    coding: CharCodingConfig,
    line: String,
    trailer_lines: HeaderLines,
    trailers: Headers,
}

impl ChunkedDecoder {
    pub fn new(constraints: MessageConstraints, coding: CharCodingConfig) -> Self {
        Self {
            state: Size,
            chunk_size: 0,
            remaining: 0,
            constraints,
            coding,
            line: String::with_capacity(32),
            trailer_lines: HeaderLines::default(),
            trailers: Headers::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == Completed
    }

    /// Trailer fields received after the last chunk. Empty until the body is complete.
    pub fn trailers(&self) -> &Headers {
        &self.trailers
    }

    pub(crate) fn take_trailers(&mut self) -> Headers {
        std::mem::take(&mut self.trailers)
    }

    pub(crate) fn decode_step(&mut self, src: &mut BytesMut, end_of_stream: bool, max: usize) -> Result<Decoded, HttpError> {
        loop {
            match self.state {
                Size => {
                    if !self.next_line(src, end_of_stream)? {
                        return self.pending_or_truncated(end_of_stream);
                    }
                    let size = parse_chunk_size(&self.line)?;
                    trace!(size, "read chunk size");
                    self.chunk_size = size;
                    self.remaining = size;
                    self.state = if size == 0 { Trailers } else { Data };
                }
                Data => {
                    if src.is_empty() {
                        return self.pending_or_truncated(end_of_stream);
                    }
                    let len = cap(self.remaining, src.len().min(max));
                    let bytes = src.split_to(len).freeze();
                    self.remaining -= bytes.len() as u64;
                    if self.remaining == 0 {
                        self.state = DataCrlf;
                    }
                    trace!(len = bytes.len(), "read chunked bytes");
                    return Ok(Decoded::Data(bytes));
                }
                DataCrlf => {
                    if !self.next_line(src, end_of_stream)? {
                        ensure!(src.len() <= 2, ProtocolError::malformed_chunk("CRLF expected at end of chunk").into());
                        return self.pending_or_truncated(end_of_stream);
                    }
                    ensure!(self.line.is_empty(), ProtocolError::malformed_chunk("CRLF expected at end of chunk").into());
                    self.state = Size;
                }
                Trailers => {
                    if !self.next_line(src, end_of_stream)? {
                        if end_of_stream {
                            self.finish()?;
                            return Ok(Decoded::Done);
                        }
                        return Ok(Decoded::Pending);
                    }
                    if self.line.is_empty() {
                        self.finish()?;
                        return Ok(Decoded::Done);
                    }
                    self.trailer_lines.push(&self.line, &self.constraints)?;
                }
                Completed => return Ok(Decoded::Done),
            }
        }
    }

    fn next_line(&mut self, src: &mut BytesMut, end_of_stream: bool) -> Result<bool, HttpError> {
        self.line.clear();
        line::read_line(src, &mut self.line, end_of_stream, self.constraints.max_line_length(), &self.coding)
    }

    fn pending_or_truncated(&self, end_of_stream: bool) -> Result<Decoded, HttpError> {
        if end_of_stream {
            return Err(ProtocolError::TruncatedChunk {
                expected: self.chunk_size,
                actual: self.chunk_size - self.remaining,
            }
            .into());
        }
        Ok(Decoded::Pending)
    }

    fn finish(&mut self) -> Result<(), HttpError> {
        self.trailers = self.trailer_lines.take_headers(&self.coding)?;
        self.state = Completed;
        trace!(trailers = self.trailers.len(), "finished reading chunked data");
        Ok(())
    }
}

fn parse_chunk_size(line: &str) -> Result<u64, ProtocolError> {
    let size = line.split_once(';').map_or(line, |(size, _extension)| size).trim();
    ensure!(
        !size.is_empty() && size.bytes().all(|b| b.is_ascii_hexdigit()),
        ProtocolError::malformed_chunk(format!("bad chunk header: {size}"))
    );
    u64::from_str_radix(size, 16).map_err(|_| ProtocolError::malformed_chunk(format!("invalid overflow chunked length: {size}")))
}

impl Decoder for ChunkedDecoder {
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
    use bytes::Bytes;
    use http::HeaderName;

    fn decoder() -> ChunkedDecoder {
        ChunkedDecoder::new(MessageConstraints::default(), CharCodingConfig::default())
    }

    fn collect(decoder: &mut ChunkedDecoder, src: &mut BytesMut) -> Result<Vec<u8>, HttpError> {
        let mut body = Vec::new();
        while let Some(item) = decoder.decode(src)? {
            match item {
                PayloadItem::Chunk(bytes) => body.extend_from_slice(&bytes),
                PayloadItem::Eof => break,
            }
        }
        Ok(body)
    }

    #[test]
    fn test_basic() {
        let str = "10\r\n1234567890abcdef\r\n0\r\n\r\n";
        let mut buffer: BytesMut = BytesMut::from(str);

        let mut decoder = decoder();
        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(item.as_bytes().unwrap(), &Bytes::from_static(b"1234567890abcdef"));

        assert_eq!(decoder.decode(&mut buffer).unwrap(), Some(PayloadItem::Eof));
        assert!(decoder.is_completed());
        assert!(buffer.is_empty());
    }

    #[test]
    fn extensions_are_ignored() {
        let mut buffer = BytesMut::from("5;name=value\r\nhello\r\n6 ; x\r\n world\r\n0\r\n\r\nGET");
        let body = collect(&mut decoder(), &mut buffer).unwrap();
        assert_eq!(body, b"hello world");
        assert_eq!(&buffer[..], b"GET");
    }

    #[test]
    fn trailers_are_parsed_like_headers() {
        let wire = "3\r\nabc\r\n0\r\nChecksum: 1234\r\nX-Folded: first\r\n second\r\n\r\n";
        let mut buffer = BytesMut::from(wire);
        let mut decoder = decoder();
        assert_eq!(collect(&mut decoder, &mut buffer).unwrap(), b"abc");

        let trailers = decoder.trailers();
        assert_eq!(trailers.len(), 2);
        assert_eq!(trailers.first(&HeaderName::from_static("checksum")).unwrap(), "1234");
        assert_eq!(trailers.first(&HeaderName::from_static("x-folded")).unwrap(), "first second");
    }

    #[test]
    fn split_input_resumes() {
        let wire = b"a\r\n0123456789\r\n0\r\n\r\n";
        let mut decoder = decoder();
        let mut buffer = BytesMut::new();
        let mut body = Vec::new();
        let mut done = false;

        for byte in wire {
            buffer.extend_from_slice(&[*byte]);
            while let Some(item) = decoder.decode(&mut buffer).unwrap() {
                match item {
                    PayloadItem::Chunk(bytes) => body.extend_from_slice(&bytes),
                    PayloadItem::Eof => {
                        done = true;
                        break;
                    }
                }
            }
        }
        assert!(done);
        assert_eq!(body, b"0123456789");
    }

    #[test]
    fn missing_crlf_after_data() {
        let mut buffer = BytesMut::from("3\r\nabcXYZ\r\n");
        let err = collect(&mut decoder(), &mut buffer).unwrap_err();
        assert!(matches!(err.as_protocol(), Some(ProtocolError::MalformedChunk { .. })));
        assert!(!err.is_truncation());
    }

    #[test]
    fn bad_chunk_size() {
        for wire in ["zz\r\n", "+5\r\n", "\r\n", "fffffffffffffffff\r\n"] {
            let mut buffer = BytesMut::from(wire);
            let err = collect(&mut decoder(), &mut buffer).unwrap_err();
            assert!(matches!(err.as_protocol(), Some(ProtocolError::MalformedChunk { .. })), "{wire:?}");
        }
    }

    #[test]
    fn end_of_stream_inside_chunk_is_truncation() {
        let mut buffer = BytesMut::from("a\r\n0123");
        let mut decoder = decoder();

        let item = decoder.decode_eof(&mut buffer).unwrap().unwrap();
        assert_eq!(item.as_bytes().unwrap(), &Bytes::from_static(b"0123"));

        let err = decoder.decode_eof(&mut buffer).unwrap_err();
        assert!(err.is_truncation());
        assert!(matches!(err.as_protocol(), Some(ProtocolError::TruncatedChunk { expected: 10, actual: 4 })));
    }

    #[test]
    fn end_of_stream_on_chunk_boundary_is_truncation() {
        let mut buffer = BytesMut::from("3\r\nabc\r\n");
        let mut decoder = decoder();

        assert!(decoder.decode_eof(&mut buffer).unwrap().unwrap().is_chunk());
        let err = decoder.decode_eof(&mut buffer).unwrap_err();
        assert!(err.is_truncation());
    }

    #[test]
    fn chunk_size_line_is_limited() {
        let mut decoder = ChunkedDecoder::new(MessageConstraints::new(8, 64, 10), CharCodingConfig::default());
        let mut buffer = BytesMut::from("1;extension-too-long\r\n");
        let err = decoder.decode(&mut buffer).unwrap_err();
        assert!(matches!(err.as_protocol(), Some(ProtocolError::LineTooLong { max_len: 8 })));
    }

    #[test]
    fn trailer_count_is_limited() {
        let mut decoder = ChunkedDecoder::new(MessageConstraints::new(0, 1, 10), CharCodingConfig::default());
        let mut buffer = BytesMut::from("0\r\nA: 1\r\nB: 2\r\n\r\n");
        let err = decoder.decode(&mut buffer).unwrap_err();
        assert!(matches!(err.as_protocol(), Some(ProtocolError::TooManyHeaders { max_num: 1 })));
    }
}
