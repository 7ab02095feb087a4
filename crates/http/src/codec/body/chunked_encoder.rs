use std::io::Write;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;

use super::ContentOutput;
use crate::protocol::{Headers, HttpError, PayloadItem};

/// Worst case size line plus the CRLF after the data: 16 hex digits and two CRLFs.
const CHUNK_OVERHEAD: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEncoder {
    fragment_hint: usize,
}

impl ChunkedEncoder {
    pub fn new(fragment_hint: usize) -> Self {
        Self { fragment_hint }
    }

    /// Frames `src` as one or more chunks sized to the room left in the session buffer.
    pub fn write(&mut self, out: &mut ContentOutput<'_>, mut src: &[u8]) -> Result<usize, HttpError> {
        let mut total = 0;
        while !src.is_empty() {
            let mut avail = out.buffer.headroom().saturating_sub(CHUNK_OVERHEAD);
            if avail == 0 && !out.buffer.has_data() {
                // Buffer too small for the framing; let it grow past its capacity.
                avail = out.buffer.headroom().max(1);
            }
            if avail > 0 {
                let len = avail.min(src.len());
                write_chunk(out.buffer.bytes_mut(), &src[..len])?;
                src = &src[len..];
                total += len;
            }
            if (out.buffer.len() >= self.fragment_hint || !src.is_empty()) && out.flush()? == 0 {
                break;
            }
        }
        Ok(total)
    }

    /// Writes the last chunk, the trailers and the final empty line.
    pub fn complete(&mut self, out: &mut ContentOutput<'_>, trailers: Option<&Headers>) -> Result<(), HttpError> {
        write_last_chunk(out.buffer.bytes_mut(), trailers);
        Ok(())
    }
}

fn write_chunk(dst: &mut BytesMut, data: &[u8]) -> Result<(), HttpError> {
    write!(helper::Writer(dst), "{:X}\r\n", data.len())?;
    dst.reserve(data.len() + 2);
    dst.extend_from_slice(data);
    dst.extend_from_slice(b"\r\n");
    Ok(())
}

fn write_last_chunk(dst: &mut BytesMut, trailers: Option<&Headers>) {
    dst.extend_from_slice(b"0\r\n");
    for (name, value) in trailers.into_iter().flatten() {
        dst.extend_from_slice(name.as_ref());
        dst.extend_from_slice(b": ");
        dst.extend_from_slice(value.as_bytes());
        dst.extend_from_slice(b"\r\n");
    }
    dst.extend_from_slice(b"\r\n");
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = HttpError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) if !bytes.has_remaining() => Ok(()),
            PayloadItem::Chunk(mut bytes) => {
                let data = bytes.copy_to_bytes(bytes.remaining());
                write_chunk(dst, &data)
            }
            PayloadItem::Eof => {
                write_last_chunk(dst, None);
                Ok(())
            }
        }
    }
}

mod helper {
    use bytes::{BufMut, BytesMut};
    use std::io;

    pub struct Writer<'a>(pub &'a mut BytesMut);

    impl io::Write for Writer<'_> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.put_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::body::test_support::Throttled;
    use crate::io::{CharCodingConfig, SessionOutputBuffer, TransportMetrics};
    use bytes::Bytes;
    use http::{HeaderName, HeaderValue};

    #[test]
    fn encodes_size_line_data_and_crlf() {
        let mut encoder = ChunkedEncoder::new(0);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"0123456789abcdefXYZ")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::new()), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert_eq!(&dst[..], b"13\r\n0123456789abcdefXYZ\r\n0\r\n\r\n");
    }

    #[test]
    fn chunks_fit_the_buffer_headroom() {
        let mut channel = Throttled { written: Vec::new(), budget: usize::MAX };
        let mut buffer = SessionOutputBuffer::new(64, 64, CharCodingConfig::default());
        let mut metrics = TransportMetrics::default();
        let mut encoder = ChunkedEncoder::new(64);

        let mut out = ContentOutput::new(&mut channel, &mut buffer, &mut metrics);
        assert_eq!(encoder.write(&mut out, &[b'a'; 100]).unwrap(), 100);

        let mut trailers = Headers::new();
        trailers.append(HeaderName::from_static("checksum"), HeaderValue::from_static("ok"));
        encoder.complete(&mut out, Some(&trailers)).unwrap();
        out.flush().unwrap();

        let expected = [
            &b"2C\r\n"[..],
            &[b'a'; 44],
            b"\r\n2C\r\n",
            &[b'a'; 44],
            b"\r\nC\r\n",
            &[b'a'; 12],
            b"\r\n0\r\nchecksum: ok\r\n\r\n",
        ]
        .concat();
        assert_eq!(channel.written, expected);
    }

    #[test]
    fn undersized_buffer_still_makes_progress() {
        let mut channel = Throttled { written: Vec::new(), budget: usize::MAX };
        let mut buffer = SessionOutputBuffer::new(16, 16, CharCodingConfig::default());
        let mut metrics = TransportMetrics::default();
        let mut encoder = ChunkedEncoder::new(16);

        let mut out = ContentOutput::new(&mut channel, &mut buffer, &mut metrics);
        assert_eq!(encoder.write(&mut out, &[b'a'; 40]).unwrap(), 40);
        out.flush().unwrap();

        let expected = [
            &b"10\r\n"[..],
            &[b'a'; 16],
            b"\r\n10\r\n",
            &[b'a'; 16],
            b"\r\n8\r\n",
            &[b'a'; 8],
            b"\r\n",
        ]
        .concat();
        assert_eq!(channel.written, expected);
    }
}
