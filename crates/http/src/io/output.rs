use std::io::{self, ErrorKind, Write};

use bytes::{Buf, BufMut, BytesMut};

use crate::config::Http1Config;
use crate::io::{CharCodingConfig, ExpandableBuffer, TransportMetrics};
use crate::protocol::HttpError;

/// Buffers outgoing heads and body bytes until the channel accepts them.
#[derive(Debug)]
pub struct SessionOutputBuffer {
    buffer: ExpandableBuffer,
    coding: CharCodingConfig,
}

impl SessionOutputBuffer {
    pub fn new(buffer_size: usize, max_buffer_size: usize, coding: CharCodingConfig) -> Self {
        Self { buffer: ExpandableBuffer::new(buffer_size, max_buffer_size), coding }
    }

    pub fn from_config(config: &Http1Config) -> Self {
        Self::new(config.buffer_size(), config.max_buffer_size(), *config.char_coding())
    }

    /// Encodes `line` and appends it followed by CRLF.
    pub fn write_line(&mut self, line: &str) -> Result<(), HttpError> {
        self.buffer.set_input_mode();
        let buf = self.buffer.bytes_mut();
        self.coding.encode(line, buf)?;
        buf.put_slice(b"\r\n");
        Ok(())
    }

    pub fn write(&mut self, src: &[u8]) {
        self.buffer.set_input_mode();
        self.buffer.bytes_mut().put_slice(src);
    }

    /// Writes buffered bytes until the channel would block, returning how many were written.
    pub fn flush<W: Write + ?Sized>(&mut self, channel: &mut W, metrics: &mut TransportMetrics) -> io::Result<usize> {
        self.buffer.set_output_mode();
        let buf = self.buffer.bytes_mut();
        let mut total = 0;
        while !buf.is_empty() {
            match channel.write(&buf[..]) {
                Ok(0) => break,
                Ok(n) => {
                    buf.advance(n);
                    total += n;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    metrics.increment(total);
                    return Err(e);
                }
            }
        }
        metrics.increment(total);
        Ok(total)
    }

    pub fn has_data(&self) -> bool {
        self.buffer.has_data()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Room left before the buffer would have to grow.
    pub fn headroom(&self) -> usize {
        self.buffer.free()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut BytesMut {
        self.buffer.set_input_mode();
        self.buffer.bytes_mut()
    }

    pub(crate) fn coding(&self) -> &CharCodingConfig {
        &self.coding
    }
}
