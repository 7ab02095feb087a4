use std::io::{self, ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::config::Http1Config;
use crate::io::{line, CharCodingConfig, ExpandableBuffer, TransportMetrics};
use crate::protocol::HttpError;

/// Outcome of a single [`SessionInputBuffer::fill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// Bytes appended; zero when the channel had nothing to offer right now.
    Data(usize),
    EndOfStream,
}

impl Fill {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Fill::EndOfStream)
    }
}

/// Line and byte oriented reads over data pulled from a non-blocking channel.
#[derive(Debug)]
pub struct SessionInputBuffer {
    buffer: ExpandableBuffer,
    max_line_length: usize,
    coding: CharCodingConfig,
}

impl SessionInputBuffer {
    pub fn new(buffer_size: usize, max_buffer_size: usize, max_line_length: usize, coding: CharCodingConfig) -> Self {
        Self { buffer: ExpandableBuffer::new(buffer_size, max_buffer_size), max_line_length, coding }
    }

    pub fn from_config(config: &Http1Config) -> Self {
        Self::new(
            config.buffer_size(),
            config.max_buffer_size(),
            config.constraints().max_line_length(),
            *config.char_coding(),
        )
    }

    /// Appends bytes that were read before this buffer took over the channel.
    pub fn put(&mut self, src: &[u8]) {
        self.buffer.set_input_mode();
        self.buffer.ensure_capacity(self.buffer.len() + src.len());
        self.buffer.bytes_mut().extend_from_slice(src);
    }

    /// Reads whatever the channel has available, expanding first when full.
    ///
    /// `WouldBlock` is reported as `Fill::Data(0)`. Every byte read is counted in `metrics`.
    pub fn fill<R: Read + ?Sized>(&mut self, channel: &mut R, metrics: &mut TransportMetrics) -> io::Result<Fill> {
        self.buffer.set_input_mode();
        if self.buffer.free() == 0 && !self.buffer.expand() {
            return Ok(Fill::Data(0));
        }

        let free = self.buffer.free();
        let buf = self.buffer.bytes_mut();
        let start = buf.len();
        buf.resize(start + free, 0);

        let result = loop {
            match channel.read(&mut buf[start..]) {
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                other => break other,
            }
        };

        match result {
            Ok(0) => {
                buf.truncate(start);
                trace!("channel reached end of stream");
                Ok(Fill::EndOfStream)
            }
            Ok(n) => {
                buf.truncate(start + n);
                metrics.increment(n);
                Ok(Fill::Data(n))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                buf.truncate(start);
                Ok(Fill::Data(0))
            }
            Err(e) => {
                buf.truncate(start);
                Err(e)
            }
        }
    }

    /// Reads one line into `dst`. See the module level rules for terminators and limits.
    pub fn read_line(&mut self, dst: &mut String, end_of_stream: bool) -> Result<bool, HttpError> {
        self.buffer.set_output_mode();
        line::read_line(self.buffer.bytes_mut(), dst, end_of_stream, self.max_line_length, &self.coding)
    }

    /// Moves up to `max` buffered bytes into `dst`, returning how many were moved.
    pub fn read(&mut self, dst: &mut BytesMut, max: usize) -> usize {
        let chunk = self.split_to(max);
        dst.extend_from_slice(&chunk);
        chunk.len()
    }

    /// Takes up to `max` buffered bytes.
    pub fn split_to(&mut self, max: usize) -> Bytes {
        self.buffer.set_output_mode();
        let buf = self.buffer.bytes_mut();
        let len = max.min(buf.len());
        buf.split_to(len).freeze()
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

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut BytesMut {
        self.buffer.set_output_mode();
        self.buffer.bytes_mut()
    }
}
