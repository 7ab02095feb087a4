//! Connection level configuration.
//!
//! Everything is configured in code through [`Http1Config::builder`]; the defaults
//! mirror the limits the codec has always enforced (8 KiB lines, 64 headers).

use std::time::Duration;

use crate::io::CharCodingConfig;

const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;
const DEFAULT_CHUNK_SIZE_HINT: usize = 8 * 1024;
const DEFAULT_INITIAL_WINDOW_SIZE: usize = 65_535;
const DEFAULT_WAIT_FOR_CONTINUE: Duration = Duration::from_secs(3);
const DEFAULT_MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Limits applied while tokenizing message heads and chunk trailers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageConstraints {
    max_line_length: usize,
    max_header_count: usize,
    max_empty_line_count: usize,
}

impl MessageConstraints {
    pub const DEFAULT: MessageConstraints =
        MessageConstraints { max_line_length: 8 * 1024, max_header_count: 64, max_empty_line_count: 10 };

    pub fn new(max_line_length: usize, max_header_count: usize, max_empty_line_count: usize) -> Self {
        Self { max_line_length, max_header_count, max_empty_line_count }
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    pub fn max_header_count(&self) -> usize {
        self.max_header_count
    }

    pub fn max_empty_line_count(&self) -> usize {
        self.max_empty_line_count
    }
}

impl Default for MessageConstraints {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone)]
pub struct Http1Config {
    buffer_size: usize,
    max_buffer_size: usize,
    chunk_size_hint: usize,
    wait_for_continue_timeout: Duration,
    initial_window_size: usize,
    constraints: MessageConstraints,
    char_coding: CharCodingConfig,
    tolerate_truncated_chunks: bool,
}

impl Http1Config {
    pub fn builder() -> Http1ConfigBuilder {
        Http1ConfigBuilder { config: Http1Config::default() }
    }

    /// Initial capacity of the session input and output buffers.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Upper bound the session buffers may grow to.
    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    /// Fragment size used to batch small body writes and to size body reads.
    pub fn chunk_size_hint(&self) -> usize {
        self.chunk_size_hint
    }

    pub fn wait_for_continue_timeout(&self) -> Duration {
        self.wait_for_continue_timeout
    }

    pub fn initial_window_size(&self) -> usize {
        self.initial_window_size
    }

    pub fn constraints(&self) -> MessageConstraints {
        self.constraints
    }

    pub fn char_coding(&self) -> &CharCodingConfig {
        &self.char_coding
    }

    /// When set, a chunk coded body cut short by the peer ends the body instead of failing the exchange.
    pub fn tolerate_truncated_chunks(&self) -> bool {
        self.tolerate_truncated_chunks
    }
}

impl Default for Http1Config {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            chunk_size_hint: DEFAULT_CHUNK_SIZE_HINT,
            wait_for_continue_timeout: DEFAULT_WAIT_FOR_CONTINUE,
            initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            constraints: MessageConstraints::DEFAULT,
            char_coding: CharCodingConfig::default(),
            tolerate_truncated_chunks: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Http1ConfigBuilder {
    config: Http1Config,
}

impl Http1ConfigBuilder {
    #[must_use]
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size.max(64);
        self
    }

    #[must_use]
    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.config.max_buffer_size = size;
        self
    }

    #[must_use]
    pub fn chunk_size_hint(mut self, size: usize) -> Self {
        self.config.chunk_size_hint = size.max(1);
        self
    }

    #[must_use]
    pub fn wait_for_continue_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_for_continue_timeout = timeout;
        self
    }

    #[must_use]
    pub fn initial_window_size(mut self, size: usize) -> Self {
        self.config.initial_window_size = size;
        self
    }

    #[must_use]
    pub fn constraints(mut self, constraints: MessageConstraints) -> Self {
        self.config.constraints = constraints;
        self
    }

    #[must_use]
    pub fn char_coding(mut self, char_coding: CharCodingConfig) -> Self {
        self.config.char_coding = char_coding;
        self
    }

    #[must_use]
    pub fn tolerate_truncated_chunks(mut self, tolerate: bool) -> Self {
        self.config.tolerate_truncated_chunks = tolerate;
        self
    }

    pub fn build(self) -> Http1Config {
        let mut config = self.config;
        config.max_buffer_size = config.max_buffer_size.max(config.buffer_size);
        config
    }
}
