use std::error::Error;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Top level error surfaced by the codec, the stream handlers and the duplexer.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("protocol error: {source}")]
    Protocol {
        #[from]
        source: ProtocolError,
    },

    #[error("connection closed: {reason}")]
    ConnectionClosed { reason: String },

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("exchange cancelled")]
    Cancelled,

    #[error("request not executed: {reason}")]
    NotExecuted { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("handler error: {source}")]
    Handler { source: Box<dyn Error + Send + Sync> },
}

impl HttpError {
    pub fn connection_closed<S: ToString>(str: S) -> Self {
        Self::ConnectionClosed { reason: str.to_string() }
    }

    pub fn not_executed<S: ToString>(str: S) -> Self {
        Self::NotExecuted { reason: str.to_string() }
    }

    pub fn handler<E: Into<Box<dyn Error + Send + Sync>>>(e: E) -> Self {
        Self::Handler { source: e.into() }
    }

    /// Returns the protocol error kind when this is a protocol violation.
    pub fn as_protocol(&self) -> Option<&ProtocolError> {
        match self {
            HttpError::Protocol { source } => Some(source),
            _ => None,
        }
    }

    /// True when the peer closed a chunk coded body in the middle of a chunk.
    pub fn is_truncation(&self) -> bool {
        self.as_protocol().is_some_and(ProtocolError::is_truncation)
    }

    pub fn is_unsupported_version(&self) -> bool {
        self.as_protocol().is_some_and(ProtocolError::is_unsupported_version)
    }
}

/// Framing, sequencing and limit violations.
///
/// [`ProtocolError::TruncatedChunk`] is the only kind a lenient consumer may choose to
/// ignore; every other kind leaves the stream in an unknown state.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("truncated chunk (expected size: {expected}; actual size: {actual})")]
    TruncatedChunk { expected: u64, actual: u64 },

    #[error("malformed chunk: {reason}")]
    MalformedChunk { reason: String },

    #[error("maximum line length limit exceeded: {max_len}")]
    LineTooLong { max_len: usize },

    #[error("maximum header count exceeded: {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("maximum empty line count exceeded: {max_num}")]
    TooManyEmptyLines { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid head line: {line}")]
    InvalidHeadLine { line: String },

    #[error("unsupported http version: {version}")]
    UnsupportedVersion { version: String },

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("unsupported transfer encoding: {value}")]
    UnsupportedTransferEncoding { value: String },

    #[error("malformed input: {reason}")]
    MalformedInput { reason: String },

    #[error("content exceeds declared length: {declared}")]
    ContentTooLong { declared: u64 },

    #[error("content shorter than declared length (expected: {declared}; written: {written})")]
    ContentTooShort { declared: u64, written: u64 },

    #[error("content stream already completed")]
    StreamCompleted,

    #[error("unexpected message head")]
    UnexpectedMessageHead,

    #[error("unexpected message data")]
    UnexpectedData,

    #[error("unexpected response: {status}")]
    UnexpectedResponse { status: u16 },

    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },

    #[error("message head already committed")]
    AlreadyCommitted,
}

impl ProtocolError {
    pub fn malformed_chunk<S: ToString>(str: S) -> Self {
        Self::MalformedChunk { reason: str.to_string() }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_head_line<S: ToString>(str: S) -> Self {
        Self::InvalidHeadLine { line: str.to_string() }
    }

    pub fn unsupported_version<S: ToString>(str: S) -> Self {
        Self::UnsupportedVersion { version: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn malformed_input<S: ToString>(str: S) -> Self {
        Self::MalformedInput { reason: str.to_string() }
    }

    pub fn invalid_response<S: ToString>(str: S) -> Self {
        Self::InvalidResponse { reason: str.to_string() }
    }

    pub fn is_truncation(&self) -> bool {
        matches!(self, ProtocolError::TruncatedChunk { .. })
    }

    pub fn is_unsupported_version(&self) -> bool {
        matches!(self, ProtocolError::UnsupportedVersion { .. })
    }
}
