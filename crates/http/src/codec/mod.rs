//! HTTP/1.x wire codec.
//!
//! - [`header`]: message head parsing and writing ([`MessageParser`], [`MessageWriter`])
//! - [`body`]: body framing ([`PayloadDecoder`], [`PayloadEncoder`] and the
//!   identity, length delimited and chunked codecs behind them)
//! - [`ContentLengthStrategy`]: picks the body framing from a message head
//!
//! Parsers and codecs work on the session buffers from [`crate::io`] so they can
//! be driven by a non-blocking event loop, and they also implement the
//! `tokio_util` codec traits for use over plain `BytesMut` buffers.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use micro_h1::codec::{ContentLengthStrategy, DefaultContentLengthStrategy, MessageParser, PayloadDecoder};
//! use micro_h1::protocol::{PayloadItem, RequestHead};
//! use micro_h1::config::Http1Config;
//! use tokio_util::codec::Decoder;
//!
//! let config = Http1Config::default();
//! let mut buffer = BytesMut::from("POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello");
//!
//! let mut parser = MessageParser::<RequestHead>::from_config(&config);
//! let head = parser.decode(&mut buffer).unwrap().unwrap();
//! let size = DefaultContentLengthStrategy.determine_length(&head).unwrap();
//!
//! let mut decoder = PayloadDecoder::for_payload(size, config.constraints(), *config.char_coding());
//! let item = decoder.decode(&mut buffer).unwrap().unwrap();
//! assert_eq!(item, PayloadItem::Chunk("hello".into()));
//! ```

pub mod body;
pub mod header;
mod strategy;

pub use body::{ContentInput, ContentOutput, PayloadDecoder, PayloadEncoder};
pub use header::{MessageParser, MessageWriter};
pub use strategy::{ContentLengthStrategy, DefaultContentLengthStrategy};
