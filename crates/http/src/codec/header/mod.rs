//! Message head codec.
//!
//! - [`MessageParser`]: line oriented head tokenizer with folding and limits
//! - [`MessageWriter`]: the inverse serializer

mod message_parser;
mod message_writer;

pub(crate) use message_parser::HeaderLines;
pub use message_parser::MessageParser;
pub use message_writer::MessageWriter;
