//! Incremental tokenizer for HTTP/1.x message heads.
//!
//! The parser consumes one line at a time from the buffered input and never
//! waits for more data: when the head is incomplete it returns `Ok(None)` and
//! picks up where it stopped on the next call. It moves through
//! `ReadHeadLine -> ReadHeaders -> Completed`, then resets itself so one parser
//! serves every pipelined message of a connection.
//!
//! # Limits
//!
//! - leading empty lines before the head line, up to `max_empty_line_count`
//! - header fields, up to `max_header_count`
//! - line length (complete, folded, or still incomplete), up to `max_line_length`
//!
//! Head lines announcing HTTP/2 or later are rejected.

use bytes::BytesMut;
use http::{HeaderName, HeaderValue};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::config::{Http1Config, MessageConstraints};
use crate::ensure;
use crate::io::{line, CharCodingConfig, SessionInputBuffer};
use crate::protocol::{Headers, HttpError, MessageHead, ProtocolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    ReadHeadLine,
    ReadHeaders,
    Completed,
}

#[derive(Debug)]
pub struct MessageParser<H> {
    constraints: MessageConstraints,
    coding: CharCodingConfig,
    state: ParserState,
    head: Option<H>,
    header_lines: HeaderLines,
    current: String,
    empty_lines: usize,
}

impl<H: MessageHead> MessageParser<H> {
    pub fn new(constraints: MessageConstraints, coding: CharCodingConfig) -> Self {
        Self {
            constraints,
            coding,
            state: ParserState::ReadHeadLine,
            head: None,
            header_lines: HeaderLines::default(),
            current: String::with_capacity(128),
            empty_lines: 0,
        }
    }

    pub fn from_config(config: &Http1Config) -> Self {
        Self::new(config.constraints(), *config.char_coding())
    }

    /// Parses from the session buffer. `end_of_stream` lets a final unterminated line through.
    pub fn parse(&mut self, input: &mut SessionInputBuffer, end_of_stream: bool) -> Result<Option<H>, HttpError> {
        self.parse_buf(input.bytes_mut(), end_of_stream)
    }

    /// True when nothing of the next head has been consumed yet.
    pub fn is_idle(&self) -> bool {
        self.state == ParserState::ReadHeadLine && self.empty_lines == 0
    }

    pub fn reset(&mut self) {
        self.state = ParserState::ReadHeadLine;
        self.head = None;
        self.header_lines.clear();
        self.current.clear();
        self.empty_lines = 0;
    }

    pub(crate) fn parse_buf(&mut self, src: &mut BytesMut, end_of_stream: bool) -> Result<Option<H>, HttpError> {
        loop {
            self.current.clear();
            let max_line_length = self.constraints.max_line_length();
            if !line::read_line(src, &mut self.current, end_of_stream, max_line_length, &self.coding)? {
                return Ok(None);
            }

            match self.state {
                ParserState::ReadHeadLine => {
                    if self.current.is_empty() {
                        self.empty_lines += 1;
                        let max_num = self.constraints.max_empty_line_count();
                        ensure!(self.empty_lines <= max_num, ProtocolError::TooManyEmptyLines { max_num }.into());
                        continue;
                    }
                    self.head = Some(H::parse_head_line(&self.current)?);
                    self.state = ParserState::ReadHeaders;
                }
                ParserState::ReadHeaders => {
                    if self.current.is_empty() {
                        self.state = ParserState::Completed;
                        let head = self.complete();
                        self.reset();
                        return head.map(Some);
                    }
                    self.header_lines.push(&self.current, &self.constraints)?;
                }
                ParserState::Completed => unreachable!("parser resets itself on completion"),
            }
        }
    }

    fn complete(&mut self) -> Result<H, HttpError> {
        let mut head = self.head.take().ok_or(ProtocolError::UnexpectedMessageHead)?;
        let headers = self.header_lines.take_headers(&self.coding)?;
        trace!(header_count = headers.len(), "parsed message head");
        *head.headers_mut() = headers;
        Ok(head)
    }
}

impl<H: MessageHead> Decoder for MessageParser<H> {
    type Item = H;
    type Error = HttpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.parse_buf(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.parse_buf(src, true)? {
            Some(head) => Ok(Some(head)),
            None if self.is_idle() => Ok(None),
            None => Err(HttpError::connection_closed("end of stream inside message head")),
        }
    }
}

/// Header field lines collected before they are parsed, with continuation lines folded in.
///
/// Shared by the head parser and the chunk trailer reader.
#[derive(Debug, Default)]
pub(crate) struct HeaderLines {
    lines: Vec<String>,
}

impl HeaderLines {
    pub(crate) fn push(&mut self, line: &str, constraints: &MessageConstraints) -> Result<(), HttpError> {
        if line.starts_with([' ', '\t']) {
            let Some(last) = self.lines.last_mut() else {
                return Err(ProtocolError::invalid_header("continuation line without a preceding header").into());
            };
            last.push(' ');
            last.push_str(line.trim_start_matches([' ', '\t']));

            let max_len = constraints.max_line_length();
            ensure!(max_len == 0 || last.len() <= max_len, ProtocolError::LineTooLong { max_len }.into());
            return Ok(());
        }

        let max_num = constraints.max_header_count();
        ensure!(max_num == 0 || self.lines.len() < max_num, ProtocolError::TooManyHeaders { max_num }.into());
        self.lines.push(line.to_owned());
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.lines.clear();
    }

    pub(crate) fn take_headers(&mut self, coding: &CharCodingConfig) -> Result<Headers, HttpError> {
        let mut headers = Headers::with_capacity(self.lines.len());
        for line in self.lines.drain(..) {
            let (name, value) = parse_header_line(&line, coding)?;
            headers.append(name, value);
        }
        Ok(headers)
    }
}

/// Splits `name: value`, trimming optional whitespace around the value.
fn parse_header_line(line: &str, coding: &CharCodingConfig) -> Result<(HeaderName, HeaderValue), ProtocolError> {
    let (name, value) = line.split_once(':').ok_or_else(|| ProtocolError::invalid_header(line))?;
    let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| ProtocolError::invalid_header(line))?;

    let mut bytes = BytesMut::with_capacity(value.len());
    coding.encode(value.trim_matches([' ', '\t']), &mut bytes)?;
    let value = HeaderValue::from_maybe_shared(bytes.freeze()).map_err(|_| ProtocolError::invalid_header(line))?;

    Ok((name, value))
}
