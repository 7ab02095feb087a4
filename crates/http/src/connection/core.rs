//! Outbound half of a connection shared by both roles.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::codec::{ContentLengthStrategy, ContentOutput, MessageWriter, PayloadEncoder};
use crate::config::Http1Config;
use crate::connection::{CapacityChannel, CloseMode, CommandSender, EventMask, ExchangeId, IoSession};
use crate::ensure;
use crate::io::{ConnectionMetrics, SessionOutputBuffer};
use crate::protocol::{Headers, HttpError, MessageHead, ProtocolError};

/// Lifecycle of a connection. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Ready,
    Active,
    /// No new exchanges; pending output is drained before closing.
    GracefulShutdown,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    Buffer,
    /// Write the head to the channel right away, used while waiting for `100 Continue`.
    Immediate,
}

/// What a stream handler may do with the outgoing side of the connection.
pub trait StreamChannel<H> {
    /// Commits a message head. Unless `end_stream` is set a body encoder is selected
    /// from the head's framing headers.
    fn submit(&mut self, head: &H, end_stream: bool, flush: FlushMode) -> Result<(), HttpError>;

    /// Writes body bytes of the committed message, returning how many were accepted.
    fn write(&mut self, src: &[u8]) -> Result<usize, HttpError>;

    /// Ends the body of the committed message.
    fn complete(&mut self, trailers: Option<&Headers>) -> Result<(), HttpError>;

    /// Ends the body early. Only a chunk coded body can be ended cleanly; `false` means
    /// the peer cannot tell where the message stopped and the connection must not be reused.
    fn abort_gracefully(&mut self) -> Result<bool, HttpError>;

    fn request_output(&mut self);

    /// Stops `on_output` callbacks while nothing is buffered.
    fn suspend_output(&mut self);

    /// Shuts the connection down once pending output is written. If the committed message
    /// was left unfinished the peer could not make sense of the stream, so it closes at once.
    fn close(&mut self);

    fn is_active(&self) -> bool;

    fn socket_timeout(&self) -> Option<Duration>;

    fn set_socket_timeout(&mut self, timeout: Option<Duration>);

    fn config(&self) -> &Http1Config;

    fn next_exchange_id(&self) -> ExchangeId;

    fn capacity_channel(&self, id: ExchangeId) -> CapacityChannel;
}

pub(crate) struct StreamCore<S, H> {
    pub(crate) session: S,
    pub(crate) config: Http1Config,
    pub(crate) state: ConnectionState,
    pub(crate) output: SessionOutputBuffer,
    writer: MessageWriter<H>,
    pub(crate) encoder: Option<PayloadEncoder>,
    pub(crate) strategy: Arc<dyn ContentLengthStrategy>,
    pub(crate) metrics: ConnectionMetrics,
    pub(crate) sender: CommandSender,
    /// A message body was cut short without a clean end marker.
    truncated: bool,
    server: bool,
}

impl<S: IoSession, H: MessageHead> StreamCore<S, H> {
    pub(crate) fn new(
        session: S,
        config: Http1Config,
        strategy: Arc<dyn ContentLengthStrategy>,
        sender: CommandSender,
        server: bool,
    ) -> Self {
        Self {
            output: SessionOutputBuffer::from_config(&config),
            session,
            config,
            state: ConnectionState::Ready,
            writer: MessageWriter::new(),
            encoder: None,
            strategy,
            metrics: ConnectionMetrics::default(),
            sender,
            truncated: false,
            server,
        }
    }

    pub(crate) fn advance(&mut self, state: ConnectionState) {
        if state > self.state {
            debug!(from = ?self.state, to = ?state, "connection state changed");
            self.state = state;
        }
    }

    pub(crate) fn request_shutdown(&mut self, mode: CloseMode) {
        match mode {
            CloseMode::Graceful if self.state == ConnectionState::Active => self.advance(ConnectionState::GracefulShutdown),
            CloseMode::Graceful => {}
            CloseMode::Immediate => self.advance(ConnectionState::Shutdown),
        }
        self.session.set_event(EventMask::WRITE);
    }

    pub(crate) fn flush(&mut self) -> Result<usize, HttpError> {
        if !self.output.has_data() {
            return Ok(0);
        }
        let n = self.output.flush(&mut self.session, &mut self.metrics.outbound)?;
        trace!(written = n, remaining = self.output.len(), "flushed output");
        Ok(n)
    }

    /// True when no message body is being written and nothing is buffered.
    pub(crate) fn is_output_end(&self) -> bool {
        self.encoder.is_none() && !self.output.has_data()
    }

    fn output(&mut self) -> ContentOutput<'_> {
        ContentOutput::new(&mut self.session, &mut self.output, &mut self.metrics.outbound)
    }
}

impl<S: IoSession, H: MessageHead> StreamChannel<H> for StreamCore<S, H> {
    fn submit(&mut self, head: &H, end_stream: bool, flush: FlushMode) -> Result<(), HttpError> {
        ensure!(self.encoder.is_none(), ProtocolError::UnexpectedMessageHead.into());
        self.writer.write(head, &mut self.output)?;
        if !end_stream {
            let size = self.strategy.determine_length(head)?;
            self.encoder = Some(PayloadEncoder::for_payload(size, self.config.chunk_size_hint()));
        }
        if self.server {
            self.metrics.response_count += 1;
        } else {
            self.metrics.request_count += 1;
        }
        if flush == FlushMode::Immediate {
            self.flush()?;
        }
        self.session.set_event(EventMask::WRITE);
        Ok(())
    }

    fn write(&mut self, src: &[u8]) -> Result<usize, HttpError> {
        let mut encoder = self.encoder.take().ok_or(ProtocolError::StreamCompleted)?;
        let result = encoder.write(&mut self.output(), src);
        self.encoder = Some(encoder);
        let n = result?;
        if n < src.len() || self.output.has_data() {
            self.session.set_event(EventMask::WRITE);
        }
        Ok(n)
    }

    fn complete(&mut self, trailers: Option<&Headers>) -> Result<(), HttpError> {
        let mut encoder = self.encoder.take().ok_or(ProtocolError::StreamCompleted)?;
        encoder.complete(&mut self.output(), trailers)?;
        self.session.set_event(EventMask::WRITE);
        Ok(())
    }

    fn abort_gracefully(&mut self) -> Result<bool, HttpError> {
        let Some(mut encoder) = self.encoder.take() else {
            return Ok(true);
        };
        self.session.set_event(EventMask::WRITE);
        if encoder.is_identity() {
            self.truncated = true;
            return Ok(false);
        }
        match encoder.complete(&mut self.output(), None) {
            Ok(()) => Ok(true),
            Err(e) if e.as_protocol().is_some() => {
                self.truncated = true;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn request_output(&mut self) {
        self.session.set_event(EventMask::WRITE);
    }

    fn suspend_output(&mut self) {
        if !self.output.has_data() {
            self.session.clear_event(EventMask::WRITE);
        }
    }

    fn close(&mut self) {
        if self.encoder.is_some() || self.truncated {
            debug!("outgoing message unfinished, closing immediately");
            self.request_shutdown(CloseMode::Immediate);
            self.session.close(CloseMode::Immediate);
        } else {
            self.request_shutdown(CloseMode::Graceful);
        }
    }

    fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }

    fn socket_timeout(&self) -> Option<Duration> {
        self.session.socket_timeout()
    }

    fn set_socket_timeout(&mut self, timeout: Option<Duration>) {
        self.session.set_socket_timeout(timeout);
    }

    fn config(&self) -> &Http1Config {
        &self.config
    }

    fn next_exchange_id(&self) -> ExchangeId {
        self.sender.next_id()
    }

    fn capacity_channel(&self, id: ExchangeId) -> CapacityChannel {
        CapacityChannel::new(self.sender.clone(), id)
    }
}
