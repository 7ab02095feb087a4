//! The per connection state machine.
//!
//! [`Http1StreamDuplexer`] owns the session buffers, the head parser and the
//! in-flight body codecs of one connection. It is driven by a reactor through
//! `on_connect`, `on_input`, `on_output`, `on_timeout` and `on_disconnect`, and
//! never blocks. Everything that differs between the client and the server side
//! lives behind [`StreamPolicy`].
//!
//! At most one incoming and one outgoing body are in flight at any time; the two
//! directions are independent, so a request body may still be streaming while its
//! response is already being read.

use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::BytesMut;
use futures::channel::mpsc::UnboundedReceiver;
use futures::{FutureExt, StreamExt};
use tracing::{debug, error, warn};

use crate::codec::{ContentInput, ContentLengthStrategy, DefaultContentLengthStrategy, MessageParser, PayloadDecoder};
use crate::config::Http1Config;
use crate::connection::command::Command;
use crate::connection::core::StreamCore;
use crate::connection::{
    CapacityChannel, CloseMode, CommandSender, ConnectionState, EventMask, ExchangeId, Execution, IoSession,
    StreamChannel,
};
use crate::io::{ConnectionMetrics, SessionInputBuffer};
use crate::protocol::{EntityDetails, Headers, HttpError, MessageHead, PayloadSize};

/// Role specific half of the duplexer: exchange bookkeeping and hand-off to stream handlers.
///
/// Every callback runs on the driving thread with the outgoing side of the connection
/// passed in as `channel`.
pub trait StreamPolicy {
    type Incoming: MessageHead;
    type Outgoing: MessageHead;

    /// True for the side that receives requests.
    const SERVER: bool;

    /// Body framing of an incoming head, `None` when it carries no body.
    fn incoming_framing(
        &self,
        head: &Self::Incoming,
        strategy: &dyn ContentLengthStrategy,
    ) -> Result<Option<PayloadSize>, HttpError>;

    fn consume_header(
        &mut self,
        head: Self::Incoming,
        entity: Option<EntityDetails>,
        channel: &mut dyn StreamChannel<Self::Outgoing>,
    ) -> Result<(), HttpError>;

    fn consume_data(&mut self, data: &[u8], channel: &mut dyn StreamChannel<Self::Outgoing>) -> Result<(), HttpError>;

    /// Exchange whose body is being received.
    fn incoming_id(&self) -> Option<ExchangeId>;

    /// Hands the input window of the incoming exchange to its handler once exhausted.
    fn request_capacity(&mut self, capacity: CapacityChannel);

    /// The incoming message is complete, body and trailers included.
    fn data_end(
        &mut self,
        trailers: Option<&Headers>,
        channel: &mut dyn StreamChannel<Self::Outgoing>,
    ) -> Result<(), HttpError>;

    fn input_end(&mut self, channel: &mut dyn StreamChannel<Self::Outgoing>) -> Result<(), HttpError>;

    fn is_output_ready(&self) -> bool;

    fn produce_output(&mut self, channel: &mut dyn StreamChannel<Self::Outgoing>) -> Result<(), HttpError>;

    /// Nothing is being written and the output buffer is empty.
    fn output_end(&mut self, channel: &mut dyn StreamChannel<Self::Outgoing>) -> Result<(), HttpError>;

    fn input_idle(&self) -> bool;

    fn output_idle(&self) -> bool;

    /// Returns true when the timeout was expected and has been dealt with.
    fn handle_timeout(&mut self, channel: &mut dyn StreamChannel<Self::Outgoing>) -> Result<bool, HttpError>;

    fn execute(
        &mut self,
        execution: Execution,
        channel: &mut dyn StreamChannel<Self::Outgoing>,
    ) -> Result<(), HttpError>;

    /// Returns true when the connection has to be shut down because the exchange was already on the wire.
    fn cancel(&mut self, id: ExchangeId, channel: &mut dyn StreamChannel<Self::Outgoing>) -> Result<bool, HttpError>;

    /// A head could not be parsed while nothing else was in flight.
    fn incoming_error(&mut self, cause: &HttpError, channel: &mut dyn StreamChannel<Self::Outgoing>);

    /// Fails and releases every exchange the policy still holds.
    fn fail_all(&mut self, cause: &HttpError);
}

pub struct Http1StreamDuplexer<S, P: StreamPolicy> {
    core: StreamCore<S, P::Outgoing>,
    policy: P,
    input: SessionInputBuffer,
    parser: MessageParser<P::Incoming>,
    incoming: Option<PayloadDecoder>,
    content: BytesMut,
    window: usize,
    commands: UnboundedReceiver<Command>,
}

impl<S: IoSession, P: StreamPolicy> Http1StreamDuplexer<S, P> {
    pub fn new(session: S, config: Http1Config, policy: P) -> Self {
        let (sender, commands) = CommandSender::channel();
        Self {
            input: SessionInputBuffer::from_config(&config),
            parser: MessageParser::from_config(&config),
            content: BytesMut::with_capacity(config.chunk_size_hint()),
            window: config.initial_window_size(),
            core: StreamCore::new(session, config, Arc::new(DefaultContentLengthStrategy), sender, P::SERVER),
            policy,
            incoming: None,
            commands,
        }
    }

    /// Replaces the framing rules used for both directions.
    #[must_use]
    pub fn with_content_length_strategy(mut self, strategy: Arc<dyn ContentLengthStrategy>) -> Self {
        self.core.strategy = strategy;
        self
    }

    /// A handle to queue commands from any thread.
    pub fn sender(&self) -> CommandSender {
        self.core.sender.clone()
    }

    pub fn session(&self) -> &S {
        &self.core.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.core.session
    }

    pub fn state(&self) -> ConnectionState {
        self.core.state
    }

    pub fn metrics(&self) -> &ConnectionMetrics {
        &self.core.metrics
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Activates the connection. `prefix` holds bytes already read from the channel.
    pub fn on_connect(&mut self, prefix: &[u8]) {
        self.core.advance(ConnectionState::Active);
        self.core.session.set_event(EventMask::READ);
        debug!(server = P::SERVER, "connection active");
        self.process_commands();
        if !prefix.is_empty() {
            self.input.put(prefix);
            self.on_input();
        }
    }

    pub fn on_input(&mut self) {
        if let Err(e) = self.input_event() {
            self.on_exception(e);
        }
    }

    pub fn on_output(&mut self) {
        if let Err(e) = self.output_event() {
            self.on_exception(e);
        }
    }

    pub fn on_timeout(&mut self) {
        match self.policy.handle_timeout(&mut self.core) {
            Ok(true) => {}
            Ok(false) if self.policy.input_idle() && self.policy.output_idle() => {
                debug!("idle connection timed out");
                self.core.request_shutdown(CloseMode::Graceful);
                self.on_output();
            }
            Ok(false) => {
                let timeout = self.core.session.socket_timeout().unwrap_or_default();
                self.on_exception(HttpError::Timeout(timeout));
            }
            Err(e) => self.on_exception(e),
        }
    }

    /// Fails every pending exchange with `cause` and closes the connection at once.
    pub fn on_exception(&mut self, cause: HttpError) {
        error!(cause = %cause, state = ?self.core.state, "connection failed");
        self.policy.fail_all(&cause);
        self.incoming = None;
        self.core.advance(ConnectionState::Shutdown);
        self.core.session.close(CloseMode::Immediate);
    }

    /// The channel is gone. Fails whatever is still pending, queued commands included.
    pub fn on_disconnect(&mut self) {
        self.core.advance(ConnectionState::Shutdown);
        let cause = HttpError::connection_closed("connection closed");
        self.policy.fail_all(&cause);
        self.commands.close();
        while let Some(Some(command)) = self.commands.next().now_or_never() {
            if let Command::Execute(execution) = command {
                execution.reject(&HttpError::not_executed("connection closed"));
            }
        }
        debug!(
            requests = self.core.metrics.request_count(),
            responses = self.core.metrics.response_count(),
            "connection disconnected"
        );
    }

    /// Runs every queued command.
    pub fn process_commands(&mut self) {
        while let Some(Some(command)) = self.commands.next().now_or_never() {
            self.handle_command(command);
        }
    }

    /// Waits for the next queued command.
    pub(crate) fn poll_command(&mut self, cx: &mut Context<'_>) -> Poll<Command> {
        match self.commands.poll_next_unpin(cx) {
            Poll::Ready(Some(command)) => Poll::Ready(command),
            Poll::Ready(None) | Poll::Pending => Poll::Pending,
        }
    }

    pub(crate) fn handle_command(&mut self, command: Command) {
        match command {
            Command::Execute(execution) => {
                if self.core.state >= ConnectionState::GracefulShutdown {
                    execution.reject(&HttpError::not_executed("connection is shutting down"));
                } else if let Err(e) = self.policy.execute(execution, &mut self.core) {
                    self.on_exception(e);
                }
            }
            Command::Cancel(id) => match self.policy.cancel(id, &mut self.core) {
                Ok(false) => {}
                Ok(true) => self.on_exception(HttpError::Cancelled),
                Err(e) => self.on_exception(e),
            },
            Command::RequestOutput => self.core.session.set_event(EventMask::WRITE),
            Command::UpdateCapacity { id, increment } => {
                if self.policy.incoming_id() != Some(id) {
                    return;
                }
                let suspended = self.window == 0;
                self.window = self.window.saturating_add(increment);
                if suspended && self.window > 0 && self.core.state < ConnectionState::Shutdown {
                    self.core.session.set_event(EventMask::READ);
                    self.on_input();
                }
            }
            Command::Shutdown(CloseMode::Graceful) => {
                self.core.request_shutdown(CloseMode::Graceful);
            }
            Command::Shutdown(CloseMode::Immediate) => {
                self.core.advance(ConnectionState::Shutdown);
                self.core.session.close(CloseMode::Immediate);
                self.policy.fail_all(&HttpError::connection_closed("connection shut down"));
            }
        }
    }

    fn input_event(&mut self) -> Result<(), HttpError> {
        if self.core.state >= ConnectionState::GracefulShutdown && self.incoming.is_none() && self.policy.input_idle() {
            self.core.session.clear_event(EventMask::READ);
            return Ok(());
        }

        let mut end_of_stream = false;
        if self.incoming.is_none() {
            end_of_stream = self.input.fill(&mut self.core.session, &mut self.core.metrics.inbound)?.is_end_of_stream();
        }

        loop {
            if self.incoming.is_none() {
                let idle = self.policy.input_idle() && self.policy.output_idle();
                let head = match self.parser.parse(&mut self.input, end_of_stream) {
                    Ok(Some(head)) => head,
                    Ok(None) => break,
                    Err(e) => {
                        if idle {
                            self.policy.incoming_error(&e, &mut self.core);
                            if let Err(flush) = self.core.flush() {
                                debug!(cause = %flush, "error response not flushed");
                            }
                        }
                        return Err(e);
                    }
                };
                if !self.dispatch_head(head)? {
                    break;
                }
            }

            let Some(decoder) = self.incoming.as_mut() else {
                if self.input.has_data() {
                    continue;
                }
                break;
            };

            let max = self.core.config.chunk_size_hint().min(self.window);
            let mut input = ContentInput::new(&mut self.core.session, &mut self.input, &mut self.core.metrics.inbound);
            let (n, truncated) = match decoder.read(&mut input, &mut self.content, max) {
                Ok(n) => (n, false),
                Err(e) if e.is_truncation() && self.core.config.tolerate_truncated_chunks() => {
                    warn!(cause = %e, "tolerating truncated chunk coded body");
                    (0, true)
                }
                Err(e) => return Err(e),
            };
            let completed = truncated || decoder.is_completed();
            end_of_stream |= decoder.is_end_of_stream();

            if n > 0 {
                let data = self.content.split();
                self.policy.consume_data(&data, &mut self.core)?;
                self.window = self.window.saturating_sub(n);
                if self.window == 0 && !completed {
                    if let Some(id) = self.policy.incoming_id() {
                        let capacity = self.core.capacity_channel(id);
                        self.policy.request_capacity(capacity);
                    }
                    self.core.session.clear_event(EventMask::READ);
                    break;
                }
            }

            if completed {
                let trailers = self.incoming.take().and_then(|mut decoder| decoder.take_trailers());
                self.message_end(trailers.as_ref())?;
                if self.core.state != ConnectionState::Active {
                    break;
                }
                continue;
            }

            if n == 0 {
                break;
            }
        }

        if end_of_stream && !self.input.has_data() && self.incoming.is_none() {
            if self.parser.is_idle() && self.policy.input_idle() && self.policy.output_idle() {
                debug!("peer closed idle connection");
                self.core.request_shutdown(CloseMode::Graceful);
                self.core.advance(ConnectionState::Shutdown);
            } else {
                return Err(HttpError::connection_closed("connection closed by peer"));
            }
        }
        Ok(())
    }

    /// Hands a parsed head to the policy. Returns false when input processing has to stop.
    fn dispatch_head(&mut self, head: P::Incoming) -> Result<bool, HttpError> {
        if P::SERVER {
            self.core.metrics.request_count += 1;
        } else {
            self.core.metrics.response_count += 1;
        }

        let framing = self.policy.incoming_framing(&head, self.core.strategy.as_ref())?;
        let entity = framing.map(|size| EntityDetails::from_message(&head, size));
        if let Some(size) = framing {
            let config = &self.core.config;
            self.incoming = Some(PayloadDecoder::for_payload(size, config.constraints(), *config.char_coding()));
            self.window = config.initial_window_size();
        }
        self.policy.consume_header(head, entity, &mut self.core)?;

        if self.incoming.is_none() {
            self.message_end(None)?;
            return Ok(self.core.state == ConnectionState::Active);
        }
        Ok(true)
    }

    fn message_end(&mut self, trailers: Option<&Headers>) -> Result<(), HttpError> {
        self.policy.data_end(trailers, &mut self.core)?;
        self.policy.input_end(&mut self.core)?;
        if self.core.state == ConnectionState::Active {
            self.core.session.set_event(EventMask::READ);
        }
        Ok(())
    }

    fn output_event(&mut self) -> Result<(), HttpError> {
        self.core.flush()?;

        if self.core.state < ConnectionState::Shutdown {
            if !self.core.output.has_data() && self.policy.is_output_ready() {
                self.policy.produce_output(&mut self.core)?;
            }
            if !self.core.output.has_data() && !self.policy.is_output_ready() {
                self.core.session.clear_event(EventMask::WRITE);
            }

            if self.core.is_output_end() {
                self.policy.output_end(&mut self.core)?;
                if self.core.state == ConnectionState::Active {
                    self.process_commands();
                } else if self.core.state == ConnectionState::GracefulShutdown
                    && self.incoming.is_none()
                    && self.policy.input_idle()
                    && self.policy.output_idle()
                {
                    self.core.advance(ConnectionState::Shutdown);
                }
            }
        }

        if self.core.state == ConnectionState::Shutdown && !self.core.output.has_data() && self.core.session.is_open() {
            self.core.session.close(CloseMode::Graceful);
            self.policy.fail_all(&HttpError::connection_closed("connection shut down"));
            debug!("connection closed");
        }
        Ok(())
    }
}

impl<S, P: StreamPolicy> std::fmt::Debug for Http1StreamDuplexer<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Http1StreamDuplexer")
            .field("server", &P::SERVER)
            .field("state", &self.core.state)
            .field("window", &self.window)
            .field("incoming", &self.incoming.is_some())
            .finish_non_exhaustive()
    }
}
