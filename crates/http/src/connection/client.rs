use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use tracing::debug;

use crate::codec::ContentLengthStrategy;
use crate::connection::client_stream::ClientStreamHandler;
use crate::connection::{CapacityChannel, ExchangeId, Execution, Http1StreamDuplexer, IoSession, StreamChannel, StreamPolicy};
use crate::config::Http1Config;
use crate::handler::{ConnectionReuseStrategy, DefaultConnectionReuseStrategy, HttpProcessor};
use crate::protocol::{EntityDetails, Headers, HttpError, PayloadSize, ProtocolError, RequestHead, ResponseHead};

pub type ClientHttp1StreamDuplexer<S> = Http1StreamDuplexer<S, ClientPolicy>;

/// Client role: requests go out in submission order, responses are matched to them FIFO.
///
/// Exchanges submitted through [`CommandSender::execute`](crate::connection::CommandSender::execute)
/// wait in a backlog. The next one starts once the previous request is fully written
/// and, unless it was submitted as pipelined, once every earlier response has arrived.
pub struct ClientPolicy {
    processor: Arc<HttpProcessor>,
    reuse: Arc<dyn ConnectionReuseStrategy>,
    backlog: VecDeque<Execution>,
    handlers: VecDeque<ClientStreamHandler>,
}

impl ClientPolicy {
    pub fn new() -> Self {
        Self {
            processor: Arc::new(HttpProcessor::client()),
            reuse: Arc::new(DefaultConnectionReuseStrategy),
            backlog: VecDeque::new(),
            handlers: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn with_processor(mut self, processor: Arc<HttpProcessor>) -> Self {
        self.processor = processor;
        self
    }

    #[must_use]
    pub fn with_reuse_strategy(mut self, reuse: Arc<dyn ConnectionReuseStrategy>) -> Self {
        self.reuse = reuse;
        self
    }

    /// Exchanges started but not completed.
    pub fn in_flight(&self) -> usize {
        self.handlers.len()
    }

    /// Exchanges waiting to be started.
    pub fn queued(&self) -> usize {
        self.backlog.len()
    }

    fn front_mut(&mut self) -> Result<&mut ClientStreamHandler, HttpError> {
        self.handlers.front_mut().ok_or_else(|| ProtocolError::UnexpectedData.into())
    }

    fn outgoing(&self) -> Option<&ClientStreamHandler> {
        self.handlers.back().filter(|h| !h.is_request_final())
    }

    fn outgoing_mut(&mut self) -> Option<&mut ClientStreamHandler> {
        self.handlers.back_mut().filter(|h| !h.is_request_final())
    }

    /// Drops the front exchange once both its request and its response are done. The
    /// response can finish first while the request body is still going out.
    fn retire_completed(&mut self) {
        if let Some(front) = self.handlers.front_mut()
            && front.is_completed()
        {
            debug!(exchange = %front.id(), "exchange completed");
            front.release();
            self.handlers.pop_front();
        }
    }

    fn start_next(&mut self, channel: &mut dyn StreamChannel<RequestHead>) {
        if !channel.is_active() {
            let cause = HttpError::not_executed("connection is shutting down");
            for execution in self.backlog.drain(..) {
                execution.reject(&cause);
            }
            return;
        }
        if self.outgoing().is_some() {
            return;
        }
        let Some(next) = self.backlog.front() else {
            return;
        };
        if !self.handlers.is_empty() && !next.is_pipelined() {
            return;
        }
        if let Some(execution) = self.backlog.pop_front() {
            debug!(exchange = %execution.id(), pipelined = execution.is_pipelined(), "starting exchange");
            let handler = ClientStreamHandler::new(execution, Arc::clone(&self.processor), Arc::clone(&self.reuse));
            self.handlers.push_back(handler);
            channel.request_output();
        }
    }
}

impl Default for ClientPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: IoSession> Http1StreamDuplexer<S, ClientPolicy> {
    /// A client connection with the default request interceptors.
    pub fn client(session: S, config: Http1Config) -> Self {
        Self::new(session, config, ClientPolicy::new())
    }
}

impl fmt::Debug for ClientPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientPolicy")
            .field("in_flight", &self.handlers.len())
            .field("queued", &self.backlog.len())
            .finish_non_exhaustive()
    }
}

impl StreamPolicy for ClientPolicy {
    type Incoming = ResponseHead;
    type Outgoing = RequestHead;

    const SERVER: bool = false;

    fn incoming_framing(
        &self,
        head: &ResponseHead,
        strategy: &dyn ContentLengthStrategy,
    ) -> Result<Option<PayloadSize>, HttpError> {
        let status = head.status();
        let Some(front) = self.handlers.front() else {
            return Err(ProtocolError::UnexpectedResponse { status: status.as_u16() }.into());
        };
        if head.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
            || front.is_head_request()
        {
            return Ok(None);
        }
        // a response without framing runs until the connection closes
        Ok(Some(strategy.determine_length(head)?))
    }

    fn consume_header(
        &mut self,
        head: ResponseHead,
        entity: Option<EntityDetails>,
        channel: &mut dyn StreamChannel<RequestHead>,
    ) -> Result<(), HttpError> {
        let handler = self.front_mut()?;
        debug!(exchange = %handler.id(), status = head.status().as_u16(), "response received");
        handler.consume_header(head, entity, channel)
    }

    fn consume_data(&mut self, data: &[u8], _channel: &mut dyn StreamChannel<RequestHead>) -> Result<(), HttpError> {
        self.front_mut()?.consume_data(data)
    }

    fn incoming_id(&self) -> Option<ExchangeId> {
        self.handlers.front().map(ClientStreamHandler::id)
    }

    fn request_capacity(&mut self, capacity: CapacityChannel) {
        if let Some(handler) = self.handlers.front_mut() {
            handler.update_capacity(capacity);
        }
    }

    fn data_end(&mut self, trailers: Option<&Headers>, channel: &mut dyn StreamChannel<RequestHead>) -> Result<(), HttpError> {
        self.front_mut()?.data_end(trailers, channel)
    }

    fn input_end(&mut self, channel: &mut dyn StreamChannel<RequestHead>) -> Result<(), HttpError> {
        self.retire_completed();
        self.start_next(channel);
        Ok(())
    }

    fn is_output_ready(&self) -> bool {
        self.outgoing().is_some_and(ClientStreamHandler::is_output_ready)
    }

    fn produce_output(&mut self, channel: &mut dyn StreamChannel<RequestHead>) -> Result<(), HttpError> {
        match self.outgoing_mut() {
            Some(handler) => handler.produce_output(channel),
            None => Ok(()),
        }
    }

    fn output_end(&mut self, channel: &mut dyn StreamChannel<RequestHead>) -> Result<(), HttpError> {
        self.retire_completed();
        self.start_next(channel);
        Ok(())
    }

    fn input_idle(&self) -> bool {
        self.handlers.front().is_none_or(|h| !h.is_request_committed() || h.is_response_complete())
    }

    fn output_idle(&self) -> bool {
        self.backlog.is_empty() && self.outgoing().is_none()
    }

    fn handle_timeout(&mut self, channel: &mut dyn StreamChannel<RequestHead>) -> Result<bool, HttpError> {
        Ok(self.outgoing_mut().is_some_and(|handler| handler.handle_timeout(channel)))
    }

    fn execute(&mut self, execution: Execution, channel: &mut dyn StreamChannel<RequestHead>) -> Result<(), HttpError> {
        debug!(exchange = %execution.id(), "exchange queued");
        self.backlog.push_back(execution);
        self.start_next(channel);
        Ok(())
    }

    fn cancel(&mut self, id: ExchangeId, _channel: &mut dyn StreamChannel<RequestHead>) -> Result<bool, HttpError> {
        if let Some(pos) = self.backlog.iter().position(|e| e.id() == id) {
            if let Some(execution) = self.backlog.remove(pos) {
                debug!(exchange = %id, "queued exchange cancelled");
                execution.cancel();
            }
            return Ok(false);
        }
        let Some(pos) = self.handlers.iter().position(|h| h.id() == id) else {
            return Ok(false);
        };
        let Some(mut handler) = self.handlers.remove(pos) else {
            return Ok(false);
        };
        debug!(exchange = %id, committed = handler.is_request_committed(), "exchange cancelled");
        let on_wire = handler.is_request_committed();
        handler.cancel();
        Ok(on_wire)
    }

    fn incoming_error(&mut self, cause: &HttpError, _channel: &mut dyn StreamChannel<RequestHead>) {
        debug!(cause = %cause, "malformed response");
    }

    fn fail_all(&mut self, cause: &HttpError) {
        for mut handler in self.handlers.drain(..) {
            handler.failed(cause);
        }
        let cause = HttpError::not_executed(format!("connection failed: {cause}"));
        for execution in self.backlog.drain(..) {
            execution.reject(&cause);
        }
    }
}
