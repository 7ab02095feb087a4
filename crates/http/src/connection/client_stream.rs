use std::sync::Arc;
use std::time::Duration;

use http::{Method, StatusCode};
use tracing::debug;

use crate::connection::{CapacityChannel, ExchangeId, Execution, FlushMode, MessageState, StreamChannel};
use crate::ensure;
use crate::handler::{ClientExchangeHandler, ConnectionReuseStrategy, DataStreamChannel, HttpProcessor, RequestChannel};
use crate::protocol::{EntityDetails, Headers, HttpError, ProtocolError, RequestHead, ResponseHead};

struct RequestSide {
    processor: Arc<HttpProcessor>,
    head: Option<RequestHead>,
    state: MessageState,
    /// Socket timeout to restore once the `100 Continue` wait is over.
    saved_timeout: Option<Option<Duration>>,
}

impl RequestSide {
    fn channel<'a>(&'a mut self, stream: &'a mut dyn StreamChannel<RequestHead>) -> ClientRequestChannel<'a> {
        ClientRequestChannel { side: self, stream }
    }

    fn resume(&mut self, stream: &mut dyn StreamChannel<RequestHead>) {
        if let Some(timeout) = self.saved_timeout.take() {
            stream.set_socket_timeout(timeout);
        }
        self.state = MessageState::Body;
        stream.request_output();
    }
}

struct ClientRequestChannel<'a> {
    side: &'a mut RequestSide,
    stream: &'a mut dyn StreamChannel<RequestHead>,
}

impl RequestChannel for ClientRequestChannel<'_> {
    fn send_request(&mut self, mut head: RequestHead, entity: Option<EntityDetails>) -> Result<(), HttpError> {
        ensure!(self.side.state == MessageState::Idle, ProtocolError::AlreadyCommitted.into());
        self.side.processor.process_request(&mut head, entity.as_ref())?;

        if entity.is_none() {
            self.stream.submit(&head, true, FlushMode::Buffer)?;
            self.side.state = MessageState::Complete;
        } else if head.expects_continue() {
            self.side.saved_timeout = Some(self.stream.socket_timeout());
            let wait = self.stream.config().wait_for_continue_timeout();
            self.stream.set_socket_timeout(Some(wait));
            self.stream.submit(&head, false, FlushMode::Immediate)?;
            self.side.state = MessageState::Ack;
        } else {
            self.stream.submit(&head, false, FlushMode::Buffer)?;
            self.side.state = MessageState::Body;
        }
        debug!(method = %head.method(), uri = %head.uri(), state = ?self.side.state, "request committed");
        self.side.head = Some(head);
        Ok(())
    }
}

impl DataStreamChannel for ClientRequestChannel<'_> {
    fn write(&mut self, src: &[u8]) -> Result<usize, HttpError> {
        match self.side.state {
            MessageState::Body => self.stream.write(src),
            MessageState::Ack => Ok(0),
            MessageState::Complete => Err(ProtocolError::StreamCompleted.into()),
            _ => Err(ProtocolError::UnexpectedData.into()),
        }
    }

    fn end_stream(&mut self, trailers: Option<Headers>) -> Result<(), HttpError> {
        ensure!(self.side.state == MessageState::Body, ProtocolError::StreamCompleted.into());
        self.side.state = MessageState::Complete;
        self.stream.complete(trailers.as_ref())
    }

    fn request_output(&mut self) {
        self.stream.request_output();
    }
}

/// One request/response exchange on the client side.
pub(crate) struct ClientStreamHandler {
    id: ExchangeId,
    exchange: Box<dyn ClientExchangeHandler>,
    request: RequestSide,
    reuse: Arc<dyn ConnectionReuseStrategy>,
    response_state: MessageState,
    keep_alive: bool,
    released: bool,
}

impl ClientStreamHandler {
    pub(crate) fn new(
        execution: Execution,
        processor: Arc<HttpProcessor>,
        reuse: Arc<dyn ConnectionReuseStrategy>,
    ) -> Self {
        Self {
            id: execution.id,
            exchange: execution.handler,
            request: RequestSide { processor, head: None, state: MessageState::Idle, saved_timeout: None },
            reuse,
            response_state: MessageState::Idle,
            keep_alive: true,
            released: false,
        }
    }

    pub(crate) fn id(&self) -> ExchangeId {
        self.id
    }

    pub(crate) fn is_head_request(&self) -> bool {
        self.request.head.as_ref().is_some_and(|head| head.method() == Method::HEAD)
    }

    /// The request head went out, so a response is owed.
    pub(crate) fn is_request_committed(&self) -> bool {
        self.request.state != MessageState::Idle
    }

    pub(crate) fn is_request_final(&self) -> bool {
        self.request.state == MessageState::Complete
    }

    pub(crate) fn is_response_complete(&self) -> bool {
        self.response_state == MessageState::Complete
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.is_request_final() && self.is_response_complete()
    }

    pub(crate) fn is_output_ready(&self) -> bool {
        match self.request.state {
            MessageState::Idle => true,
            MessageState::Body => self.exchange.available() > 0,
            _ => false,
        }
    }

    pub(crate) fn produce_output(&mut self, stream: &mut dyn StreamChannel<RequestHead>) -> Result<(), HttpError> {
        match self.request.state {
            MessageState::Idle => self.exchange.produce_request(&mut self.request.channel(stream)),
            MessageState::Body => self.exchange.produce(&mut self.request.channel(stream)),
            _ => Ok(()),
        }
    }

    pub(crate) fn consume_header(
        &mut self,
        head: ResponseHead,
        entity: Option<EntityDetails>,
        stream: &mut dyn StreamChannel<RequestHead>,
    ) -> Result<(), HttpError> {
        let status = head.status();
        ensure!(
            self.is_request_committed()
                && self.response_state == MessageState::Idle
                && status != StatusCode::SWITCHING_PROTOCOLS,
            ProtocolError::UnexpectedResponse { status: status.as_u16() }.into()
        );

        if head.is_informational() {
            if status == StatusCode::CONTINUE && self.request.state == MessageState::Ack {
                debug!(exchange = %self.id, "100 Continue received");
                self.request.resume(stream);
            }
            return self.exchange.consume_information(head);
        }

        if let Some(request) = &self.request.head {
            self.keep_alive = self.reuse.keep_alive(request, &head);
        }
        if self.request.state == MessageState::Ack {
            self.request.resume(stream);
        }
        if self.request.state == MessageState::Body {
            if status.as_u16() >= 400 {
                debug!(exchange = %self.id, status = status.as_u16(), "error response, abandoning request body");
                self.request.state = MessageState::Complete;
                if !stream.abort_gracefully()? {
                    self.keep_alive = false;
                }
            } else {
                debug!(exchange = %self.id, status = status.as_u16(), "response arrived while request body is still being sent");
            }
        }

        self.response_state = if entity.is_some() { MessageState::Body } else { MessageState::Headers };
        self.exchange.consume_response(head, entity.as_ref())
    }

    pub(crate) fn consume_data(&mut self, data: &[u8]) -> Result<(), HttpError> {
        self.exchange.consume(data)
    }

    pub(crate) fn update_capacity(&mut self, capacity: CapacityChannel) {
        self.exchange.update_capacity(capacity);
    }

    pub(crate) fn data_end(
        &mut self,
        trailers: Option<&Headers>,
        stream: &mut dyn StreamChannel<RequestHead>,
    ) -> Result<(), HttpError> {
        // after a 1xx the final response is still to come
        if self.response_state == MessageState::Idle {
            return Ok(());
        }
        self.response_state = MessageState::Complete;
        if !self.keep_alive {
            stream.close();
        }
        self.exchange.stream_end(trailers)
    }

    /// Treats an expired `100 Continue` wait as permission to send the body.
    pub(crate) fn handle_timeout(&mut self, stream: &mut dyn StreamChannel<RequestHead>) -> bool {
        if self.request.state != MessageState::Ack {
            return false;
        }
        debug!(exchange = %self.id, "no 100 Continue in time, sending body");
        self.request.resume(stream);
        true
    }

    /// The exchange learns about a failure unless its response was already delivered.
    pub(crate) fn failed(&mut self, cause: &HttpError) {
        if !self.released {
            if self.response_state != MessageState::Complete {
                self.exchange.failed(cause);
            }
            self.release();
        }
    }

    pub(crate) fn cancel(&mut self) {
        if !self.released {
            self.exchange.cancel();
            self.release();
        }
    }

    pub(crate) fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.exchange.release_resources();
        }
    }
}
