use std::collections::VecDeque;
use std::sync::Arc;

use http::{Method, StatusCode};
use tracing::{debug, warn};

use crate::connection::{CapacityChannel, ExchangeId, FlushMode, MessageState, StreamChannel};
use crate::ensure;
use crate::handler::{
    ConnectionReuseStrategy, DataStreamChannel, HttpProcessor, ImmediateResponse, ResponseChannel, ServerExchangeHandler,
};
use crate::protocol::{EntityDetails, Headers, HttpError, ProtocolError, RequestHead, ResponseHead};

/// Output held back while an earlier response still owns the connection.
#[derive(Debug)]
enum Deferred {
    Submit(ResponseHead, bool),
    Complete(Option<Headers>),
    Close,
}

struct ResponseSide {
    request: RequestHead,
    processor: Arc<HttpProcessor>,
    reuse: Arc<dyn ConnectionReuseStrategy>,
    state: MessageState,
    committed: bool,
    keep_alive: bool,
    discard_body: bool,
    active: bool,
    deferred: VecDeque<Deferred>,
}

impl ResponseSide {
    fn submit(
        &mut self,
        stream: &mut dyn StreamChannel<ResponseHead>,
        head: ResponseHead,
        end_stream: bool,
    ) -> Result<(), HttpError> {
        if self.active {
            stream.submit(&head, end_stream, FlushMode::Buffer)
        } else {
            self.deferred.push_back(Deferred::Submit(head, end_stream));
            Ok(())
        }
    }

    fn complete(&mut self, stream: &mut dyn StreamChannel<ResponseHead>, trailers: Option<Headers>) -> Result<(), HttpError> {
        if self.active {
            stream.complete(trailers.as_ref())
        } else {
            self.deferred.push_back(Deferred::Complete(trailers));
            Ok(())
        }
    }

    fn close(&mut self, stream: &mut dyn StreamChannel<ResponseHead>) {
        if self.active {
            stream.close();
        } else {
            self.deferred.push_back(Deferred::Close);
        }
    }

    fn activate(&mut self, stream: &mut dyn StreamChannel<ResponseHead>) -> Result<(), HttpError> {
        self.active = true;
        while let Some(deferred) = self.deferred.pop_front() {
            match deferred {
                Deferred::Submit(head, end_stream) => stream.submit(&head, end_stream, FlushMode::Buffer)?,
                Deferred::Complete(trailers) => stream.complete(trailers.as_ref())?,
                Deferred::Close => stream.close(),
            }
        }
        Ok(())
    }

    fn channel<'a>(&'a mut self, stream: &'a mut dyn StreamChannel<ResponseHead>) -> ServerResponseChannel<'a> {
        ServerResponseChannel { side: self, stream }
    }
}

struct ServerResponseChannel<'a> {
    side: &'a mut ResponseSide,
    stream: &'a mut dyn StreamChannel<ResponseHead>,
}

impl ServerResponseChannel<'_> {
    fn ensure_body(&self) -> Result<(), HttpError> {
        match self.side.state {
            MessageState::Body => Ok(()),
            MessageState::Complete => Err(ProtocolError::StreamCompleted.into()),
            _ => Err(ProtocolError::UnexpectedData.into()),
        }
    }
}

impl DataStreamChannel for ServerResponseChannel<'_> {
    fn write(&mut self, src: &[u8]) -> Result<usize, HttpError> {
        self.ensure_body()?;
        if self.side.discard_body {
            return Ok(src.len());
        }
        if !self.side.active {
            return Ok(0);
        }
        self.stream.write(src)
    }

    fn end_stream(&mut self, trailers: Option<Headers>) -> Result<(), HttpError> {
        self.ensure_body()?;
        self.side.state = MessageState::Complete;
        if !self.side.discard_body {
            self.side.complete(&mut *self.stream, trailers)?;
        }
        if !self.side.keep_alive {
            self.side.close(&mut *self.stream);
        }
        Ok(())
    }

    fn request_output(&mut self) {
        self.stream.request_output();
    }
}

impl ResponseChannel for ServerResponseChannel<'_> {
    fn send_information(&mut self, head: ResponseHead) -> Result<(), HttpError> {
        ensure!(!self.side.committed, ProtocolError::AlreadyCommitted.into());
        ensure!(
            head.is_informational(),
            ProtocolError::invalid_response(format!("{} is not an informational status", head.status())).into()
        );
        self.side.submit(&mut *self.stream, head, true)
    }

    fn send_response(&mut self, mut head: ResponseHead, entity: Option<EntityDetails>) -> Result<(), HttpError> {
        ensure!(!self.side.committed, ProtocolError::AlreadyCommitted.into());
        ensure!(
            !head.is_informational(),
            ProtocolError::invalid_response(format!("{} is not a final status", head.status())).into()
        );

        let side = &mut *self.side;
        side.processor.process_response(&mut head, entity.as_ref(), &side.request)?;
        side.keep_alive = side.reuse.keep_alive(&side.request, &head);
        side.discard_body = side.request.method() == Method::HEAD;
        side.committed = true;
        side.state = if entity.is_some() { MessageState::Body } else { MessageState::Complete };

        let end_stream = entity.is_none() || side.discard_body;
        debug!(status = head.status().as_u16(), keep_alive = side.keep_alive, end_stream, "response committed");
        side.submit(&mut *self.stream, head, end_stream)?;

        if side.state == MessageState::Complete && !side.keep_alive {
            side.close(&mut *self.stream);
        }
        Ok(())
    }

    fn is_committed(&self) -> bool {
        self.side.committed
    }
}

/// One request/response exchange on the server side.
pub(crate) struct ServerStreamHandler {
    id: ExchangeId,
    exchange: Box<dyn ServerExchangeHandler>,
    response: ResponseSide,
    request_state: MessageState,
    released: bool,
}

impl ServerStreamHandler {
    pub(crate) fn new(
        id: ExchangeId,
        exchange: Box<dyn ServerExchangeHandler>,
        request: RequestHead,
        processor: Arc<HttpProcessor>,
        reuse: Arc<dyn ConnectionReuseStrategy>,
        active: bool,
    ) -> Self {
        Self {
            id,
            exchange,
            response: ResponseSide {
                request,
                processor,
                reuse,
                state: MessageState::Idle,
                committed: false,
                keep_alive: true,
                discard_body: false,
                active,
                deferred: VecDeque::new(),
            },
            request_state: MessageState::Headers,
            released: false,
        }
    }

    pub(crate) fn id(&self) -> ExchangeId {
        self.id
    }

    pub(crate) fn is_active(&self) -> bool {
        self.response.active
    }

    pub(crate) fn consume_header(
        &mut self,
        head: RequestHead,
        entity: Option<EntityDetails>,
        stream: &mut dyn StreamChannel<ResponseHead>,
    ) -> Result<(), HttpError> {
        self.request_state = if entity.is_some() { MessageState::Body } else { MessageState::Complete };
        let expect_continue = entity.is_some() && head.expects_continue();

        let result = self.exchange.handle_request(head, entity.as_ref(), &mut self.response.channel(stream));
        self.recover(result, stream)?;

        if expect_continue && !self.response.committed {
            debug!(exchange = %self.id, "sending 100 Continue");
            self.response.channel(stream).send_information(ResponseHead::new(StatusCode::CONTINUE))?;
        }
        Ok(())
    }

    pub(crate) fn consume_data(&mut self, data: &[u8], stream: &mut dyn StreamChannel<ResponseHead>) -> Result<(), HttpError> {
        let result = self.exchange.consume(data);
        self.recover(result, stream)
    }

    pub(crate) fn update_capacity(&mut self, capacity: CapacityChannel) {
        self.exchange.update_capacity(capacity);
    }

    pub(crate) fn data_end(
        &mut self,
        trailers: Option<&Headers>,
        stream: &mut dyn StreamChannel<ResponseHead>,
    ) -> Result<(), HttpError> {
        self.request_state = MessageState::Complete;
        let result = self.exchange.stream_end(trailers, &mut self.response.channel(stream));
        self.recover(result, stream)
    }

    pub(crate) fn is_output_ready(&self) -> bool {
        self.response.active
            && matches!(self.response.state, MessageState::Idle | MessageState::Body)
            && self.exchange.available() > 0
    }

    pub(crate) fn produce_output(&mut self, stream: &mut dyn StreamChannel<ResponseHead>) -> Result<(), HttpError> {
        if !matches!(self.response.state, MessageState::Idle | MessageState::Body) {
            return Ok(());
        }
        let result = self.exchange.produce(&mut self.response.channel(stream));
        self.recover(result, stream)
    }

    /// Moves this exchange to the front of the connection, replaying output held back so far.
    pub(crate) fn activate(&mut self, stream: &mut dyn StreamChannel<ResponseHead>) -> Result<(), HttpError> {
        self.response.activate(stream)?;
        if self.is_output_ready() {
            self.produce_output(stream)?;
        }
        Ok(())
    }

    pub(crate) fn is_response_final(&self) -> bool {
        self.response.active && self.response.state == MessageState::Complete && self.response.deferred.is_empty()
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.request_state == MessageState::Complete && self.is_response_final()
    }

    /// Cancels the exchange. Returns true when a partially written response leaves
    /// the connection unusable.
    pub(crate) fn cancel(&mut self, stream: &mut dyn StreamChannel<ResponseHead>) -> Result<bool, HttpError> {
        self.failed(&HttpError::Cancelled);
        if !self.response.committed {
            self.replace(ImmediateResponse::closing(StatusCode::SERVICE_UNAVAILABLE), stream)?;
            return Ok(false);
        }
        Ok(self.response.state != MessageState::Complete)
    }

    pub(crate) fn failed(&mut self, cause: &HttpError) {
        if !self.released {
            self.exchange.failed(cause);
            self.release();
        }
    }

    pub(crate) fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.exchange.release_resources();
        }
    }

    /// Turns an application error raised before the response was committed into a `500`.
    fn recover(&mut self, result: Result<(), HttpError>, stream: &mut dyn StreamChannel<ResponseHead>) -> Result<(), HttpError> {
        let Err(cause) = result else {
            return Ok(());
        };
        if self.response.committed {
            return Err(cause);
        }
        warn!(exchange = %self.id, cause = %cause, "exchange failed before responding");
        self.failed(&cause);
        self.replace(ImmediateResponse::closing(StatusCode::INTERNAL_SERVER_ERROR), stream)
    }

    fn replace(&mut self, mut response: ImmediateResponse, stream: &mut dyn StreamChannel<ResponseHead>) -> Result<(), HttpError> {
        response.commit(&mut self.response.channel(stream))?;
        self.exchange = Box::new(response);
        self.released = false;
        Ok(())
    }
}
