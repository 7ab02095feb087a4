use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderValue, StatusCode, header};
use tracing::{debug, warn};

use crate::codec::ContentLengthStrategy;
use crate::connection::server_stream::ServerStreamHandler;
use crate::connection::{
    CapacityChannel, ExchangeId, Execution, FlushMode, Http1StreamDuplexer, IoSession, StreamChannel, StreamPolicy,
};
use crate::config::Http1Config;
use crate::handler::{
    ConnectionReuseStrategy, DefaultConnectionReuseStrategy, HandlerFactory, HttpProcessor, ImmediateResponse,
};
use crate::protocol::{EntityDetails, Headers, HttpError, PayloadSize, ProtocolError, RequestHead, ResponseHead};

pub type ServerHttp1StreamDuplexer<S> = Http1StreamDuplexer<S, ServerPolicy>;

/// Server role: requests come in, responses go out in request order.
///
/// Every request gets its own [`ServerStreamHandler`](crate::handler::ServerExchangeHandler)
/// from the factory. Handlers of pipelined requests run as soon as their request
/// arrives, but their output is held back until every earlier response is complete.
pub struct ServerPolicy {
    factory: Arc<dyn HandlerFactory>,
    processor: Arc<HttpProcessor>,
    reuse: Arc<dyn ConnectionReuseStrategy>,
    handlers: VecDeque<ServerStreamHandler>,
    incoming: Option<ExchangeId>,
}

impl ServerPolicy {
    pub fn new(factory: Arc<dyn HandlerFactory>) -> Self {
        Self {
            factory,
            processor: Arc::new(HttpProcessor::server()),
            reuse: Arc::new(DefaultConnectionReuseStrategy),
            handlers: VecDeque::new(),
            incoming: None,
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

    /// Exchanges whose response has not been completely written yet.
    pub fn pending_exchanges(&self) -> usize {
        self.handlers.len()
    }

    fn incoming_mut(&mut self) -> Result<&mut ServerStreamHandler, HttpError> {
        let id = self.incoming.ok_or(ProtocolError::UnexpectedData)?;
        self.handlers.iter_mut().rev().find(|h| h.id() == id).ok_or_else(|| ProtocolError::UnexpectedData.into())
    }

    fn write_error_response(
        status: StatusCode,
        channel: &mut dyn StreamChannel<ResponseHead>,
    ) -> Result<(), HttpError> {
        let body = Bytes::from_static(status.canonical_reason().unwrap_or("").as_bytes());
        let head = ResponseHead::new(status)
            .with_header(header::CONTENT_LENGTH, HeaderValue::from(body.len()))
            .with_header(header::CONNECTION, HeaderValue::from_static("close"));
        channel.submit(&head, false, FlushMode::Buffer)?;
        channel.write(&body)?;
        channel.complete(None)
    }
}

impl<S: IoSession> Http1StreamDuplexer<S, ServerPolicy> {
    /// A server connection answering requests with handlers from `factory`.
    pub fn server(session: S, config: Http1Config, factory: Arc<dyn HandlerFactory>) -> Self {
        Self::new(session, config, ServerPolicy::new(factory))
    }
}

impl fmt::Debug for ServerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerPolicy")
            .field("pending", &self.handlers.len())
            .field("incoming", &self.incoming)
            .finish_non_exhaustive()
    }
}

impl StreamPolicy for ServerPolicy {
    type Incoming = RequestHead;
    type Outgoing = ResponseHead;

    const SERVER: bool = true;

    fn incoming_framing(
        &self,
        head: &RequestHead,
        strategy: &dyn ContentLengthStrategy,
    ) -> Result<Option<PayloadSize>, HttpError> {
        match strategy.determine_length(head)? {
            PayloadSize::Undefined => Ok(None),
            size => Ok(Some(size)),
        }
    }

    fn consume_header(
        &mut self,
        head: RequestHead,
        entity: Option<EntityDetails>,
        channel: &mut dyn StreamChannel<ResponseHead>,
    ) -> Result<(), HttpError> {
        let id = channel.next_exchange_id();
        let active = self.handlers.is_empty();
        debug!(exchange = %id, method = %head.method(), uri = %head.uri(), pipelined = !active, "request received");

        let exchange = self.factory.create(&head).unwrap_or_else(|| {
            debug!(exchange = %id, "no handler for request");
            Box::new(ImmediateResponse::status(StatusCode::NOT_FOUND))
        });
        let handler = ServerStreamHandler::new(
            id,
            exchange,
            head.clone(),
            Arc::clone(&self.processor),
            Arc::clone(&self.reuse),
            active,
        );
        self.handlers.push_back(handler);
        self.incoming = Some(id);
        self.incoming_mut()?.consume_header(head, entity, channel)
    }

    fn consume_data(&mut self, data: &[u8], channel: &mut dyn StreamChannel<ResponseHead>) -> Result<(), HttpError> {
        self.incoming_mut()?.consume_data(data, channel)
    }

    fn incoming_id(&self) -> Option<ExchangeId> {
        self.incoming
    }

    fn request_capacity(&mut self, capacity: CapacityChannel) {
        if let Ok(handler) = self.incoming_mut() {
            handler.update_capacity(capacity);
        }
    }

    fn data_end(&mut self, trailers: Option<&Headers>, channel: &mut dyn StreamChannel<ResponseHead>) -> Result<(), HttpError> {
        self.incoming_mut()?.data_end(trailers, channel)
    }

    fn input_end(&mut self, _channel: &mut dyn StreamChannel<ResponseHead>) -> Result<(), HttpError> {
        let Some(id) = self.incoming.take() else {
            return Ok(());
        };
        if let Some(back) = self.handlers.back_mut()
            && back.id() == id
            && back.is_completed()
        {
            back.release();
            self.handlers.pop_back();
        }
        Ok(())
    }

    fn is_output_ready(&self) -> bool {
        self.handlers.front().is_some_and(ServerStreamHandler::is_output_ready)
    }

    fn produce_output(&mut self, channel: &mut dyn StreamChannel<ResponseHead>) -> Result<(), HttpError> {
        match self.handlers.front_mut() {
            Some(handler) => handler.produce_output(channel),
            None => Ok(()),
        }
    }

    fn output_end(&mut self, channel: &mut dyn StreamChannel<ResponseHead>) -> Result<(), HttpError> {
        if let Some(front) = self.handlers.front_mut()
            && front.is_completed()
        {
            front.release();
            self.handlers.pop_front();
        }

        if channel.is_active() {
            if let Some(front) = self.handlers.front_mut()
                && !front.is_active()
            {
                debug!(exchange = %front.id(), "activating pipelined response");
                front.activate(channel)?;
            }
        } else {
            let cause = HttpError::connection_closed("connection is shutting down");
            while let Some(back) = self.handlers.back_mut()
                && !back.is_active()
            {
                debug!(exchange = %back.id(), "dropping pipelined request");
                back.failed(&cause);
                self.handlers.pop_back();
            }
        }
        Ok(())
    }

    fn input_idle(&self) -> bool {
        self.incoming.is_none()
    }

    fn output_idle(&self) -> bool {
        self.handlers.is_empty()
    }

    fn handle_timeout(&mut self, _channel: &mut dyn StreamChannel<ResponseHead>) -> Result<bool, HttpError> {
        Ok(false)
    }

    fn execute(&mut self, execution: Execution, _channel: &mut dyn StreamChannel<ResponseHead>) -> Result<(), HttpError> {
        execution.reject(&HttpError::not_executed("server connections do not send requests"));
        Ok(())
    }

    fn cancel(&mut self, id: ExchangeId, channel: &mut dyn StreamChannel<ResponseHead>) -> Result<bool, HttpError> {
        match self.handlers.iter_mut().find(|h| h.id() == id) {
            Some(handler) => {
                debug!(exchange = %id, "exchange cancelled");
                handler.cancel(channel)
            }
            None => Ok(false),
        }
    }

    fn incoming_error(&mut self, cause: &HttpError, channel: &mut dyn StreamChannel<ResponseHead>) {
        let status = if cause.is_unsupported_version() {
            StatusCode::HTTP_VERSION_NOT_SUPPORTED
        } else {
            StatusCode::BAD_REQUEST
        };
        if let Err(e) = Self::write_error_response(status, channel) {
            warn!(cause = %e, status = status.as_u16(), "could not send error response");
        }
    }

    fn fail_all(&mut self, cause: &HttpError) {
        for mut handler in self.handlers.drain(..) {
            handler.failed(cause);
        }
        self.incoming = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::connection::mock::MockSession;
    use crate::connection::{CapacityChannel, CloseMode, ConnectionState, EventMask};
    use crate::handler::{ResponseChannel, ServerExchangeHandler, make_handler};

    type TestServer = ServerHttp1StreamDuplexer<MockSession>;

    fn echo(request: &RequestHead, body: Bytes) -> Result<(ResponseHead, Bytes), HttpError> {
        let body = if body.is_empty() { Bytes::from(request.uri().path().to_owned()) } else { body };
        Ok((ResponseHead::new(StatusCode::OK), body))
    }

    fn server_with(config: Http1Config, factory: Arc<dyn HandlerFactory>) -> TestServer {
        let mut server = Http1StreamDuplexer::server(MockSession::default(), config, factory);
        server.on_connect(&[]);
        server
    }

    fn echo_server() -> TestServer {
        server_with(Http1Config::default(), Arc::new(make_handler(echo)))
    }

    fn drain(server: &mut TestServer) -> String {
        for _ in 0..8 {
            if !server.session().event_mask().contains(EventMask::WRITE) {
                break;
            }
            server.on_output();
        }
        server.session_mut().take_output()
    }

    fn exchange(server: &mut TestServer, input: &str) -> String {
        server.session_mut().feed(input);
        server.on_input();
        drain(server)
    }

    fn strip_date(output: &str) -> String {
        output.split_inclusive("\r\n").filter(|line| !line.starts_with("date: ")).collect()
    }

    /// Records what the connection reports to it and never responds.
    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
        capacity: Arc<Mutex<Option<CapacityChannel>>>,
    }

    impl Recorder {
        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn factory(&self) -> Arc<dyn HandlerFactory> {
            let recorder = self.clone();
            Arc::new(move |_: &RequestHead| -> Option<Box<dyn ServerExchangeHandler>> { Some(Box::new(recorder.clone())) })
        }
    }

    impl ServerExchangeHandler for Recorder {
        fn handle_request(
            &mut self,
            head: RequestHead,
            _entity: Option<&EntityDetails>,
            _channel: &mut dyn ResponseChannel,
        ) -> Result<(), HttpError> {
            self.push(format!("request {}", head.uri()));
            Ok(())
        }

        fn update_capacity(&mut self, capacity: CapacityChannel) {
            *self.capacity.lock().unwrap() = Some(capacity);
        }

        fn consume(&mut self, data: &[u8]) -> Result<(), HttpError> {
            self.push(format!("data {}", String::from_utf8_lossy(data)));
            Ok(())
        }

        fn stream_end(&mut self, _trailers: Option<&Headers>, _channel: &mut dyn ResponseChannel) -> Result<(), HttpError> {
            self.push("end".into());
            Ok(())
        }

        fn failed(&mut self, cause: &HttpError) {
            self.push(if cause.is_truncation() { "failed truncated".into() } else { "failed".into() });
        }

        fn release_resources(&mut self) {
            self.push("released".into());
        }
    }

    /// Answers with its own path once the request is in and the gate is open.
    struct Gated {
        body: Bytes,
        open: Arc<AtomicBool>,
        requested: bool,
        committed: bool,
        written: usize,
        done: bool,
    }

    impl Gated {
        fn respond(&mut self, channel: &mut dyn ResponseChannel) -> Result<(), HttpError> {
            if !self.requested || self.done || !self.open.load(Ordering::SeqCst) {
                return Ok(());
            }
            if !self.committed {
                self.committed = true;
                let entity = EntityDetails::with_length(self.body.len() as u64);
                channel.send_response(ResponseHead::new(StatusCode::OK), Some(entity))?;
            }
            self.written += channel.write(&self.body[self.written..])?;
            if self.written == self.body.len() {
                self.done = true;
                channel.end_stream(None)?;
            }
            Ok(())
        }
    }

    impl ServerExchangeHandler for Gated {
        fn handle_request(
            &mut self,
            _head: RequestHead,
            _entity: Option<&EntityDetails>,
            _channel: &mut dyn ResponseChannel,
        ) -> Result<(), HttpError> {
            Ok(())
        }

        fn stream_end(&mut self, _trailers: Option<&Headers>, channel: &mut dyn ResponseChannel) -> Result<(), HttpError> {
            self.requested = true;
            self.respond(channel)
        }

        fn available(&self) -> usize {
            usize::from(self.requested && !self.done && self.open.load(Ordering::SeqCst))
        }

        fn produce(&mut self, channel: &mut dyn ResponseChannel) -> Result<(), HttpError> {
            self.respond(channel)
        }
    }

    /// Promises a longer body than it writes.
    struct ShortBody;

    impl ServerExchangeHandler for ShortBody {
        fn handle_request(
            &mut self,
            _head: RequestHead,
            _entity: Option<&EntityDetails>,
            channel: &mut dyn ResponseChannel,
        ) -> Result<(), HttpError> {
            channel.send_response(ResponseHead::new(StatusCode::OK), Some(EntityDetails::with_length(10)))?;
            channel.write(b"abc")?;
            channel.end_stream(None)
        }
    }

    #[test]
    fn simple_get() {
        let mut server = echo_server();
        let out = exchange(&mut server, "GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n");

        assert_eq!(strip_date(&out), "HTTP/1.1 200 OK\r\ncontent-length: 6\r\n\r\n/hello");
        assert!(out.contains("\r\ndate: "));
        assert_eq!(server.state(), ConnectionState::Active);
        assert_eq!(server.metrics().request_count(), 1);
        assert_eq!(server.metrics().response_count(), 1);
        assert_eq!(server.policy().pending_exchanges(), 0);
    }

    #[test]
    fn head_response_has_no_body() {
        let mut server = echo_server();
        let out = exchange(&mut server, "HEAD /x HTTP/1.1\r\n\r\n");
        assert_eq!(strip_date(&out), "HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\n");
        assert_eq!(server.policy().pending_exchanges(), 0);
    }

    #[test]
    fn chunked_request_body() {
        let mut server = echo_server();
        let out = exchange(
            &mut server,
            "POST /echo HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\nX-Sum: 1\r\n\r\n",
        );
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.ends_with("content-length: 11\r\n\r\nhello world"));
    }

    #[test]
    fn pipelined_responses_keep_request_order() {
        let gate = Arc::new(AtomicBool::new(false));
        let slow_gate = Arc::clone(&gate);
        let factory = move |head: &RequestHead| -> Option<Box<dyn ServerExchangeHandler>> {
            let open = if head.uri().path() == "/slow" { Arc::clone(&slow_gate) } else { Arc::new(AtomicBool::new(true)) };
            Some(Box::new(Gated {
                body: Bytes::from(head.uri().path().to_owned()),
                open,
                requested: false,
                committed: false,
                written: 0,
                done: false,
            }))
        };
        let mut server = server_with(Http1Config::default(), Arc::new(factory));

        let out = exchange(&mut server, "GET /one HTTP/1.1\r\n\r\nGET /slow HTTP/1.1\r\n\r\nGET /three HTTP/1.1\r\n\r\n");
        assert!(out.ends_with("\r\n\r\n/one"));
        assert!(!out.contains("/three"));
        assert_eq!(server.metrics().request_count(), 3);
        assert_eq!(server.policy().pending_exchanges(), 2);

        gate.store(true, Ordering::SeqCst);
        server.sender().request_output();
        server.process_commands();
        let out = drain(&mut server);

        let slow = out.find("/slow").unwrap();
        let three = out.find("/three").unwrap();
        assert!(slow < three);
        assert!(out.ends_with("\r\n\r\n/three"));
        assert_eq!(server.policy().pending_exchanges(), 0);
        assert_eq!(server.metrics().response_count(), 3);
    }

    #[test]
    fn connection_close_stops_reading_pipelined_requests() {
        let mut server = echo_server();
        let out = exchange(&mut server, "GET /a HTTP/1.1\r\nConnection: close\r\n\r\nGET /b HTTP/1.1\r\n\r\n");

        assert!(out.contains("connection: close\r\n"));
        assert!(out.ends_with("\r\n\r\n/a"));
        assert!(!out.contains("/b"));
        assert_eq!(server.metrics().request_count(), 1);
        assert_eq!(server.state(), ConnectionState::Shutdown);
        assert_eq!(server.session().closed, Some(CloseMode::Graceful));
    }

    #[test]
    fn missing_handler_is_not_found() {
        let factory = |_: &RequestHead| -> Option<Box<dyn ServerExchangeHandler>> { None };
        let mut server = server_with(Http1Config::default(), Arc::new(factory));
        let out = exchange(&mut server, "GET /nowhere HTTP/1.1\r\n\r\n");

        assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(out.ends_with("\r\n\r\nNot Found"));
        assert_eq!(server.state(), ConnectionState::Active);
    }

    #[test]
    fn malformed_request_line_gets_bad_request() {
        let mut server = echo_server();
        let out = exchange(&mut server, "GET\r\n\r\n");

        assert_eq!(out, "HTTP/1.1 400 Bad Request\r\ncontent-length: 11\r\nconnection: close\r\n\r\nBad Request");
        assert_eq!(server.state(), ConnectionState::Shutdown);
        assert_eq!(server.session().closed, Some(CloseMode::Immediate));
    }

    #[test]
    fn http2_request_gets_version_not_supported() {
        let mut server = echo_server();
        let out = exchange(&mut server, "GET / HTTP/2.0\r\n\r\n");

        assert!(out.starts_with("HTTP/1.1 505 HTTP Version Not Supported\r\n"));
        assert_eq!(server.session().closed, Some(CloseMode::Immediate));
    }

    #[test]
    fn expect_continue_is_acknowledged() {
        let mut server = echo_server();
        let out = exchange(&mut server, "POST /upload HTTP/1.1\r\nContent-Length: 5\r\nExpect: 100-continue\r\n\r\n");
        assert_eq!(out, "HTTP/1.1 100 Continue\r\n\r\n");

        let out = exchange(&mut server, "hello");
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.ends_with("\r\n\r\nhello"));
        assert_eq!(server.metrics().response_count(), 2);
    }

    #[test]
    fn handler_error_becomes_internal_server_error() {
        let failing = |_: &RequestHead, _: Bytes| -> Result<(ResponseHead, Bytes), std::io::Error> {
            Err(std::io::Error::other("backend down"))
        };
        let mut server = server_with(Http1Config::default(), Arc::new(make_handler(failing)));
        let out = exchange(&mut server, "GET / HTTP/1.1\r\n\r\n");

        assert!(out.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(out.contains("connection: close\r\n"));
        assert_eq!(server.session().closed, Some(CloseMode::Graceful));
    }

    #[test]
    fn truncated_chunk_fails_the_exchange() {
        let recorder = Recorder::default();
        let mut server = server_with(Http1Config::default(), recorder.factory());
        server.session_mut().feed("POST /up HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nA\r\nhel");
        server.session_mut().eof = true;
        server.on_input();

        assert_eq!(recorder.events(), ["request /up", "data hel", "failed truncated", "released"]);
        assert_eq!(server.state(), ConnectionState::Shutdown);
        assert_eq!(server.session().closed, Some(CloseMode::Immediate));
    }

    #[test]
    fn truncated_chunk_can_be_tolerated() {
        let config = Http1Config::builder().tolerate_truncated_chunks(true).build();
        let mut server = server_with(config, Arc::new(make_handler(echo)));
        server.session_mut().feed("POST /up HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nA\r\nhel");
        server.session_mut().eof = true;
        server.on_input();
        let out = drain(&mut server);

        assert!(out.ends_with("content-length: 3\r\n\r\nhel"));
        assert_eq!(server.session().closed, Some(CloseMode::Graceful));
    }

    #[test]
    fn input_window_suspends_reading() {
        let recorder = Recorder::default();
        let config = Http1Config::builder().initial_window_size(4).build();
        let mut server = server_with(config, recorder.factory());
        server.session_mut().feed("POST /up HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123456789");
        server.on_input();

        assert_eq!(recorder.events(), ["request /up", "data 0123"]);
        assert!(!server.session().event_mask().contains(EventMask::READ));

        let capacity = recorder.capacity.lock().unwrap().take().unwrap();
        capacity.update(100);
        server.process_commands();
        assert_eq!(recorder.events(), ["request /up", "data 0123", "data 456789", "end"]);
    }

    #[test]
    fn window_equal_to_content_length_ends_the_body() {
        let recorder = Recorder::default();
        let config = Http1Config::builder().initial_window_size(10).build();
        let mut server = server_with(config, recorder.factory());
        server.session_mut().feed("POST /up HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123456789");
        server.on_input();

        assert_eq!(recorder.events(), ["request /up", "data 0123456789", "end"]);
        assert!(recorder.capacity.lock().unwrap().is_none());
        assert!(server.session().event_mask().contains(EventMask::READ));
    }

    #[test]
    fn unfinished_response_on_closing_connection_shuts_down_immediately() {
        let factory = |_: &RequestHead| -> Option<Box<dyn ServerExchangeHandler>> { Some(Box::new(ShortBody)) };
        let mut server = server_with(Http1Config::default(), Arc::new(factory));
        exchange(&mut server, "GET /short HTTP/1.1\r\nConnection: close\r\n\r\n");

        assert_eq!(server.state(), ConnectionState::Shutdown);
        assert_eq!(server.session().closed, Some(CloseMode::Immediate));
    }

    #[test]
    fn peer_close_on_idle_connection_is_graceful() {
        let mut server = echo_server();
        server.session_mut().eof = true;
        server.on_input();
        drain(&mut server);

        assert_eq!(server.state(), ConnectionState::Shutdown);
        assert_eq!(server.session().closed, Some(CloseMode::Graceful));
    }

    #[test]
    fn peer_close_mid_request_fails_exchange() {
        let recorder = Recorder::default();
        let mut server = server_with(Http1Config::default(), recorder.factory());
        server.session_mut().feed("POST /up HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123");
        server.session_mut().eof = true;
        server.on_input();

        assert_eq!(recorder.events(), ["request /up", "data 0123", "failed", "released"]);
        assert_eq!(server.session().closed, Some(CloseMode::Immediate));
    }
}
