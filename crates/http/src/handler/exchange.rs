//! Per exchange callbacks invoked by the stream handlers.
//!
//! Every callback runs on the thread that drives the connection and must not block.
//! Work handed to other threads reports back through the [`CapacityChannel`] handed
//! to each exchange, which can grant input capacity or ask for output.
//!
//! Each exchange gets exactly one terminal notification, either `stream_end` of the
//! message it receives or `failed` (client exchanges may also be cancelled), followed
//! by exactly one `release_resources`.

use std::error::Error;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::connection::CapacityChannel;
use crate::protocol::{EntityDetails, Headers, HttpError, RequestHead, ResponseHead};

/// Outgoing body of the message currently being produced.
pub trait DataStreamChannel {
    /// Writes body bytes, returning how many were accepted. Zero means the connection is
    /// congested; `produce` is called again once it can take more.
    fn write(&mut self, src: &[u8]) -> Result<usize, HttpError>;

    /// Ends the body, sending `trailers` when the body is chunk coded.
    fn end_stream(&mut self, trailers: Option<Headers>) -> Result<(), HttpError>;

    /// Asks for another `produce` call once the connection is writable.
    fn request_output(&mut self);
}

pub trait ResponseChannel: DataStreamChannel {
    /// Sends a `1xx` response. May be called any number of times before the final response.
    fn send_information(&mut self, head: ResponseHead) -> Result<(), HttpError>;

    /// Commits the final response. `entity` describes the body to follow, `None` means no body.
    fn send_response(&mut self, head: ResponseHead, entity: Option<EntityDetails>) -> Result<(), HttpError>;

    fn is_committed(&self) -> bool;
}

pub trait RequestChannel {
    /// Commits the request. `entity` describes the body to follow, `None` means no body.
    fn send_request(&mut self, head: RequestHead, entity: Option<EntityDetails>) -> Result<(), HttpError>;
}

pub trait ServerExchangeHandler: Send {
    fn handle_request(
        &mut self,
        head: RequestHead,
        entity: Option<&EntityDetails>,
        channel: &mut dyn ResponseChannel,
    ) -> Result<(), HttpError>;

    /// Hands over the control handle of this exchange. The default grants unlimited input capacity.
    fn update_capacity(&mut self, capacity: CapacityChannel) {
        capacity.update(usize::MAX);
    }

    fn consume(&mut self, _data: &[u8]) -> Result<(), HttpError> {
        Ok(())
    }

    /// Called once the request, including its body if any, has been received.
    fn stream_end(&mut self, _trailers: Option<&Headers>, _channel: &mut dyn ResponseChannel) -> Result<(), HttpError> {
        Ok(())
    }

    /// Bytes ready to be produced. Output is only driven while this is non zero.
    fn available(&self) -> usize {
        0
    }

    fn produce(&mut self, _channel: &mut dyn ResponseChannel) -> Result<(), HttpError> {
        Ok(())
    }

    fn failed(&mut self, _cause: &HttpError) {}

    fn release_resources(&mut self) {}
}

pub trait ClientExchangeHandler: Send {
    fn produce_request(&mut self, channel: &mut dyn RequestChannel) -> Result<(), HttpError>;

    /// Bytes of request body ready to be produced.
    fn available(&self) -> usize {
        0
    }

    fn produce(&mut self, _channel: &mut dyn DataStreamChannel) -> Result<(), HttpError> {
        Ok(())
    }

    fn consume_information(&mut self, _head: ResponseHead) -> Result<(), HttpError> {
        Ok(())
    }

    fn consume_response(&mut self, head: ResponseHead, entity: Option<&EntityDetails>) -> Result<(), HttpError>;

    /// Hands over the control handle of this exchange. The default grants unlimited input capacity.
    fn update_capacity(&mut self, capacity: CapacityChannel) {
        capacity.update(usize::MAX);
    }

    fn consume(&mut self, _data: &[u8]) -> Result<(), HttpError> {
        Ok(())
    }

    /// Called once the response, including its body if any, has been received.
    fn stream_end(&mut self, _trailers: Option<&Headers>) -> Result<(), HttpError> {
        Ok(())
    }

    fn failed(&mut self, _cause: &HttpError) {}

    fn cancel(&mut self) {}

    fn release_resources(&mut self) {}
}

/// Creates the handler for each incoming request. `None` is answered with `404 Not Found`.
pub trait HandlerFactory: Send + Sync {
    fn create(&self, head: &RequestHead) -> Option<Box<dyn ServerExchangeHandler>>;
}

impl<F> HandlerFactory for F
where
    F: Fn(&RequestHead) -> Option<Box<dyn ServerExchangeHandler>> + Send + Sync,
{
    fn create(&self, head: &RequestHead) -> Option<Box<dyn ServerExchangeHandler>> {
        self(head)
    }
}

/// A [`HandlerFactory`] calling a function with the fully buffered request.
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: Arc<F>,
}

impl<F, Err> HandlerFactory for HandlerFn<F>
where
    F: Fn(&RequestHead, Bytes) -> Result<(ResponseHead, Bytes), Err> + Send + Sync + 'static,
    Err: Into<Box<dyn Error + Send + Sync>> + 'static,
{
    fn create(&self, _head: &RequestHead) -> Option<Box<dyn ServerExchangeHandler>> {
        Some(Box::new(BufferedExchange {
            f: Arc::clone(&self.f),
            request: None,
            body: BytesMut::new(),
            response_body: Bytes::new(),
            written: 0,
            responding: false,
        }))
    }
}

/// Wraps `f` into a handler factory. The request body is collected before `f` runs and
/// the response body is sent with a `Content-Length`.
pub fn make_handler<F, Err>(f: F) -> HandlerFn<F>
where
    F: Fn(&RequestHead, Bytes) -> Result<(ResponseHead, Bytes), Err> + Send + Sync + 'static,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    HandlerFn { f: Arc::new(f) }
}

struct BufferedExchange<F> {
    f: Arc<F>,
    request: Option<RequestHead>,
    body: BytesMut,
    response_body: Bytes,
    written: usize,
    responding: bool,
}

impl<F> BufferedExchange<F> {
    fn write_body(&mut self, channel: &mut dyn ResponseChannel) -> Result<(), HttpError> {
        while self.written < self.response_body.len() {
            let n = channel.write(&self.response_body[self.written..])?;
            if n == 0 {
                return Ok(());
            }
            self.written += n;
        }
        self.responding = false;
        channel.end_stream(None)
    }
}

impl<F, Err> ServerExchangeHandler for BufferedExchange<F>
where
    F: Fn(&RequestHead, Bytes) -> Result<(ResponseHead, Bytes), Err> + Send + Sync + 'static,
    Err: Into<Box<dyn Error + Send + Sync>>,
{
    fn handle_request(
        &mut self,
        head: RequestHead,
        _entity: Option<&EntityDetails>,
        _channel: &mut dyn ResponseChannel,
    ) -> Result<(), HttpError> {
        self.request = Some(head);
        Ok(())
    }

    fn consume(&mut self, data: &[u8]) -> Result<(), HttpError> {
        self.body.extend_from_slice(data);
        Ok(())
    }

    fn stream_end(&mut self, _trailers: Option<&Headers>, channel: &mut dyn ResponseChannel) -> Result<(), HttpError> {
        let Some(request) = self.request.take() else {
            return Ok(());
        };
        let body = self.body.split().freeze();
        let (head, response_body) = (self.f)(&request, body).map_err(HttpError::handler)?;
        debug!(status = head.status().as_u16(), body_len = response_body.len(), "response produced");

        if response_body.is_empty() {
            return channel.send_response(head, None);
        }
        channel.send_response(head, Some(EntityDetails::with_length(response_body.len() as u64)))?;
        self.response_body = response_body;
        self.written = 0;
        self.responding = true;
        self.write_body(channel)
    }

    fn available(&self) -> usize {
        if self.responding { self.response_body.len() - self.written } else { 0 }
    }

    fn produce(&mut self, channel: &mut dyn ResponseChannel) -> Result<(), HttpError> {
        if self.responding { self.write_body(channel) } else { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode, Uri, header};

    use crate::protocol::HttpMessage;

    #[derive(Default)]
    struct Recorder {
        head: Option<ResponseHead>,
        entity: Option<EntityDetails>,
        body: Vec<u8>,
        budget: usize,
        ended: bool,
    }

    impl DataStreamChannel for Recorder {
        fn write(&mut self, src: &[u8]) -> Result<usize, HttpError> {
            let n = src.len().min(self.budget);
            self.budget -= n;
            self.body.extend_from_slice(&src[..n]);
            Ok(n)
        }

        fn end_stream(&mut self, _trailers: Option<Headers>) -> Result<(), HttpError> {
            self.ended = true;
            Ok(())
        }

        fn request_output(&mut self) {}
    }

    impl ResponseChannel for Recorder {
        fn send_information(&mut self, _head: ResponseHead) -> Result<(), HttpError> {
            Ok(())
        }

        fn send_response(&mut self, head: ResponseHead, entity: Option<EntityDetails>) -> Result<(), HttpError> {
            self.head = Some(head);
            self.entity = entity;
            Ok(())
        }

        fn is_committed(&self) -> bool {
            self.head.is_some()
        }
    }

    fn echo(request: &RequestHead, body: Bytes) -> Result<(ResponseHead, Bytes), HttpError> {
        let head = ResponseHead::new(StatusCode::OK).with_header(header::SERVER, http::HeaderValue::from_static("echo"));
        assert_eq!(request.uri(), "/echo");
        Ok((head, body))
    }

    #[test]
    fn buffered_exchange_collects_then_responds() {
        let factory = make_handler(echo);
        let request = RequestHead::new(Method::POST, Uri::from_static("/echo"));
        let mut exchange = factory.create(&request).unwrap();
        let mut channel = Recorder { budget: 4, ..Recorder::default() };

        exchange.handle_request(request, Some(&EntityDetails::with_length(11)), &mut channel).unwrap();
        exchange.consume(b"hello ").unwrap();
        exchange.consume(b"world").unwrap();
        assert!(channel.head.is_none());

        exchange.stream_end(None, &mut channel).unwrap();
        assert_eq!(channel.head.as_ref().unwrap().headers().first(&header::SERVER).unwrap(), "echo");
        assert_eq!(channel.entity.as_ref().unwrap().content_length(), Some(11));
        assert_eq!(channel.body, b"hell");
        assert_eq!(exchange.available(), 7);
        assert!(!channel.ended);

        channel.budget = 100;
        exchange.produce(&mut channel).unwrap();
        assert_eq!(channel.body, b"hello world");
        assert_eq!(exchange.available(), 0);
        assert!(channel.ended);
    }

    #[test]
    fn handler_error_surfaces() {
        let factory = make_handler(|_: &RequestHead, _: Bytes| Err::<(ResponseHead, Bytes), _>("boom"));
        let request = RequestHead::new(Method::GET, Uri::from_static("/"));
        let mut exchange = factory.create(&request).unwrap();
        let mut channel = Recorder::default();

        exchange.handle_request(request, None, &mut channel).unwrap();
        let err = exchange.stream_end(None, &mut channel).unwrap_err();
        assert!(matches!(err, HttpError::Handler { .. }));
        assert!(channel.head.is_none());
    }
}
