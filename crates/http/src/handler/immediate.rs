use bytes::Bytes;
use http::{HeaderValue, StatusCode, header};

use crate::handler::{ResponseChannel, ServerExchangeHandler};
use crate::protocol::{EntityDetails, HttpError, HttpMessage, RequestHead, ResponseHead};

/// Answers with a fixed response, ignoring the request body.
#[derive(Debug)]
pub struct ImmediateResponse {
    head: Option<ResponseHead>,
    body: Bytes,
    written: usize,
}

impl ImmediateResponse {
    pub fn new(head: ResponseHead, body: Bytes) -> Self {
        Self { head: Some(head), body, written: 0 }
    }

    /// A plain text response carrying the canonical reason of `status`.
    pub fn status(status: StatusCode) -> Self {
        let body = Bytes::from_static(status.canonical_reason().unwrap_or("").as_bytes());
        Self::new(ResponseHead::new(status), body)
    }

    /// Like [`ImmediateResponse::status`], asking the peer to close the connection.
    pub fn closing(status: StatusCode) -> Self {
        let mut response = Self::status(status);
        if let Some(head) = response.head.as_mut() {
            head.headers_mut().set(header::CONNECTION, HeaderValue::from_static("close"));
        }
        response
    }

    pub(crate) fn commit(&mut self, channel: &mut dyn ResponseChannel) -> Result<(), HttpError> {
        let Some(head) = self.head.take() else {
            return Ok(());
        };
        if self.body.is_empty() {
            return channel.send_response(head, None);
        }
        let entity = EntityDetails::with_length(self.body.len() as u64).content_type("text/plain; charset=utf-8");
        channel.send_response(head, Some(entity))?;
        self.write_body(channel)
    }

    fn write_body(&mut self, channel: &mut dyn ResponseChannel) -> Result<(), HttpError> {
        while self.written < self.body.len() {
            let n = channel.write(&self.body[self.written..])?;
            if n == 0 {
                return Ok(());
            }
            self.written += n;
        }
        channel.end_stream(None)
    }
}

impl ServerExchangeHandler for ImmediateResponse {
    fn handle_request(
        &mut self,
        _head: RequestHead,
        _entity: Option<&EntityDetails>,
        channel: &mut dyn ResponseChannel,
    ) -> Result<(), HttpError> {
        self.commit(channel)
    }

    fn available(&self) -> usize {
        if self.head.is_none() { self.body.len() - self.written } else { 0 }
    }

    fn produce(&mut self, channel: &mut dyn ResponseChannel) -> Result<(), HttpError> {
        if self.head.is_some() {
            return self.commit(channel);
        }
        if self.written < self.body.len() { self.write_body(channel) } else { Ok(()) }
    }
}
