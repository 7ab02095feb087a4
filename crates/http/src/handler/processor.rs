//! Interceptors applied to outgoing heads right before they are committed.
//!
//! [`HttpProcessor::server`] fills in the framing headers from the response
//! [`EntityDetails`], decides `Connection` and stamps a `Date`.
//! [`HttpProcessor::client`] does the same for requests and adds `Host`.
//! Headers already set by the application are left in place.

use std::fmt;

use http::{HeaderValue, StatusCode, Version, header};

use crate::protocol::{EntityDetails, HttpError, HttpMessage, ProtocolError, RequestHead, ResponseHead};

pub trait RequestInterceptor: Send + Sync {
    fn process(&self, head: &mut RequestHead, entity: Option<&EntityDetails>) -> Result<(), HttpError>;
}

pub trait ResponseInterceptor: Send + Sync {
    fn process(
        &self,
        head: &mut ResponseHead,
        entity: Option<&EntityDetails>,
        request: &RequestHead,
    ) -> Result<(), HttpError>;
}

/// Ordered chains of request and response interceptors.
#[derive(Default)]
pub struct HttpProcessor {
    request: Vec<Box<dyn RequestInterceptor>>,
    response: Vec<Box<dyn ResponseInterceptor>>,
}

impl HttpProcessor {
    pub fn builder() -> HttpProcessorBuilder {
        HttpProcessorBuilder { processor: HttpProcessor::default() }
    }

    pub fn server() -> Self {
        Self::builder().add_response(ResponseDate).add_response(ResponseContent).add_response(ResponseConnControl).build()
    }

    pub fn client() -> Self {
        Self::builder().add_request(RequestContent).add_request(RequestTargetHost).build()
    }

    pub fn process_request(&self, head: &mut RequestHead, entity: Option<&EntityDetails>) -> Result<(), HttpError> {
        self.request.iter().try_for_each(|interceptor| interceptor.process(head, entity))
    }

    pub fn process_response(
        &self,
        head: &mut ResponseHead,
        entity: Option<&EntityDetails>,
        request: &RequestHead,
    ) -> Result<(), HttpError> {
        self.response.iter().try_for_each(|interceptor| interceptor.process(head, entity, request))
    }
}

impl fmt::Debug for HttpProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProcessor")
            .field("request", &self.request.len())
            .field("response", &self.response.len())
            .finish()
    }
}

#[derive(Debug)]
pub struct HttpProcessorBuilder {
    processor: HttpProcessor,
}

impl HttpProcessorBuilder {
    #[must_use]
    pub fn add_request<I: RequestInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.processor.request.push(Box::new(interceptor));
        self
    }

    #[must_use]
    pub fn add_response<I: ResponseInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.processor.response.push(Box::new(interceptor));
        self
    }

    pub fn build(self) -> HttpProcessor {
        self.processor
    }
}

fn has_framing(head: &dyn HttpMessage) -> bool {
    head.headers().contains(&header::CONTENT_LENGTH) || head.headers().contains(&header::TRANSFER_ENCODING)
}

fn string_value(value: &str) -> Result<HeaderValue, HttpError> {
    Ok(HeaderValue::from_str(value).map_err(ProtocolError::invalid_header)?)
}

/// Adds the entity headers (`Content-Type`, `Content-Encoding`, `Trailer`) that are not set yet.
fn add_entity_headers(head: &mut dyn HttpMessage, entity: &EntityDetails) -> Result<(), HttpError> {
    let headers = head.headers_mut();
    if let Some(content_type) = entity.get_content_type()
        && !headers.contains(&header::CONTENT_TYPE)
    {
        headers.append(header::CONTENT_TYPE, string_value(content_type)?);
    }
    if let Some(content_encoding) = entity.get_content_encoding()
        && !headers.contains(&header::CONTENT_ENCODING)
    {
        headers.append(header::CONTENT_ENCODING, string_value(content_encoding)?);
    }
    if !entity.get_trailer_names().is_empty() && !headers.contains(&header::TRAILER) {
        headers.append(header::TRAILER, string_value(&entity.get_trailer_names().join(", "))?);
    }
    Ok(())
}

/// Framing headers of outgoing requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestContent;

impl RequestInterceptor for RequestContent {
    fn process(&self, head: &mut RequestHead, entity: Option<&EntityDetails>) -> Result<(), HttpError> {
        let Some(entity) = entity else {
            return Ok(());
        };
        if !has_framing(&*head) {
            match entity.content_length() {
                Some(length) if !entity.is_chunked() => {
                    head.headers_mut().append(header::CONTENT_LENGTH, HeaderValue::from(length));
                }
                _ => {
                    if head.version() < Version::HTTP_11 {
                        return Err(ProtocolError::UnsupportedTransferEncoding {
                            value: format!("chunked is not allowed for {:?}", head.version()),
                        }
                        .into());
                    }
                    head.headers_mut().append(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
                }
            }
        }
        add_entity_headers(head, entity)
    }
}

/// `Host` for HTTP/1.1 requests, taken from the request target.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestTargetHost;

impl RequestInterceptor for RequestTargetHost {
    fn process(&self, head: &mut RequestHead, _entity: Option<&EntityDetails>) -> Result<(), HttpError> {
        if head.version() < Version::HTTP_11 || head.headers().contains(&header::HOST) {
            return Ok(());
        }
        let Some(authority) = head.uri().authority() else {
            return Err(ProtocolError::invalid_header("target host is unknown").into());
        };
        let value = string_value(authority.as_str())?;
        head.headers_mut().append(header::HOST, value);
        Ok(())
    }
}

/// Framing headers of outgoing responses.
///
/// A response without a body gets `Content-Length: 0` unless its status forbids one.
/// A body of unknown length is chunk coded for HTTP/1.1 peers and close delimited otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseContent;

impl ResponseInterceptor for ResponseContent {
    fn process(
        &self,
        head: &mut ResponseHead,
        entity: Option<&EntityDetails>,
        request: &RequestHead,
    ) -> Result<(), HttpError> {
        let status = head.status();
        if status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
            return Ok(());
        }
        if has_framing(&*head) {
            return entity.map_or(Ok(()), |entity| add_entity_headers(head, entity));
        }
        let Some(entity) = entity else {
            head.headers_mut().append(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
            return Ok(());
        };
        match entity.content_length() {
            Some(length) if !entity.is_chunked() => {
                head.headers_mut().append(header::CONTENT_LENGTH, HeaderValue::from(length));
            }
            _ if request.version() >= Version::HTTP_11 => {
                head.headers_mut().append(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            }
            _ => {}
        }
        add_entity_headers(head, entity)
    }
}

/// `Date` on final responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseDate;

impl ResponseInterceptor for ResponseDate {
    fn process(
        &self,
        head: &mut ResponseHead,
        _entity: Option<&EntityDetails>,
        _request: &RequestHead,
    ) -> Result<(), HttpError> {
        if head.status().is_informational() || head.headers().contains(&header::DATE) {
            return Ok(());
        }
        let mut date = faf_http_date::get_date_buff_no_key();
        faf_http_date::get_date_no_key(&mut date);
        let value = HeaderValue::from_bytes(&date).map_err(ProtocolError::invalid_header)?;
        head.headers_mut().append(header::DATE, value);
        Ok(())
    }
}

/// `Connection` on final responses.
///
/// Statuses that leave the request stream in doubt always close. Otherwise the
/// request's wish is echoed, and HTTP/1.0 peers without `keep-alive` get `close`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseConnControl;

impl ResponseInterceptor for ResponseConnControl {
    fn process(
        &self,
        head: &mut ResponseHead,
        _entity: Option<&EntityDetails>,
        request: &RequestHead,
    ) -> Result<(), HttpError> {
        let status = head.status();
        if status.is_informational() {
            return Ok(());
        }
        if matches!(
            status,
            StatusCode::BAD_REQUEST
                | StatusCode::REQUEST_TIMEOUT
                | StatusCode::LENGTH_REQUIRED
                | StatusCode::PAYLOAD_TOO_LARGE
                | StatusCode::URI_TOO_LONG
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::NOT_IMPLEMENTED
        ) {
            head.headers_mut().set(header::CONNECTION, HeaderValue::from_static("close"));
            return Ok(());
        }
        if head.headers().contains(&header::CONNECTION) {
            return Ok(());
        }

        let request_headers = request.headers();
        if request_headers.contains_token(&header::CONNECTION, "close") {
            head.headers_mut().append(header::CONNECTION, HeaderValue::from_static("close"));
        } else if request.version() < Version::HTTP_11 {
            let value = if request_headers.contains_token(&header::CONNECTION, "keep-alive") && has_framing(&*head) {
                "keep-alive"
            } else {
                "close"
            };
            head.headers_mut().append(header::CONNECTION, HeaderValue::from_static(value));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Uri};

    fn get() -> RequestHead {
        RequestHead::new(Method::GET, Uri::from_static("/"))
    }

    #[test]
    fn response_without_entity_gets_zero_length() {
        let mut head = ResponseHead::new(StatusCode::OK);
        HttpProcessor::server().process_response(&mut head, None, &get()).unwrap();

        assert_eq!(head.headers().first(&header::CONTENT_LENGTH).unwrap(), "0");
        assert!(head.headers().contains(&header::DATE));
        assert!(!head.headers().contains(&header::CONNECTION));
    }

    #[test]
    fn streaming_response_is_chunked_for_http11_only() {
        let entity = EntityDetails::streaming().content_type("text/plain");

        let mut head = ResponseHead::new(StatusCode::OK);
        ResponseContent.process(&mut head, Some(&entity), &get()).unwrap();
        assert_eq!(head.headers().first(&header::TRANSFER_ENCODING).unwrap(), "chunked");
        assert_eq!(head.headers().first(&header::CONTENT_TYPE).unwrap(), "text/plain");

        let request = get().with_version(Version::HTTP_10);
        let mut head = ResponseHead::new(StatusCode::OK);
        ResponseContent.process(&mut head, Some(&entity), &request).unwrap();
        assert!(!head.headers().contains(&header::TRANSFER_ENCODING));
        assert!(!head.headers().contains(&header::CONTENT_LENGTH));
    }

    #[test]
    fn existing_framing_is_kept() {
        let mut head = ResponseHead::new(StatusCode::OK).with_header(header::CONTENT_LENGTH, HeaderValue::from_static("7"));
        ResponseContent.process(&mut head, Some(&EntityDetails::with_length(3)), &get()).unwrap();
        assert_eq!(head.headers().count(&header::CONTENT_LENGTH), 1);
        assert_eq!(head.headers().first(&header::CONTENT_LENGTH).unwrap(), "7");
    }

    #[test]
    fn connection_control() {
        let mut head = ResponseHead::new(StatusCode::BAD_REQUEST)
            .with_header(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        ResponseConnControl.process(&mut head, None, &get()).unwrap();
        assert_eq!(head.headers().first(&header::CONNECTION).unwrap(), "close");

        let request = get().with_header(header::CONNECTION, HeaderValue::from_static("close"));
        let mut head = ResponseHead::new(StatusCode::OK);
        ResponseConnControl.process(&mut head, None, &request).unwrap();
        assert_eq!(head.headers().first(&header::CONNECTION).unwrap(), "close");

        let request = get()
            .with_version(Version::HTTP_10)
            .with_header(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        let mut head = ResponseHead::new(StatusCode::OK).with_header(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        ResponseConnControl.process(&mut head, None, &request).unwrap();
        assert_eq!(head.headers().first(&header::CONNECTION).unwrap(), "keep-alive");

        let mut head = ResponseHead::new(StatusCode::OK);
        ResponseConnControl.process(&mut head, None, &get().with_version(Version::HTTP_10)).unwrap();
        assert_eq!(head.headers().first(&header::CONNECTION).unwrap(), "close");
    }

    #[test]
    fn request_framing_and_host() {
        let mut head = RequestHead::new(Method::POST, Uri::from_static("http://example.com:8080/upload"));
        HttpProcessor::client().process_request(&mut head, Some(&EntityDetails::with_length(12))).unwrap();
        assert_eq!(head.headers().first(&header::CONTENT_LENGTH).unwrap(), "12");
        assert_eq!(head.headers().first(&header::HOST).unwrap(), "example.com:8080");

        let mut head = RequestHead::new(Method::POST, Uri::from_static("/upload")).with_version(Version::HTTP_10);
        let err = RequestContent.process(&mut head, Some(&EntityDetails::streaming())).unwrap_err();
        assert!(matches!(err.as_protocol(), Some(ProtocolError::UnsupportedTransferEncoding { .. })));

        let mut head = RequestHead::new(Method::GET, Uri::from_static("/"));
        assert!(RequestTargetHost.process(&mut head, None).is_err());
    }
}
