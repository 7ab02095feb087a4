use std::fmt::Write;
use std::str::FromStr;

use bytes::{Buf, Bytes};
use http::{Method, StatusCode, Uri, Version};

use crate::protocol::{Headers, ProtocolError};

/// Common view over request and response heads.
pub trait HttpMessage {
    fn version(&self) -> Version;

    fn headers(&self) -> &Headers;

    fn headers_mut(&mut self) -> &mut Headers;
}

/// A message head that can be read from and written to an HTTP/1.x head line.
pub trait MessageHead: HttpMessage + Sized + Send + 'static {
    /// Parses a request-line or status-line. Headers are attached by the parser afterwards.
    fn parse_head_line(line: &str) -> Result<Self, ProtocolError>;

    /// Appends the head line, without line terminator, to `dst`.
    fn write_head_line(&self, dst: &mut String) -> Result<(), ProtocolError>;
}

/// Represents an item in the HTTP message payload stream.
///
/// Produced by the `tokio_util` decoder implementations of the content codecs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data
    Chunk(Data),
    /// Marks the end of the payload stream
    Eof,
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

/// Framing of a message body as determined by a content length strategy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// `Content-Length: n`
    Length(u64),
    /// `Transfer-Encoding: chunked`
    Chunked,
    /// Neither header present, the body (if any) ends with the connection
    Undefined,
}

impl PayloadSize {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, PayloadSize::Undefined)
    }
}

/// Request method, target, version and headers.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestHead {
    method: Method,
    uri: Uri,
    version: Version,
    headers: Headers,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self { method, uri, version: Version::HTTP_11, headers: Headers::new() }
    }

    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: http::HeaderName, value: http::HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Returns true when the request carries `Expect: 100-continue`.
    pub fn expects_continue(&self) -> bool {
        self.headers.contains_token(&http::header::EXPECT, "100-continue")
    }

    pub fn into_request(self) -> http::Request<()> {
        let mut request = http::Request::new(());
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers.to_header_map();
        request
    }
}

impl From<http::Request<()>> for RequestHead {
    fn from(request: http::Request<()>) -> Self {
        let (parts, ()) = request.into_parts();
        Self { headers: Headers::from(&parts.headers), method: parts.method, uri: parts.uri, version: parts.version }
    }
}

impl HttpMessage for RequestHead {
    fn version(&self) -> Version {
        self.version
    }

    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }
}

impl MessageHead for RequestHead {
    fn parse_head_line(line: &str) -> Result<Self, ProtocolError> {
        let mut parts = line.split_ascii_whitespace();
        let (Some(method), Some(target), Some(version), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ProtocolError::invalid_head_line(line));
        };

        let version = parse_version(version)?;
        let method = Method::from_bytes(method.as_bytes()).map_err(ProtocolError::invalid_head_line)?;
        let uri = Uri::from_str(target).map_err(ProtocolError::invalid_head_line)?;

        Ok(Self { method, uri, version, headers: Headers::new() })
    }

    fn write_head_line(&self, dst: &mut String) -> Result<(), ProtocolError> {
        let version = version_str(self.version)?;
        // origin form; the authority travels in `Host`
        let _ = match self.uri.path_and_query() {
            Some(target) if self.method != Method::CONNECT => write!(dst, "{} {} {}", self.method, target, version),
            _ => write!(dst, "{} {} {}", self.method, self.uri, version),
        };
        Ok(())
    }
}

/// Status, optional custom reason phrase, version and headers.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHead {
    status: StatusCode,
    reason: Option<String>,
    version: Version,
    headers: Headers,
}

impl ResponseHead {
    pub fn new(status: StatusCode) -> Self {
        Self { status, reason: None, version: Version::HTTP_11, headers: Headers::new() }
    }

    #[must_use]
    pub fn with_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: http::HeaderName, value: http::HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The reason phrase as received, or the canonical one for the status.
    pub fn reason(&self) -> &str {
        match &self.reason {
            Some(reason) => reason,
            None => self.status.canonical_reason().unwrap_or(""),
        }
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn is_informational(&self) -> bool {
        self.status.is_informational()
    }

    pub fn into_response(self) -> http::Response<()> {
        let mut response = http::Response::new(());
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.headers_mut() = self.headers.to_header_map();
        response
    }
}

impl From<http::Response<()>> for ResponseHead {
    fn from(response: http::Response<()>) -> Self {
        let (parts, ()) = response.into_parts();
        Self { headers: Headers::from(&parts.headers), status: parts.status, reason: None, version: parts.version }
    }
}

impl HttpMessage for ResponseHead {
    fn version(&self) -> Version {
        self.version
    }

    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }
}

impl MessageHead for ResponseHead {
    fn parse_head_line(line: &str) -> Result<Self, ProtocolError> {
        let (version, rest) = line.split_once(' ').ok_or_else(|| ProtocolError::invalid_head_line(line))?;
        let version = parse_version(version)?;

        let rest = rest.trim_start();
        let (code, reason) = match rest.split_once(' ') {
            Some((code, reason)) => (code, reason.trim()),
            None => (rest, ""),
        };

        if code.len() != 3 {
            return Err(ProtocolError::invalid_head_line(line));
        }
        let status = StatusCode::from_bytes(code.as_bytes()).map_err(|_| ProtocolError::invalid_head_line(line))?;

        let reason = (!reason.is_empty() && Some(reason) != status.canonical_reason()).then(|| reason.to_owned());
        Ok(Self { status, reason, version, headers: Headers::new() })
    }

    fn write_head_line(&self, dst: &mut String) -> Result<(), ProtocolError> {
        let version = version_str(self.version)?;
        let _ = write!(dst, "{} {} {}", version, self.status.as_str(), self.reason());
        Ok(())
    }
}

/// Parses an `HTTP/x.y` protocol token. Major versions of two or more are rejected.
pub(crate) fn parse_version(token: &str) -> Result<Version, ProtocolError> {
    let rest = token.strip_prefix("HTTP/").ok_or_else(|| ProtocolError::invalid_head_line(token))?;
    let (major, minor) = rest.split_once('.').unwrap_or((rest, "0"));

    let major: u32 = major.parse().map_err(|_| ProtocolError::invalid_head_line(token))?;
    let minor: u32 = minor.parse().map_err(|_| ProtocolError::invalid_head_line(token))?;

    match (major, minor) {
        (0, 9) => Ok(Version::HTTP_09),
        (1, 0) => Ok(Version::HTTP_10),
        (1, _) => Ok(Version::HTTP_11),
        (m, _) if m >= 2 => Err(ProtocolError::unsupported_version(token)),
        _ => Err(ProtocolError::invalid_head_line(token)),
    }
}

pub(crate) fn version_str(version: Version) -> Result<&'static str, ProtocolError> {
    match version {
        Version::HTTP_09 => Ok("HTTP/0.9"),
        Version::HTTP_10 => Ok("HTTP/1.0"),
        Version::HTTP_11 => Ok("HTTP/1.1"),
        v => Err(ProtocolError::unsupported_version(format!("{v:?}"))),
    }
}
