//! Body framing rules.

use http::header;

use crate::ensure;
use crate::protocol::{HttpError, HttpMessage, PayloadSize, ProtocolError};

/// Decides how the body of a message is framed from its headers alone.
///
/// Whether a message may carry a body at all (a `GET` request, a `204` response,
/// the response to `HEAD`) is decided by the caller.
pub trait ContentLengthStrategy: Send + Sync {
    fn determine_length(&self, message: &dyn HttpMessage) -> Result<PayloadSize, HttpError>;
}

/// `Transfer-Encoding: chunked` wins over `Content-Length`; any other transfer coding is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContentLengthStrategy;

impl ContentLengthStrategy for DefaultContentLengthStrategy {
    fn determine_length(&self, message: &dyn HttpMessage) -> Result<PayloadSize, HttpError> {
        let headers = message.headers();

        if headers.contains(&header::TRANSFER_ENCODING) {
            let last = headers.tokens(&header::TRANSFER_ENCODING).last().unwrap_or_default();
            ensure!(
                last.eq_ignore_ascii_case("chunked"),
                ProtocolError::UnsupportedTransferEncoding { value: last.to_owned() }.into()
            );
            return Ok(PayloadSize::Chunked);
        }

        let mut values = headers.get_all(&header::CONTENT_LENGTH);
        let Some(value) = values.next() else {
            return Ok(PayloadSize::Undefined);
        };
        ensure!(values.next().is_none(), ProtocolError::invalid_content_length("multiple content-length headers").into());

        let length = value
            .to_str()
            .ok()
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| ProtocolError::invalid_content_length(format!("{value:?}")))?;

        Ok(PayloadSize::Length(length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestHead;
    use http::{HeaderValue, Method, Uri};

    fn head(headers: &[(header::HeaderName, &'static str)]) -> RequestHead {
        headers.iter().fold(RequestHead::new(Method::POST, Uri::from_static("/")), |head, (name, value)| {
            head.with_header(name.clone(), HeaderValue::from_static(value))
        })
    }

    fn determine(headers: &[(header::HeaderName, &'static str)]) -> Result<PayloadSize, HttpError> {
        DefaultContentLengthStrategy.determine_length(&head(headers))
    }

    #[test]
    fn framing_rules() {
        assert_eq!(determine(&[]).unwrap(), PayloadSize::Undefined);
        assert_eq!(determine(&[(header::CONTENT_LENGTH, "42")]).unwrap(), PayloadSize::Length(42));
        assert_eq!(determine(&[(header::TRANSFER_ENCODING, "Chunked")]).unwrap(), PayloadSize::Chunked);
        assert_eq!(
            determine(&[(header::CONTENT_LENGTH, "42"), (header::TRANSFER_ENCODING, "gzip, chunked")]).unwrap(),
            PayloadSize::Chunked
        );
    }

    #[test]
    fn rejects_unsupported_coding_and_bad_lengths() {
        let err = determine(&[(header::TRANSFER_ENCODING, "chunked, gzip")]).unwrap_err();
        assert!(matches!(err.as_protocol(), Some(ProtocolError::UnsupportedTransferEncoding { .. })));

        for value in ["-1", "1.5", "", "12 34"] {
            let err = determine(&[(header::CONTENT_LENGTH, value)]).unwrap_err();
            assert!(matches!(err.as_protocol(), Some(ProtocolError::InvalidContentLength { .. })), "{value:?}");
        }

        let err = determine(&[(header::CONTENT_LENGTH, "1"), (header::CONTENT_LENGTH, "1")]).unwrap_err();
        assert!(matches!(err.as_protocol(), Some(ProtocolError::InvalidContentLength { .. })));
    }
}
