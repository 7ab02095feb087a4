use http::{Method, StatusCode, Version, header};

use crate::protocol::{HttpMessage, RequestHead, ResponseHead};

/// Decides whether the connection may carry another exchange after this one.
pub trait ConnectionReuseStrategy: Send + Sync {
    fn keep_alive(&self, request: &RequestHead, response: &ResponseHead) -> bool;
}

/// Keeps a connection open when both sides speak HTTP/1.1 (or ask for `keep-alive`),
/// nobody asked to `close`, and the response body is delimited by its headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnectionReuseStrategy;

impl DefaultConnectionReuseStrategy {
    fn may_have_body(request: &RequestHead, response: &ResponseHead) -> bool {
        let status = response.status();
        request.method() != Method::HEAD
            && !status.is_informational()
            && status != StatusCode::NO_CONTENT
            && status != StatusCode::NOT_MODIFIED
    }
}

impl ConnectionReuseStrategy for DefaultConnectionReuseStrategy {
    fn keep_alive(&self, request: &RequestHead, response: &ResponseHead) -> bool {
        if request.headers().contains_token(&header::CONNECTION, "close") {
            return false;
        }

        let headers = response.headers();
        if headers.contains(&header::TRANSFER_ENCODING) {
            if !headers.tokens(&header::TRANSFER_ENCODING).last().is_some_and(|t| t.eq_ignore_ascii_case("chunked")) {
                return false;
            }
        } else if Self::may_have_body(request, response) {
            let mut values = headers.get_all(&header::CONTENT_LENGTH);
            let valid = match (values.next(), values.next()) {
                (Some(value), None) => value.to_str().is_ok_and(|v| v.trim().parse::<u64>().is_ok()),
                _ => false,
            };
            if !valid {
                return false;
            }
        }

        if headers.contains_token(&header::CONNECTION, "close") {
            return false;
        }
        if headers.contains_token(&header::CONNECTION, "keep-alive") {
            return true;
        }
        request.version() >= Version::HTTP_11 && response.version() >= Version::HTTP_11
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, Uri};

    fn request() -> RequestHead {
        RequestHead::new(Method::GET, Uri::from_static("/"))
    }

    fn response(headers: &[(header::HeaderName, &'static str)]) -> ResponseHead {
        headers.iter().fold(ResponseHead::new(StatusCode::OK), |head, (name, value)| {
            head.with_header(name.clone(), HeaderValue::from_static(value))
        })
    }

    #[test]
    fn delimited_http11_is_reused() {
        let strategy = DefaultConnectionReuseStrategy;
        assert!(strategy.keep_alive(&request(), &response(&[(header::CONTENT_LENGTH, "10")])));
        assert!(strategy.keep_alive(&request(), &response(&[(header::TRANSFER_ENCODING, "chunked")])));
    }

    #[test]
    fn undelimited_body_closes() {
        let strategy = DefaultConnectionReuseStrategy;
        assert!(!strategy.keep_alive(&request(), &response(&[])));
        assert!(!strategy.keep_alive(&request(), &response(&[(header::CONTENT_LENGTH, "1"), (header::CONTENT_LENGTH, "1")])));
        assert!(!strategy.keep_alive(&request(), &response(&[(header::TRANSFER_ENCODING, "gzip")])));

        let head = RequestHead::new(Method::HEAD, Uri::from_static("/"));
        assert!(strategy.keep_alive(&head, &response(&[])));
    }

    #[test]
    fn connection_tokens_and_versions() {
        let strategy = DefaultConnectionReuseStrategy;
        let closing = request().with_header(header::CONNECTION, HeaderValue::from_static("close"));
        assert!(!strategy.keep_alive(&closing, &response(&[(header::CONTENT_LENGTH, "0")])));
        assert!(!strategy.keep_alive(&request(), &response(&[(header::CONTENT_LENGTH, "0"), (header::CONNECTION, "close")])));

        let old = request().with_version(Version::HTTP_10);
        assert!(!strategy.keep_alive(&old, &response(&[(header::CONTENT_LENGTH, "0")])));
        assert!(strategy.keep_alive(&old, &response(&[(header::CONTENT_LENGTH, "0"), (header::CONNECTION, "keep-alive")])));
    }
}
