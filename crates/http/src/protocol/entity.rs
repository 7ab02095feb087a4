use http::header;

use crate::protocol::{HttpMessage, PayloadSize};

/// Describes a message body without carrying its content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDetails {
    content_length: Option<u64>,
    content_type: Option<String>,
    content_encoding: Option<String>,
    chunked: bool,
    trailer_names: Vec<String>,
}

impl EntityDetails {
    /// A body of known length.
    pub fn with_length(content_length: u64) -> Self {
        Self { content_length: Some(content_length), ..Self::default() }
    }

    /// A body of unknown length, sent with chunked coding where the peer supports it.
    pub fn streaming() -> Self {
        Self { chunked: true, ..Self::default() }
    }

    /// Details of an incoming body framed as `size`.
    pub fn from_message(message: &dyn HttpMessage, size: PayloadSize) -> Self {
        let headers = message.headers();
        let as_string = |name: &header::HeaderName| headers.first(name).and_then(|v| v.to_str().ok()).map(str::to_owned);

        Self {
            content_length: match size {
                PayloadSize::Length(n) => Some(n),
                _ => None,
            },
            content_type: as_string(&header::CONTENT_TYPE),
            content_encoding: as_string(&header::CONTENT_ENCODING),
            chunked: size.is_chunked(),
            trailer_names: headers.tokens(&header::TRAILER).map(str::to_owned).collect(),
        }
    }

    #[must_use]
    pub fn content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn content_encoding<S: Into<String>>(mut self, content_encoding: S) -> Self {
        self.content_encoding = Some(content_encoding.into());
        self
    }

    #[must_use]
    pub fn trailer_names(mut self, names: Vec<String>) -> Self {
        self.trailer_names = names;
        self
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn get_content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn get_content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn get_trailer_names(&self) -> &[String] {
        &self.trailer_names
    }
}
