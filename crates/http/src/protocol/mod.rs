//! Message model shared by the codec and the connection layer.
//!
//! - [`RequestHead`] / [`ResponseHead`]: head line plus an ordered [`Headers`] multimap
//! - [`EntityDetails`]: what is known about a body before it is streamed
//! - [`PayloadSize`]: framing picked by a content length strategy
//! - [`HttpError`] / [`ProtocolError`]: error taxonomy

mod entity;
mod error;
mod header;
mod message;

pub use entity::EntityDetails;
pub use error::HttpError;
pub use error::ProtocolError;
pub use header::Headers;
pub use message::HttpMessage;
pub use message::MessageHead;
pub use message::PayloadItem;
pub use message::PayloadSize;
pub use message::RequestHead;
pub use message::ResponseHead;
pub(crate) use message::{parse_version, version_str};
