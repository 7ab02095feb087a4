//! Session buffers between a non-blocking channel and the codec.
//!
//! Channels are plain [`std::io::Read`] / [`std::io::Write`] implementations in
//! non-blocking mode: `WouldBlock` means no progress right now and `Ok(0)` from a
//! read means the peer closed its side.

mod buffer;
mod charset;
mod input;
pub(crate) mod line;
mod metrics;
mod output;

pub use buffer::{BufferMode, ExpandableBuffer};
pub use charset::{CharCodingConfig, Charset, CodingErrorAction};
pub use input::{Fill, SessionInputBuffer};
pub use metrics::{ConnectionMetrics, TransportMetrics};
pub use output::SessionOutputBuffer;
