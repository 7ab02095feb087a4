//! HTTP/1.1 connection handling module
//!
//! This module drives one HTTP/1.1 connection over a non-blocking [`IoSession`].
//! The same state machine serves both roles; what differs between client and
//! server is a [`StreamPolicy`].
//!
//! # Components
//!
//! - [`Http1StreamDuplexer`]: the per connection state machine that:
//!   - Parses incoming heads and streams bodies to the current exchange
//!   - Writes outgoing heads and bodies through the session output buffer
//!   - Applies input backpressure through a per exchange capacity window
//!   - Walks the `Ready -> Active -> GracefulShutdown -> Shutdown` lifecycle
//! - [`ServerPolicy`]: request dispatch to handlers, with pipelined responses
//!   held back until every earlier response is complete
//! - [`ClientPolicy`]: request submission queue with optional pipelining and
//!   `Expect: 100-continue` handling
//! - [`CommandSender`]: thread safe handle for submitting exchanges, cancelling
//!   them, granting capacity and shutting down

mod client;
mod client_stream;
mod command;
mod core;
mod duplexer;
mod server;
mod server_stream;
mod session;

pub use client::{ClientHttp1StreamDuplexer, ClientPolicy};
pub use command::{CapacityChannel, CommandSender, ExchangeId, Execution};
pub use self::core::{ConnectionState, FlushMode, StreamChannel};
pub use duplexer::{Http1StreamDuplexer, StreamPolicy};
pub use server::{ServerHttp1StreamDuplexer, ServerPolicy};
pub use session::{CloseMode, EventMask, IoSession};

pub(crate) use command::Command;

#[cfg(test)]
pub(crate) use session::mock;

/// Progress of one message of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageState {
    Idle,
    Headers,
    /// Head sent with `Expect: 100-continue`, body held back.
    Ack,
    Body,
    Complete,
}
