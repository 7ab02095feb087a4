//! Application facing side of an exchange.
//!
//! A [`ServerExchangeHandler`] is created per request by a [`HandlerFactory`] and
//! answers through a [`ResponseChannel`]. A [`ClientExchangeHandler`] is submitted
//! for execution, produces its request through a [`RequestChannel`] and consumes
//! the response. [`make_handler`] adapts a plain function over fully buffered
//! bodies.
//!
//! Outgoing heads pass through an [`HttpProcessor`] before they are committed and
//! a [`ConnectionReuseStrategy`] decides whether the connection stays open.

mod exchange;
mod immediate;
mod processor;
mod reuse;

pub use exchange::{
    ClientExchangeHandler, DataStreamChannel, HandlerFactory, HandlerFn, RequestChannel, ResponseChannel,
    ServerExchangeHandler, make_handler,
};
pub use immediate::ImmediateResponse;
pub use processor::{
    HttpProcessor, HttpProcessorBuilder, RequestContent, RequestInterceptor, RequestTargetHost, ResponseConnControl,
    ResponseContent, ResponseDate, ResponseInterceptor,
};
pub use reuse::{ConnectionReuseStrategy, DefaultConnectionReuseStrategy};
