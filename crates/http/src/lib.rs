//! A non-blocking HTTP/1.1 engine
//!
//! This crate parses and emits HTTP/1.1 message streams directly against
//! non-blocking byte channels. One [`connection::Http1StreamDuplexer`] per
//! connection is driven by a reactor through readiness callbacks; it never blocks
//! and never spawns work of its own.
//!
//! # Features
//!
//! - Request and response head parsing with header folding and size limits
//! - Identity, length delimited and chunked body codecs, trailers included
//! - Server side pipelining with responses kept in request order
//! - Client side pipelining and `Expect: 100-continue`
//! - Keep-alive decisions and framing headers through pluggable interceptors
//! - Input backpressure with a per exchange capacity window
//! - A tokio driver for TCP connections
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use http::StatusCode;
//! use micro_h1::config::Http1Config;
//! use micro_h1::handler::make_handler;
//! use micro_h1::protocol::{HttpError, RequestHead, ResponseHead};
//! use micro_h1::runtime::serve;
//! use tokio::net::TcpListener;
//! use tracing::{Level, error};
//! use tracing_subscriber::FmtSubscriber;
//!
//! #[tokio::main]
//! async fn main() {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
//!
//!     let listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(listener) => listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     let handler = make_handler(|request: &RequestHead, _body: Bytes| {
//!         let body = Bytes::from(format!("Hello {}!\r\n", request.uri().path()));
//!         Ok::<_, HttpError>((ResponseHead::new(StatusCode::OK), body))
//!     });
//!     serve(listener, Http1Config::default(), Arc::new(handler)).await;
//! }
//! ```
//!
//! # Architecture
//!
//! - [`io`]: expandable buffers and the session input/output buffers
//! - [`codec`]: head parser and writer, body codecs, framing strategy
//! - [`protocol`]: message heads, headers, entity details and errors
//! - [`handler`]: exchange handler traits, interceptors, reuse strategy
//! - [`connection`]: the duplexer and its client and server policies
//! - [`runtime`]: tokio adapter
//! - [`config`]: buffer sizes, limits and timeouts
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only; heads announcing HTTP/2 or later are rejected
//! - No TLS; wrap the channel before handing it to the duplexer
//! - Header semantics beyond framing, `Connection` and `Expect` are left to the application

pub mod codec;
pub mod config;
pub mod connection;
pub mod handler;
pub mod io;
pub mod protocol;
pub mod runtime;

mod utils;
pub(crate) use utils::ensure;
