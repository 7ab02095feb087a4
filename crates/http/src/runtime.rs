//! Runs connections on tokio.
//!
//! [`TcpSession`] adapts a [`TcpStream`] to [`IoSession`] through the non-blocking
//! `try_read`/`try_write` calls, and [`drive`] is the reactor loop: it waits for the
//! readiness the duplexer asked for, for queued commands and for the socket timeout,
//! and dispatches each to the matching callback.

use std::future::{pending, poll_fn};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, Interest, Ready};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, error, info, warn};

use crate::config::Http1Config;
use crate::connection::{
    ClientPolicy, CloseMode, Command, CommandSender, EventMask, Http1StreamDuplexer, IoSession, ServerPolicy,
    StreamPolicy,
};
use crate::handler::HandlerFactory;
use crate::protocol::HttpError;

/// A tokio TCP stream seen as a non-blocking session.
#[derive(Debug)]
pub struct TcpSession {
    stream: Arc<TcpStream>,
    events: EventMask,
    timeout: Option<Duration>,
    closed: Option<CloseMode>,
}

impl TcpSession {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream: Arc::new(stream), events: EventMask::NONE, timeout: None, closed: None }
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    fn interest(&self) -> Option<Interest> {
        match (self.events.contains(EventMask::READ), self.events.contains(EventMask::WRITE)) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }
}

impl Read for TcpSession {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.try_read(buf)
    }
}

impl Write for TcpSession {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.try_write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl IoSession for TcpSession {
    fn event_mask(&self) -> EventMask {
        self.events
    }

    fn set_event(&mut self, event: EventMask) {
        self.events.insert(event);
    }

    fn clear_event(&mut self, event: EventMask) {
        self.events.remove(event);
    }

    fn socket_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn set_socket_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    fn close(&mut self, mode: CloseMode) {
        self.closed.get_or_insert(mode);
    }

    fn is_open(&self) -> bool {
        self.closed.is_none()
    }
}

enum Event {
    Ready(io::Result<Ready>),
    Command(Command),
    Timeout,
}

async fn ready(stream: &TcpStream, interest: Option<Interest>) -> io::Result<Ready> {
    match interest {
        Some(interest) => stream.ready(interest).await,
        None => pending().await,
    }
}

async fn expire(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => pending().await,
    }
}

/// Runs a connection until it is closed.
pub async fn drive<P: StreamPolicy>(mut duplexer: Http1StreamDuplexer<TcpSession, P>) {
    let stream = Arc::clone(&duplexer.session().stream);
    duplexer.on_connect(&[]);

    while duplexer.session().is_open() {
        let interest = duplexer.session().interest();
        let timeout = duplexer.session().socket_timeout();

        let event = tokio::select! {
            result = ready(&stream, interest) => Event::Ready(result),
            command = poll_fn(|cx| duplexer.poll_command(cx)) => Event::Command(command),
            () = expire(timeout) => Event::Timeout,
        };

        match event {
            Event::Ready(Ok(ready)) => {
                if ready.is_readable() || ready.is_read_closed() {
                    duplexer.on_input();
                }
                if ready.is_writable() && duplexer.session().is_open() {
                    duplexer.on_output();
                }
            }
            Event::Ready(Err(e)) => duplexer.on_exception(HttpError::from(e)),
            Event::Command(command) => duplexer.handle_command(command),
            Event::Timeout => duplexer.on_timeout(),
        }
    }

    let mode = duplexer.session().closed;
    duplexer.on_disconnect();
    drop(duplexer);

    if mode == Some(CloseMode::Graceful)
        && let Ok(mut stream) = Arc::try_unwrap(stream)
        && let Err(e) = stream.shutdown().await
    {
        debug!(cause = %e, "shutdown of write half failed");
    }
}

/// Accepts connections forever, answering requests with handlers from `factory`.
pub async fn serve(listener: TcpListener, config: Http1Config, factory: Arc<dyn HandlerFactory>) {
    match listener.local_addr() {
        Ok(addr) => info!(%addr, "start listening"),
        Err(e) => warn!(cause = %e, "listening on unknown address"),
    }
    loop {
        let (tcp_stream, remote_addr) = match listener.accept().await {
            Ok(stream_and_addr) => stream_and_addr,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };
        if let Err(e) = tcp_stream.set_nodelay(true) {
            error!(cause = %e, "failed to set TCP_NODELAY");
        }

        let duplexer = Http1StreamDuplexer::new(
            TcpSession::new(tcp_stream),
            config.clone(),
            ServerPolicy::new(Arc::clone(&factory)),
        );
        tokio::spawn(async move {
            debug!(%remote_addr, "connection accepted");
            drive(duplexer).await;
            debug!(%remote_addr, "connection finished");
        });
    }
}

/// Opens a client connection and runs it in the background.
///
/// Exchanges are submitted through the returned sender; dropping every sender does not
/// close the connection, [`CommandSender::shutdown`] does.
pub async fn connect<A: ToSocketAddrs>(addr: A, config: Http1Config) -> io::Result<CommandSender> {
    let tcp_stream = TcpStream::connect(addr).await?;
    tcp_stream.set_nodelay(true)?;
    let duplexer = Http1StreamDuplexer::new(TcpSession::new(tcp_stream), config, ClientPolicy::new());
    let sender = duplexer.sender();
    tokio::spawn(drive(duplexer));
    Ok(sender)
}
