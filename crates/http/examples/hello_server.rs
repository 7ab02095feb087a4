use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use micro_h1::config::Http1Config;
use micro_h1::handler::{HandlerFactory, ResponseChannel, ServerExchangeHandler, make_handler};
use micro_h1::protocol::{EntityDetails, Headers, HttpError, RequestHead, ResponseHead};
use micro_h1::runtime::serve;
use tokio::net::TcpListener;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// Streams a counted number of lines as a chunk coded body.
struct Countdown {
    remaining: usize,
    line: Bytes,
}

impl Countdown {
    fn new(from: usize) -> Self {
        Self { remaining: from, line: Bytes::new() }
    }
}

impl ServerExchangeHandler for Countdown {
    fn handle_request(
        &mut self,
        _head: RequestHead,
        _entity: Option<&EntityDetails>,
        channel: &mut dyn ResponseChannel,
    ) -> Result<(), HttpError> {
        let entity = EntityDetails::streaming().content_type("text/plain");
        channel.send_response(ResponseHead::new(StatusCode::OK), Some(entity))
    }

    fn available(&self) -> usize {
        self.line.len() + self.remaining
    }

    fn produce(&mut self, channel: &mut dyn ResponseChannel) -> Result<(), HttpError> {
        loop {
            if self.line.is_empty() {
                if self.remaining == 0 {
                    return channel.end_stream(None);
                }
                self.line = Bytes::from(format!("{}\r\n", self.remaining));
                self.remaining -= 1;
            }
            let n = channel.write(&self.line)?;
            if n == 0 {
                return Ok(());
            }
            let _ = self.line.split_to(n);
        }
    }

    fn stream_end(&mut self, _trailers: Option<&Headers>, channel: &mut dyn ResponseChannel) -> Result<(), HttpError> {
        self.produce(channel)
    }
}

struct Routes {
    hello: Arc<dyn HandlerFactory>,
}

impl HandlerFactory for Routes {
    fn create(&self, head: &RequestHead) -> Option<Box<dyn ServerExchangeHandler>> {
        match head.uri().path() {
            "/countdown" => Some(Box::new(Countdown::new(10))),
            path if path.starts_with("/hello") => self.hello.create(head),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let listener = match TcpListener::bind("127.0.0.1:8080").await {
        Ok(listener) => listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    let hello = make_handler(|request: &RequestHead, body: Bytes| {
        info!(path = request.uri().path(), body_len = body.len(), "hello");
        Ok::<_, HttpError>((ResponseHead::new(StatusCode::OK), Bytes::from_static(b"Hello World!\r\n")))
    });
    let routes = Routes { hello: Arc::new(hello) };

    let config = Http1Config::builder().chunk_size_hint(4 * 1024).build();
    serve(listener, config, Arc::new(routes)).await;
}
