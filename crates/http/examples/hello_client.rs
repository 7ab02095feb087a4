use bytes::BytesMut;
use futures::channel::oneshot;
use http::{Method, Uri};
use micro_h1::config::Http1Config;
use micro_h1::connection::CloseMode;
use micro_h1::handler::{ClientExchangeHandler, RequestChannel};
use micro_h1::protocol::{EntityDetails, Headers, HttpError, RequestHead, ResponseHead};
use micro_h1::runtime::connect;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

struct Fetch {
    request: Option<RequestHead>,
    body: BytesMut,
    done: Option<oneshot::Sender<Result<String, String>>>,
}

impl ClientExchangeHandler for Fetch {
    fn produce_request(&mut self, channel: &mut dyn RequestChannel) -> Result<(), HttpError> {
        match self.request.take() {
            Some(head) => channel.send_request(head, None),
            None => Ok(()),
        }
    }

    fn consume_response(&mut self, head: ResponseHead, _entity: Option<&EntityDetails>) -> Result<(), HttpError> {
        info!(status = head.status().as_u16(), "response head received");
        Ok(())
    }

    fn consume(&mut self, data: &[u8]) -> Result<(), HttpError> {
        self.body.extend_from_slice(data);
        Ok(())
    }

    fn stream_end(&mut self, _trailers: Option<&Headers>) -> Result<(), HttpError> {
        if let Some(done) = self.done.take() {
            let _ = done.send(Ok(String::from_utf8_lossy(&self.body).into_owned()));
        }
        Ok(())
    }

    fn failed(&mut self, cause: &HttpError) {
        if let Some(done) = self.done.take() {
            let _ = done.send(Err(cause.to_string()));
        }
    }
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let sender = match connect("127.0.0.1:8080", Http1Config::default()).await {
        Ok(sender) => sender,
        Err(e) => {
            error!(cause = %e, "connect error");
            return;
        }
    };

    for path in ["/hello", "/countdown"] {
        let (tx, rx) = oneshot::channel();
        let uri = Uri::builder().scheme("http").authority("127.0.0.1:8080").path_and_query(path).build();
        let uri = match uri {
            Ok(uri) => uri,
            Err(e) => {
                error!(cause = %e, "invalid uri");
                return;
            }
        };
        let fetch = Fetch { request: Some(RequestHead::new(Method::GET, uri)), body: BytesMut::new(), done: Some(tx) };
        if let Err(e) = sender.execute(Box::new(fetch), true) {
            error!(cause = %e, "execute error");
            return;
        }
        match rx.await {
            Ok(Ok(body)) => info!(path, %body, "exchange completed"),
            Ok(Err(cause)) => error!(path, %cause, "exchange failed"),
            Err(_) => error!(path, "exchange dropped"),
        }
    }
    sender.shutdown(CloseMode::Graceful);
}
