//! Cross thread hand-off into the thread driving a connection.
//!
//! Every mutation of connection state happens on the driving thread. Other
//! threads (or handlers that finish work later) talk to it by queueing a
//! [`Command`] through a [`CommandSender`]; the duplexer drains the queue from
//! its entry points and [`poll_command`](super::Http1StreamDuplexer::poll_command)
//! lets an async driver wait on it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};

use crate::connection::CloseMode;
use crate::handler::ClientExchangeHandler;
use crate::protocol::HttpError;

/// Identifies one exchange on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeId(u64);

impl ExchangeId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ex-{:06}", self.0)
    }
}

/// A client exchange waiting to be put on the wire.
pub struct Execution {
    pub(crate) id: ExchangeId,
    pub(crate) handler: Box<dyn ClientExchangeHandler>,
    pub(crate) pipelined: bool,
}

impl Execution {
    pub fn id(&self) -> ExchangeId {
        self.id
    }

    /// True when the request may be sent before earlier responses have arrived.
    pub fn is_pipelined(&self) -> bool {
        self.pipelined
    }

    /// Reports that the exchange never made it onto the connection.
    pub(crate) fn reject(mut self, cause: &HttpError) {
        self.handler.failed(cause);
        self.handler.release_resources();
    }

    /// Drops an exchange cancelled before it was started.
    pub(crate) fn cancel(mut self) {
        self.handler.cancel();
        self.handler.release_resources();
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution").field("id", &self.id).field("pipelined", &self.pipelined).finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub(crate) enum Command {
    Execute(Execution),
    Cancel(ExchangeId),
    RequestOutput,
    UpdateCapacity { id: ExchangeId, increment: usize },
    Shutdown(CloseMode),
}

/// Queues commands for a connection. Cheap to clone and usable from any thread.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: UnboundedSender<Command>,
    ids: Arc<AtomicU64>,
}

impl CommandSender {
    pub(crate) fn channel() -> (CommandSender, UnboundedReceiver<Command>) {
        let (tx, rx) = unbounded();
        (CommandSender { tx, ids: Arc::new(AtomicU64::new(1)) }, rx)
    }

    pub(crate) fn next_id(&self) -> ExchangeId {
        ExchangeId(self.ids.fetch_add(1, Ordering::Relaxed))
    }

    fn send(&self, command: Command) -> Result<(), Command> {
        self.tx.unbounded_send(command).map_err(|e| e.into_inner())
    }

    /// Submits a client exchange. `pipelined` lets the request go out while earlier
    /// responses are still pending.
    ///
    /// When the connection is gone the handler is failed and released right away.
    pub fn execute(&self, handler: Box<dyn ClientExchangeHandler>, pipelined: bool) -> Result<ExchangeId, HttpError> {
        let id = self.next_id();
        match self.send(Command::Execute(Execution { id, handler, pipelined })) {
            Ok(()) => Ok(id),
            Err(command) => {
                let cause = HttpError::not_executed("connection is closed");
                if let Command::Execute(execution) = command {
                    execution.reject(&cause);
                }
                Err(cause)
            }
        }
    }

    /// Cancels an exchange. Cancelling one that is already on the wire shuts the connection down.
    pub fn cancel(&self, id: ExchangeId) -> bool {
        self.send(Command::Cancel(id)).is_ok()
    }

    pub fn request_output(&self) -> bool {
        self.send(Command::RequestOutput).is_ok()
    }

    pub fn shutdown(&self, mode: CloseMode) -> bool {
        self.send(Command::Shutdown(mode)).is_ok()
    }

    pub(crate) fn update_capacity(&self, id: ExchangeId, increment: usize) -> bool {
        self.send(Command::UpdateCapacity { id, increment }).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Control handle of one exchange.
///
/// Lets a slow consumer grant more input capacity once it caught up, and lets a
/// producer that was not ready ask to be polled again.
#[derive(Debug, Clone)]
pub struct CapacityChannel {
    sender: CommandSender,
    id: ExchangeId,
}

impl CapacityChannel {
    pub(crate) fn new(sender: CommandSender, id: ExchangeId) -> Self {
        Self { sender, id }
    }

    pub fn exchange_id(&self) -> ExchangeId {
        self.id
    }

    /// Allows `increment` more body bytes to be delivered.
    pub fn update(&self, increment: usize) {
        self.sender.update_capacity(self.id, increment);
    }

    pub fn request_output(&self) {
        self.sender.request_output();
    }

    pub fn cancel(&self) {
        self.sender.cancel(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{FutureExt, StreamExt};

    use crate::handler::RequestChannel;

    struct Noop {
        failed: Arc<AtomicU64>,
    }

    impl ClientExchangeHandler for Noop {
        fn produce_request(&mut self, _channel: &mut dyn RequestChannel) -> Result<(), HttpError> {
            Ok(())
        }

        fn consume_response(
            &mut self,
            _head: crate::protocol::ResponseHead,
            _entity: Option<&crate::protocol::EntityDetails>,
        ) -> Result<(), HttpError> {
            Ok(())
        }

        fn failed(&mut self, _cause: &HttpError) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn commands_are_queued_in_order() {
        let (sender, mut rx) = CommandSender::channel();
        let failed = Arc::new(AtomicU64::new(0));

        let id = sender.execute(Box::new(Noop { failed: Arc::clone(&failed) }), false).unwrap();
        assert!(sender.cancel(id));
        CapacityChannel::new(sender.clone(), id).update(10);

        assert!(matches!(rx.next().now_or_never(), Some(Some(Command::Execute(e))) if e.id() == id));
        assert!(matches!(rx.next().now_or_never(), Some(Some(Command::Cancel(c))) if c == id));
        assert!(matches!(
            rx.next().now_or_never(),
            Some(Some(Command::UpdateCapacity { id: c, increment: 10 })) if c == id
        ));
        assert_eq!(failed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn execute_on_closed_connection_fails_handler() {
        let (sender, rx) = CommandSender::channel();
        drop(rx);
        let failed = Arc::new(AtomicU64::new(0));

        let err = sender.execute(Box::new(Noop { failed: Arc::clone(&failed) }), true).unwrap_err();
        assert!(matches!(err, HttpError::NotExecuted { .. }));
        assert_eq!(failed.load(Ordering::SeqCst), 1);
        assert!(sender.is_closed());
    }
}
