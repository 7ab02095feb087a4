use std::io::{Read, Write};
use std::ops::BitOr;
use std::time::Duration;

/// Readiness the connection is interested in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventMask(u8);

impl EventMask {
    pub const NONE: EventMask = EventMask(0);
    pub const READ: EventMask = EventMask(1);
    pub const WRITE: EventMask = EventMask(1 << 1);

    pub fn contains(self, other: EventMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: EventMask) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: EventMask) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for EventMask {
    type Output = EventMask;

    fn bitor(self, rhs: EventMask) -> EventMask {
        EventMask(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    /// Close once pending output has been written.
    Graceful,
    Immediate,
}

/// A non-blocking byte channel plus the reactor registration of one connection.
///
/// `read` and `write` must never block: `WouldBlock` means no progress right now
/// and a zero length read means the peer closed its side. The reactor polls
/// readiness according to [`event_mask`](IoSession::event_mask) and calls the
/// duplexer back.
pub trait IoSession: Read + Write {
    fn event_mask(&self) -> EventMask;

    fn set_event(&mut self, event: EventMask);

    fn clear_event(&mut self, event: EventMask);

    fn socket_timeout(&self) -> Option<Duration>;

    fn set_socket_timeout(&mut self, timeout: Option<Duration>);

    fn close(&mut self, mode: CloseMode);

    fn is_open(&self) -> bool;
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::io::{self, ErrorKind, Read, Write};
    use std::time::Duration;

    use super::{CloseMode, EventMask, IoSession};

    /// Scripted in-memory session. Reads drain `input`, then block, or report end of
    /// stream once `eof` is set. Writes are collected in `output`.
    #[derive(Debug, Default)]
    pub(crate) struct MockSession {
        pub(crate) input: VecDeque<u8>,
        pub(crate) eof: bool,
        pub(crate) output: Vec<u8>,
        pub(crate) events: EventMask,
        pub(crate) timeout: Option<Duration>,
        pub(crate) closed: Option<CloseMode>,
    }

    impl MockSession {
        pub(crate) fn feed(&mut self, data: &str) {
            self.input.extend(data.as_bytes());
        }

        pub(crate) fn take_output(&mut self) -> String {
            String::from_utf8(std::mem::take(&mut self.output)).unwrap()
        }
    }

    impl Read for MockSession {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.input.is_empty() {
                return if self.eof { Ok(0) } else { Err(ErrorKind::WouldBlock.into()) };
            }
            let n = buf.len().min(self.input.len());
            for (dst, src) in buf.iter_mut().zip(self.input.drain(..n)) {
                *dst = src;
            }
            Ok(n)
        }
    }

    impl Write for MockSession {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.closed.is_some() {
                return Err(ErrorKind::BrokenPipe.into());
            }
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl IoSession for MockSession {
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
}
