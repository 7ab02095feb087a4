/// Bytes moved across the channel in one direction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransportMetrics {
    bytes_transferred: u64,
}

impl TransportMetrics {
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    pub fn increment(&mut self, count: usize) {
        self.bytes_transferred += count as u64;
    }

    pub fn reset(&mut self) {
        self.bytes_transferred = 0;
    }
}

/// Per connection counters.
#[derive(Debug, Default, Clone)]
pub struct ConnectionMetrics {
    pub(crate) request_count: u64,
    pub(crate) response_count: u64,
    pub(crate) inbound: TransportMetrics,
    pub(crate) outbound: TransportMetrics,
}

impl ConnectionMetrics {
    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    pub fn response_count(&self) -> u64 {
        self.response_count
    }

    pub fn received_bytes(&self) -> u64 {
        self.inbound.bytes_transferred()
    }

    pub fn sent_bytes(&self) -> u64 {
        self.outbound.bytes_transferred()
    }
}
