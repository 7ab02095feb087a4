//! Growable byte store backing the session buffers.
//!
//! The buffer is written in [`BufferMode::Input`] and read in [`BufferMode::Output`].
//! `BytesMut` already tracks separate read and write positions, so switching modes
//! never copies; switching to input mode reclaims consumed space in front of the
//! unread bytes before new data is appended.

use bytes::BytesMut;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    Input,
    Output,
}

#[derive(Debug)]
pub struct ExpandableBuffer {
    buf: BytesMut,
    mode: BufferMode,
    capacity: usize,
    max_capacity: usize,
}

impl ExpandableBuffer {
    pub fn new(capacity: usize, max_capacity: usize) -> Self {
        Self { buf: BytesMut::with_capacity(capacity), mode: BufferMode::Input, capacity, max_capacity: max_capacity.max(capacity) }
    }

    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    pub fn set_input_mode(&mut self) {
        if self.mode == BufferMode::Output {
            self.mode = BufferMode::Input;
            let spare = self.capacity.saturating_sub(self.buf.len());
            self.buf.reserve(spare);
        }
    }

    pub fn set_output_mode(&mut self) {
        self.mode = BufferMode::Output;
    }

    pub fn has_data(&self) -> bool {
        !self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Logical capacity; the backing allocation may be larger.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Room left before the logical capacity is reached.
    pub fn free(&self) -> usize {
        self.capacity.saturating_sub(self.buf.len())
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.mode = BufferMode::Input;
    }

    /// Doubles the capacity, capped at the maximum. Returns false when already at the cap.
    pub fn expand(&mut self) -> bool {
        let new_capacity = self.capacity.saturating_mul(2).min(self.max_capacity);
        if new_capacity <= self.capacity {
            return false;
        }
        self.capacity = new_capacity;
        self.buf.reserve(new_capacity - self.buf.len());
        true
    }

    /// Grows until at least `required` bytes fit, within the maximum capacity.
    pub fn ensure_capacity(&mut self, required: usize) -> bool {
        while self.capacity < required {
            if !self.expand() {
                return false;
            }
        }
        true
    }

    /// Like [`ensure_capacity`](Self::ensure_capacity) but rounds up to the next KiB.
    pub fn ensure_adjusted_capacity(&mut self, required: usize) -> bool {
        let adjusted = required.div_ceil(1024).saturating_mul(1024);
        self.ensure_capacity(adjusted)
    }

    pub(crate) fn bytes(&self) -> &BytesMut {
        &self.buf
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}
