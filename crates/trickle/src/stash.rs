//! Growable stash for retrieved-but-undispatched bytes.

/// Headroom kept above the stash target when the backing buffer grows.
pub const BUFFER_HEADROOM: usize = 1024 * 1024;

/// A single owned byte buffer with a logical `used` length.
///
/// `[0, used)` holds valid undispatched data starting at stream offset
/// `byte_start`. Capacity never shrinks for the lifetime of the buffer.
#[derive(Debug)]
pub struct StashBuffer {
    buf: Vec<u8>,
    used: usize,
    byte_start: u64,
}

impl StashBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            used: 0,
            byte_start: 0,
        }
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn byte_start(&self) -> u64 {
        self.byte_start
    }

    pub fn set_byte_start(&mut self, offset: u64) {
        self.byte_start = offset;
    }

    /// Absolute offset one past the last stashed byte.
    pub fn byte_end(&self) -> u64 {
        self.byte_start + self.used as u64
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.used]
    }

    /// Reallocate to exactly `capacity` bytes if that is larger than the
    /// current capacity. Stashed bytes are copied into the new allocation
    /// and the old one is dropped.
    pub fn ensure_capacity(&mut self, capacity: usize) -> bool {
        if capacity <= self.buf.len() {
            return false;
        }
        let mut grown = vec![0; capacity];
        grown[..self.used].copy_from_slice(&self.buf[..self.used]);
        self.buf = grown;
        true
    }

    /// Append bytes after the stashed content, growing exactly as needed when
    /// the caller has not reserved room.
    pub fn append(&mut self, data: &[u8]) {
        let end = self.used + data.len();
        if end > self.buf.len() {
            self.ensure_capacity(end);
        }
        self.buf[self.used..end].copy_from_slice(data);
        self.used = end;
    }

    /// Discard the first `count` stashed bytes and move the rest to the front.
    pub fn consume(&mut self, count: usize) {
        let count = count.min(self.used);
        if count == 0 {
            return;
        }
        self.buf.copy_within(count..self.used, 0);
        self.used -= count;
        self.byte_start += count as u64;
    }

    /// Forget all stashed bytes, keeping the allocation.
    pub fn clear(&mut self) {
        self.used = 0;
        self.byte_start = 0;
    }
}

/// Capacity to grow to so that `expected` bytes fit.
///
/// The stash target is doubled until it plus [`BUFFER_HEADROOM`] covers
/// `expected`, then the headroom is added on top.
pub fn expanded_capacity(stash_size: usize, expected: usize) -> usize {
    let mut size = stash_size.max(1);
    while size + BUFFER_HEADROOM < expected {
        size *= 2;
    }
    size + BUFFER_HEADROOM
}
