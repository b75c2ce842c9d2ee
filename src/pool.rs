//! A small free-list of reusable byte buffers (spec §9 "pool of reusable
//! buffers" design note).
//!
//! The original implementation keeps a `sync.Pool` of `*bytes.Buffer`
//! behind each parser that serializes outgoing data. `sync.Pool` has no
//! direct Rust equivalent (it is tied to the garbage collector, which
//! decides when to evict entries), so this is a plain mutex-guarded
//! free-list of [`BytesMut`] buffers instead — deterministic, and more than
//! adequate below the "a few thousand calls per second" the design note
//! calls out as the performance floor.

use std::sync::Mutex;

use bytes::BytesMut;

/// A bounded-in-practice, unbounded-in-capacity free-list of buffers.
///
/// `get` returns a cleared buffer — either one reclaimed via [`BufferPool::put`]
/// or a freshly allocated one. Buffers are exclusively owned between `get`
/// and `put`, matching the "exclusively owned" shared-resource policy of
/// spec §5.
#[derive(Debug, Default)]
pub struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
}

impl BufferPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self { free: Mutex::new(Vec::new()) }
    }

    /// Returns a cleared buffer, reusing one from the free-list if
    /// available.
    pub fn get(&self) -> BytesMut {
        let mut buf = self
            .free
            .lock()
            .expect("buffer pool mutex poisoned")
            .pop()
            .unwrap_or_default();
        buf.clear();
        buf
    }

    /// Returns `buf` to the free-list for reuse.
    pub fn put(&self, buf: BytesMut) {
        self.free.lock().expect("buffer pool mutex poisoned").push(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_is_cleared() {
        let pool = BufferPool::new();
        let mut buf = pool.get();
        buf.extend_from_slice(b"hello");
        pool.put(buf);

        let buf2 = pool.get();
        assert!(buf2.is_empty());
    }

    #[test]
    fn test_reuses_capacity() {
        let pool = BufferPool::new();
        let mut buf = pool.get();
        buf.extend_from_slice(&[0u8; 256]);
        let cap = buf.capacity();
        pool.put(buf);

        let buf2 = pool.get();
        assert!(buf2.capacity() >= cap);
    }
}
