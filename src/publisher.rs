//! The publish-side parser (spec §4.4): a fire-and-forget, queued stream of
//! framed messages with no replies and no inbound reads.

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Condvar, Mutex};

use bytes::{BufMut, BytesMut};

use crate::pool::BufferPool;
use crate::value::Value;
use crate::{Error, MessageParser, Signature, MAX_SECTION_LEN, PUBLISH_QUEUE_CAPACITY};

/// The top byte of a publish frame's header, marking it as a publish rather
/// than a call or reply (spec §6).
const PUBLISH_HEADER_TAG: u32 = 1 << 24;

/// A single-procedure, queued publisher. Calls to [`Publisher::publish`]
/// serialize immediately and enqueue the framed bytes; the frame loop drains
/// the queue and writes them out in order. The queue has capacity
/// [`crate::PUBLISH_QUEUE_CAPACITY`] by default (spec §5): once full,
/// `publish` is the system's one back-pressure point and blocks until the
/// frame loop drains room.
pub struct Publisher {
    signature: Signature,
    pool: BufferPool,
    tx: Mutex<Option<SyncSender<BytesMut>>>,
    rx: Mutex<Receiver<BytesMut>>,
    outstanding: Arc<(Mutex<usize>, Condvar)>,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher").field("signature", &self.signature).finish()
    }
}

impl Publisher {
    /// Creates a publisher whose messages are encoded per `signature`, with
    /// a queue of [`crate::PUBLISH_QUEUE_CAPACITY`] outstanding frames.
    pub fn new(signature: Signature) -> Self {
        Self::with_capacity(signature, PUBLISH_QUEUE_CAPACITY)
    }

    /// As [`Publisher::new`], with an explicit queue capacity.
    pub fn with_capacity(signature: Signature, capacity: usize) -> Self {
        let (tx, rx) = mpsc::sync_channel(capacity);
        Self {
            signature,
            pool: BufferPool::new(),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
            outstanding: Arc::new((Mutex::new(0), Condvar::new())),
        }
    }

    /// Serializes `args` per this publisher's signature and enqueues the
    /// framed message, blocking until the queue has room if it is currently
    /// full (spec §5's back-pressure point).
    ///
    /// Fails locally, before touching the queue, on any encoding error;
    /// fails with [`Error::Stopped`] if [`MessageParser::stop`] has closed
    /// the queue.
    pub fn publish(&self, args: &[Value]) -> Result<(), Error> {
        let mut body = self.pool.get();
        if let Err(e) = self.signature.to_binary(&mut body, args) {
            self.pool.put(body);
            return Err(e);
        }
        if body.len() > MAX_SECTION_LEN {
            let len = body.len();
            self.pool.put(body);
            return Err(Error::SectionTooLarge(len));
        }

        let header = PUBLISH_HEADER_TAG | (body.len() as u32 & 0x00FF_FFFF);
        let mut frame = BytesMut::with_capacity(4 + body.len());
        frame.put_u32_le(header);
        frame.extend_from_slice(&body);
        self.pool.put(body);

        *self.outstanding.0.lock().expect("outstanding mutex poisoned") += 1;

        let sent = match self.tx.lock().expect("publish queue sender mutex poisoned").as_ref() {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        };
        if !sent {
            let mut count = self.outstanding.0.lock().expect("outstanding mutex poisoned");
            *count -= 1;
            self.outstanding.1.notify_all();
            return Err(Error::Stopped);
        }
        Ok(())
    }

    /// Blocks until every message enqueued so far has been handed to the
    /// transport (spec §5's `wait_for_publish_complete`). Messages enqueued
    /// concurrently with this call may or may not be waited for.
    pub fn wait_for_publish_complete(&self) {
        let (lock, cvar) = &*self.outstanding;
        let guard = lock.lock().expect("outstanding mutex poisoned");
        let _unused = cvar.wait_while(guard, |count| *count > 0).expect("outstanding mutex poisoned");
    }
}

impl MessageParser for Publisher {
    fn parse_message(&self, _message: &[u8]) -> bool {
        // A publisher never reads; the manager only ever calls this for a
        // non-zero `message_len`, which this parser never reports.
        true
    }

    fn message_len(&self) -> usize {
        0
    }

    fn send_message(&self, sink: &mut BytesMut) -> bool {
        let next = self.rx.lock().expect("publish queue mutex poisoned").recv();
        match next {
            Ok(frame) => {
                sink.extend_from_slice(&frame);
                let mut count = self.outstanding.0.lock().expect("outstanding mutex poisoned");
                *count -= 1;
                self.outstanding.1.notify_all();
                true
            }
            Err(_) => false,
        }
    }

    fn is_requester(&self) -> bool {
        true
    }

    fn stop(&self) {
        // Dropping the sender, rather than replacing the receiver, is what
        // unblocks a `send_message` already parked in `recv()` on an empty
        // queue: `recv()` only ever needs the receiver's own lock, which
        // `stop()` must not touch while that call holds it (spec §4.2/§4.4).
        self.tx.lock().expect("publish queue sender mutex poisoned").take();
        self.outstanding.1.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_then_drain_matches_spec_scenario() {
        // header 0x10000010 (publish tag, 16-byte body)
        let publisher = Publisher::new(Signature::parse("is").unwrap());
        publisher.publish(&[Value::Int(7), Value::Str("apples".into())]).unwrap();

        let mut sink = BytesMut::new();
        assert!(publisher.send_message(&mut sink));
        let header = u32::from_le_bytes(sink[0..4].try_into().unwrap());
        assert_eq!(header, PUBLISH_HEADER_TAG | 16);
        assert_eq!(sink.len(), 4 + 16);
    }

    #[test]
    fn test_wait_for_publish_complete_returns_after_drain() {
        let publisher = Publisher::new(Signature::parse("i").unwrap());
        publisher.publish(&[Value::Int(1)]).unwrap();

        let mut sink = BytesMut::new();
        assert!(publisher.send_message(&mut sink));
        publisher.wait_for_publish_complete();
    }

    #[test]
    fn test_publish_blocks_until_drained_when_queue_full() {
        let publisher = Arc::new(Publisher::with_capacity(Signature::parse("i").unwrap(), 1));
        publisher.publish(&[Value::Int(1)]).unwrap();

        let publisher2 = Arc::clone(&publisher);
        let handle = std::thread::spawn(move || {
            // Would block forever if the queue didn't drain.
            publisher2.publish(&[Value::Int(2)]).unwrap();
        });

        let mut sink = BytesMut::new();
        assert!(publisher.send_message(&mut sink));
        handle.join().unwrap();
    }

    #[test]
    fn test_encoding_error_does_not_touch_queue() {
        let publisher = Publisher::with_capacity(Signature::parse("i").unwrap(), 1);
        let err = publisher.publish(&[Value::Str("wrong".into())]).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        // The queue is still empty, so a real publish should still fit.
        assert!(publisher.publish(&[Value::Int(1)]).is_ok());
    }

    #[test]
    fn test_stop_makes_send_message_return_false() {
        let publisher = Publisher::new(Signature::parse("i").unwrap());
        publisher.stop();
        let mut sink = BytesMut::new();
        assert!(!publisher.send_message(&mut sink));
    }

    /// A stream that never has bytes to offer; the publisher being a
    /// requester means the manager calls `send_message` before ever
    /// touching it, so this only has to satisfy the trait bounds.
    struct NullStream;

    impl std::io::Read for NullStream {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }
    }

    impl std::io::Write for NullStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_stop_data_flow_joins_manager_blocked_in_send_message() {
        // Regression test for the deadlock where `stop` re-locked the
        // receiver that `send_message` was already blocked holding: an empty
        // queue parks the manager's worker thread inside `recv()` before it
        // ever writes anything, and `stop_data_flow` must still be able to
        // unblock it from another thread.
        let publisher = Arc::new(Publisher::new(Signature::parse("i").unwrap()));
        let manager = crate::MessageManager::new(NullStream, publisher);
        let handle = manager.handle();
        let worker = manager.start_non_blocking();

        std::thread::sleep(std::time::Duration::from_millis(20));
        handle.stop_data_flow();
        worker.join().expect("worker thread must join once stop_data_flow unblocks send_message");
    }
}
