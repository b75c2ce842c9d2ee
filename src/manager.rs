//! The framed duplex message manager (spec §4.2): owns the transport and
//! alternates between reading exactly the number of bytes a parser asks
//! for and writing back whatever the parser wants to send.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::BytesMut;

use crate::MAX_SECTION_LEN;

/// The capability set a [`MessageManager`] drives. Three concrete kinds
/// implement it: [`crate::RpcClient`], [`crate::Publisher`] and
/// [`crate::Subscriber`].
///
/// Realised as a trait object rather than a tagged enum (spec §9 "dispatch
/// by interface" note) so a new parser kind can be added without touching
/// the manager.
pub trait MessageParser: Send + Sync {
    /// Parses one fully-received section. Returns `false` on a decoding
    /// mismatch (§7): the manager treats that as fatal and stops the flow.
    fn parse_message(&self, message: &[u8]) -> bool;

    /// The number of bytes the manager should read next before calling
    /// [`MessageParser::parse_message`] again. `0` means "nothing to wait
    /// for" — the manager instead calls [`MessageParser::send_message`]
    /// immediately and loops.
    fn message_len(&self) -> usize;

    /// Produces outbound bytes, appending them to `sink`. Returning `false`
    /// is fatal; returning with `sink` left empty is not — it just means
    /// there is nothing to send this iteration.
    fn send_message(&self, sink: &mut BytesMut) -> bool;

    /// Whether this parser must send the first frame after the transport
    /// opens, before ever reading.
    fn is_requester(&self) -> bool;

    /// Unblocks any caller suspended waiting on this parser's single send
    /// slot and marks it as stopped. Called only via
    /// [`ManagerHandle::stop_data_flow`], never automatically when the
    /// flow ends on its own (clean EOF or a fatal error already unwinds
    /// without anyone being blocked waiting to send).
    fn stop(&self);
}

/// A cheap, cloneable handle to a running or not-yet-started
/// [`MessageManager`], usable from any thread to request a cooperative
/// shutdown.
#[derive(Clone)]
pub struct ManagerHandle {
    parser: Arc<dyn MessageParser>,
    stop: Arc<AtomicBool>,
}

impl std::fmt::Debug for ManagerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerHandle").field("stopped", &self.is_stopped()).finish()
    }
}

impl ManagerHandle {
    /// Sets the stop flag and calls the parser's [`MessageParser::stop`],
    /// unblocking anything suspended on its send slot (spec §4.2).
    pub fn stop_data_flow(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.parser.stop();
    }

    /// Whether a stop has been requested or the flow has already ended.
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Owns a bidirectional byte stream and a [`MessageParser`], and alternates
/// reads and writes between them until one side fails or the stream
/// reaches a clean end.
pub struct MessageManager<S> {
    stream: S,
    parser: Arc<dyn MessageParser>,
    stop: Arc<AtomicBool>,
}

impl<S> std::fmt::Debug for MessageManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageManager").field("stopped", &self.stop.load(Ordering::SeqCst)).finish()
    }
}

impl<S> MessageManager<S>
where
    S: Read + Write,
{
    /// Constructs a manager over an already-open stream and a parser.
    pub fn new(stream: S, parser: Arc<dyn MessageParser>) -> Self {
        Self { stream, parser, stop: Arc::new(AtomicBool::new(false)) }
    }

    /// Returns a handle that can request a shutdown of this manager from
    /// any thread, including before the flow has started.
    pub fn handle(&self) -> ManagerHandle {
        ManagerHandle { parser: Arc::clone(&self.parser), stop: Arc::clone(&self.stop) }
    }

    /// Runs the data flow on the calling thread, returning once it stops.
    /// The transport is dropped (and thus closed, for transports that close
    /// on drop) when this returns.
    pub fn start_blocking(mut self) {
        self.run();
    }

    /// Runs the data flow on a dedicated worker thread. Behavior is
    /// identical to [`MessageManager::start_blocking`]; only the executing
    /// thread differs.
    pub fn start_non_blocking(mut self) -> JoinHandle<()>
    where
        S: Send + 'static,
    {
        std::thread::spawn(move || self.run())
    }

    fn run(&mut self) {
        if self.parser.is_requester() {
            let mut buf = BytesMut::new();
            if !self.parser.send_message(&mut buf) {
                tracing::error!("message manager: parser failed to produce initial message");
                return;
            }
            if buf.len() > MAX_SECTION_LEN {
                tracing::error!("message manager: parser requested oversize initial message");
                return;
            }
            if buf.is_empty() {
                tracing::error!("message manager: parser is requester but initial message is empty");
                return;
            }
            if let Err(e) = self.stream.write_all(&buf) {
                tracing::error!(error = %e, "message manager: error writing initial message");
                return;
            }
        }

        self.data_flow();
    }

    fn data_flow(&mut self) {
        let mut message = Vec::new();
        let mut reply = BytesMut::new();
        let mut message_len = self.parser.message_len();

        while !self.stop.load(Ordering::SeqCst) {
            if message_len > MAX_SECTION_LEN {
                tracing::error!(message_len, "message manager: parser requesting oversize read");
                break;
            }

            if message_len == 0 {
                if !self.send_reply(&mut reply) {
                    break;
                }
            } else {
                message.resize(message_len, 0);
                match self.stream.read_exact(&mut message) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                    Err(e) => {
                        tracing::error!(error = %e, "message manager: error reading bytes");
                        break;
                    }
                }

                if !self.parser.parse_message(&message) {
                    tracing::error!("message manager: parser failed to parse message, stopping flow");
                    break;
                }

                if !self.send_reply(&mut reply) {
                    break;
                }
            }

            message_len = self.parser.message_len();
        }

        self.stop.store(true, Ordering::SeqCst);
    }

    /// Calls `send_message`, writes what it produces (if anything), and
    /// returns whether the flow should continue.
    fn send_reply(&mut self, reply: &mut BytesMut) -> bool {
        reply.clear();
        if !self.parser.send_message(reply) {
            tracing::error!("message manager: parser failed to send message, stopping flow");
            return false;
        }

        if reply.len() > MAX_SECTION_LEN {
            tracing::error!(len = reply.len(), "message manager: parser requested oversize reply");
            return false;
        }

        if !reply.is_empty() {
            if let Err(e) = self.stream.write_all(reply) {
                tracing::error!(error = %e, "message manager: error writing bytes");
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// An in-memory duplex stream: reads come from a fixed buffer, writes
    /// are appended to a shared log for assertions.
    struct MockStream {
        input: Cursor<Vec<u8>>,
        output: Arc<Mutex<Vec<u8>>>,
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// A parser that echoes a fixed number of zero-length reads then stops.
    struct NullParser;

    impl MessageParser for NullParser {
        fn parse_message(&self, _message: &[u8]) -> bool {
            true
        }
        fn message_len(&self) -> usize {
            0
        }
        fn send_message(&self, _sink: &mut BytesMut) -> bool {
            // Nothing to send; but to avoid spinning forever in the test we
            // rely on the external stop handle instead.
            true
        }
        fn is_requester(&self) -> bool {
            false
        }
        fn stop(&self) {}
    }

    #[test]
    fn test_handle_stops_before_run() {
        let output = Arc::new(Mutex::new(Vec::new()));
        let stream = MockStream { input: Cursor::new(Vec::new()), output: Arc::clone(&output) };
        let manager = MessageManager::new(stream, Arc::new(NullParser));
        let handle = manager.handle();
        handle.stop_data_flow();
        assert!(handle.is_stopped());
        // Running after a stop request returns almost immediately since the
        // loop condition is checked before the first read/send.
        manager.start_blocking();
    }

    #[test]
    fn test_requester_aborts_on_empty_initial_message() {
        struct EmptyRequester;
        impl MessageParser for EmptyRequester {
            fn parse_message(&self, _m: &[u8]) -> bool {
                true
            }
            fn message_len(&self) -> usize {
                0
            }
            fn send_message(&self, _sink: &mut BytesMut) -> bool {
                true // produces nothing
            }
            fn is_requester(&self) -> bool {
                true
            }
            fn stop(&self) {}
        }

        let output = Arc::new(Mutex::new(Vec::new()));
        let stream = MockStream { input: Cursor::new(Vec::new()), output: Arc::clone(&output) };
        let manager = MessageManager::new(stream, Arc::new(EmptyRequester));
        manager.start_blocking();
        assert!(output.lock().unwrap().is_empty());
    }

    #[test]
    fn test_clean_eof_stops_quietly() {
        let output = Arc::new(Mutex::new(Vec::new()));
        struct WantsOneByte;
        impl MessageParser for WantsOneByte {
            fn parse_message(&self, _m: &[u8]) -> bool {
                true
            }
            fn message_len(&self) -> usize {
                1
            }
            fn send_message(&self, _sink: &mut BytesMut) -> bool {
                true
            }
            fn is_requester(&self) -> bool {
                false
            }
            fn stop(&self) {}
        }
        let stream = MockStream { input: Cursor::new(Vec::new()), output: Arc::clone(&output) };
        let manager = MessageManager::new(stream, Arc::new(WantsOneByte));
        manager.start_blocking();
    }
}
