//! The subscribe-side parser (spec §4.5): the receiving half of a publish
//! stream. Never sends; carries exactly one signature.

use std::io::Cursor;
use std::sync::Mutex;

use bytes::BytesMut;

use crate::value::Value;
use crate::{MessageParser, Signature};

/// Framing state of the message currently being read, mirroring
/// [`crate::client::RpcClient`]'s state machine but with no reply leg.
#[derive(Debug, Clone, Copy)]
enum Section {
    Header,
    Body(usize),
}

struct SubscriberState {
    section: Section,
    success: bool,
}

/// The callback invoked once per received message, as `(success, decoded
/// values)`.
pub type SubscribeCallback = Box<dyn FnMut(bool, &[Value]) + Send>;

/// Consumes a publisher's wire stream and delivers decoded tuples to a
/// callback, in wire arrival order.
pub struct Subscriber {
    signature: Signature,
    state: Mutex<SubscriberState>,
    callback: Mutex<Option<SubscribeCallback>>,
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber").field("signature", &self.signature).finish()
    }
}

impl Subscriber {
    /// Creates a subscriber expecting every message on its stream to decode
    /// per `signature`.
    pub fn new(signature: Signature) -> Self {
        Self {
            signature,
            state: Mutex::new(SubscriberState { section: Section::Header, success: false }),
            callback: Mutex::new(None),
        }
    }

    /// Sets (or replaces) the callback invoked for each decoded message.
    pub fn set_callback(&self, callback: impl FnMut(bool, &[Value]) + Send + 'static) {
        *self.callback.lock().expect("callback mutex poisoned") = Some(Box::new(callback));
    }
}

impl MessageParser for Subscriber {
    fn parse_message(&self, message: &[u8]) -> bool {
        let mut state = self.state.lock().expect("subscriber state mutex poisoned");

        match state.section {
            Section::Header => {
                if message.len() != 4 {
                    tracing::error!(len = message.len(), "subscriber: invalid header length");
                    return false;
                }
                let raw = u32::from_le_bytes(message.try_into().expect("checked length above"));
                state.success = (raw >> 24) & 0xFF == 1;
                let body_len = (raw & 0x00FF_FFFF) as usize;

                if body_len > 0 {
                    state.section = Section::Body(body_len);
                    true
                } else {
                    let success = state.success;
                    let values = match self.signature.from_binary(&mut Cursor::new(&[][..])) {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::error!(error = %e, "subscriber: error decoding empty message");
                            return false;
                        }
                    };
                    state.section = Section::Header;
                    drop(state);
                    self.deliver(success, &values);
                    true
                }
            }
            Section::Body(len) => {
                if message.len() != len {
                    tracing::error!(len = message.len(), expected = len, "subscriber: invalid body length");
                    return false;
                }
                let success = state.success;
                let values = match self.signature.from_binary(&mut Cursor::new(message)) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::error!(error = %e, "subscriber: error decoding message");
                        return false;
                    }
                };
                state.section = Section::Header;
                drop(state);
                self.deliver(success, &values);
                true
            }
        }
    }

    fn message_len(&self) -> usize {
        match self.state.lock().expect("subscriber state mutex poisoned").section {
            Section::Header => 4,
            Section::Body(len) => len,
        }
    }

    fn send_message(&self, _sink: &mut BytesMut) -> bool {
        true
    }

    fn is_requester(&self) -> bool {
        false
    }

    fn stop(&self) {}
}

impl Subscriber {
    fn deliver(&self, success: bool, values: &[Value]) {
        if let Some(cb) = self.callback.lock().expect("callback mutex poisoned").as_mut() {
            cb(success, values);
        }
    }
}
