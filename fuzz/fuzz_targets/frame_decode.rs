#![no_main]

use std::sync::Arc;

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use rpcmple::{MessageParser, Signature, Subscriber};

// Drives a Subscriber directly with attacker-controlled bytes, split on
// whatever lengths it asks for via `message_len`, the same way a
// MessageManager would. Must never panic, regardless of what bytes arrive.
fuzz_target!(|data: &[u8]| {
    let subscriber = Arc::new(Subscriber::new(Signature::parse("is").unwrap()));
    subscriber.set_callback(|_success, _values| {});

    let mut offset = 0;
    let mut sink = BytesMut::new();
    loop {
        let want = subscriber.message_len();
        if want == 0 || offset + want > data.len() {
            break;
        }
        let chunk = &data[offset..offset + want];
        offset += want;
        if !subscriber.parse_message(chunk) {
            break;
        }
        let _ = subscriber.send_message(&mut sink);
    }
});
