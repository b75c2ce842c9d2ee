//! Listens on a UDP port and prints every `(i, s)` tuple a publisher sends.
//!
//! Grounded on `example5SubscriberOverUDP`.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use clap::Parser;
use rpcmple::{MessageManager, Signature, Subscriber, Value};

#[derive(Parser)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8088")]
    listen: String,
}

struct UdpStream(UdpSocket);

impl std::io::Read for UdpStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        // The socket is never connected (a publisher may send from any
        // address); `send_message` is a no-op for a subscriber, so the peer
        // address isn't needed.
        self.0.recv_from(buf).map(|(n, _addr)| n)
    }
}

impl std::io::Write for UdpStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.send(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let socket = UdpSocket::bind(&args.listen).expect("failed to bind socket");
    tracing::info!(addr = %args.listen, "listening for published messages");

    let subscriber = Arc::new(Subscriber::new(Signature::parse("is").unwrap()));
    let id = Arc::new(AtomicUsize::new(0));
    let id_for_callback = Arc::clone(&id);
    subscriber.set_callback(move |success, values| {
        let msg_id = id_for_callback.fetch_add(1, Ordering::SeqCst);
        if !success {
            tracing::error!(msg_id, "error getting data from publisher");
            return;
        }
        if let [Value::Int(qty), Value::Str(word)] = values {
            tracing::info!(msg_id, qty, word, "received");
        }
    });

    let manager = MessageManager::new(UdpStream(socket), subscriber);
    manager.start_blocking();
}
