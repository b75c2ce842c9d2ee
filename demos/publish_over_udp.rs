//! Publishes randomly generated `(i, s)` tuples over UDP at a steady rate.
//!
//! Grounded on `example5PublisherOverUDP`. Each datagram carries exactly one
//! header or one body (spec §6's datagram requirement), satisfied here by
//! `Publisher` producing one framed message per `send_message` call and the
//! frame loop writing it with a single `write_all`.

use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rpcmple::{MessageManager, Publisher, Signature, Value};

#[derive(Parser)]
struct Args {
    /// Address to send datagrams to.
    #[arg(long, default_value = "127.0.0.1:8088")]
    target: String,

    /// Number of messages to publish.
    #[arg(long, default_value_t = 1000)]
    count: usize,
}

/// A [`UdpSocket`] bound to an ephemeral local port and connected to one
/// peer, so `Read`/`Write` behave as a single logical stream of datagrams.
struct UdpStream(UdpSocket);

impl std::io::Read for UdpStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.recv(buf)
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

    let socket = UdpSocket::bind("0.0.0.0:0").expect("failed to bind socket");
    socket.connect(&args.target).expect("failed to connect socket");
    tracing::info!(target = %args.target, "publishing over udp");

    let publisher = Arc::new(Publisher::new(Signature::parse("is").unwrap()));
    let manager = MessageManager::new(UdpStream(socket), publisher.clone());
    let handle = manager.start_non_blocking();

    let words = ["apples", "frogs", "dinosaurs", "stones", "melons", "pens", "crocodiles"];
    for i in 0..args.count {
        let word = words[i % words.len()];
        let qty = (i % 7) as i64 + 2;
        publisher.publish(&[Value::Int(qty), Value::Str(word.into())]).expect("publish failed");
        std::thread::sleep(Duration::from_millis(1));
    }

    publisher.wait_for_publish_complete();
    tracing::info!("all messages flushed");
    drop(handle);
}
