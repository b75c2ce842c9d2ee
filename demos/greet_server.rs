//! Listens on a TCP port, accepts one connection, and drives an
//! [`RpcClient`] over it, calling `Greet` and `Sum` on whatever responder
//! connects.
//!
//! Grounded on the original `example1` program: a TCP listener that plays
//! the RPC *caller* role, since this crate specifies no server-side
//! dispatcher — the responder is always the peer.

use std::net::TcpListener;
use std::sync::mpsc;

use clap::Parser;
use rpcmple::{MessageManager, ProcedureSpec, RpcClient, Signature, Value};

#[derive(Parser)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let listener = TcpListener::bind(&args.listen).expect("failed to bind listener");
    tracing::info!(addr = %args.listen, "waiting for a connection");
    let (stream, peer) = listener.accept().expect("failed to accept connection");
    tracing::info!(%peer, "connection accepted");

    let client = RpcClient::new(vec![
        ProcedureSpec::new("Greet", Signature::parse("s").unwrap(), Signature::parse("s").unwrap()),
        ProcedureSpec::new("Sum", Signature::parse("I").unwrap(), Signature::parse("i").unwrap()),
    ])
    .expect("failed to register procedures");
    let client = std::sync::Arc::new(client);

    let (greet_tx, greet_rx) = mpsc::channel();
    client
        .set_reply_callback("Greet", move |success, values| {
            let _ = greet_tx.send((success, values.to_vec()));
        })
        .unwrap();

    let (sum_tx, sum_rx) = mpsc::channel();
    client
        .set_reply_callback("Sum", move |success, values| {
            let _ = sum_tx.send((success, values.to_vec()));
        })
        .unwrap();

    let manager = MessageManager::new(stream, client.clone());
    let handle = manager.start_non_blocking();

    client.call("Greet", &[Value::Str("Hello World".into())]).expect("call failed");
    match greet_rx.recv() {
        Ok((true, values)) => tracing::info!(?values, "Greet succeeded"),
        Ok((false, _)) => tracing::error!("Greet call failed"),
        Err(_) => tracing::error!("connection closed before Greet replied"),
    }

    client.call("Sum", &[Value::IntArray(vec![1, 2, 3, 4, 5])]).expect("call failed");
    match sum_rx.recv() {
        Ok((true, values)) => tracing::info!(?values, "Sum succeeded"),
        Ok((false, _)) => tracing::error!("Sum call failed"),
        Err(_) => tracing::error!("connection closed before Sum replied"),
    }

    let _ = handle.join();
}
