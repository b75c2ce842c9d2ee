//! Dials a TCP address and drives an [`RpcClient`] over the connection,
//! calling `Greet` and `Sum` on the responder at the other end.
//!
//! The transport direction (dial vs. listen) is orthogonal to the RPC role:
//! this crate only ever plays the caller side (spec §1 non-goals), so this
//! demo differs from `greet_server` only in how the stream is obtained.

use std::net::TcpStream;
use std::sync::mpsc;

use clap::Parser;
use rpcmple::{MessageManager, ProcedureSpec, RpcClient, Signature, Value};

#[derive(Parser)]
struct Args {
    /// Address to connect to.
    #[arg(long, default_value = "127.0.0.1:8080")]
    connect: String,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let stream = TcpStream::connect(&args.connect).expect("failed to connect");
    tracing::info!(addr = %args.connect, "connected");

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

    let manager = MessageManager::new(stream, client.clone());
    let handle = manager.start_non_blocking();

    client.call("Greet", &[Value::Str("Hello World".into())]).expect("call failed");
    match greet_rx.recv() {
        Ok((true, values)) => tracing::info!(?values, "Greet succeeded"),
        Ok((false, _)) => tracing::error!("Greet call failed"),
        Err(_) => tracing::error!("connection closed before Greet replied"),
    }

    let _ = handle.join();
}
