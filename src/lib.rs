#![doc = include_str!("../README.md")]
#![deny(rustdoc::broken_intra_doc_links, rust_2018_idioms)]
#![warn(
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::todo,
    clippy::unimplemented,
    clippy::use_self,
    clippy::doc_markdown,
    clippy::print_stdout,
    missing_debug_implementations,
    unreachable_pub,
    missing_docs
)]

mod errors;
pub use errors::Error;

mod value;
pub use value::{Tag, Value};

mod signature;
pub use signature::Signature;

mod pool;
pub(crate) use pool::BufferPool;

mod manager;
pub use manager::{ManagerHandle, MessageManager, MessageParser};

mod procedure;
pub use procedure::{ProcedureSpec, RemoteProcedureSignature};

mod client;
pub use client::RpcClient;

mod publisher;
pub use publisher::Publisher;

mod subscriber;
pub use subscriber::Subscriber;

/// Largest number of elements a wire array or string may carry: the wire
/// length prefix is a `u16`.
pub const MAX_ELEMENT_COUNT: usize = u16::MAX as usize;

/// Largest permitted size, in bytes, of a single header or body section.
/// The 32-bit frame header reserves its top byte for a tag/flag, leaving 24
/// bits for a length: `2^24 - 1` is the largest value those bits can hold.
pub const MAX_SECTION_LEN: usize = (1 << 24) - 1;

/// Largest number of procedures an [`RpcClient`] may register: procedure
/// ids are one byte wide on the wire.
pub const MAX_PROCEDURES: usize = u8::MAX as usize + 1;

/// Default capacity of a [`Publisher`]'s outbound queue, matching the
/// original implementation's buffered channel.
pub const PUBLISH_QUEUE_CAPACITY: usize = 1024;

// Unused crate lint workaround for dev dependencies that are exercised only
// via `cargo bench`/`cargo fuzz`, not from library code.
#[cfg(test)]
use criterion as _;
