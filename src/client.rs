//! The RPC client parser (spec §4.3): the caller side of a call/reply
//! exchange.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Mutex;

use bytes::{BufMut, BytesMut};

use crate::pool::BufferPool;
use crate::procedure::{ProcedureSpec, RemoteProcedureSignature};
use crate::value::Value;
use crate::{Error, MessageParser, MAX_PROCEDURES, MAX_SECTION_LEN};

/// The callback invoked once per reply, as `(success, return values)`.
pub type ReplyCallback = Box<dyn FnMut(bool, &[Value]) + Send>;

/// Framing state of the reply currently being read (spec §4.3's
/// HEADER/BODY state machine).
#[derive(Debug, Clone, Copy)]
enum Section {
    Header,
    Body(usize),
}

struct ProcedureEntry {
    signature: RemoteProcedureSignature,
    callback: Mutex<Option<ReplyCallback>>,
}

struct ClientState {
    section: Section,
    last_proc: Option<u8>,
    reply_success: bool,
    command: BytesMut,
    pool: BufferPool,
}

/// The caller side of an RPC exchange: registers a table of remote
/// procedures, serializes calls, and dispatches replies to per-procedure
/// callbacks.
///
/// At most one call may be outstanding at a time (spec §4.3); `call` from
/// any thread is safe, and is totally ordered by an internal mutex.
pub struct RpcClient {
    procedures: Vec<ProcedureEntry>,
    by_name: HashMap<String, u8>,
    state: Mutex<ClientState>,
    ready_tx: Mutex<Option<SyncSender<()>>>,
    ready_rx: Mutex<Receiver<()>>,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient").field("procedures", &self.procedures.len()).finish()
    }
}

impl RpcClient {
    /// Registers `specs` in order, assigning each an id equal to its index.
    /// Fails with [`Error::TooManyProcedures`] if more than
    /// [`crate::MAX_PROCEDURES`] are given (the id is 8 bits wide on the
    /// wire).
    pub fn new(specs: Vec<ProcedureSpec>) -> Result<Self, Error> {
        if specs.len() > MAX_PROCEDURES {
            return Err(Error::TooManyProcedures);
        }

        let mut by_name = HashMap::with_capacity(specs.len());
        let mut procedures = Vec::with_capacity(specs.len());
        for (i, spec) in specs.into_iter().enumerate() {
            let id = i as u8;
            by_name.insert(spec.name.clone(), id);
            procedures.push(ProcedureEntry {
                signature: RemoteProcedureSignature::new(id, spec),
                callback: Mutex::new(None),
            });
        }

        let (ready_tx, ready_rx) = mpsc::sync_channel(0);

        Ok(Self {
            procedures,
            by_name,
            state: Mutex::new(ClientState {
                section: Section::Header,
                last_proc: None,
                reply_success: false,
                command: BytesMut::new(),
                pool: BufferPool::new(),
            }),
            ready_tx: Mutex::new(Some(ready_tx)),
            ready_rx: Mutex::new(ready_rx),
        })
    }

    /// Returns the registered procedure table entry for `name`, if any.
    pub fn procedure(&self, name: &str) -> Option<&RemoteProcedureSignature> {
        self.by_name.get(name).map(|&id| &self.procedures[id as usize].signature)
    }

    /// Sets (or replaces) the reply callback for the procedure registered
    /// under `name`. Returns [`Error::UnknownProcedure`] if no such
    /// procedure was registered.
    pub fn set_reply_callback(
        &self,
        name: &str,
        callback: impl FnMut(bool, &[Value]) + Send + 'static,
    ) -> Result<(), Error> {
        let id = self.id_for(name)?;
        *self.procedures[id as usize].callback.lock().expect("callback mutex poisoned") =
            Some(Box::new(callback));
        Ok(())
    }

    /// Invokes the remote procedure registered under `name` with `args`.
    ///
    /// Returns as soon as the command has been serialized and handed to the
    /// frame loop (spec §5): it does not wait for the reply. Fails locally,
    /// without touching the transport, on [`Error::UnknownProcedure`] or any
    /// encoding error (spec §7 items 1 and 5).
    pub fn call(&self, name: &str, args: &[Value]) -> Result<(), Error> {
        let id = self.id_for(name)?;
        self.call_by_id(id, args)
    }

    fn id_for(&self, name: &str) -> Result<u8, Error> {
        self.by_name.get(name).copied().ok_or_else(|| Error::UnknownProcedure(name.to_owned()))
    }

    fn call_by_id(&self, id: u8, args: &[Value]) -> Result<(), Error> {
        let entry = &self.procedures[id as usize];
        let mut state = self.state.lock().expect("client state mutex poisoned");

        let mut body = state.pool.get();
        if let Err(e) = entry.signature.arguments().to_binary(&mut body, args) {
            state.pool.put(body);
            return Err(e);
        }

        if body.len() > MAX_SECTION_LEN {
            let len = body.len();
            state.pool.put(body);
            return Err(Error::SectionTooLarge(len));
        }

        let header = ((id as u32) << 24) | (body.len() as u32 & 0x00FF_FFFF);
        state.command.clear();
        state.command.put_u32_le(header);
        state.command.extend_from_slice(&body);
        state.pool.put(body);
        state.last_proc = Some(id);

        // Holding `state` across the rendezvous send totally orders
        // transmission with mutex-acquisition order (spec §5): a second
        // caller cannot start overwriting `command` until this call has
        // actually been handed to the frame loop.
        match self.ready_tx.lock().expect("ready sender mutex poisoned").as_ref() {
            Some(tx) => tx.send(()).map_err(|_| Error::Stopped),
            None => Err(Error::Stopped),
        }
    }

    fn deliver(&self, entry: &ProcedureEntry, success: bool, values: &[Value]) {
        if let Some(cb) = entry.callback.lock().expect("callback mutex poisoned").as_mut() {
            cb(success, values);
        }
    }
}

impl MessageParser for RpcClient {
    fn parse_message(&self, message: &[u8]) -> bool {
        let mut state = self.state.lock().expect("client state mutex poisoned");

        match state.section {
            Section::Header => {
                if message.len() != 4 {
                    tracing::error!(len = message.len(), "rpc client: invalid header length");
                    return false;
                }
                let raw = u32::from_le_bytes(message.try_into().expect("checked length above"));
                let success = (raw >> 24) & 0xFF == 1;
                let body_len = (raw & 0x00FF_FFFF) as usize;
                state.reply_success = success;

                if body_len > 0 {
                    state.section = Section::Body(body_len);
                    true
                } else {
                    let Some(last) = state.last_proc else {
                        tracing::error!("rpc client: reply received with no outstanding call");
                        return false;
                    };
                    let entry = &self.procedures[last as usize];
                    let values = match entry.signature.returns().from_binary(&mut Cursor::new(&[][..])) {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::error!(error = %e, "rpc client: error decoding empty reply");
                            return false;
                        }
                    };
                    state.section = Section::Header;
                    drop(state);
                    self.deliver(entry, success, &values);
                    true
                }
            }
            Section::Body(len) => {
                if message.len() != len {
                    tracing::error!(len = message.len(), expected = len, "rpc client: invalid body length");
                    return false;
                }
                let Some(last) = state.last_proc else {
                    tracing::error!("rpc client: reply body received with no outstanding call");
                    return false;
                };
                let entry = &self.procedures[last as usize];
                let success = state.reply_success;
                let values = match entry.signature.returns().from_binary(&mut Cursor::new(message)) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::error!(error = %e, "rpc client: error decoding reply");
                        return false;
                    }
                };
                state.section = Section::Header;
                drop(state);
                self.deliver(entry, success, &values);
                true
            }
        }
    }

    fn message_len(&self) -> usize {
        match self.state.lock().expect("client state mutex poisoned").section {
            Section::Header => 4,
            Section::Body(len) => len,
        }
    }

    fn send_message(&self, sink: &mut BytesMut) -> bool {
        let is_header = matches!(
            self.state.lock().expect("client state mutex poisoned").section,
            Section::Header
        );
        if !is_header {
            return true;
        }

        if self.ready_rx.lock().expect("ready channel mutex poisoned").recv().is_err() {
            // The channel was closed by `stop()`: lifecycle shutdown, not a
            // parse/transport failure.
            return false;
        }

        let state = self.state.lock().expect("client state mutex poisoned");
        if state.command.is_empty() {
            tracing::error!("rpc client: invalid serialized arguments");
            return false;
        }
        sink.extend_from_slice(&state.command);
        true
    }

    fn is_requester(&self) -> bool {
        true
    }

    fn stop(&self) {
        // Dropping the sender, rather than replacing the receiver, is what
        // unblocks a `send_message` already parked in `recv()` waiting for
        // the next `call` (spec §4.2/§4.3): `recv()` only ever needs the
        // receiver's own lock, which `stop()` must not touch while that call
        // holds it.
        self.ready_tx.lock().expect("ready sender mutex poisoned").take();
    }
}
