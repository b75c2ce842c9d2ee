//! Remote procedure registration (spec §3, §9).
//!
//! Ids are assigned by registration order, once, at [`crate::RpcClient::new`]
//! time. The original implementation assigns the id by mutating a shared
//! struct after the fact; in a language without that kind of interior
//! mutability the natural translation (spec §9 "global mutable identity"
//! design note) is a builder that produces an immutable table — there is no
//! `RemoteProcedureSignature` floating around before it has an id.

use crate::Signature;

/// A procedure to register with an [`crate::RpcClient`], before an id has
/// been assigned.
#[derive(Debug, Clone)]
pub struct ProcedureSpec {
    /// Display name; used only for local lookups (`call("name", ...)`) and
    /// error messages. Never transmitted (spec §9 open question).
    pub name: String,
    /// Signature of the arguments this procedure expects.
    pub arguments: Signature,
    /// Signature of the values this procedure returns.
    pub returns: Signature,
}

impl ProcedureSpec {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, arguments: Signature, returns: Signature) -> Self {
        Self { name: name.into(), arguments, returns }
    }
}

/// An immutable, registered remote procedure: the id assigned at
/// registration, plus the spec it was registered with.
#[derive(Debug, Clone)]
pub struct RemoteProcedureSignature {
    id: u8,
    name: String,
    arguments: Signature,
    returns: Signature,
}

impl RemoteProcedureSignature {
    pub(crate) fn new(id: u8, spec: ProcedureSpec) -> Self {
        Self { id, name: spec.name, arguments: spec.arguments, returns: spec.returns }
    }

    /// The zero-based index assigned at registration; this is what goes on
    /// the wire, never [`RemoteProcedureSignature::name`].
    pub fn id(&self) -> u8 {
        self.id
    }

    /// The local display name this procedure was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The signature arguments to this procedure must match.
    pub fn arguments(&self) -> &Signature {
        &self.arguments
    }

    /// The signature this procedure's return values must match.
    pub fn returns(&self) -> &Signature {
        &self.returns
    }
}
