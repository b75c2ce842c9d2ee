use thiserror::Error;

/// Error types returned by this crate.
#[non_exhaustive]
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// `to_binary` was called with a different number of arguments than the
    /// signature declares.
    #[error("argument count mismatch: got {got}, signature expects {expected}")]
    ArgumentCountMismatch {
        /// Number of arguments actually provided.
        got: usize,
        /// Number of tags in the signature.
        expected: usize,
    },

    /// An argument's runtime shape does not match the tag at its position in
    /// the signature (or, for a `v` slot, is not one of the eight concrete
    /// shapes a variant may hold).
    #[error("argument {index} does not match tag {tag:?}")]
    TypeMismatch {
        /// Position of the offending argument.
        index: usize,
        /// The tag it was expected to satisfy.
        tag: crate::value::Tag,
    },

    /// A string argument is longer than a `u16` can represent.
    #[error("string of {0} bytes exceeds the 65535 byte wire limit")]
    StringTooLong(usize),

    /// An array argument has more elements than a `u16` can represent.
    #[error("array of {0} elements exceeds the 65535 element wire limit")]
    ArrayTooLong(usize),

    /// A `v` (variant) tag byte read from the wire is not one of the eight
    /// concrete scalar/array tags.
    #[error("invalid variant tag byte {0:#04x}")]
    UnknownVariantTag(u8),

    /// A variant was found to contain another variant; recursion through
    /// `v` is not permitted.
    #[error("a variant tag may not itself be a variant")]
    RecursiveVariant,

    /// The byte source was exhausted before the signature was fully decoded.
    #[error("unexpected end of data while decoding")]
    UnexpectedEof,

    /// A section (header or body), on the wire or about to be written,
    /// exceeds [`crate::MAX_SECTION_LEN`].
    #[error("section of {0} bytes exceeds the maximum section size")]
    SectionTooLarge(usize),

    /// `call` referenced a procedure name that was never registered.
    #[error("unknown procedure {0:?}")]
    UnknownProcedure(String),

    /// More than [`crate::MAX_PROCEDURES`] procedures were registered with a
    /// single client.
    #[error("cannot register more than the maximum number of procedures")]
    TooManyProcedures,

    /// An I/O error occurred reading from or writing to the transport.
    #[error("i/o error ({0:?}): {1}")]
    IOError(std::io::ErrorKind, String),

    /// The data flow was stopped (locally, via [`crate::ManagerHandle::stop_data_flow`],
    /// or because the peer closed the transport) while a caller was waiting
    /// on a send or a reply.
    #[error("data flow stopped")]
    Stopped,
}

impl From<std::io::Error> for Error {
    fn from(v: std::io::Error) -> Self {
        Self::IOError(v.kind(), v.to_string())
    }
}
