use thiserror::Error;

/// Errors raised while resolving a key template or looking up a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("template expects {expected} parameter(s), {supplied} supplied")]
    ArgumentCount { expected: usize, supplied: usize },

    #[error("unsupported conversion `%{conversion}` at byte {offset}")]
    UnsupportedConversion { conversion: char, offset: usize },

    #[error("template ends with a dangling `%` at byte {offset}")]
    DanglingPercent { offset: usize },

    #[error("parameter {position} is not an integer: {value:?}")]
    NotAnInteger { position: usize, value: String },

    #[error("key descriptor already registered: {0}")]
    DuplicateName(String),

    #[error("unknown key descriptor: {0}")]
    UnknownName(String),
}

/// Errors raised by a [`Codec`](crate::codec::Codec).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}
