use thiserror::Error;

/// Failures of the meta-model, the navigator, and value coercion.
#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot copy between record types '{expect}' and '{got}'")]
    TypeMismatch { expect: String, got: String },

    #[error("record structures differ at child {index}")]
    StructureMismatch { index: usize },

    #[error("invalid value '{value}' for field {field}")]
    Coercion { field: String, value: String },

    #[error("element {path} not found")]
    UnknownElement { path: String },

    #[error("{path} is no variable, can't assign")]
    NotAVariable { path: String },

    #[error("writing null to {path} which does not allow null")]
    NullNotAllowed { path: String },

    #[error("object stack underflow")]
    StackUnderflow,

    #[error("expected to leave '{expect}', got '{got}'")]
    LeaveMismatch { expect: String, got: String },

    #[error("no object to navigate")]
    NoObject,

    #[error("vector {path} holds no addressable element")]
    CorruptVector { path: String },

    #[error("{type_name}: key element missing")]
    MissingKey { type_name: String },

    #[error("version field overflows the signed 64-bit range")]
    VersionOverflow,
}
