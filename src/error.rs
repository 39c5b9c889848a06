//! Crate-wide error taxonomy for the object store, ref manager, and index.
//!
//! Library code returns [`Error`]; the CLI wraps it in `anyhow::Result` at
//! the boundary the way `git-rs` already does for its own ad hoc errors.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("locked")]
    Locked,

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("truncated input")]
    Truncated,

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("unsupported index version {0}")]
    UnsupportedVersion(u32),

    #[error("conflict: expected {expected}, found {actual}")]
    Conflict { expected: String, actual: String },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decompression error: {0}")]
    Decompress(String),

    #[error("invalid hex in object id")]
    InvalidHex,

    #[error("invalid id length")]
    InvalidLength,

    #[error("tree entry has an empty name")]
    EmptyName,

    #[error("duplicate entry name {0:?} in tree")]
    DuplicateName(String),

    #[error("missing separator between mode and name")]
    MissingSeparator,

    #[error("tree entry is missing its NUL terminator")]
    NoNullTerminator,

    #[error("invalid octal mode {0:?}")]
    InvalidMode(String),

    #[error("fewer than 20 bytes remained for the trailing object id")]
    ShortTrailingHash,

    #[error("bad header line {0:?}")]
    BadHeader(String),

    #[error("invalid tree id in commit header")]
    InvalidTreeId,

    #[error("invalid parent id in commit header")]
    InvalidParentId,

    #[error("invalid signature {0:?}")]
    InvalidSignature(String),

    #[error("invalid object type {0:?}")]
    InvalidObjectType(String),

    #[error("symbolic ref cycle detected")]
    Cycle,

    #[error("empty path")]
    EmptyPath,

    #[error("not a repository")]
    NotARepository,
}

impl Error {
    /// Short, stable kind name — useful for tests asserting on the error
    /// taxonomy rather than on message text.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound => "NotFound",
            Error::AlreadyExists => "AlreadyExists",
            Error::Locked => "Locked",
            Error::InvalidFormat(_) => "InvalidFormat",
            Error::Truncated => "Truncated",
            Error::ChecksumMismatch => "ChecksumMismatch",
            Error::UnsupportedVersion(_) => "UnsupportedVersion",
            Error::Conflict { .. } => "Conflict",
            Error::UnsupportedOperation(_) => "UnsupportedOperation",
            Error::Io(_) => "Io",
            Error::Decompress(_) => "Decompress",
            Error::InvalidHex => "InvalidHex",
            Error::InvalidLength => "InvalidLength",
            Error::EmptyName => "EmptyName",
            Error::DuplicateName(_) => "DuplicateName",
            Error::MissingSeparator => "MissingSeparator",
            Error::NoNullTerminator => "NoNullTerminator",
            Error::InvalidMode(_) => "InvalidMode",
            Error::ShortTrailingHash => "ShortTrailingHash",
            Error::BadHeader(_) => "BadHeader",
            Error::InvalidTreeId => "InvalidTreeId",
            Error::InvalidParentId => "InvalidParentId",
            Error::InvalidSignature(_) => "InvalidSignature",
            Error::InvalidObjectType(_) => "InvalidObjectType",
            Error::Cycle => "Cycle",
            Error::EmptyPath => "EmptyPath",
            Error::NotARepository => "NotARepository",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
