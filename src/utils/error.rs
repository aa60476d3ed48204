use thiserror::Error;

/// Main error type for the netc library.
///
/// Every failure a library call can report is one of these values; nothing
/// panics across the public boundary. Each variant has a stable integer
/// code (see [`NetcError::code`]) so the taxonomy survives FFI and logging
/// round-trips unchanged.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetcError {
    /// The context arena is exhausted
    #[error("out of memory: context arena exhausted")]
    Nomem,
    /// The payload exceeds the 65535-byte packet limit
    #[error("packet too big: payload exceeds 65535 bytes")]
    TooBig,
    /// The input bytes are not a valid packet for this context
    #[error("corrupt packet")]
    Corrupt,
    /// The dictionary blob failed validation
    #[error("invalid dictionary blob")]
    DictInvalid,
    /// The destination buffer is too small
    #[error("destination buffer too small")]
    BufSmall,
    /// A null context handle was passed across the FFI boundary.
    ///
    /// The safe Rust API cannot produce this value (references are never
    /// null); it is kept so the error-code table stays stable for FFI callers.
    #[error("null context handle")]
    CtxNull,
    /// The requested capability was not enabled at context creation
    #[error("operation unsupported by this context")]
    Unsupported,
    /// The packet or blob was produced by an incompatible dictionary version
    #[error("dictionary or format version mismatch")]
    Version,
    /// A precondition on the arguments was violated
    #[error("invalid argument")]
    InvalidArg,
}

/// The full return-code enumeration, including success.
///
/// `Ok` is 0 and every error is negative; values are stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    Nomem = -1,
    TooBig = -2,
    Corrupt = -3,
    DictInvalid = -4,
    BufSmall = -5,
    CtxNull = -6,
    Unsupported = -7,
    Version = -8,
    InvalidArg = -9,
}

impl NetcError {
    /// The stable integer code for this error.
    pub fn code(self) -> i32 {
        ErrorCode::from(self) as i32
    }
}

impl From<NetcError> for ErrorCode {
    fn from(err: NetcError) -> Self {
        match err {
            NetcError::Nomem => ErrorCode::Nomem,
            NetcError::TooBig => ErrorCode::TooBig,
            NetcError::Corrupt => ErrorCode::Corrupt,
            NetcError::DictInvalid => ErrorCode::DictInvalid,
            NetcError::BufSmall => ErrorCode::BufSmall,
            NetcError::CtxNull => ErrorCode::CtxNull,
            NetcError::Unsupported => ErrorCode::Unsupported,
            NetcError::Version => ErrorCode::Version,
            NetcError::InvalidArg => ErrorCode::InvalidArg,
        }
    }
}

/// A specialized `Result` type for netc operations.
pub type Result<T> = std::result::Result<T, NetcError>;
