//! Result and status codes for FF-A calls.
//!
//! A failing FF-A interface answers with `FFA_ERROR` and a signed 32-bit status code in `w2`.
//! Status codes are translated into the local [`Error`] category once, at the boundary, so
//! callers never handle raw integers.
//!
//! The service partitions layered on top (see `ffa-service-tpm`) report their own status codes
//! and translate them into the same [`Error`] category.
//!
//! # References
//! - [DEN0077, Table "Error status codes"](https://developer.arm.com/documentation/den0077/latest)

/// Type alias for Result with [`Error`] as the error type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// FF-A status codes, as carried in `w2` of an `FFA_ERROR` response.
pub mod status {
    pub const SUCCESS: i32 = 0;
    pub const NOT_SUPPORTED: i32 = -1;
    pub const INVALID_PARAMETERS: i32 = -2;
    pub const NO_MEMORY: i32 = -3;
    pub const BUSY: i32 = -4;
    pub const INTERRUPTED: i32 = -5;
    pub const DENIED: i32 = -6;
    pub const RETRY: i32 = -7;
    pub const ABORTED: i32 = -8;
    pub const NO_DATA: i32 = -9;
    pub const NOT_READY: i32 = -10;
}

/// Local error category for every operation in the FF-A stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The interface or feature is not implemented by the callee.
    #[error("operation not supported")]
    NotSupported,
    /// A parameter was rejected.
    #[error("invalid parameter")]
    InvalidParameter,
    /// The callee ran out of memory.
    #[error("out of resources")]
    NoMemory,
    /// The caller-provided buffer cannot hold the result.
    #[error("buffer too small, {required} entries required")]
    BufferTooSmall {
        /// Number of entries (or bytes) the buffer must hold.
        required: usize,
    },
    /// The target is busy.
    #[error("target busy")]
    Busy,
    /// The call was interrupted before it completed.
    #[error("call interrupted")]
    Interrupted,
    /// The caller has no permission to perform the operation.
    #[error("access denied")]
    AccessDenied,
    /// The operation may succeed if retried.
    #[error("retry required")]
    Retry,
    /// The operation was aborted.
    #[error("operation aborted")]
    Aborted,
    /// The requested data or function does not exist.
    #[error("not found")]
    NotFound,
    /// A prerequisite has not been satisfied yet.
    #[error("not ready")]
    NotReady,
    /// The resource has already been set up.
    #[error("already started")]
    AlreadyStarted,
    /// Control data shared with the service was rejected as malformed.
    #[error("corrupted control data")]
    CorruptedControlData,
    /// The callee or the protocol misbehaved.
    #[error("device error")]
    DeviceError,
}

impl Error {
    /// Translates an FF-A status code into the local error category.
    ///
    /// [`status::SUCCESS`] is not an error; seeing it inside an `FFA_ERROR` response is a
    /// protocol violation and maps to [`Error::DeviceError`], like any unlisted code.
    pub const fn from_status(code: i32) -> Self {
        match code {
            status::NOT_SUPPORTED => Self::NotSupported,
            status::INVALID_PARAMETERS => Self::InvalidParameter,
            status::NO_MEMORY => Self::NoMemory,
            status::BUSY => Self::Busy,
            status::INTERRUPTED => Self::Interrupted,
            status::DENIED => Self::AccessDenied,
            status::RETRY => Self::Retry,
            status::ABORTED => Self::Aborted,
            status::NO_DATA => Self::NotFound,
            status::NOT_READY => Self::NotReady,
            _ => Self::DeviceError,
        }
    }
}

/// Translates an FF-A status code, mapping [`status::SUCCESS`] to `Ok(())`.
pub const fn translate(code: i32) -> Result<()> {
    match code {
        status::SUCCESS => Ok(()),
        other => Err(Error::from_status(other)),
    }
}
