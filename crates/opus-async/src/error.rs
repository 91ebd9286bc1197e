//! Native codec status codes.
//!
//! Codes are small negative integers defined by the codec library and passed
//! through verbatim; the named constants mirror libopus.

use std::fmt;

use job_runtime::{JobError, SubmitError};

/// A native codec error code (always `<= 0` when produced by a codec call).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const OK: ErrorCode = ErrorCode(0);
    pub const BAD_ARG: ErrorCode = ErrorCode(-1);
    pub const BUFFER_TOO_SMALL: ErrorCode = ErrorCode(-2);
    pub const INTERNAL_ERROR: ErrorCode = ErrorCode(-3);
    pub const INVALID_PACKET: ErrorCode = ErrorCode(-4);
    pub const UNIMPLEMENTED: ErrorCode = ErrorCode(-5);
    pub const INVALID_STATE: ErrorCode = ErrorCode(-6);
    pub const ALLOC_FAIL: ErrorCode = ErrorCode(-7);

    pub fn code(self) -> i32 {
        self.0
    }

    /// Interpret a raw status: positive is a count, anything else a failure.
    pub fn check(status: i32) -> Result<usize, ErrorCode> {
        if status > 0 {
            Ok(status as usize)
        } else {
            Err(ErrorCode(status))
        }
    }

    fn describe(self) -> &'static str {
        match self.0 {
            0 => "no error",
            -1 => "invalid argument",
            -2 => "buffer too small",
            -3 => "internal error",
            -4 => "corrupted packet",
            -5 => "request not implemented",
            -6 => "invalid state",
            -7 => "memory allocation failed",
            _ => "unknown error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.describe(), self.0)
    }
}

impl std::error::Error for ErrorCode {}

/// Runtime-side failures surface through the same `(nil, code)` channel.
impl From<JobError> for ErrorCode {
    fn from(e: JobError) -> Self {
        match e {
            JobError::Rejected(SubmitError::ShutDown) => ErrorCode::INVALID_STATE,
            JobError::Rejected(SubmitError::QueueFull) => ErrorCode::ALLOC_FAIL,
            JobError::Lost => ErrorCode::INTERNAL_ERROR,
        }
    }
}
