use std::fmt;

use rusqlite::ffi;
use thiserror::Error;

use crate::sqlite::error_domain::{ErrorDomain, error_domain};

/// Raw SQLite status code.
///
/// The code is the only thing stored; the message is looked up through the
/// process-wide [`ErrorDomain`] whenever it is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(i32);

impl ErrorCode {
    pub const OK: Self = Self(ffi::SQLITE_OK);
    pub const ERROR: Self = Self(ffi::SQLITE_ERROR);
    pub const ABORT: Self = Self(ffi::SQLITE_ABORT);
    pub const BUSY: Self = Self(ffi::SQLITE_BUSY);
    pub const NOMEM: Self = Self(ffi::SQLITE_NOMEM);
    pub const CANTOPEN: Self = Self(ffi::SQLITE_CANTOPEN);
    pub const MISUSE: Self = Self(ffi::SQLITE_MISUSE);

    #[must_use]
    pub const fn new(code: i32) -> Self {
        Self(code)
    }

    /// The code as returned by SQLite, extended bits included.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Primary result code (low byte of an extended code).
    #[must_use]
    pub const fn primary(self) -> i32 {
        self.0 & 0xff
    }

    #[must_use]
    pub fn message(self) -> &'static str {
        error_domain().message(self.0)
    }

    #[must_use]
    pub fn domain(self) -> &'static ErrorDomain {
        error_domain()
    }

    #[must_use]
    pub const fn is_busy(self) -> bool {
        self.primary() == ffi::SQLITE_BUSY
    }

    /// Panic on `SQLITE_BUSY`.
    ///
    /// Locked databases are not retried; hitting one is treated as a defect in the caller's
    /// locking discipline rather than a runtime condition.
    pub(crate) fn expect_not_busy(self) -> Self {
        assert!(
            !self.is_busy(),
            "SQLite reported `{}` (code {}); retrying busy statements is not supported",
            self.message(),
            self.0
        );
        self
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqliteServiceError {
    #[error("{}", .0.message())]
    OpenError(ErrorCode),

    #[error("{}", ErrorCode::NOMEM.message())]
    OutOfMemory,

    #[error("database connection is already open")]
    AlreadyOpen,

    #[error("database connection is not open")]
    NotOpen,

    /// Statement compilation failed; `message` is SQLite's diagnostic for the query.
    #[error("{message}")]
    PrepareError { code: ErrorCode, message: String },

    #[error("{}", .0.message())]
    ExecError(ErrorCode),

    #[error("{}", .0.message())]
    StepError(ErrorCode),

    #[error("operation aborted: SQLite worker is shutting down")]
    Aborted,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl SqliteServiceError {
    /// Status code that best describes this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::OpenError(code) | Self::ExecError(code) | Self::StepError(code) => *code,
            Self::PrepareError { code, .. } => *code,
            Self::OutOfMemory => ErrorCode::NOMEM,
            Self::AlreadyOpen | Self::NotOpen | Self::InvalidInput(_) | Self::ConfigError(_) => {
                ErrorCode::MISUSE
            }
            Self::Aborted => ErrorCode::ABORT,
            Self::ConnectionError(_) | Self::Other(_) => ErrorCode::ERROR,
        }
    }
}
