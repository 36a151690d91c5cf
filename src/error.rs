//! The error type shared by every fallible operation in this crate.
//!
//! Modeled on `object_rewrite::Error`: a newtype around a private enum so
//! the representation can change without breaking callers, plus a `.kind()`
//! accessor for callers that need to branch on the error class described in
//! the error-handling design (`spec.md` §7).

use std::{error, fmt, io};

/// An error produced by the assembler, linker, or disassembler core.
#[derive(Debug)]
pub struct Error {
    inner: ErrorInner,
}

#[derive(Debug)]
enum ErrorInner {
    Io(io::Error),
    Source { code: u32, message: String },
    Link { code: u32, message: String },
    Usage(String),
    Internal(String),
}

/// The class of error, per `spec.md` §7.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad flag, missing argument, conflicting options.
    Usage,
    /// Undefined symbol, duplicate label, out-of-range operand, and the like.
    Source,
    /// Missing definition, processor mismatch, section does not fit.
    Link,
    /// An I/O failure opening, reading, or writing a file.
    Io(io::ErrorKind),
    /// An assertion failure: a broken invariant inside the core itself.
    Internal,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            ErrorInner::Io(e) => e.fmt(f),
            ErrorInner::Source { code, message } => write!(f, "error {code}: {message}"),
            ErrorInner::Link { code, message } => write!(f, "error {code}: {message}"),
            ErrorInner::Usage(m) => write!(f, "usage: {m}"),
            ErrorInner::Internal(m) => write!(f, "internal error: {m}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.inner {
            ErrorInner::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error {
            inner: ErrorInner::Io(e),
        }
    }
}

impl Error {
    /// The class of this error.
    pub fn kind(&self) -> ErrorKind {
        match &self.inner {
            ErrorInner::Io(e) => ErrorKind::Io(e.kind()),
            ErrorInner::Source { .. } => ErrorKind::Source,
            ErrorInner::Link { .. } => ErrorKind::Link,
            ErrorInner::Usage(_) => ErrorKind::Usage,
            ErrorInner::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn source_error(code: u32, message: impl Into<String>) -> Self {
        Error {
            inner: ErrorInner::Source {
                code,
                message: message.into(),
            },
        }
    }

    pub fn link_error(code: u32, message: impl Into<String>) -> Self {
        Error {
            inner: ErrorInner::Link {
                code,
                message: message.into(),
            },
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Error {
            inner: ErrorInner::Usage(message.into()),
        }
    }

    #[track_caller]
    pub fn internal(message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Error {
            inner: ErrorInner::Internal(format!("{} (at {location})", message.into())),
        }
    }
}

/// The `Result` type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric message codes, per `spec.md` §7: three disjoint ranges with
/// sub-ranges reserved for extension codes.
pub mod codes {
    /// Errors: 0..2000, with 1000..2000 reserved for extensions.
    pub const ERR_OUT_OF_RANGE: u32 = 101;
    pub const ERR_UNDEFINED_SYMBOL: u32 = 102;
    pub const ERR_DUPLICATE_LABEL: u32 = 103;
    pub const ERR_SECTION_OVERFLOW: u32 = 104;
    pub const ERR_SECTION_OVERLAP: u32 = 105;
    pub const ERR_BAD_OBJECT: u32 = 106;
    pub const ERR_UNMATCHED_MACRO: u32 = 107;

    /// Warnings: 2000..3000.
    pub const WARN_MISSING_SYMBOL: u32 = 2001;
    pub const WARN_PROCESSOR_MISMATCH: u32 = 2002;
    pub const WARN_MISSING_ARCHIVE_INDEX: u32 = 2003;

    /// Messages: 3000..4000.
    pub const MSG_REPAGE: u32 = 3001;
}
