//! Error types for the avikit engine.
//!
//! Every component reports failures through one taxonomy so that a caller
//! can tell a malformed file from a caller mistake from a missing codec
//! without knowing which layer produced the error.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::fourcc::FourCC;

/// Main error type shared by all avikit crates.
///
/// The type is `Clone` so a container that failed to open can hand its
/// original error back on every later call.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Null or invalid argument, out-of-range position or bad range.
    #[error("Invalid parameter: {0}")]
    BadParam(String),

    /// Caller-provided structure buffer is too small.
    #[error("Bad size: need {needed} bytes, have {available}")]
    BadSize { needed: usize, available: usize },

    /// Operation on an invalid, closed or unopened handle.
    #[error("Bad handle: {0}")]
    BadHandle(String),

    /// Malformed container.
    #[error("Bad format: {0}")]
    BadFormat(String),

    /// Operation not applicable to this stream, format mismatch, or
    /// unimplemented feature.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Allocation failure.
    #[error("Out of memory: {0}")]
    Memory(String),

    /// I/O failure while reading.
    #[error("File read error: {0}")]
    FileRead(#[source] Arc<io::Error>),

    /// I/O failure while writing.
    #[error("File write error: {0}")]
    FileWrite(#[source] Arc<io::Error>),

    /// Requested auxiliary data is not present.
    #[error("No data: {0}")]
    NoData(String),

    /// No codec handler registered for a compression tag.
    #[error("No compressor registered for '{0}'")]
    NoCompressor(FourCC),

    /// Read/format negotiation buffer too small; retry with `needed` bytes.
    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// A chunk search ran to the end of its scope.
    #[error("Chunk '{0}' not found")]
    NotFound(FourCC),

    /// Failure reported by an external codec handler.
    #[error("Codec error: {0}")]
    Codec(String),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::FileRead(Arc::new(e))
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid parameter error.
    pub fn bad_param(msg: impl Into<String>) -> Self {
        Error::BadParam(msg.into())
    }

    /// Create a malformed-container error.
    pub fn bad_format(msg: impl Into<String>) -> Self {
        Error::BadFormat(msg.into())
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Create a write error from an I/O failure.
    pub fn write(e: io::Error) -> Self {
        Error::FileWrite(Arc::new(e))
    }

    /// Check if this is an I/O error (read or write).
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Error::FileRead(_) | Error::FileWrite(_))
    }

    /// Check if the caller should retry with a bigger buffer.
    #[must_use]
    pub fn required_size(&self) -> Option<usize> {
        match self {
            Error::BufferTooSmall { needed, .. } | Error::BadSize { needed, .. } => Some(*needed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::bad_param("negative start");
        assert_eq!(err.to_string(), "Invalid parameter: negative start");

        let err = Error::NoCompressor(FourCC::new(*b"cvid"));
        assert!(err.to_string().contains("cvid"));
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::FileRead(_)));
        assert!(err.is_io());

        // Cloning keeps the same underlying error.
        let copy = err.clone();
        assert_eq!(copy.to_string(), err.to_string());
    }

    #[test]
    fn test_required_size() {
        let err = Error::BufferTooSmall {
            needed: 128,
            available: 16,
        };
        assert_eq!(err.required_size(), Some(128));
        assert_eq!(Error::bad_format("x").required_size(), None);
    }
}
