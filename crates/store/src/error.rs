//! Error types for the store engine.

use std::io;

use snafu::Snafu;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during store operations.
#[derive(Debug, Snafu)]
pub enum Error {
    /// I/O error from the underlying storage backend.
    #[snafu(display("I/O error: {source}"))]
    Io {
        /// The underlying I/O error.
        source: io::Error,
    },

    /// Store image is corrupted or has invalid format.
    #[snafu(display("Corrupted database: {reason}"))]
    Corrupted {
        /// Description of what was corrupted.
        reason: String,
    },

    /// Image body checksum verification failed.
    #[snafu(display("Image checksum mismatch: expected {expected:#018x}, computed {actual:#018x}"))]
    ChecksumMismatch {
        /// Checksum recorded in the image header.
        expected: u64,
        /// Checksum computed over the image body.
        actual: u64,
    },

    /// Invalid magic number in image header.
    #[snafu(display("Invalid database magic number"))]
    InvalidMagic,

    /// Unsupported image format version.
    #[snafu(display("Unsupported format version: {version}"))]
    UnsupportedVersion {
        /// The unsupported version number.
        version: u16,
    },

    /// Internal lock was poisoned (another thread panicked while holding it).
    #[snafu(display("Internal lock poisoned"))]
    Poisoned,
}

impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        Error::Io { source }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = Error::from(io_err);
        let display = format!("{err}");
        assert!(display.starts_with("I/O error:"), "got: {display}");
    }

    #[test]
    fn test_error_display_corrupted() {
        let err = Error::Corrupted { reason: "bad header".to_string() };
        assert_eq!(format!("{err}"), "Corrupted database: bad header");
    }

    #[test]
    fn test_error_display_checksum_mismatch() {
        let err = Error::ChecksumMismatch { expected: 1, actual: 2 };
        assert_eq!(
            format!("{err}"),
            "Image checksum mismatch: expected 0x0000000000000001, computed 0x0000000000000002"
        );
    }

    #[test]
    fn test_error_display_unsupported_version() {
        let err = Error::UnsupportedVersion { version: 99 };
        assert_eq!(format!("{err}"), "Unsupported format version: 99");
    }

    #[test]
    fn test_error_display_poisoned() {
        assert_eq!(format!("{}", Error::Poisoned), "Internal lock poisoned");
    }

    #[test]
    fn test_from_io_error_keeps_kind() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        match err {
            Error::Io { source } => assert_eq!(source.kind(), io::ErrorKind::PermissionDenied),
            other => panic!("Expected Io variant, got {other:?}"),
        }
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error as StdError;

        let err = Error::from(io::Error::other("boom"));
        assert!(err.source().is_some(), "Error::Io should have a source");
    }
}
