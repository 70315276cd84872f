//! Error types for OTA operations

use thiserror::Error;

/// Errors raised while talking to a BT122 module
#[derive(Debug, Error)]
pub enum OtaError {
    /// Service or port not found, or a connection is already open
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Send or receive failure on an established connection
    #[error("Transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// No data arrived within the transport timeout
    #[error("Communication timeout")]
    Timeout,

    /// The transport closed or timed out part way through a response
    #[error("Short read: expected {expected} bytes, received {received}")]
    ShortRead {
        /// Number of bytes requested
        expected: usize,
        /// Number of bytes actually received before the stream stopped
        received: usize,
    },

    /// The remote response violates the framing contract
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Read-back flash contents differ from the source image
    #[error(
        "Verification failed at offset 0x{offset:06X}: expected 0x{expected:02X}, found 0x{found:02X}"
    )]
    Verification {
        /// Offset of the first mismatching byte
        offset: usize,
        /// Byte from the firmware image
        expected: u8,
        /// Byte read back from flash
        found: u8,
    },

    /// Caller supplied an out of range or inconsistent value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Local file access failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being accessed
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl OtaError {
    /// Whether this error came from the link rather than the remote's answers
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout | Self::ShortRead { .. }
        )
    }
}

/// Result type for OTA operations
pub type Result<T> = std::result::Result<T, OtaError>;

impl From<std::io::Error> for OtaError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => OtaError::Timeout,
            _ => OtaError::Transport(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_io_timeout_maps_to_timeout() {
        let err: OtaError = Error::new(ErrorKind::TimedOut, "slow").into();
        assert!(matches!(err, OtaError::Timeout));
        let err: OtaError = Error::new(ErrorKind::WouldBlock, "again").into();
        assert!(matches!(err, OtaError::Timeout));
    }

    #[test]
    fn test_io_failure_maps_to_transport() {
        let err: OtaError = Error::new(ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, OtaError::Transport(_)));
        assert!(err.is_transport());
    }

    #[test]
    fn test_verification_message() {
        let err = OtaError::Verification {
            offset: 0x40,
            expected: 0xAA,
            found: 0xFF,
        };
        assert_eq!(
            err.to_string(),
            "Verification failed at offset 0x000040: expected 0xAA, found 0xFF"
        );
        assert!(!err.is_transport());
    }
}
