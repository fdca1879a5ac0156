//! Error types for the mirror engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for mirror operations.
pub type MirrorResult<T> = Result<T, MirrorError>;

/// Errors that can occur while mirroring a remote tree.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Listing or transfer failed at the network layer.
    #[error("transfer of {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// A transport call exceeded its deadline.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// Checksum present and readable but different from the archive digest.
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Every download attempt produced a corrupt archive.
    #[error("{url} still corrupt after {attempts} attempts: expected {expected}, got {actual}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        expected: String,
        actual: String,
    },

    /// Local filesystem create/write/delete failed.
    #[error("local I/O failed on {}: {source}", path.display())]
    LocalIo { path: PathBuf, source: io::Error },

    /// Archive or checksum sibling could not be read.
    ///
    /// Never a basis for deleting files.
    #[error("cannot verify {}: {source}", path.display())]
    IndeterminateVerification { path: PathBuf, source: io::Error },

    /// The crawl was cancelled by the caller.
    #[error("mirror cancelled")]
    Cancelled,

    /// The remote tree is deeper than the configured bound.
    #[error("{url} exceeds the maximum directory depth of {max_depth}")]
    DepthExceeded { url: String, max_depth: usize },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MirrorError {
    /// Build a `LocalIo` error for `path`.
    pub(crate) fn local_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// Whether the error came from a definite checksum mismatch.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::Integrity { .. } | Self::RetriesExhausted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_display() {
        let err = MirrorError::Transport {
            url: "ftps://example.org/a.zip".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "transfer of ftps://example.org/a.zip failed: connection refused"
        );
    }

    #[test]
    fn test_integrity_display() {
        let err = MirrorError::Integrity {
            path: PathBuf::from("/tmp/a.zip"),
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        assert!(err.to_string().contains("checksum mismatch"));
        assert!(err.to_string().contains("abc123"));
        assert!(err.to_string().contains("def456"));
        assert!(err.is_integrity());
    }

    #[test]
    fn test_local_io_keeps_source() {
        use std::error::Error as _;

        let err = MirrorError::local_io(
            "/tmp/a.zip",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.source().is_some());
        assert!(!err.is_integrity());
    }
}
