//! Unified error types for the virtres workspace.
//!
//! Every crate returns [`VirtResError`]; binaries wrap it in `anyhow` at the
//! edge.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum VirtResError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// User- or domain-supplied text could not be parsed.
    #[error("failed to parse {input:?}: {message}")]
    Parse {
        /// The offending input (token, range, or whole string).
        input: String,
        /// What was wrong with it.
        message: String,
    },

    /// A required process, thread, or resource was not found.
    ///
    /// Process snapshots are racy, so callers treat this as retryable.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A kernel call against another process or thread failed.
    #[error("{op} failed for pid {pid} (requested {value}): {source}")]
    Syscall {
        /// Name of the kernel operation.
        op: &'static str,
        /// Target process or thread id.
        pid: i32,
        /// The value that was being applied.
        value: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl VirtResError {
    /// Builds a [`VirtResError::Parse`] for the given input.
    pub fn parse(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Returns `true` when the error means "not there yet, retry later".
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, VirtResError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syscall_error_names_pid_and_value() {
        let err = VirtResError::Syscall {
            op: "prlimit",
            pid: 42,
            value: "1073741824".into(),
            source: std::io::Error::from_raw_os_error(libc_esrch()),
        };
        let msg = err.to_string();
        assert!(msg.contains("pid 42"));
        assert!(msg.contains("1073741824"));
    }

    #[test]
    fn not_found_is_retryable() {
        let err = VirtResError::NotFound {
            kind: "process",
            id: "qemu-kvm".into(),
        };
        assert!(err.is_not_found());
        assert!(!VirtResError::parse("x", "bad").is_not_found());
    }

    const fn libc_esrch() -> i32 {
        3
    }
}
