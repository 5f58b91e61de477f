//! Error types for Reef
//!
//! This module defines the unified error type used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! ## Error Categories
//!
//! - **Transport**: send/receive failures, short reads, broken connections
//! - **Protocol**: malformed replies, id mismatches
//! - **Backend**: failures propagated from a storage backend
//! - **NotFound** / **Exists**: entity lookup and uniqueness violations
//! - **InvalidArgument**: malformed URIs, out-of-range selectors,
//!   unsupported types
//! - **IteratorEnd**: the explicit end-of-stream signal; never conflated
//!   with I/O errors
//! - **NotSupported**: semantics that a backend cannot represent

use std::io;
use thiserror::Error;

/// Result type alias for Reef operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the Reef framework
#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure (send, receive, short read, connect)
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed reply or id mismatch
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Failure propagated from a storage backend
    #[error("backend error: {0}")]
    Backend(String),

    /// Entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Entity already exists and the backend enforces uniqueness
    #[error("already exists: {0}")]
    Exists(String),

    /// Malformed input or out-of-range value
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// End of an iterator stream. Distinct from any I/O failure so that
    /// callers can tell exhaustion apart from errors.
    #[error("no more elements")]
    IteratorEnd,

    /// Requested semantics or operation is not representable
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Reserved; unused by the current core
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error is the end-of-iteration signal.
    pub fn is_iterator_end(&self) -> bool {
        matches!(self, Error::IteratorEnd)
    }

    /// Whether this error indicates a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Error::Protocol(format!("document encode: {err}"))
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Error::Protocol(format!("document decode: {err}"))
    }
}
