//! Error types for the core library.

use thiserror::Error;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core library.
///
/// None of these are fatal to the driver: callers log them and keep the
/// previously known value of whatever they were trying to update.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Version string did not contain at least `major.minor`.
    #[error("Invalid version string: {0:?}")]
    InvalidVersion(String),
    /// Inet encoding was neither 4 (IPv4) nor 16 (IPv6) bytes long.
    #[error("Invalid inet encoding: {len} bytes")]
    InvalidInet { len: usize },
    /// Value had the wrong type for the requested conversion.
    #[error("Unexpected value type: expected {expected}")]
    UnexpectedType { expected: &'static str },
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}
