//! Error handling for the iqscope library
//!
//! Only setup and I/O failures surface as [`Error`]. Stream corruption
//! (magic mismatch, oversize length fields, odd payload lengths) is absorbed
//! by the decoder and transform and never reaches the caller as an error.

use std::io;

use thiserror::Error;

/// A specialized Result type for iqscope operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for iqscope operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (socket, file, stdin)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid pipeline, decoder or waterfall configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Capture file could not be opened or written
    #[error("Capture error: {0}")]
    Capture(String),

    /// Snapshot rendering failed
    #[error("Render error: {0}")]
    Render(String),

    /// A pipeline task stopped abnormally
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Create a capture error with a custom message
    pub fn capture<S: Into<String>>(msg: S) -> Self {
        Error::Capture(msg.into())
    }

    /// Create a render error with a custom message
    pub fn render<S: Into<String>>(msg: S) -> Self {
        Error::Render(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "peer reset");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("I/O error"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_config_error_constructor() {
        let err = Error::config("waterfall height must be positive");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(
            err.to_string(),
            "Configuration error: waterfall height must be positive"
        );
    }

    #[test]
    fn test_capture_error_constructor() {
        let err = Error::capture("disk full");
        assert!(matches!(err, Error::Capture(_)));
        assert!(err.to_string().contains("Capture error"));
    }
}
