//! Error types for the `rpc` crate.
//!
//! Follows the same pattern as the other layers: a root Error struct holding an
//! error kind and an optional source for error chaining.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for RPC transport and pool operations.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Categories of errors raised while reaching a remote endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// The connection could not be established.
    Dial,
    /// No endpoint is registered under the requested id.
    NotFound,
    /// The endpoint is registered but has no live connection right now.
    Unavailable,
    /// The connection carrying the call was closed.
    Shutdown,
    /// No reply arrived within the per-call timeout.
    Timeout,
    /// Arguments or replies could not be encoded or decoded.
    Codec,
    /// The remote side answered the call with an error.
    Remote(String),
    /// An endpoint string could not be parsed.
    Config,
}

impl Error {
    pub fn new(error_kind: ErrorKind, message: &str) -> Self {
        Error {
            source: Some(message.to_string().into()),
            error_kind,
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    /// True when the failure says the connection itself is unusable, as
    /// opposed to the remote side rejecting a single call.
    pub fn is_connection(&self) -> bool {
        matches!(
            self.error_kind,
            ErrorKind::Dial | ErrorKind::Shutdown | ErrorKind::Timeout
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Remote(message) => write!(f, "RPC error: remote: {message}"),
            kind => match &self.source {
                Some(source) => write!(f, "RPC error: {kind:?}: {source}"),
                None => write!(f, "RPC error: {kind:?}"),
            },
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Dial,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Codec,
        }
    }
}

/// Helper function to create the error returned once a connection is gone.
pub fn shutdown_error() -> Error {
    Error::new(ErrorKind::Shutdown, "connection is shut down")
}

/// Helper function to create a remote error from the message the peer sent back.
pub fn remote_error(message: &str) -> Error {
    Error {
        source: None,
        error_kind: ErrorKind::Remote(message.to_string()),
    }
}
