//! Error types for the `logic` facade.
//!
//! Errors from the routing directory, the queue and startup configuration
//! are folded into one `Error` whose `error_kind` keeps the lower layer's
//! kind, so callers can tell a failed routing node from a rejected publish
//! without depending on those crates' error types directly.
use queue::error::{Error as QueueError, QueueErrorKind};
use router::error::{Error as RouterError, RouterErrorKind};
use rpc::error::Error as RpcError;
use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: LogicErrorKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogicErrorKind {
    Router(RouterErrorKind),
    Queue(QueueErrorKind),
    Config,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Logic error: {source}"),
            None => write!(f, "Logic error: {:?}", self.error_kind),
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

impl From<RouterError> for Error {
    fn from(err: RouterError) -> Self {
        Error {
            error_kind: LogicErrorKind::Router(err.error_kind.clone()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<QueueError> for Error {
    fn from(err: QueueError) -> Self {
        Error {
            error_kind: LogicErrorKind::Queue(err.error_kind.clone()),
            source: Some(Box::new(err)),
        }
    }
}

// Only endpoint parsing surfaces raw RPC errors at this layer.
impl From<RpcError> for Error {
    fn from(err: RpcError) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: LogicErrorKind::Config,
        }
    }
}
