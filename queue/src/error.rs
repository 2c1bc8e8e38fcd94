//! Error types for the `queue` crate.
use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: QueueErrorKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueueErrorKind {
    /// A push-intent record could not be encoded.
    Serialization,
    /// The producer did not accept the record.
    Publish,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Queue error: {:?}: {source}", self.error_kind),
            None => write!(f, "Queue error: {:?}", self.error_kind),
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

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: QueueErrorKind::Serialization,
        }
    }
}

pub fn publish_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: QueueErrorKind::Publish,
    }
}
