//! Error types for the `router` crate.
use rpc::error::{Error as RpcError, ErrorKind as RpcErrorKind};
use std::error::Error as StdError;
use std::fmt;

/// Top-level error for ring lookups, subkey decoding and routing-node calls.
///
/// RPC failures keep the routing node that produced them so a failed
/// dispatch can name the node responsible.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: RouterErrorKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouterErrorKind {
    /// No nodes were registered on the ring.
    RingEmpty,
    /// A subkey was not produced by `subkey::encode`.
    Decode,
    /// A call to a routing node failed.
    Rpc { node: String, kind: RpcErrorKind },
    /// A routing node replied with inconsistent session arrays.
    Protocol { node: String },
}

impl Error {
    /// Routing node involved in the failure, if any.
    pub fn node(&self) -> Option<&str> {
        match &self.error_kind {
            RouterErrorKind::Rpc { node, .. } | RouterErrorKind::Protocol { node } => Some(node),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            RouterErrorKind::RingEmpty => write!(f, "Router error: hash ring has no nodes"),
            RouterErrorKind::Decode => match &self.source {
                Some(source) => write!(f, "Router error: {source}"),
                None => write!(f, "Router error: malformed subkey"),
            },
            RouterErrorKind::Rpc { node, .. } => match &self.source {
                Some(source) => write!(f, "Router error: node {node}: {source}"),
                None => write!(f, "Router error: node {node}: call failed"),
            },
            RouterErrorKind::Protocol { node } => {
                write!(f, "Router error: node {node} returned a malformed reply")
            }
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

/// Attach the routing node to an RPC failure.
pub fn rpc_error(node: &str, err: RpcError) -> Error {
    Error {
        error_kind: RouterErrorKind::Rpc {
            node: node.to_string(),
            kind: err.error_kind.clone(),
        },
        source: Some(Box::new(err)),
    }
}

pub fn ring_empty_error() -> Error {
    Error {
        source: None,
        error_kind: RouterErrorKind::RingEmpty,
    }
}

pub fn decode_error(subkey: &str) -> Error {
    Error {
        source: Some(format!("malformed subkey \"{subkey}\"").into()),
        error_kind: RouterErrorKind::Decode,
    }
}

pub fn protocol_error(node: &str, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: RouterErrorKind::Protocol {
            node: node.to_string(),
        },
    }
}
