//! Frame bodies exchanged over a connection. Each frame is a length-prefixed
//! JSON document; requests and responses are matched by `seq`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub seq: u64,
    pub method: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub reply: Value,
}

impl Response {
    pub fn ok(seq: u64, reply: Value) -> Self {
        Self {
            seq,
            error: None,
            reply,
        }
    }

    pub fn err(seq: u64, error: String) -> Self {
        Self {
            seq,
            error: Some(error),
            reply: Value::Null,
        }
    }
}

pub(crate) fn encode<T: Serialize>(frame: &T) -> Result<Bytes, Error> {
    Ok(Bytes::from(serde_json::to_vec(frame)?))
}

pub(crate) fn decode<'a, T: Deserialize<'a>>(frame: &'a [u8]) -> Result<T, Error> {
    Ok(serde_json::from_slice(frame)?)
}
