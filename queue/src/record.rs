//! Push-intent records written to the queue.

use router::SubKey;
use rpc::Payload;
use serde::{Deserialize, Serialize};

pub const PUSHS_TOPIC: &str = "KafkaPushsTopic";

/// Partition key of multi-push records.
pub const MULTI_KEY: &str = "multiple";
/// Partition key of broadcast records.
pub const BROADCAST_KEY: &str = "broadcast";

/// Deliver `msg` to `sub_keys` on edge server `server`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushsMsg {
    pub server: i32,
    pub sub_keys: Vec<SubKey>,
    pub msg: Payload,
}

/// Deliver `msg` to every connection on every edge server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMsg {
    pub msg: Payload,
}
