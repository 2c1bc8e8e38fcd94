//! Argument and reply bodies for the `PushRPC` service exposed by edge
//! servers.

use router::SubKey;
use rpc::Payload;
use serde::{Deserialize, Serialize};

pub const PING: &str = "PushRPC.Ping";
pub const PUSH_MSG: &str = "PushRPC.PushMsg";
pub const PUSH_MSGS: &str = "PushRPC.PushMsgs";
pub const MPUSH_MSG: &str = "PushRPC.MPushMsg";
pub const MPUSH_MSGS: &str = "PushRPC.MPushMsgs";
pub const BROADCAST: &str = "PushRPC.Broadcast";

/// Operation code of a pushed message as seen by the end client.
pub const OP_SEND_SMS_REPLY: i32 = 5;

/// One message for one connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMsgArg {
    pub key: SubKey,
    #[serde(default)]
    pub ver: i32,
    pub operation: i32,
    pub msg: Payload,
}

/// Several messages for one connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMsgsArg {
    pub key: SubKey,
    pub pm_args: Vec<PushMsgArg>,
}

/// One message for several connections held by the same edge server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MPushMsgArg {
    pub keys: Vec<SubKey>,
    pub operation: i32,
    pub msg: Payload,
}

/// A distinct message per connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MPushMsgsArg {
    pub pm_args: Vec<PushMsgArg>,
}

/// Index of the last delivered entry, as reported by the edge server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexReply {
    #[serde(default)]
    pub index: i32,
}

pub type PushMsgsReply = IndexReply;
pub type MPushMsgReply = IndexReply;
pub type MPushMsgsReply = IndexReply;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardcastArg {
    pub ver: i32,
    pub operation: i32,
    pub msg: Payload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use router::subkey::encode;
    use serde_json::json;

    #[test]
    fn test_mpush_arg_wire_shape() {
        let arg = MPushMsgArg {
            keys: vec![encode(100, 1), encode(300, 2)],
            operation: OP_SEND_SMS_REPLY,
            msg: Payload::from(&b"hi"[..]),
        };

        assert_eq!(
            serde_json::to_value(&arg).unwrap(),
            json!({"keys": ["100_1", "300_2"], "operation": 5, "msg": "aGk="})
        );
    }

    #[test]
    fn test_index_reply_defaults_to_zero() {
        let reply: MPushMsgReply = serde_json::from_value(json!({})).unwrap();
        assert_eq!(reply.index, 0);
    }
}
