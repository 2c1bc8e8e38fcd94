//! Argument and reply bodies for the `RouterRPC` service.

use serde::{Deserialize, Serialize};

pub const PING: &str = "RouterRPC.Ping";
pub const CONNECT: &str = "RouterRPC.Connect";
pub const DISCONNECT: &str = "RouterRPC.Disconnect";
pub const GET: &str = "RouterRPC.Get";
pub const MGET: &str = "RouterRPC.MGet";
pub const GET_ALL: &str = "RouterRPC.GetAll";
pub const GET_SEQ_COUNT: &str = "RouterRPC.GetSeqCount";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnArg {
    pub user_id: i64,
    pub server: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnReply {
    pub seq: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnArg {
    pub user_id: i64,
    pub seq: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisconnReply {
    #[serde(default)]
    pub has: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetArg {
    pub user_id: i64,
}

/// Sessions of one user as parallel arrays: `seqs[i]` lives on `servers[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetReply {
    #[serde(default)]
    pub seqs: Vec<i32>,
    #[serde(default)]
    pub servers: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MGetArg {
    pub user_ids: Vec<i64>,
}

/// `sessions[i]` belongs to `user_ids[i]`. Also the reply shape of `GetAll`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MGetReply {
    #[serde(default)]
    pub user_ids: Vec<i64>,
    #[serde(default)]
    pub sessions: Vec<GetReply>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSeqCountArg {
    pub user_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetSeqCountReply {
    #[serde(default)]
    pub count: i32,
}
