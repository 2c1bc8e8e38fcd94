//! Client for the sharded routing directory.
//!
//! Every user is owned by exactly one routing node, chosen by the hash ring.
//! Per-user calls are sent to the owner; batch calls are addressed to a node
//! explicitly and must only carry users that node owns.

use crate::divide::DispatchMode;
use crate::error::{protocol_error, rpc_error, Error};
use crate::proto::{self, ConnArg, ConnReply, DisconnArg, DisconnReply, GetArg, GetReply};
use crate::proto::{GetSeqCountArg, GetSeqCountReply, MGetArg, MGetReply};
use crate::ring::Ring;
use crate::subkey::{self, SubKey};
use log::*;
use rpc::{invoke, ClientHandle, Connector, Endpoint, Pool, PoolOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One live connection of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Session {
    pub user_id: i64,
    pub seq: i32,
    pub server: i32,
}

impl Session {
    pub fn subkey(&self) -> SubKey {
        subkey::encode(self.user_id, self.seq)
    }
}

pub struct Directory {
    ring: Ring,
    pool: Pool<String>,
    pub(crate) mode: DispatchMode,
}

impl Directory {
    pub fn new(ring: Ring, pool: Pool<String>) -> Self {
        Self {
            ring,
            pool,
            mode: DispatchMode::default(),
        }
    }

    /// Connect to every routing node and place each on the ring with weight 1.
    pub async fn start(
        nodes: HashMap<String, Endpoint>,
        connector: Arc<dyn Connector>,
        options: PoolOptions,
    ) -> Self {
        let ring = Ring::build(nodes.keys().map(|node| (node.clone(), 1)));
        let options = options.with_ping_method(proto::PING);
        let pool = Pool::start("router", nodes, connector, options).await;
        Self::new(ring, pool)
    }

    pub fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    pub fn pool(&self) -> &Pool<String> {
        &self.pool
    }

    /// Routing node that owns `user_id`.
    pub fn node_for(&self, user_id: i64) -> Result<&str, Error> {
        self.ring.lookup_user(user_id)
    }

    /// Register a new connection of `user_id` on edge server `server` and
    /// return the sequence number assigned to it.
    pub async fn connect(&self, user_id: i64, server: i32) -> Result<i32, Error> {
        let node = self.node_for(user_id)?;
        let reply: ConnReply = self
            .call(node, proto::CONNECT, &ConnArg { user_id, server })
            .await?;
        Ok(reply.seq)
    }

    /// Remove one connection. Returns whether it existed.
    pub async fn disconnect(&self, user_id: i64, seq: i32) -> Result<bool, Error> {
        let node = self.node_for(user_id)?;
        let reply: DisconnReply = self
            .call(node, proto::DISCONNECT, &DisconnArg { user_id, seq })
            .await?;
        Ok(reply.has)
    }

    /// All live connections of one user.
    pub async fn get(&self, user_id: i64) -> Result<Vec<Session>, Error> {
        let node = self.node_for(user_id)?;
        let reply: GetReply = self.call(node, proto::GET, &GetArg { user_id }).await?;
        sessions_of(node, user_id, reply)
    }

    /// Live connections of `user_ids`, all owned by `node`, in reply order.
    pub async fn batch_get(&self, node: &str, user_ids: &[i64]) -> Result<Vec<Session>, Error> {
        let arg = MGetArg {
            user_ids: user_ids.to_vec(),
        };
        let reply: MGetReply = self.call(node, proto::MGET, &arg).await?;
        flatten(node, reply)
    }

    /// Every live connection recorded on `node`.
    pub async fn get_all(&self, node: &str) -> Result<Vec<Session>, Error> {
        let reply: MGetReply = self.call(node, proto::GET_ALL, &()).await?;
        flatten(node, reply)
    }

    /// Number of live connections of `user_id`.
    pub async fn seq_count(&self, user_id: i64) -> Result<i32, Error> {
        let node = self.node_for(user_id)?;
        let reply: GetSeqCountReply = self
            .call(node, proto::GET_SEQ_COUNT, &GetSeqCountArg { user_id })
            .await?;
        Ok(reply.count)
    }

    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    fn client(&self, node: &str) -> Result<ClientHandle, Error> {
        self.pool
            .resolve(&node.to_string())
            .map_err(|e| rpc_error(node, e))
    }

    async fn call<A, R>(&self, node: &str, method: &str, args: &A) -> Result<R, Error>
    where
        A: Serialize + fmt::Debug + Sync,
        R: DeserializeOwned,
    {
        let client = self.client(node)?;
        invoke(client.as_ref(), method, args).await.map_err(|e| {
            error!("Router {node} call {method}({args:?}) failed: {e}");
            rpc_error(node, e)
        })
    }
}

fn sessions_of(node: &str, user_id: i64, reply: GetReply) -> Result<Vec<Session>, Error> {
    if reply.seqs.len() != reply.servers.len() {
        return Err(protocol_error(
            node,
            &format!(
                "user {user_id} has {} seqs but {} servers",
                reply.seqs.len(),
                reply.servers.len()
            ),
        ));
    }
    Ok(reply
        .seqs
        .into_iter()
        .zip(reply.servers)
        .map(|(seq, server)| Session {
            user_id,
            seq,
            server,
        })
        .collect())
}

fn flatten(node: &str, reply: MGetReply) -> Result<Vec<Session>, Error> {
    if reply.user_ids.len() != reply.sessions.len() {
        return Err(protocol_error(
            node,
            &format!(
                "{} user ids but {} session lists",
                reply.user_ids.len(),
                reply.sessions.len()
            ),
        ));
    }
    let mut sessions = Vec::new();
    for (user_id, reply) in reply.user_ids.into_iter().zip(reply.sessions) {
        sessions.extend(sessions_of(node, user_id, reply)?);
    }
    Ok(sessions)
}
