use crate::proto::{self, BoardcastArg, IndexReply, MPushMsgArg, MPushMsgsArg, PushMsgArg};
use crate::proto::{PushMsgsArg, OP_SEND_SMS_REPLY};
use futures_util::future::join_all;
use log::*;
use router::{DeliveryPlan, SubKey};
use rpc::{invoke, ClientHandle, Connector, Endpoint, Error, Payload, Pool, PoolOptions};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Pushes messages to edge servers over their pooled RPC clients.
///
/// Fan-out is best effort: every server is an independent unit of work and
/// a failing server is logged without affecting the others.
pub struct Pusher {
    pool: Pool<i32>,
}

impl Pusher {
    pub fn new(pool: Pool<i32>) -> Self {
        Self { pool }
    }

    /// Connect to every edge server, health-checked with `PushRPC.Ping`.
    pub async fn start(
        servers: HashMap<i32, Endpoint>,
        connector: Arc<dyn Connector>,
        options: PoolOptions,
    ) -> Self {
        let options = options.with_ping_method(proto::PING);
        Self::new(Pool::start("comet", servers, connector, options).await)
    }

    pub fn pool(&self) -> &Pool<i32> {
        &self.pool
    }

    /// Configured edge server ids in ascending order.
    pub fn servers(&self) -> Vec<i32> {
        let mut servers: Vec<i32> = self.pool.ids().copied().collect();
        servers.sort_unstable();
        servers
    }

    fn client(&self, server: i32) -> Result<ClientHandle, Error> {
        self.pool.resolve(&server)
    }

    /// Deliver `msg` to `subkeys` on one edge server with `PushRPC.MPushMsg`.
    /// Returns the index reported by the server.
    pub async fn push_direct(
        &self,
        server: i32,
        subkeys: &[SubKey],
        msg: &Payload,
    ) -> Result<i32, Error> {
        let now = Instant::now();
        let arg = MPushMsgArg {
            keys: subkeys.to_vec(),
            operation: OP_SEND_SMS_REPLY,
            msg: msg.clone(),
        };
        let result = match self.client(server) {
            Ok(client) => invoke::<_, IndexReply>(client.as_ref(), proto::MPUSH_MSG, &arg).await,
            Err(e) => Err(e),
        };
        let elapsed = now.elapsed().as_secs_f64();
        match result {
            Ok(reply) => {
                info!("Pushed to comet {server}: index {} ({elapsed:.6}s)", reply.index);
                Ok(reply.index)
            }
            Err(e) => {
                error!(
                    "Push to comet {server} failed after {elapsed:.6}s: {e}; subkeys {:?}",
                    subkeys
                );
                Err(e)
            }
        }
    }

    /// Deliver `msg` to every connection held by one edge server.
    pub async fn broadcast_direct(&self, server: i32, msg: &Payload) -> Result<(), Error> {
        let now = Instant::now();
        let arg = BoardcastArg {
            ver: 0,
            operation: OP_SEND_SMS_REPLY,
            msg: msg.clone(),
        };
        let result = match self.client(server) {
            Ok(client) => invoke::<_, Value>(client.as_ref(), proto::BROADCAST, &arg)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };
        let elapsed = now.elapsed().as_secs_f64();
        match &result {
            Ok(()) => info!(
                "Broadcast to comet {server}: {} bytes ({elapsed:.6}s)",
                msg.len()
            ),
            Err(e) => error!("Broadcast to comet {server} failed after {elapsed:.6}s: {e}"),
        }
        result
    }

    /// Push one message to a single connection.
    pub async fn push_msg(&self, server: i32, subkey: &SubKey, msg: &Payload) -> Result<(), Error> {
        let client = self.client(server)?;
        let arg = push_arg(subkey, msg);
        invoke::<_, Value>(client.as_ref(), proto::PUSH_MSG, &arg).await?;
        Ok(())
    }

    /// Push several messages, in order, to a single connection.
    pub async fn push_msgs(
        &self,
        server: i32,
        subkey: &SubKey,
        msgs: &[Payload],
    ) -> Result<i32, Error> {
        let client = self.client(server)?;
        let arg = PushMsgsArg {
            key: subkey.clone(),
            pm_args: msgs.iter().map(|msg| push_arg(subkey, msg)).collect(),
        };
        let reply: IndexReply = invoke(client.as_ref(), proto::PUSH_MSGS, &arg).await?;
        Ok(reply.index)
    }

    /// Push a distinct message to each listed connection of one edge server.
    pub async fn mpush_msgs(
        &self,
        server: i32,
        msgs: &[(SubKey, Payload)],
    ) -> Result<i32, Error> {
        let client = self.client(server)?;
        let arg = MPushMsgsArg {
            pm_args: msgs.iter().map(|(key, msg)| push_arg(key, msg)).collect(),
        };
        let reply: IndexReply = invoke(client.as_ref(), proto::MPUSH_MSGS, &arg).await?;
        Ok(reply.index)
    }

    /// Push `msg` to every server of `plan` concurrently. Returns how many
    /// servers accepted it; failures are only logged.
    pub async fn push_plan(&self, plan: &DeliveryPlan, msg: &Payload) -> usize {
        let pushes = plan
            .iter()
            .map(|(server, subkeys)| self.push_direct(*server, subkeys, msg));
        let delivered = join_all(pushes).await.iter().filter(|r| r.is_ok()).count();
        debug!("Pushed to {delivered} of {} comet servers", plan.len());
        delivered
    }

    /// Broadcast `msg` through every configured edge server. Returns how
    /// many servers accepted it.
    pub async fn broadcast(&self, msg: &Payload) -> usize {
        let servers = self.servers();
        let broadcasts = servers
            .iter()
            .map(|server| self.broadcast_direct(*server, msg));
        join_all(broadcasts)
            .await
            .iter()
            .filter(|r| r.is_ok())
            .count()
    }

    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

fn push_arg(subkey: &SubKey, msg: &Payload) -> PushMsgArg {
    PushMsgArg {
        key: subkey.clone(),
        ver: 0,
        operation: OP_SEND_SMS_REPLY,
        msg: msg.clone(),
    }
}
