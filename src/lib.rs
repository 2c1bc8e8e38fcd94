//! The logic tier: resolves users to their live connections and delivers
//! messages to the edge servers holding them.

use comet::Pusher;
use log::*;
use queue::{Producer, Publisher};
use router::error::ring_empty_error;
use router::{DeliveryPlan, Directory};
use rpc::{Connector, Payload};
use service::config::Config;
use std::sync::Arc;

pub mod error;

pub use error::{Error, LogicErrorKind};

/// How a push reaches the edge servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Synchronous RPC to every edge server, best effort per server.
    Direct,
    /// Push intents written to the queue for a consumer to deliver.
    Queued,
}

#[derive(Clone)]
pub struct AppState {
    directory: Arc<Directory>,
    pusher: Arc<Pusher>,
    publisher: Publisher,
}

/// Connect to every routing node and edge server and wire up the queue.
///
/// Unreachable endpoints do not fail startup; their supervisors keep
/// dialing in the background. An empty routing node list does.
pub async fn init(
    config: &Config,
    router_connector: Arc<dyn Connector>,
    comet_connector: Arc<dyn Connector>,
    producer: Arc<dyn Producer>,
) -> Result<AppState, Error> {
    let routers = config.router_endpoints()?;
    if routers.is_empty() {
        return Err(ring_empty_error().into());
    }
    let comets = config.comet_endpoints()?;
    info!(
        "Starting with {} routing nodes, {} edge servers, dispatch {}",
        routers.len(),
        comets.len(),
        config.dispatch_mode
    );

    let directory = Directory::start(routers, router_connector, config.pool_options())
        .await
        .with_dispatch_mode(config.dispatch_mode);
    let pusher = Pusher::start(comets, comet_connector, config.pool_options()).await;
    let publisher = Publisher::new(producer, config.push_topic.clone());

    Ok(AppState::new(directory, pusher, publisher))
}

impl AppState {
    pub fn new(directory: Directory, pusher: Pusher, publisher: Publisher) -> Self {
        Self {
            directory: Arc::new(directory),
            pusher: Arc::new(pusher),
            publisher,
        }
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn pusher(&self) -> &Pusher {
        &self.pusher
    }

    /// Deliver `msg` to every live connection of `user_ids`.
    ///
    /// Resolution is all or nothing: if any routing node fails nothing is
    /// sent. Direct delivery then tries every edge server and only logs
    /// failures. Queued delivery stops at the first rejected publish.
    pub async fn push_users(
        &self,
        user_ids: &[i64],
        msg: &Payload,
        delivery: Delivery,
    ) -> Result<DeliveryPlan, Error> {
        let plan = self.directory.divide(user_ids).await?;
        match delivery {
            Delivery::Direct => {
                let delivered = self.pusher.push_plan(&plan, msg).await;
                if delivered < plan.len() {
                    warn!(
                        "Push reached {delivered} of {} edge servers",
                        plan.len()
                    );
                }
            }
            Delivery::Queued => {
                for server in plan.servers() {
                    if let Some(subkeys) = plan.get(server) {
                        self.publisher
                            .publish_multi_push(server, subkeys, msg)
                            .await?;
                    }
                }
            }
        }
        Ok(plan)
    }

    /// Deliver `msg` to every connection on every edge server.
    pub async fn broadcast(&self, msg: &Payload, delivery: Delivery) -> Result<(), Error> {
        match delivery {
            Delivery::Direct => {
                let delivered = self.pusher.broadcast(msg).await;
                debug!("Broadcast reached {delivered} edge servers");
            }
            Delivery::Queued => self.publisher.publish_broadcast(msg).await?,
        }
        Ok(())
    }

    pub async fn connect(&self, user_id: i64, server: i32) -> Result<i32, Error> {
        Ok(self.directory.connect(user_id, server).await?)
    }

    pub async fn disconnect(&self, user_id: i64, seq: i32) -> Result<bool, Error> {
        Ok(self.directory.disconnect(user_id, seq).await?)
    }

    /// Log every endpoint that currently has no live connection.
    pub fn log_unavailable(&self) {
        for node in self.directory.pool().unavailable() {
            warn!("Routing node {node} is unavailable, retrying in background");
        }
        for server in self.pusher.pool().unavailable() {
            warn!("Edge server {server} is unavailable, retrying in background");
        }
    }

    /// Stop every reconnect supervisor and release all connections.
    pub async fn shutdown(&self) {
        tokio::join!(self.directory.shutdown(), self.pusher.shutdown());
    }
}
