use crate::error::Error;
use crate::producer::Producer;
use crate::record::{BroadcastMsg, PushsMsg, BROADCAST_KEY, MULTI_KEY};
use log::*;
use router::SubKey;
use rpc::Payload;
use std::sync::Arc;

/// Writes push intents to the queue for asynchronous delivery.
#[derive(Clone)]
pub struct Publisher {
    producer: Arc<dyn Producer>,
    topic: String,
}

impl Publisher {
    pub fn new(producer: Arc<dyn Producer>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }

    /// Queue delivery of `msg` to `subkeys` held by edge server `server`.
    pub async fn publish_multi_push(
        &self,
        server: i32,
        subkeys: &[SubKey],
        msg: &Payload,
    ) -> Result<(), Error> {
        let record = PushsMsg {
            server,
            sub_keys: subkeys.to_vec(),
            msg: msg.clone(),
        };
        let payload = serde_json::to_vec(&record)?;
        self.producer.publish(&self.topic, MULTI_KEY, payload).await?;
        debug!(
            "Queued multi-push to comet {server}: {} subkeys, {} bytes",
            subkeys.len(),
            msg.len()
        );
        Ok(())
    }

    /// Queue delivery of `msg` to every connection.
    pub async fn publish_broadcast(&self, msg: &Payload) -> Result<(), Error> {
        let payload = serde_json::to_vec(&BroadcastMsg { msg: msg.clone() })?;
        self.producer
            .publish(&self.topic, BROADCAST_KEY, payload)
            .await?;
        debug!("Queued broadcast: {} bytes", msg.len());
        Ok(())
    }
}
