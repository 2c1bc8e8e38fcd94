use crate::error::{publish_error, Error};
use async_trait::async_trait;
use log::*;
use tokio::sync::mpsc;

/// The message-queue collaborator: accepts `payload` on `topic` under the
/// partition `key`, or reports why it did not.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Producer: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), Error>;
}

/// One record handed to a [`ChannelProducer`].
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

/// In-process producer that forwards every record to a channel.
#[derive(Debug, Clone)]
pub struct ChannelProducer {
    sender: mpsc::UnboundedSender<Record>,
}

impl ChannelProducer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Record>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Producer for ChannelProducer {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), Error> {
        let record = Record {
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
        };
        self.sender.send(record).map_err(|e| {
            warn!("Dropping {} record for {}: consumer gone", e.0.key, e.0.topic);
            publish_error("record channel closed")
        })
    }
}

/// Log and discard every record until all producers are dropped.
pub async fn drain(mut receiver: mpsc::UnboundedReceiver<Record>) {
    while let Some(record) = receiver.recv().await {
        info!(
            "Queued {} record on {} ({} bytes)",
            record.key,
            record.topic,
            record.payload.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueErrorKind;

    #[tokio::test]
    async fn test_channel_producer_forwards_records() {
        let (producer, mut receiver) = ChannelProducer::new();

        producer.publish("topic", "multiple", b"x".to_vec()).await.unwrap();

        assert_eq!(
            receiver.recv().await,
            Some(Record {
                topic: "topic".to_string(),
                key: "multiple".to_string(),
                payload: b"x".to_vec(),
            })
        );
    }

    #[tokio::test]
    async fn test_channel_producer_fails_without_consumer() {
        let (producer, receiver) = ChannelProducer::new();
        drop(receiver);

        let err = producer
            .publish("topic", "broadcast", Vec::new())
            .await
            .unwrap_err();

        assert_eq!(err.error_kind, QueueErrorKind::Publish);
    }
}
