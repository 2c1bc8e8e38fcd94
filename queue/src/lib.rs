//! Asynchronous delivery path: push intents are written to a message queue
//! and delivered by a separate consumer.

pub mod error;
pub mod producer;
pub mod publisher;
pub mod record;

pub use error::{Error, QueueErrorKind};
pub use producer::{drain, ChannelProducer, Producer, Record};
pub use publisher::Publisher;
pub use record::{BroadcastMsg, PushsMsg, BROADCAST_KEY, MULTI_KEY, PUSHS_TOPIC};
