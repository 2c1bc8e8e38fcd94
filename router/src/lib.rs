//! Session routing: the hash ring of routing nodes, the directory client that
//! talks to them and the divide step that turns users into delivery lists.

pub mod client;
pub mod divide;
pub mod error;
pub mod proto;
pub mod ring;
pub mod subkey;

#[cfg(test)]
mod testing;

pub use client::{Directory, Session};
pub use divide::{shard, DeliveryPlan, DispatchMode};
pub use error::{Error, RouterErrorKind};
pub use ring::{Ring, RingBuilder};
pub use subkey::SubKey;
