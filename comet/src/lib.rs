//! Push fan-out to edge (comet) servers over pooled RPC clients.

pub mod proto;
pub mod pusher;

#[cfg(test)]
mod testing;

pub use proto::OP_SEND_SMS_REPLY;
pub use pusher::Pusher;
