//! RPC plumbing shared by the routing-directory and edge-server clients.
//!
//! # Modules
//!
//! - `client`: the `Client` and `Connector` seams plus typed `invoke`
//! - `net`: framed TCP / unix-socket transport (`NetConnector`, `NetClient`)
//! - `server`: the serving side of the same framing (`Service`, `serve`)
//! - `pool`: per-endpoint handles kept alive by reconnect supervisors
//! - `backoff`: exponential backoff between reconnect attempts
//! - `payload`: opaque message bytes, base64 on the wire
//! - `mock`: in-process transport (feature `mock`)

pub mod backoff;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod net;
pub mod payload;
pub mod pool;
pub mod server;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use client::{invoke, Client, ClientHandle, Connector};
pub use endpoint::{Endpoint, Network};
pub use error::{Error, ErrorKind};
pub use net::NetConnector;
pub use payload::Payload;
pub use pool::{Pool, PoolOptions};
