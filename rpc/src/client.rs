use crate::endpoint::Endpoint;
use crate::error::Error;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// A live connection to one remote endpoint.
///
/// Implementations multiplex concurrent calls and report when the underlying
/// connection is gone so a supervisor can replace it.
#[async_trait]
pub trait Client: Send + Sync {
    /// Issue `method` with JSON `args` and wait for the reply.
    async fn call(&self, method: &str, args: Value) -> Result<Value, Error>;

    /// Whether the connection has been closed.
    fn is_closed(&self) -> bool;

    /// Resolves once the connection has been closed.
    async fn closed(&self);
}

/// Shared handle to a live client. Pools hand these out; a reconnect swaps
/// which handle the pool publishes but never mutates an existing one.
pub type ClientHandle = Arc<dyn Client>;

/// Opens connections to endpoints.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn dial(&self, endpoint: &Endpoint) -> Result<ClientHandle, Error>;
}

/// Call `method` with typed arguments and decode the typed reply.
pub async fn invoke<A, R>(client: &dyn Client, method: &str, args: &A) -> Result<R, Error>
where
    A: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let args = serde_json::to_value(args)?;
    let reply = client.call(method, args).await?;
    Ok(serde_json::from_value(reply)?)
}
