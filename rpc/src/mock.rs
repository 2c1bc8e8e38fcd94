//! In-process transport for tests: endpoints are served by local [`Service`]
//! implementations instead of sockets.

use crate::client::{Client, ClientHandle, Connector};
use crate::endpoint::Endpoint;
use crate::error::{remote_error, shutdown_error, Error, ErrorKind};
use crate::server::Service;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Connector that resolves endpoint addresses to registered services.
#[derive(Default)]
pub struct MockConnector {
    services: DashMap<String, Arc<dyn Service>>,
    failures: DashMap<String, usize>,
    latest: DashMap<String, Arc<MockClient>>,
    dials: DashMap<String, usize>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `address` with `service`.
    pub fn register(&self, address: &str, service: Arc<dyn Service>) {
        self.services.insert(address.to_string(), service);
    }

    /// Make the next `count` dials to `address` fail.
    pub fn fail_next(&self, address: &str, count: usize) {
        self.failures.insert(address.to_string(), count);
    }

    /// Close the most recently dialed client for `address`, simulating a
    /// dropped connection. Returns false if nothing was dialed yet.
    pub fn kill(&self, address: &str) -> bool {
        match self.latest.get(address) {
            Some(client) => {
                client.close();
                true
            }
            None => false,
        }
    }

    pub fn dial_count(&self, address: &str) -> usize {
        self.dials.get(address).map(|count| *count).unwrap_or(0)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn dial(&self, endpoint: &Endpoint) -> Result<ClientHandle, Error> {
        let address = endpoint.address.clone();
        *self.dials.entry(address.clone()).or_insert(0) += 1;

        if let Some(mut remaining) = self.failures.get_mut(&address) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::new(
                    ErrorKind::Dial,
                    &format!("injected dial failure for {address}"),
                ));
            }
        }

        let service = self
            .services
            .get(&address)
            .map(|service| Arc::clone(service.value()))
            .ok_or_else(|| Error::new(ErrorKind::Dial, &format!("connection refused: {address}")))?;

        let client = Arc::new(MockClient {
            service,
            closed: CancellationToken::new(),
        });
        self.latest.insert(address, Arc::clone(&client));
        Ok(client)
    }
}

/// Client whose calls go straight to an in-process service.
pub struct MockClient {
    service: Arc<dyn Service>,
    closed: CancellationToken,
}

impl MockClient {
    pub fn close(&self) {
        self.closed.cancel();
    }
}

#[async_trait]
impl Client for MockClient {
    async fn call(&self, method: &str, args: Value) -> Result<Value, Error> {
        if self.closed.is_cancelled() {
            return Err(shutdown_error());
        }
        self.service
            .handle(method, args)
            .await
            .map_err(|message| remote_error(&message))
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    async fn closed(&self) {
        self.closed.cancelled().await
    }
}

/// Service backed by a synchronous closure.
pub struct FnService<F>(F);

#[async_trait]
impl<F> Service for FnService<F>
where
    F: Fn(&str, Value) -> Result<Value, String> + Send + Sync,
{
    async fn handle(&self, method: &str, args: Value) -> Result<Value, String> {
        (self.0)(method, args)
    }
}

pub fn service_fn<F>(handler: F) -> Arc<dyn Service>
where
    F: Fn(&str, Value) -> Result<Value, String> + Send + Sync + 'static,
{
    Arc::new(FnService(handler))
}
