//! Per-endpoint client pool with background reconnect supervision.
//!
//! Every registered endpoint owns one published [`ClientHandle`] slot. A
//! supervisor task per endpoint watches the published handle and, once it is
//! closed or fails a health check, dials again with exponential backoff and
//! swaps the new handle in atomically. Callers resolving concurrently observe
//! either the old or the new handle, never a partially built one.

use crate::backoff::Backoff;
use crate::client::{Client, ClientHandle, Connector};
use crate::endpoint::Endpoint;
use crate::error::{Error, ErrorKind};
use arc_swap::ArcSwapOption;
use futures_util::future::join_all;
use log::*;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Supervisor tuning shared by every endpoint in a pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Method used as a periodic health check, e.g. `PushRPC.Ping`.
    pub ping_method: Option<&'static str>,
    pub ping_interval: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            ping_method: None,
            ping_interval: Duration::from_secs(1),
            reconnect_base: Duration::from_millis(100),
            reconnect_max: Duration::from_secs(10),
        }
    }
}

impl PoolOptions {
    pub fn with_ping_method(mut self, method: &'static str) -> Self {
        self.ping_method = Some(method);
        self
    }
}

struct Entry {
    endpoint: Endpoint,
    current: ArcSwapOption<ClientHandle>,
    stop: CancellationToken,
}

impl Entry {
    /// The published handle, if one exists and its connection is still open.
    fn live(&self) -> Option<ClientHandle> {
        self.current
            .load_full()
            .filter(|client| !client.is_closed())
            .map(|client| Arc::clone(&*client))
    }
}

/// Clients for a fixed set of endpoints keyed by logical id (a routing node
/// name or an edge server id).
pub struct Pool<K> {
    name: &'static str,
    entries: HashMap<K, Arc<Entry>>,
    shutdown: CancellationToken,
    supervisors: Mutex<Vec<JoinHandle<()>>>,
}

impl<K> Pool<K>
where
    K: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static,
{
    /// Dial every endpoint once and start its supervisor.
    ///
    /// A failed initial dial is logged and the endpoint is still registered;
    /// it stays unavailable until its supervisor connects.
    pub async fn start(
        name: &'static str,
        endpoints: HashMap<K, Endpoint>,
        connector: Arc<dyn Connector>,
        options: PoolOptions,
    ) -> Self {
        let shutdown = CancellationToken::new();

        let dials = endpoints.into_iter().map(|(id, endpoint)| {
            let connector = Arc::clone(&connector);
            async move {
                let dialed = connector.dial(&endpoint).await;
                (id, endpoint, dialed)
            }
        });

        let mut entries = HashMap::new();
        let mut supervisors = Vec::new();
        for (id, endpoint, dialed) in join_all(dials).await {
            let initial = match dialed {
                Ok(client) => {
                    info!("{name} rpc {id} connected to {endpoint}");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    error!("{name} rpc {id} dial {endpoint} failed: {e}");
                    None
                }
            };
            let entry = Arc::new(Entry {
                endpoint,
                current: ArcSwapOption::new(initial),
                stop: shutdown.child_token(),
            });
            supervisors.push(tokio::spawn(supervise(
                name,
                id.to_string(),
                Arc::clone(&entry),
                Arc::clone(&connector),
                options.clone(),
            )));
            entries.insert(id, entry);
        }

        Self {
            name,
            entries,
            shutdown,
            supervisors: Mutex::new(supervisors),
        }
    }

    /// Current live client for `id`.
    ///
    /// `NotFound` means the id was never configured; `Unavailable` is
    /// transient and clears once the supervisor reconnects.
    pub fn resolve(&self, id: &K) -> Result<ClientHandle, Error> {
        let entry = self.entries.get(id).ok_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                &format!("no {} endpoint registered for {id}", self.name),
            )
        })?;
        entry.live().ok_or_else(|| {
            Error::new(
                ErrorKind::Unavailable,
                &format!(
                    "{} endpoint {id} ({}) has no live connection",
                    self.name, entry.endpoint
                ),
            )
        })
    }

    pub fn ids(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    /// Ids whose endpoints currently have no live connection.
    pub fn unavailable(&self) -> Vec<K> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.live().is_none())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Stop supervising one endpoint. Its current handle stays published
    /// until the connection closes. Returns false for unknown ids.
    pub fn stop(&self, id: &K) -> bool {
        match self.entries.get(id) {
            Some(entry) => {
                entry.stop.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop every supervisor, wait for them to exit and release all handles.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let supervisors = std::mem::take(&mut *self.supervisors.lock().await);
        for supervisor in supervisors {
            if let Err(e) = supervisor.await {
                warn!("{} rpc supervisor ended abnormally: {e}", self.name);
            }
        }
        for entry in self.entries.values() {
            entry.current.store(None);
        }
        info!("{} rpc pool shut down", self.name);
    }
}

impl<K> Drop for Pool<K> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn supervise(
    name: &'static str,
    id: String,
    entry: Arc<Entry>,
    connector: Arc<dyn Connector>,
    options: PoolOptions,
) {
    let mut backoff = Backoff::new(options.reconnect_base, options.reconnect_max);

    loop {
        if let Some(client) = entry.live() {
            tokio::select! {
                _ = entry.stop.cancelled() => break,
                _ = client.closed() => {
                    warn!("{name} rpc {id} connection to {} closed", entry.endpoint);
                }
                _ = tokio::time::sleep(options.ping_interval) => {
                    match ping(client.as_ref(), options.ping_method).await {
                        Ok(()) => continue,
                        Err(e) if e.is_connection() => {
                            warn!("{name} rpc {id} ping {} failed: {e}", entry.endpoint);
                        }
                        Err(e) => {
                            debug!("{name} rpc {id} ping rejected: {e}");
                            continue;
                        }
                    }
                }
            }
        }

        let dialed = tokio::select! {
            _ = entry.stop.cancelled() => break,
            dialed = connector.dial(&entry.endpoint) => dialed,
        };
        match dialed {
            Ok(client) => {
                entry.current.store(Some(Arc::new(client)));
                backoff.reset();
                info!("{name} rpc {id} reconnected to {}", entry.endpoint);
            }
            Err(e) => {
                let delay = backoff.next_delay();
                error!(
                    "{name} rpc {id} reconnect to {} failed: {e}, retrying in {delay:?}",
                    entry.endpoint
                );
                tokio::select! {
                    _ = entry.stop.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    debug!("{name} rpc {id} supervisor stopped");
}

async fn ping(client: &dyn Client, method: Option<&str>) -> Result<(), Error> {
    match method {
        Some(method) => client.call(method, Value::Null).await.map(|_| ()),
        None => Ok(()),
    }
}
