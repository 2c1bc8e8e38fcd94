//! In-memory routing node used by the router tests.

use crate::client::Directory;
use crate::divide::DispatchMode;
use crate::proto::{self, ConnArg, ConnReply, DisconnArg, DisconnReply, GetArg, GetReply};
use crate::proto::{GetSeqCountArg, GetSeqCountReply, MGetArg, MGetReply};
use async_trait::async_trait;
use rpc::mock::MockConnector;
use rpc::server::Service;
use rpc::{Endpoint, PoolOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct MemoryRouter {
    // user -> (seq -> server), kept ordered for stable replies
    sessions: Mutex<BTreeMap<i64, BTreeMap<i32, i32>>>,
    next_seq: Mutex<HashMap<i64, i32>>,
    failing: AtomicBool,
    delay_ms: AtomicU64,
    mget_calls: AtomicUsize,
}

impl MemoryRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, user_id: i64, seq: i32, server: i32) {
        self.sessions
            .lock()
            .unwrap()
            .entry(user_id)
            .or_default()
            .insert(seq, server);
    }

    pub fn has_user(&self, user_id: i64) -> bool {
        self.sessions.lock().unwrap().contains_key(&user_id)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every non-ping reply by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn mget_calls(&self) -> usize {
        self.mget_calls.load(Ordering::SeqCst)
    }

    fn reply_of(&self, user_id: i64) -> GetReply {
        let sessions = self.sessions.lock().unwrap();
        let mut reply = GetReply::default();
        if let Some(user) = sessions.get(&user_id) {
            for (seq, server) in user {
                reply.seqs.push(*seq);
                reply.servers.push(*server);
            }
        }
        reply
    }

    fn connect(&self, arg: ConnArg) -> ConnReply {
        let seq = {
            let mut next_seq = self.next_seq.lock().unwrap();
            let next = next_seq.entry(arg.user_id).or_insert(0);
            *next += 1;
            *next
        };
        self.insert(arg.user_id, seq, arg.server);
        ConnReply { seq }
    }

    fn disconnect(&self, arg: DisconnArg) -> DisconnReply {
        let mut sessions = self.sessions.lock().unwrap();
        let has = match sessions.get_mut(&arg.user_id) {
            Some(user) => {
                let has = user.remove(&arg.seq).is_some();
                if user.is_empty() {
                    sessions.remove(&arg.user_id);
                }
                has
            }
            None => false,
        };
        DisconnReply { has }
    }

    fn mget(&self, user_ids: Vec<i64>) -> MGetReply {
        let mut reply = MGetReply::default();
        for user_id in user_ids {
            reply.sessions.push(self.reply_of(user_id));
            reply.user_ids.push(user_id);
        }
        reply
    }
}

fn parse<T: DeserializeOwned>(args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| e.to_string())
}

fn reply<T: Serialize>(reply: T) -> Result<Value, String> {
    serde_json::to_value(reply).map_err(|e| e.to_string())
}

#[async_trait]
impl Service for MemoryRouter {
    async fn handle(&self, method: &str, args: Value) -> Result<Value, String> {
        if method == proto::PING {
            return Ok(Value::Null);
        }
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err("router unavailable".to_string());
        }
        match method {
            proto::CONNECT => reply(self.connect(parse(args)?)),
            proto::DISCONNECT => reply(self.disconnect(parse(args)?)),
            proto::GET => {
                let arg: GetArg = parse(args)?;
                reply(self.reply_of(arg.user_id))
            }
            proto::MGET => {
                self.mget_calls.fetch_add(1, Ordering::SeqCst);
                let arg: MGetArg = parse(args)?;
                reply(self.mget(arg.user_ids))
            }
            proto::GET_ALL => {
                let user_ids = self.sessions.lock().unwrap().keys().copied().collect();
                reply(self.mget(user_ids))
            }
            proto::GET_SEQ_COUNT => {
                let arg: GetSeqCountArg = parse(args)?;
                let count = self.reply_of(arg.user_id).seqs.len() as i32;
                reply(GetSeqCountReply { count })
            }
            other => Err(format!("unknown method {other}")),
        }
    }
}

pub fn fast_options() -> PoolOptions {
    PoolOptions {
        ping_method: None,
        ping_interval: Duration::from_millis(5),
        reconnect_base: Duration::from_millis(5),
        reconnect_max: Duration::from_millis(20),
    }
}

/// Directory over in-memory routing nodes; node `X` is served at address
/// `router-x`.
pub async fn directory(nodes: &[(&str, Arc<MemoryRouter>)]) -> (Directory, Arc<MockConnector>) {
    directory_with_mode(nodes, DispatchMode::default()).await
}

pub async fn directory_with_mode(
    nodes: &[(&str, Arc<MemoryRouter>)],
    mode: DispatchMode,
) -> (Directory, Arc<MockConnector>) {
    let connector = Arc::new(MockConnector::new());
    let mut endpoints = HashMap::new();
    for (name, router) in nodes {
        let address = format!("router-{}", name.to_lowercase());
        connector.register(&address, Arc::clone(router) as Arc<dyn Service>);
        endpoints.insert(name.to_string(), Endpoint::tcp(address));
    }
    let directory = Directory::start(endpoints, connector.clone(), fast_options())
        .await
        .with_dispatch_mode(mode);
    (directory, connector)
}
