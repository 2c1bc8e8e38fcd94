//! In-memory edge server used by the comet tests.

use crate::proto;
use crate::pusher::Pusher;
use async_trait::async_trait;
use rpc::mock::MockConnector;
use rpc::server::Service;
use rpc::{Endpoint, PoolOptions};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every push it receives. Pings are answered but not recorded.
#[derive(Default)]
pub struct RecordingComet {
    calls: Mutex<Vec<(String, Value)>>,
    failing: AtomicBool,
}

impl RecordingComet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

fn last_index(items: &Value) -> i64 {
    items.as_array().map(|items| items.len() as i64 - 1).unwrap_or(0)
}

#[async_trait]
impl Service for RecordingComet {
    async fn handle(&self, method: &str, args: Value) -> Result<Value, String> {
        if method == proto::PING {
            return Ok(Value::Null);
        }
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), args.clone()));
        if self.failing.load(Ordering::SeqCst) {
            return Err("comet overloaded".to_string());
        }
        match method {
            proto::MPUSH_MSG => Ok(json!({ "index": last_index(&args["keys"]) })),
            proto::PUSH_MSGS | proto::MPUSH_MSGS => {
                Ok(json!({ "index": last_index(&args["pmArgs"]) }))
            }
            proto::PUSH_MSG | proto::BROADCAST => Ok(Value::Null),
            other => Err(format!("unknown method {other}")),
        }
    }
}

/// Pusher over in-memory edge servers; server `n` is served at address
/// `comet-n`.
pub async fn pusher(servers: &[(i32, Arc<RecordingComet>)]) -> (Pusher, Arc<MockConnector>) {
    let connector = Arc::new(MockConnector::new());
    let mut endpoints = HashMap::new();
    for (server, comet) in servers {
        let address = format!("comet-{server}");
        connector.register(&address, Arc::clone(comet) as Arc<dyn Service>);
        endpoints.insert(*server, Endpoint::tcp(address));
    }
    let options = PoolOptions {
        ping_method: None,
        ping_interval: Duration::from_millis(5),
        reconnect_base: Duration::from_millis(5),
        reconnect_max: Duration::from_millis(20),
    };
    let pusher = Pusher::start(endpoints, connector.clone(), options).await;
    (pusher, connector)
}
