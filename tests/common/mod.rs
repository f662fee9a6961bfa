#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

use sdht_client::cache::{avatar_storage_key, now_secs, PersistedAvatar};
use sdht_client::{MemoryStore, PersistentStore, RpcError, RpcTransport, Session, SessionOptions};

/// How an injected failure surfaces to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    /// The daemon answers with an error object.
    Daemon,
    /// The daemon cannot be reached.
    Unreachable,
    /// The daemon answers with neither result nor error.
    Empty,
}

/// In-memory daemon: DHT records, identity keys, call log and fault injection.
#[derive(Clone, Default)]
pub struct TestTransport {
    dht: Arc<Mutex<HashMap<(String, String), Vec<Value>>>>,
    pubkeys: Arc<Mutex<HashMap<String, String>>>,
    privkeys: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
    latency: Arc<Mutex<Option<Duration>>>,
    failure: Arc<Mutex<Option<Failure>>>,
}

impl TestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the records stored for `username/resource`.
    pub async fn set_records(&self, username: &str, resource: &str, values: Vec<Value>) {
        let records = values.into_iter().map(|v| record(username, resource, v)).collect();
        let mut dht = self.dht.lock().await;
        dht.insert((username.to_string(), resource.to_string()), records);
    }

    /// Store records verbatim, for payloads the daemon might send that
    /// [`record`] would not produce.
    pub async fn set_raw_records(&self, username: &str, resource: &str, records: Vec<Value>) {
        let mut dht = self.dht.lock().await;
        dht.insert((username.to_string(), resource.to_string()), records);
    }

    pub async fn set_value(&self, username: &str, resource: &str, value: Value) {
        self.set_records(username, resource, vec![value]).await;
    }

    pub async fn set_pubkey(&self, username: &str, key: &str) {
        self.pubkeys.lock().await.insert(username.to_string(), key.to_string());
    }

    pub async fn set_privkey(&self, username: &str, key: &str) {
        self.privkeys.lock().await.insert(username.to_string(), key.to_string());
    }

    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.lock().await = Some(latency);
    }

    pub async fn set_failure(&self, failure: Option<Failure>) {
        *self.failure.lock().await = failure;
    }

    pub async fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().await.clone()
    }

    /// Number of calls made to `method`.
    pub async fn call_count(&self, method: &str) -> usize {
        let calls = self.calls.lock().await;
        calls.iter().filter(|(m, _)| m == method).count()
    }

    /// Number of `dhtget` calls made for `username/resource`.
    pub async fn dhtget_count(&self, username: &str, resource: &str) -> usize {
        let calls = self.calls.lock().await;
        calls
            .iter()
            .filter(|(m, params)| {
                m == "dhtget" && params.first() == Some(&json!(username))
                    && params.get(1) == Some(&json!(resource))
            })
            .count()
    }

    async fn dispatch(&self, method: &str, params: &[Value]) -> Result<Value> {
        let arg = |idx: usize| {
            params
                .get(idx)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| anyhow!("missing string param {idx}"))
        };
        match method {
            "dhtget" => {
                let key = (arg(0)?, arg(1)?);
                let multi = arg(2)? == "m";
                let dht = self.dht.lock().await;
                let mut records = dht.get(&key).cloned().unwrap_or_default();
                if !multi {
                    records.truncate(1);
                }
                Ok(Value::Array(records))
            }
            "dhtput" => {
                let (username, resource) = (arg(0)?, arg(1)?);
                let multi = arg(2)? == "m";
                let value = params.get(3).cloned().unwrap_or(Value::Null);
                let entry = record(&username, &resource, value);
                let mut dht = self.dht.lock().await;
                let records = dht.entry((username, resource)).or_default();
                if !multi {
                    records.clear();
                }
                records.push(entry);
                Ok(Value::Null)
            }
            "dumppubkey" => {
                let keys = self.pubkeys.lock().await;
                Ok(json!(keys.get(&arg(0)?).cloned().unwrap_or_default()))
            }
            "dumpprivkey" => {
                let keys = self.privkeys.lock().await;
                match keys.get(&arg(0)?) {
                    Some(key) => Ok(json!(key)),
                    None => Err(anyhow!("Error: Private key not available")),
                }
            }
            other => Err(anyhow!("Method not found: {other}")),
        }
    }
}

#[async_trait::async_trait]
impl RpcTransport for TestTransport {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        {
            let mut calls = self.calls.lock().await;
            calls.push((method.to_string(), params.clone()));
        }
        let latency = *self.latency.lock().await;
        if let Some(delay) = latency {
            sleep(delay).await;
        }
        let failure = *self.failure.lock().await;
        match failure {
            Some(Failure::Daemon) => {
                return Err(RpcError::Daemon {
                    code: -1,
                    message: "injected daemon failure".into(),
                })
            }
            Some(Failure::Unreachable) => {
                return Err(RpcError::Http(reqwest::StatusCode::BAD_GATEWAY))
            }
            Some(Failure::Empty) => return Err(RpcError::EmptyError),
            None => {}
        }
        self.dispatch(method, &params)
            .await
            .map_err(|err| RpcError::Daemon {
                code: -4,
                message: err.to_string(),
            })
    }
}

/// A DHT record in the shape the daemon returns.
pub fn record(username: &str, resource: &str, value: Value) -> Value {
    json!({
        "p": {
            "height": 100,
            "seq": 1,
            "target": { "n": username, "r": resource, "t": "s" },
            "time": 1_400_000_000u64,
            "v": value
        },
        "sig_p": "sig",
        "sig_user": username
    })
}

pub struct TestSession {
    pub session: Session<TestTransport>,
    pub transport: TestTransport,
    pub store: Arc<MemoryStore>,
}

impl TestSession {
    pub fn new() -> Self {
        Self::with_options(SessionOptions::default())
    }

    pub fn with_options(options: SessionOptions) -> Self {
        let transport = TestTransport::new();
        let store = Arc::new(MemoryStore::new());
        let session = Session::new(transport.clone(), store.clone(), options);
        Self {
            session,
            transport,
            store,
        }
    }

    /// Write an avatar record into the persistent store, aged `age_secs`.
    pub async fn persist_avatar(&self, username: &str, data: &str, age_secs: f64) -> Result<()> {
        let record = PersistedAvatar {
            time: now_secs() - age_secs,
            data: data.to_string(),
        };
        self.store
            .set(&avatar_storage_key(username), serde_json::to_value(&record)?)
            .await?;
        Ok(())
    }
}
