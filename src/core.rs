//! Core client logic: the RPC transport seam, the pending-request ledger, and
//! the DHT access layer built on top of them.
//!
//! - **Transport**: [`RpcTransport`] abstracts one JSON-RPC call so tests can
//!   use an in-memory daemon while production uses [`crate::net::HttpTransport`].
//! - **RPC client**: [`RpcClient`] offers both an async `call` and a
//!   callback-forwarding `call_with`.
//! - **Ledger**: [`PendingLedger`] joins concurrent lookups for the same
//!   [`Locator`] so only one upstream `dhtget` is ever in flight per key.
//! - **DHT access**: [`DhtClient`] exposes `dhtget` and `dhtput`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::error::RpcError;
use crate::protocol::{
    decode_entries, dhtget_params, dhtput_params, DhtEntry, Multiplicity, METHOD_DHTGET,
    METHOD_DHTPUT,
};

// ─────────────────────────────────────────────────────────────────────────────
// Transport Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Transport abstraction for JSON-RPC calls to the local daemon.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Issue one call and return the decoded `result` member.
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError>;
}

/// Thin wrapper that forwards calls to a shared transport.
pub struct RpcClient<T: RpcTransport> {
    transport: Arc<T>,
}

impl<T: RpcTransport> Clone for RpcClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
        }
    }
}

impl<T: RpcTransport> RpcClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    /// Issue a call and hand the outcome back unchanged.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        debug!(method, "rpc call");
        self.transport.call(method, params).await
    }

    /// Issue a call in the background and forward its outcome to a callback.
    ///
    /// `on_error` only runs for reportable errors. When the daemon answers
    /// with a null error payload neither callback runs.
    pub fn call_with<S, E>(&self, method: &str, params: Vec<Value>, on_success: S, on_error: E)
    where
        S: FnOnce(Value) + Send + 'static,
        E: FnOnce(RpcError) + Send + 'static,
    {
        let client = self.clone();
        let method = method.to_string();
        tokio::spawn(async move {
            match client.call(&method, params).await {
                Ok(result) => on_success(result),
                Err(err) if err.is_reportable() => on_error(err),
                Err(_) => {
                    warn!(%method, "rpc failed with an empty error payload; no handler invoked");
                }
            }
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pending-Request Ledger
// ─────────────────────────────────────────────────────────────────────────────

/// Composite key identifying one DHT query: `username;resource;multiplicity`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Locator(String);

impl Locator {
    pub fn new(username: &str, resource: &str, multiplicity: Multiplicity) -> Self {
        Self(format!("{username};{resource};{multiplicity}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The value extracted from a successful `dhtget`.
#[derive(Clone, Debug, PartialEq)]
pub enum DhtValue {
    /// First record's `p.v`.
    Single(Value),
    /// Every record's `p.v`, in response order. Missing values are `null`.
    Multi(Vec<Value>),
}

/// Outcome delivered to every waiter of a successful lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct DhtReply {
    pub value: DhtValue,
    /// The records exactly as the daemon returned them.
    pub raw: Arc<Vec<DhtEntry>>,
}

impl DhtReply {
    /// The single value, if this reply came from a single-valued lookup.
    pub fn single(&self) -> Option<&Value> {
        match &self.value {
            DhtValue::Single(v) => Some(v),
            DhtValue::Multi(_) => None,
        }
    }

    /// The value list, if this reply came from a multi-valued lookup.
    pub fn multi(&self) -> Option<&[Value]> {
        match &self.value {
            DhtValue::Multi(values) => Some(values),
            DhtValue::Single(_) => None,
        }
    }
}

/// A registered callback. `None` means the resource is unavailable.
pub type Waiter = Box<dyn FnOnce(Option<DhtReply>) + Send>;

/// Identifies one upstream call for a locator.
///
/// A response only flushes the ledger entry created for its own call, so a
/// call issued before [`PendingLedger::clear`] cannot complete lookups
/// registered after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FlightId(u64);

struct Flight {
    id: FlightId,
    waiters: Vec<Waiter>,
}

/// In-flight `dhtget` calls and the callers waiting on them.
///
/// A locator is present iff an upstream call for it is outstanding.
#[derive(Default)]
pub struct PendingLedger {
    pending: HashMap<Locator, Flight>,
    next_flight: u64,
}

impl fmt::Debug for PendingLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingLedger")
            .field("locators", &self.pending.len())
            .field("next_flight", &self.next_flight)
            .finish()
    }
}

impl PendingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a waiter. Returns the new flight if the locator was not pending
    /// before, in which case the caller is responsible for issuing the
    /// upstream call and reporting back with that id.
    pub fn add_pending(&mut self, locator: Locator, waiter: Waiter) -> Option<FlightId> {
        match self.pending.entry(locator) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().waiters.push(waiter);
                None
            }
            Entry::Vacant(entry) => {
                let id = FlightId(self.next_flight);
                self.next_flight += 1;
                entry.insert(Flight {
                    id,
                    waiters: vec![waiter],
                });
                Some(id)
            }
        }
    }

    fn take_flight(&mut self, locator: &Locator, flight: FlightId) -> Option<Vec<Waiter>> {
        match self.pending.get(locator) {
            Some(current) if current.id == flight => {
                self.pending.remove(locator).map(|flight| flight.waiters)
            }
            Some(_) => {
                warn!(%locator, ?flight, "response for a superseded flight ignored");
                None
            }
            None => {
                warn!(%locator, ?flight, "response for unknown locator ignored");
                None
            }
        }
    }

    /// Deliver an upstream response to every waiter and forget the locator.
    pub fn process_pending(
        &mut self,
        locator: &Locator,
        flight: FlightId,
        multiplicity: Multiplicity,
        entries: Vec<DhtEntry>,
    ) {
        let Some(waiters) = self.take_flight(locator, flight) else {
            return;
        };

        let raw = Arc::new(entries);
        let outcome = match multiplicity {
            Multiplicity::Single => raw.first().and_then(DhtEntry::value).cloned().map(|v| {
                DhtReply {
                    value: DhtValue::Single(v),
                    raw: raw.clone(),
                }
            }),
            Multiplicity::Multi => {
                let values = raw
                    .iter()
                    .map(|entry| entry.value().cloned().unwrap_or(Value::Null))
                    .collect();
                Some(DhtReply {
                    value: DhtValue::Multi(values),
                    raw: raw.clone(),
                })
            }
        };

        debug!(%locator, waiters = waiters.len(), found = outcome.is_some(), "dhtget flushed");
        for waiter in waiters {
            waiter(outcome.clone());
        }
    }

    /// Signal failure to every waiter and forget the locator.
    pub fn abort_pending(&mut self, locator: &Locator, flight: FlightId) {
        let Some(waiters) = self.take_flight(locator, flight) else {
            return;
        };
        for waiter in waiters {
            waiter(None);
        }
    }

    pub fn is_pending(&self, locator: &Locator) -> bool {
        self.pending.contains_key(locator)
    }

    /// Number of waiters registered for a locator.
    pub fn waiters(&self, locator: &Locator) -> usize {
        self.pending
            .get(locator)
            .map_or(0, |flight| flight.waiters.len())
    }

    /// Number of locators currently in flight.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every waiter without calling it. Flight ids keep counting, so a
    /// response to a call issued before the clear is recognised as stale.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DHT Access Layer
// ─────────────────────────────────────────────────────────────────────────────

/// `dhtget` / `dhtput` on top of an [`RpcTransport`].
///
/// Reads are coalesced through a [`PendingLedger`]: concurrent lookups for
/// the same `(username, resource, multiplicity)` share one upstream call and
/// each caller still gets its own callback. Writes are never coalesced.
///
/// The client is cheap to clone; clones share the ledger.
pub struct DhtClient<T: RpcTransport> {
    rpc: RpcClient<T>,
    ledger: Arc<Mutex<PendingLedger>>,
    lookup_timeout: Option<Duration>,
}

impl<T: RpcTransport> Clone for DhtClient<T> {
    fn clone(&self) -> Self {
        Self {
            rpc: self.rpc.clone(),
            ledger: self.ledger.clone(),
            lookup_timeout: self.lookup_timeout,
        }
    }
}

impl<T: RpcTransport> DhtClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_rpc(RpcClient::new(transport))
    }

    pub fn with_rpc(rpc: RpcClient<T>) -> Self {
        Self {
            rpc,
            ledger: Arc::new(Mutex::new(PendingLedger::new())),
            lookup_timeout: None,
        }
    }

    /// Bound how long [`DhtClient::dhtget`] waits for its flight. A lookup
    /// that runs out of time yields `None`; its locator stays pending.
    pub fn with_lookup_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// The underlying RPC client, for calls that bypass the DHT path.
    pub fn rpc(&self) -> &RpcClient<T> {
        &self.rpc
    }

    /// Look up a resource and deliver the outcome to `callback`.
    ///
    /// If the same locator is already in flight the callback joins it and no
    /// new call is issued. Otherwise the call runs in a background task.
    /// A reportable transport error aborts the locator. A null error payload
    /// leaves it pending until [`DhtClient::clear_pending`].
    pub async fn dhtget_with<F>(
        &self,
        username: &str,
        resource: &str,
        multiplicity: Multiplicity,
        callback: F,
    ) where
        F: FnOnce(Option<DhtReply>) + Send + 'static,
    {
        let locator = Locator::new(username, resource, multiplicity);
        let flight = {
            let mut ledger = self.ledger.lock().await;
            ledger.add_pending(locator.clone(), Box::new(callback))
        };
        let Some(flight) = flight else {
            debug!(%locator, "joined pending dhtget");
            return;
        };

        let rpc = self.rpc.clone();
        let ledger = self.ledger.clone();
        let params = dhtget_params(username, resource, multiplicity);
        tokio::spawn(async move {
            match rpc.call(METHOD_DHTGET, params).await {
                Ok(ret) => {
                    let entries = decode_entries(ret);
                    let mut ledger = ledger.lock().await;
                    ledger.process_pending(&locator, flight, multiplicity, entries);
                }
                Err(err) if err.is_reportable() => {
                    warn!(%locator, "dhtget failed: {err}");
                    let mut ledger = ledger.lock().await;
                    ledger.abort_pending(&locator, flight);
                }
                Err(_) => {
                    warn!(%locator, "dhtget returned an empty error payload; locator stays pending");
                }
            }
        });
    }

    /// Look up a resource. `None` means unavailable, not an empty value.
    ///
    /// Without a lookup timeout this waits until the flight completes or the
    /// ledger is cleared.
    pub async fn dhtget(
        &self,
        username: &str,
        resource: &str,
        multiplicity: Multiplicity,
    ) -> Option<DhtReply> {
        let (tx, rx) = oneshot::channel();
        self.dhtget_with(username, resource, multiplicity, move |reply| {
            let _ = tx.send(reply);
        })
        .await;
        match self.lookup_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply.ok().flatten(),
                Err(_) => {
                    warn!(username, resource, "dhtget gave up after {limit:?}");
                    None
                }
            },
            None => rx.await.ok().flatten(),
        }
    }

    /// Store a value at a resource. Returns whether the daemon accepted it.
    pub async fn dhtput(
        &self,
        username: &str,
        resource: &str,
        multiplicity: Multiplicity,
        value: Value,
        signing_user: &str,
        seq: u64,
    ) -> bool {
        let params = dhtput_params(username, resource, multiplicity, value, signing_user, seq);
        match self.rpc.call(METHOD_DHTPUT, params).await {
            Ok(_) => true,
            Err(err) => {
                if err.is_reportable() {
                    warn!(username, resource, "dhtput failed: {err}");
                }
                false
            }
        }
    }

    /// Callback form of [`DhtClient::dhtput`]. Without a callback the result
    /// is discarded.
    #[allow(clippy::too_many_arguments)]
    pub fn dhtput_with<F>(
        &self,
        username: &str,
        resource: &str,
        multiplicity: Multiplicity,
        value: Value,
        signing_user: &str,
        seq: u64,
        callback: Option<F>,
    ) where
        F: FnOnce(bool) + Send + 'static,
    {
        let params = dhtput_params(username, resource, multiplicity, value, signing_user, seq);
        let (ok_tx, err_tx) = split_callback(callback);
        let resource = resource.to_string();
        self.rpc.call_with(
            METHOD_DHTPUT,
            params,
            move |_| {
                if let Some(cb) = ok_tx.take() {
                    cb(true);
                }
            },
            move |err| {
                warn!(%resource, "dhtput failed: {err}");
                if let Some(cb) = err_tx.take() {
                    cb(false);
                }
            },
        );
    }

    /// Whether a lookup for this locator is in flight.
    pub async fn is_pending(&self, locator: &Locator) -> bool {
        self.ledger.lock().await.is_pending(locator)
    }

    /// Number of locators in flight.
    pub async fn pending_count(&self) -> usize {
        self.ledger.lock().await.len()
    }

    /// Forget every in-flight lookup. Async waiters observe `None`.
    pub async fn clear_pending(&self) {
        self.ledger.lock().await.clear();
    }
}

/// A one-shot callback that either the success or the error path may claim.
struct SharedCallback<F>(Arc<std::sync::Mutex<Option<F>>>);

impl<F> SharedCallback<F> {
    fn take(&self) -> Option<F> {
        match self.0.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

fn split_callback<F>(callback: Option<F>) -> (SharedCallback<F>, SharedCallback<F>) {
    let slot = Arc::new(std::sync::Mutex::new(callback));
    (SharedCallback(slot.clone()), SharedCallback(slot))
}
