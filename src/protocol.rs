//! JSON-RPC message definitions.
//!
//! This module defines the request and response envelopes exchanged with the
//! local daemon, plus the typed shape of the records returned by `dhtget`.
//! All messages are serializable with serde.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

/// Read a DHT resource.
pub const METHOD_DHTGET: &str = "dhtget";
/// Store a DHT resource.
pub const METHOD_DHTPUT: &str = "dhtput";
/// Public key from the block chain database.
pub const METHOD_DUMPPUBKEY: &str = "dumppubkey";
/// Private key from the wallet database.
pub const METHOD_DUMPPRIVKEY: &str = "dumpprivkey";

/// Whether a DHT query expects one authoritative value or a set of
/// contributions from many peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Multiplicity {
    #[serde(rename = "s")]
    Single,
    #[serde(rename = "m")]
    Multi,
}

impl Multiplicity {
    /// The code the daemon expects on the wire.
    pub fn as_wire(self) -> &'static str {
        match self {
            Multiplicity::Single => "s",
            Multiplicity::Multi => "m",
        }
    }
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for Multiplicity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "s" | "single" => Ok(Multiplicity::Single),
            "m" | "multi" => Ok(Multiplicity::Multi),
            other => anyhow::bail!("unknown multiplicity {other:?}, expected s or m"),
        }
    }
}

/// A JSON-RPC request envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

impl RpcRequest {
    pub fn new(id: u64, method: &str, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// Error object carried by a failed response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// A JSON-RPC response envelope.
///
/// `result` and `error` are both optional: the daemon omits `result` on
/// failure, and sets `error` to `null` on success. A `result` of `null` is
/// kept as `Some(Value::Null)` so it can be told apart from a missing one.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default, deserialize_with = "present")]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
    #[serde(default)]
    pub id: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Metadata fields are informational. A field of an unexpected type reads as
/// absent instead of rejecting the record it belongs to.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Addressing information echoed back in a DHT record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DhtTarget {
    /// Owner username.
    #[serde(default)]
    pub n: String,
    /// Resource name.
    #[serde(default)]
    pub r: String,
    /// Multiplicity code.
    #[serde(default)]
    pub t: String,
}

/// The signed payload of a DHT record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DhtPayload {
    /// The stored value.
    #[serde(default)]
    pub v: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub seq: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub height: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub time: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub target: Option<DhtTarget>,
}

/// One record returned by `dhtget`, shaped `{ p: { v: <value>, ... }, ... }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DhtEntry {
    #[serde(default)]
    pub p: DhtPayload,
    #[serde(default, deserialize_with = "lenient")]
    pub sig_p: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub sig_user: Option<String>,
}

impl DhtEntry {
    /// Entry wrapping `v`, used when building fixtures and local echoes.
    pub fn with_value(v: Value) -> Self {
        Self {
            p: DhtPayload {
                v: Some(v),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// The stored value, if the record carried one.
    pub fn value(&self) -> Option<&Value> {
        self.p.v.as_ref()
    }
}

/// Decode a raw `dhtget` result into typed entries.
///
/// Anything that is not an array of records is treated as an empty result.
/// A record whose shape cannot be decoded still yields its `p.v`.
pub fn decode_entries(raw: Value) -> Vec<DhtEntry> {
    match raw {
        Value::Array(items) => items.into_iter().map(decode_entry).collect(),
        _ => Vec::new(),
    }
}

fn decode_entry(item: Value) -> DhtEntry {
    let value = item.get("p").and_then(|p| p.get("v")).cloned();
    match serde_json::from_value(item) {
        Ok(entry) => entry,
        Err(err) => {
            debug!("undecodable dht record metadata: {err}");
            match value {
                Some(v) if !v.is_null() => DhtEntry::with_value(v),
                _ => DhtEntry::default(),
            }
        }
    }
}

/// Parameters for `dhtget`.
pub fn dhtget_params(username: &str, resource: &str, multiplicity: Multiplicity) -> Vec<Value> {
    vec![
        Value::from(username),
        Value::from(resource),
        Value::from(multiplicity.as_wire()),
    ]
}

/// Parameters for `dhtput`.
pub fn dhtput_params(
    username: &str,
    resource: &str,
    multiplicity: Multiplicity,
    value: Value,
    signing_user: &str,
    seq: u64,
) -> Vec<Value> {
    vec![
        Value::from(username),
        Value::from(resource),
        Value::from(multiplicity.as_wire()),
        value,
        Value::from(signing_user),
        Value::from(seq),
    ]
}
