//! HTTP implementation of the RPC transport.
//!
//! This module provides [`HttpTransport`], the [`RpcTransport`] used in
//! production. Every call is a JSON-RPC POST to the daemon's local endpoint
//! using basic auth. The daemon only trusts local connections, so the
//! credentials are fixed placeholders rather than a real auth mechanism.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;
use url::Url;

use crate::core::RpcTransport;
use crate::error::RpcError;
use crate::protocol::{RpcRequest, RpcResponse};

/// Endpoint of a daemon running on the same machine.
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:28332/";
/// Placeholder basic-auth user.
pub const DEFAULT_RPC_USER: &str = "user";
/// Placeholder basic-auth password.
pub const DEFAULT_RPC_PASSWORD: &str = "pwd";

/// JSON-RPC over HTTP.
#[derive(Debug)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    url: Url,
    username: String,
    password: String,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: Url, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            url,
            username: username.into(),
            password: password.into(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Transport for the local daemon with placeholder credentials.
    pub fn local() -> anyhow::Result<Self> {
        Ok(Self::new(
            Url::parse(DEFAULT_RPC_URL)?,
            DEFAULT_RPC_USER,
            DEFAULT_RPC_PASSWORD,
        ))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);
        trace!(id, method, "sending rpc request");

        let response = self
            .http_client
            .post(self.url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(if status.is_success() {
                RpcError::EmptyError
            } else {
                RpcError::Http(status)
            });
        }
        let envelope: RpcResponse = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            // Error pages from proxies or the daemon's auth layer are not JSON.
            Err(_) if !status.is_success() => return Err(RpcError::Http(status)),
            Err(err) => return Err(err.into()),
        };
        interpret_response(envelope)
    }
}

/// Turn a decoded envelope into the call's outcome.
pub fn interpret_response(envelope: RpcResponse) -> Result<Value, RpcError> {
    match (envelope.error, envelope.result) {
        (Some(err), _) => Err(RpcError::Daemon {
            code: err.code,
            message: err.message,
        }),
        (None, Some(result)) => Ok(result),
        (None, None) => Err(RpcError::EmptyError),
    }
}
