//! Identity lookups against the blockchain-backed key store.
//!
//! These calls bypass the DHT path entirely: no coalescing and no caching.
//! Public keys come from the block chain database, so only accepted
//! registrations are reported (local wallet users are not). Private keys
//! come from the wallet and exist even for unsent registrations.

use serde_json::Value;
use tracing::{debug, info};

use crate::core::{RpcClient, RpcTransport};
use crate::error::IdentityError;
use crate::protocol::{METHOD_DUMPPRIVKEY, METHOD_DUMPPUBKEY};

/// Pubkey/privkey helpers sharing the session's RPC client.
pub struct IdentityClient<T: RpcTransport> {
    rpc: RpcClient<T>,
}

impl<T: RpcTransport> Clone for IdentityClient<T> {
    fn clone(&self) -> Self {
        Self {
            rpc: self.rpc.clone(),
        }
    }
}

impl<T: RpcTransport> IdentityClient<T> {
    pub fn new(rpc: RpcClient<T>) -> Self {
        Self { rpc }
    }

    /// Whether `username` has a registered public key.
    ///
    /// Errors follow [`IdentityClient::dump_pubkey`].
    pub async fn check_pubkey_exists(&self, username: &str) -> Result<bool, IdentityError> {
        let pubkey = self.dump_pubkey(username).await?;
        Ok(!pubkey.is_empty())
    }

    /// The registered public key, or an empty string for unknown users.
    ///
    /// Failing to reach the daemon yields [`IdentityError::DaemonUnreachable`],
    /// whose message is meant to be shown to the user. A reply carrying
    /// neither a result nor an error yields [`IdentityError::NoAnswer`],
    /// which callers should ignore (see [`IdentityError::is_reportable`]).
    pub async fn dump_pubkey(&self, username: &str) -> Result<String, IdentityError> {
        let ret = self
            .rpc
            .call(METHOD_DUMPPUBKEY, vec![Value::from(username)])
            .await?;
        match ret {
            Value::String(key) => Ok(key),
            Value::Null => Ok(String::new()),
            other => Err(IdentityError::Payload(other)),
        }
    }

    /// The wallet's private key for `username`.
    ///
    /// The wallet legitimately has no key for foreign users, so every
    /// failure is reported as an empty string.
    pub async fn dump_privkey(&self, username: &str) -> String {
        match self
            .rpc
            .call(METHOD_DUMPPRIVKEY, vec![Value::from(username)])
            .await
        {
            Ok(Value::String(key)) => key,
            Ok(other) => {
                info!(username, "dumpprivkey: unexpected payload {other}");
                String::new()
            }
            Err(err) if err.is_reportable() => {
                info!(username, "dumpprivkey: user unknown ({err})");
                String::new()
            }
            Err(err) => {
                debug!(username, "dumpprivkey: {err}");
                String::new()
            }
        }
    }
}
