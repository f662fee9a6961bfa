//! Error types shared across the client.
//!
//! Transport failures are split into *reportable* errors, which reach error
//! handlers, and the silent [`RpcError::EmptyError`] case where the daemon
//! answered without an error object.

use thiserror::Error;

/// Failure of a single JSON-RPC call.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The daemon returned a non-null error object.
    #[error("daemon error {code}: {message}")]
    Daemon { code: i64, message: String },
    /// The daemon answered with a non-success HTTP status and no JSON body.
    #[error("http status {0}")]
    Http(reqwest::StatusCode),
    /// The request never reached the daemon or the connection broke.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The response body was not a JSON-RPC envelope.
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    /// The envelope carried neither a result nor an error object.
    #[error("empty error payload")]
    EmptyError,
}

impl RpcError {
    /// Whether error handlers should see this error at all.
    ///
    /// A null error payload is not treated as an error: no handler runs.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, RpcError::EmptyError)
    }

    /// Whether the failure means the daemon could not be talked to.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            RpcError::Transport(_) | RpcError::Http(_) | RpcError::Decode(_)
        )
    }
}

/// Failure of an identity lookup against the blockchain-backed store.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Error connecting to local twister daemon.")]
    DaemonUnreachable(#[source] RpcError),
    #[error("identity lookup failed: {0}")]
    Rpc(#[source] RpcError),
    /// The daemon answered with neither a result nor an error object.
    #[error("daemon returned no answer")]
    NoAnswer,
    #[error("unexpected identity payload: {0}")]
    Payload(serde_json::Value),
}

impl IdentityError {
    /// Whether the error should be presented to the user. A silent daemon
    /// reply should be ignored, like a null error payload on the DHT path.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, IdentityError::NoAnswer)
    }
}

impl From<RpcError> for IdentityError {
    fn from(err: RpcError) -> Self {
        if !err.is_reportable() {
            IdentityError::NoAnswer
        } else if err.is_connection_failure() {
            IdentityError::DaemonUnreachable(err)
        } else {
            IdentityError::Rpc(err)
        }
    }
}

/// Failure of the persistent key/value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}
