//! Configuration for the client.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use crate::net::{DEFAULT_RPC_PASSWORD, DEFAULT_RPC_URL, DEFAULT_RPC_USER};
use crate::session::{SessionOptions, PLACEHOLDER_AVATAR, RESERVED_USERNAME};

const ENV_RPC_URL: &str = "SDHT_CLIENT_RPC_URL";
const ENV_ACTIVE_USER: &str = "SDHT_CLIENT_USER";

/// Name of the optional config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "sdht-client.toml";

/// The configuration for a client session.
#[derive(PartialEq, Eq, Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// JSON-RPC endpoint of the local daemon.
    pub rpc_url: Url,
    pub rpc_user: String,
    pub rpc_password: String,
    /// How long a persisted avatar stays valid, in seconds.
    pub avatar_ttl_secs: u64,
    /// How long a single DHT lookup may wait, in seconds. `0` waits forever.
    pub lookup_timeout_secs: u64,
    pub placeholder_avatar: String,
    pub reserved_username: String,
    /// JSON file backing the persistent avatar store. In-memory when unset.
    pub storage_path: Option<PathBuf>,
    /// The locally logged-in user.
    pub active_user: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            rpc_user: DEFAULT_RPC_USER.to_string(),
            rpc_password: DEFAULT_RPC_PASSWORD.to_string(),
            avatar_ttl_secs: 24 * 3600,
            lookup_timeout_secs: 30,
            placeholder_avatar: PLACEHOLDER_AVATAR.to_string(),
            reserved_username: RESERVED_USERNAME.to_string(),
            storage_path: None,
            active_user: None,
        }
    }
}

fn default_rpc_url() -> Url {
    Url::parse(DEFAULT_RPC_URL).expect("default rpc url is valid")
}

impl ClientConfig {
    /// Loads the configuration.
    ///
    /// If *file* is `Some` the configuration is read from it. Otherwise
    /// [`CONFIG_FILE_NAME`] in the working directory is used when present,
    /// falling back to the defaults. Environment variables override both.
    pub async fn load(file: Option<&Path>) -> Result<ClientConfig> {
        let default_config = PathBuf::from(CONFIG_FILE_NAME);
        let config_file = match file {
            Some(file) => Some(file),
            None if default_config.exists() => Some(default_config.as_path()),
            None => None,
        };

        let mut config = if let Some(file) = config_file {
            let contents = tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("reading config file {}", file.display()))?;
            Self::load_toml(&contents)?
        } else {
            Self::default()
        };

        if let Ok(url) = env::var(ENV_RPC_URL) {
            config.rpc_url = Url::parse(&url).with_context(|| format!("invalid {ENV_RPC_URL}"))?;
        }
        if let Ok(user) = env::var(ENV_ACTIVE_USER) {
            config.active_user = Some(user);
        }
        Ok(config)
    }

    fn load_toml(s: &str) -> Result<ClientConfig> {
        let config = toml::from_str(s)?;
        Ok(config)
    }

    pub fn avatar_ttl(&self) -> Duration {
        Duration::from_secs(self.avatar_ttl_secs)
    }

    pub fn lookup_timeout(&self) -> Option<Duration> {
        match self.lookup_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            reserved_username: self.reserved_username.clone(),
            placeholder_avatar: self.placeholder_avatar.clone(),
            avatar_ttl: self.avatar_ttl(),
            lookup_timeout: self.lookup_timeout(),
            active_user: self.active_user.clone(),
        }
    }
}
