//! Command line client for the local daemon.
//!
//! Every subcommand runs one lookup through a [`Session`], so the same
//! coalescing and caching rules apply as in an embedding application.
//!
//! # Usage
//!
//! ```bash
//! sdht-client profile alice fullname
//! sdht-client get alice tracker m
//! RUST_LOG=sdht_client=debug sdht-client avatar alice
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use sdht_client::cache::PersistentStore;
use sdht_client::logging::init_terminal_logging;
use sdht_client::{
    ClientConfig, DhtValue, DisplayTarget, HttpTransport, JsonFileStore, MemoryStore, Multiplicity,
    Session, TextTarget,
};

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(version, about = "Query a DHT social daemon over JSON-RPC")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Raw dhtget
    Get {
        username: String,
        resource: String,
        #[arg(default_value = "s")]
        multiplicity: Multiplicity,
    },
    /// Raw dhtput; VALUE is parsed as JSON, falling back to a plain string
    Put {
        username: String,
        resource: String,
        value: String,
        #[arg(long)]
        seq: u64,
        #[arg(long, default_value = "s")]
        multiplicity: Multiplicity,
        /// Signing user, defaults to USERNAME
        #[arg(long)]
        signer: Option<String>,
    },
    /// One profile field
    Profile { username: String, field: String },
    /// Avatar payload
    Avatar { username: String },
    /// Estimated follower count
    Followers { username: String },
    /// Number of posts
    Posts { username: String },
    /// Registered public key
    Pubkey { username: String },
    /// Wallet private key
    Privkey { username: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_terminal_logging()?;
    let cli = Cli::parse();
    let config = ClientConfig::load(cli.config.as_deref()).await?;

    let store: Arc<dyn PersistentStore> = match &config.storage_path {
        Some(path) => Arc::new(
            JsonFileStore::open(path)
                .await
                .with_context(|| format!("opening storage {}", path.display()))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };
    let transport = HttpTransport::new(
        config.rpc_url.clone(),
        config.rpc_user.clone(),
        config.rpc_password.clone(),
    );
    let session = Session::new(transport, store, config.session_options());

    match cli.command {
        Command::Get {
            username,
            resource,
            multiplicity,
        } => {
            let Some(reply) = session.dht().dhtget(&username, &resource, multiplicity).await else {
                bail!("{username}/{resource} unavailable");
            };
            let value = match reply.value {
                DhtValue::Single(v) => v,
                DhtValue::Multi(values) => Value::Array(values),
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Put {
            username,
            resource,
            value,
            seq,
            multiplicity,
            signer,
        } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            let signer = signer.unwrap_or_else(|| username.clone());
            let accepted = session
                .dht()
                .dhtput(&username, &resource, multiplicity, value, &signer, seq)
                .await;
            if !accepted {
                bail!("dhtput {username}/{resource} rejected");
            }
            println!("ok");
        }
        Command::Profile { username, field } => {
            let target = TextTarget::new();
            if session
                .get_profile_resource(&username, &field, Some(&target))
                .await
                .is_none()
            {
                bail!("{username} has no {field}");
            }
            println!("{}", target.text());
        }
        Command::Avatar { username } => {
            let target = TextTarget::new();
            match session.get_avatar(&username, &target).await {
                Some(src) => println!("{src}"),
                None => bail!("{username} has no avatar"),
            }
        }
        Command::Followers { username } => {
            let target = TextTarget::new();
            match session.get_followers(&username, &target).await {
                Some(_) => println!("{}", target.text()),
                None => bail!("no follower estimate for {username}"),
            }
        }
        Command::Posts { username } => {
            let target = TextTarget::new();
            session.get_posts_count(&username, &target).await;
            println!("{}", target.text());
        }
        Command::Pubkey { username } => {
            let pubkey = session.identity().dump_pubkey(&username).await?;
            if pubkey.is_empty() {
                bail!("{username} is not registered");
            }
            println!("{pubkey}");
        }
        Command::Privkey { username } => {
            let privkey = session.identity().dump_privkey(&username).await;
            if privkey.is_empty() {
                bail!("no private key for {username} in the wallet");
            }
            println!("{privkey}");
        }
    }
    Ok(())
}
