//! # sDHT client
//!
//! Client-side data access for a social network built on a distributed hash
//! table (DHT) and a blockchain-backed identity store. All traffic goes to a
//! local daemon over JSON-RPC.
//!
//! The crate is split into a handful of modules:
//!
//! - [`core`]: the [`RpcTransport`] seam, the [`PendingLedger`] that joins
//!   concurrent lookups for the same resource, and the [`DhtClient`] exposing
//!   `dhtget` / `dhtput`.
//! - [`net`]: the [`HttpTransport`] used against a real daemon.
//! - [`protocol`]: JSON-RPC envelopes and the typed DHT record.
//! - [`cache`]: the in-memory profile cache and the two-tier avatar cache
//!   with its [`PersistentStore`] backends.
//! - [`session`]: [`Session`], which owns all per-session state and provides
//!   the profile, avatar and counter getters.
//! - [`identity`]: public/private key lookups that bypass the DHT.
//! - [`display`]: the [`DisplayTarget`] trait UI elements implement.
//!
//! ## Getting started
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sdht_client::{HttpTransport, MemoryStore, Session, SessionOptions, TextTarget};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let session = Session::new(
//!     HttpTransport::local()?,
//!     Arc::new(MemoryStore::new()),
//!     SessionOptions::default(),
//! );
//! let name = TextTarget::new();
//! session.get_fullname("alice", &name).await;
//! println!("{}", sdht_client::DisplayTarget::text(&name));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod display;
pub mod error;
pub mod identity;
pub mod logging;
pub mod net;
pub mod protocol;
pub mod session;

pub use cache::{JsonFileStore, MemoryStore, PersistentStore, Profile};
pub use config::ClientConfig;
pub use crate::core::{
    DhtClient, DhtReply, DhtValue, FlightId, Locator, PendingLedger, RpcClient, RpcTransport,
};
pub use display::{DisplayTarget, TextTarget};
pub use error::{IdentityError, RpcError, StoreError};
pub use identity::IdentityClient;
pub use net::HttpTransport;
pub use protocol::{DhtEntry, Multiplicity};
pub use session::{normalize_url, Session, SessionOptions};
