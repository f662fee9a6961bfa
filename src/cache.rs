//! Profile and avatar caches.
//!
//! Profiles live only in memory for the lifetime of a session. Avatars use
//! two tiers: an in-memory map in front of a [`PersistentStore`] whose
//! records expire after a configurable age (one day by default). Fetching
//! avatars at most once per day keeps the load on other peers low, since the
//! DHT rate-limits requests.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Default lifetime of a persisted avatar.
pub const AVATAR_TTL: Duration = Duration::from_secs(24 * 3600);

/// A profile document as published in the DHT.
pub type Profile = Map<String, Value>;

/// Seconds since the Unix epoch, with sub-second precision.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Persistent Key-Value Store
// ─────────────────────────────────────────────────────────────────────────────

/// A string-keyed store of JSON records with no built-in expiration.
#[async_trait]
pub trait PersistentStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Volatile [`PersistentStore`], useful for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// [`PersistentStore`] backed by a single JSON document on disk.
///
/// The whole document is loaded on open and rewritten after every mutation.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl PersistentStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value);
        self.persist(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Profile Cache
// ─────────────────────────────────────────────────────────────────────────────

/// Last successfully fetched profile per user. Entries never expire.
#[derive(Debug, Default)]
pub struct ProfileCache {
    profiles: HashMap<String, Profile>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, username: &str) -> Option<&Profile> {
        self.profiles.get(username)
    }

    pub fn insert(&mut self, username: &str, profile: Profile) {
        self.profiles.insert(username.to_string(), profile);
    }

    pub fn remove(&mut self, username: &str) -> Option<Profile> {
        self.profiles.remove(username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.profiles.contains_key(username)
    }

    pub fn clear(&mut self) {
        self.profiles.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Avatar Cache
// ─────────────────────────────────────────────────────────────────────────────

/// Avatar as written to the persistent store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedAvatar {
    /// Fetch time in seconds since the Unix epoch.
    pub time: f64,
    pub data: String,
}

impl PersistedAvatar {
    pub fn new(data: String) -> Self {
        Self {
            time: now_secs(),
            data,
        }
    }

    pub fn is_fresh(&self, now: f64, ttl: Duration) -> bool {
        self.time + ttl.as_secs_f64() > now
    }
}

/// Persistent store key for a user's avatar.
pub fn avatar_storage_key(username: &str) -> String {
    format!("avatar:{username}")
}

/// Two-tier avatar cache: memory map in front of a [`PersistentStore`].
pub struct AvatarCache {
    memory: HashMap<String, String>,
    store: Arc<dyn PersistentStore>,
    ttl: Duration,
}

impl AvatarCache {
    pub fn new(store: Arc<dyn PersistentStore>, ttl: Duration) -> Self {
        Self {
            memory: HashMap::new(),
            store,
            ttl,
        }
    }

    /// Memory hit, else a fresh persisted record promoted into memory.
    pub async fn lookup(&mut self, username: &str) -> Option<String> {
        if let Some(data) = self.memory.get(username) {
            debug!(username, "avatar memory hit");
            return Some(data.clone());
        }
        let data = self.load_persisted(username).await?;
        debug!(username, "avatar promoted from persistent store");
        self.memory.insert(username.to_string(), data.clone());
        Some(data)
    }

    async fn load_persisted(&self, username: &str) -> Option<String> {
        let key = avatar_storage_key(username);
        let raw = match self.store.get(&key).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(%key, "reading persisted avatar failed: {err}");
                return None;
            }
        };
        let record: PersistedAvatar = match serde_json::from_value(raw) {
            Ok(record) => record,
            Err(err) => {
                warn!(%key, "ignoring malformed persisted avatar: {err}");
                return None;
            }
        };
        if record.is_fresh(now_secs(), self.ttl) {
            Some(record.data)
        } else {
            debug!(%key, "persisted avatar expired");
            None
        }
    }

    /// Record a freshly fetched avatar in both tiers.
    pub async fn insert(&mut self, username: &str, data: String) {
        self.memory.insert(username.to_string(), data.clone());
        let key = avatar_storage_key(username);
        let record = PersistedAvatar::new(data);
        let stored = match serde_json::to_value(&record) {
            Ok(value) => self.store.set(&key, value).await,
            Err(err) => Err(err.into()),
        };
        if let Err(err) = stored {
            warn!(%key, "persisting avatar failed: {err}");
        }
    }

    /// Forget a user's avatar in both tiers. Missing entries are fine.
    pub async fn remove(&mut self, username: &str) {
        let key = avatar_storage_key(username);
        if let Err(err) = self.store.remove(&key).await {
            warn!(%key, "removing persisted avatar failed: {err}");
        }
        self.memory.remove(username);
    }

    pub fn in_memory(&self, username: &str) -> bool {
        self.memory.contains_key(username)
    }

    /// Drop the memory tier, keeping persisted records.
    pub fn clear_memory(&mut self) {
        self.memory.clear();
    }
}
