//! Per-session client state and the high-level getters built on it.
//!
//! A [`Session`] owns the pending-request ledger, the profile cache and the
//! avatar cache for one logged-in application session. Nothing is global:
//! construct one on login and [`Session::reset`] it (or drop it) on logout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::cache::{AvatarCache, PersistentStore, Profile, ProfileCache, AVATAR_TTL};
use crate::core::{DhtClient, DhtReply, RpcClient, RpcTransport};
use crate::display::{display_text, is_truthy, DisplayTarget};
use crate::identity::IdentityClient;
use crate::protocol::Multiplicity;

/// DHT resource holding a user's profile document.
pub const PROFILE_RESOURCE: &str = "profile";
/// DHT resource holding a user's avatar image.
pub const AVATAR_RESOURCE: &str = "avatar";
/// DHT resource holding torrent tracker statistics.
pub const TRACKER_RESOURCE: &str = "tracker";
/// DHT resource holding a user's latest post index.
pub const STATUS_RESOURCE: &str = "status";

/// Username that never has a DHT presence.
pub const RESERVED_USERNAME: &str = "nobody";
/// Image shown for [`RESERVED_USERNAME`].
pub const PLACEHOLDER_AVATAR: &str = "img/tornado_avatar.png";

/// Callback advancing the local user's last-seen post index.
pub type LastPostIndexHook = Arc<dyn Fn(u64) + Send + Sync>;

/// Tunables for a [`Session`].
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub reserved_username: String,
    pub placeholder_avatar: String,
    pub avatar_ttl: Duration,
    /// Upper bound on one DHT lookup. Unbounded when `None`.
    pub lookup_timeout: Option<Duration>,
    /// The locally logged-in user, if any.
    pub active_user: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            reserved_username: RESERVED_USERNAME.to_string(),
            placeholder_avatar: PLACEHOLDER_AVATAR.to_string(),
            avatar_ttl: AVATAR_TTL,
            lookup_timeout: None,
            active_user: None,
        }
    }
}

/// Prefix `http://` when the URL carries no scheme separator.
pub fn normalize_url(url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

fn serve_field(field: Option<Value>, target: Option<&dyn DisplayTarget>) -> Option<Value> {
    if let (Some(target), Some(value)) = (target, field.as_ref()) {
        target.set_text(&display_text(value));
    }
    field
}

/// Client state for one application session.
///
/// Cloning is cheap; clones share all caches and the pending ledger.
pub struct Session<T: RpcTransport> {
    dht: DhtClient<T>,
    identity: IdentityClient<T>,
    profiles: Arc<Mutex<ProfileCache>>,
    avatars: Arc<Mutex<AvatarCache>>,
    options: Arc<SessionOptions>,
    active_user: Arc<Mutex<Option<String>>>,
    last_post_hook: Option<LastPostIndexHook>,
}

impl<T: RpcTransport> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            dht: self.dht.clone(),
            identity: self.identity.clone(),
            profiles: self.profiles.clone(),
            avatars: self.avatars.clone(),
            options: self.options.clone(),
            active_user: self.active_user.clone(),
            last_post_hook: self.last_post_hook.clone(),
        }
    }
}

impl<T: RpcTransport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<T: RpcTransport> Session<T> {
    pub fn new(transport: T, store: Arc<dyn PersistentStore>, options: SessionOptions) -> Self {
        let rpc = RpcClient::new(transport);
        Self {
            dht: DhtClient::with_rpc(rpc.clone()).with_lookup_timeout(options.lookup_timeout),
            identity: IdentityClient::new(rpc),
            profiles: Arc::new(Mutex::new(ProfileCache::new())),
            avatars: Arc::new(Mutex::new(AvatarCache::new(store, options.avatar_ttl))),
            active_user: Arc::new(Mutex::new(options.active_user.clone())),
            options: Arc::new(options),
            last_post_hook: None,
        }
    }

    /// Install the collaborator invoked when the active user's own post
    /// count is observed.
    pub fn with_last_post_index_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.last_post_hook = Some(Arc::new(hook));
        self
    }

    pub fn dht(&self) -> &DhtClient<T> {
        &self.dht
    }

    pub fn identity(&self) -> &IdentityClient<T> {
        &self.identity
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub async fn set_active_user(&self, username: Option<String>) {
        *self.active_user.lock().await = username;
    }

    pub async fn active_user(&self) -> Option<String> {
        self.active_user.lock().await.clone()
    }

    /// Drop every cache tier held in memory and every pending lookup.
    /// Persisted avatars are kept.
    pub async fn reset(&self) {
        self.dht.clear_pending().await;
        self.profiles.lock().await.clear();
        self.avatars.lock().await.clear_memory();
        *self.active_user.lock().await = None;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Profiles
    // ─────────────────────────────────────────────────────────────────────

    /// One field of a user's profile, written to `target` when present.
    ///
    /// The whole profile document is cached on the first successful fetch.
    /// `None` means the profile or the field is unavailable; the target is
    /// left untouched in that case.
    pub async fn get_profile_resource(
        &self,
        username: &str,
        resource: &str,
        target: Option<&dyn DisplayTarget>,
    ) -> Option<Value> {
        let cached = {
            let profiles = self.profiles.lock().await;
            profiles
                .get(username)
                .map(|profile| profile.get(resource).cloned())
        };
        if let Some(field) = cached {
            debug!(username, resource, "profile cache hit");
            return serve_field(field, target);
        }

        let reply = self
            .dht
            .dhtget(username, PROFILE_RESOURCE, Multiplicity::Single)
            .await;
        let Some(Value::Object(profile)) = reply.as_ref().and_then(DhtReply::single).cloned()
        else {
            debug!(username, "profile unavailable");
            return None;
        };
        let field = profile.get(resource).cloned();
        self.profiles.lock().await.insert(username, profile);
        serve_field(field, target)
    }

    pub async fn get_fullname(&self, username: &str, target: &dyn DisplayTarget) -> Option<Value> {
        self.get_profile_resource(username, "fullname", Some(target))
            .await
    }

    pub async fn get_bio(&self, username: &str, target: &dyn DisplayTarget) -> Option<Value> {
        self.get_profile_resource(username, "bio", Some(target)).await
    }

    pub async fn get_location(&self, username: &str, target: &dyn DisplayTarget) -> Option<Value> {
        self.get_profile_resource(username, "location", Some(target))
            .await
    }

    /// Show the user's webpage and point the target's `href` at it.
    pub async fn get_webpage(&self, username: &str, target: &dyn DisplayTarget) -> Option<String> {
        let url = self
            .get_profile_resource(username, "url", Some(target))
            .await?;
        let href = normalize_url(&display_text(&url));
        target.set_attr("href", &href);
        Some(href)
    }

    /// Publish a new profile document and drop the stale cached copy.
    pub async fn publish_profile(&self, username: &str, profile: Profile, seq: u64) -> bool {
        let accepted = self
            .dht
            .dhtput(
                username,
                PROFILE_RESOURCE,
                Multiplicity::Single,
                Value::Object(profile),
                username,
                seq,
            )
            .await;
        if accepted {
            self.clear_avatar_and_profile_cache(username).await;
        }
        accepted
    }

    // ─────────────────────────────────────────────────────────────────────
    // Avatars
    // ─────────────────────────────────────────────────────────────────────

    /// Set the target's `src` to the user's avatar.
    ///
    /// A failed or empty fetch leaves the target unchanged.
    pub async fn get_avatar(&self, username: &str, target: &dyn DisplayTarget) -> Option<String> {
        if username == self.options.reserved_username {
            target.set_attr("src", &self.options.placeholder_avatar);
            return Some(self.options.placeholder_avatar.clone());
        }

        let cached = self.avatars.lock().await.lookup(username).await;
        if let Some(data) = cached {
            target.set_attr("src", &data);
            return Some(data);
        }

        let reply = self
            .dht
            .dhtget(username, AVATAR_RESOURCE, Multiplicity::Single)
            .await;
        let data = match reply.as_ref().and_then(DhtReply::single) {
            Some(Value::String(data)) if !data.is_empty() => data.clone(),
            _ => {
                debug!(username, "avatar unavailable");
                return None;
            }
        };
        self.avatars
            .lock()
            .await
            .insert(username, data.clone())
            .await;
        target.set_attr("src", &data);
        Some(data)
    }

    /// Publish a new avatar and drop the stale cached copies.
    pub async fn publish_avatar(&self, username: &str, data: String, seq: u64) -> bool {
        let accepted = self
            .dht
            .dhtput(
                username,
                AVATAR_RESOURCE,
                Multiplicity::Single,
                Value::String(data),
                username,
                seq,
            )
            .await;
        if accepted {
            self.clear_avatar_and_profile_cache(username).await;
        }
        accepted
    }

    /// Forget everything cached about a user: the persisted avatar and both
    /// in-memory entries.
    pub async fn clear_avatar_and_profile_cache(&self, username: &str) {
        self.avatars.lock().await.remove(username).await;
        self.profiles.lock().await.remove(username);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Counters
    // ─────────────────────────────────────────────────────────────────────

    /// Estimated follower count, from the known peers of the user's tracker.
    ///
    /// The target is only written when a count is present.
    pub async fn get_followers(&self, username: &str, target: &dyn DisplayTarget) -> Option<Value> {
        let reply = self
            .dht
            .dhtget(username, TRACKER_RESOURCE, Multiplicity::Multi)
            .await?;
        let followers = reply.multi()?.first()?.get("followers")?.clone();
        if !is_truthy(&followers) {
            return None;
        }
        target.set_text(&display_text(&followers));
        Some(followers)
    }

    /// Number of posts published by the user.
    ///
    /// The displayed count never goes down: the target is only written when
    /// it shows nothing numeric, shows zero, or shows a smaller count.
    pub async fn get_posts_count(&self, username: &str, target: &dyn DisplayTarget) -> u64 {
        let reply = self
            .dht
            .dhtget(username, STATUS_RESOURCE, Multiplicity::Single)
            .await;
        let last_index = reply
            .as_ref()
            .and_then(DhtReply::single)
            .and_then(|status| status.get("userpost"))
            .and_then(|post| post.get("k"))
            .and_then(Value::as_u64);
        let count = last_index.map_or(0, |k| k + 1);

        let shown = target.text().trim().parse::<u64>().ok();
        if shown.map_or(true, |old| old == 0 || count > old) {
            target.set_text(&count.to_string());
        }

        if let (Some(k), Some(hook)) = (last_index, self.last_post_hook.as_ref()) {
            let is_active = self.active_user.lock().await.as_deref() == Some(username);
            if is_active {
                hook(k);
            }
        }
        count
    }
}
