#[path = "common/mod.rs"]
mod common;

use common::{Failure, TestSession};
use futures::future::join_all;
use sdht_client::{DisplayTarget, Profile, TextTarget};
use serde_json::json;
use tokio::time::Duration;

#[tokio::test]
async fn profile_is_fetched_once_and_cached_whole() {
    let t = TestSession::new();
    t.transport
        .set_value(
            "alice",
            "profile",
            json!({ "fullname": "Alice Liddell", "bio": "down the hole", "location": "Oxford" }),
        )
        .await;

    let name = TextTarget::new();
    let bio = TextTarget::new();
    let location = TextTarget::new();
    assert_eq!(t.session.get_fullname("alice", &name).await, Some(json!("Alice Liddell")));
    assert_eq!(t.session.get_bio("alice", &bio).await, Some(json!("down the hole")));
    t.session.get_location("alice", &location).await;

    assert_eq!(name.text(), "Alice Liddell");
    assert_eq!(bio.text(), "down the hole");
    assert_eq!(location.text(), "Oxford");
    assert_eq!(t.transport.dhtget_count("alice", "profile").await, 1);
}

#[tokio::test]
async fn profile_resource_without_target_returns_field() {
    let t = TestSession::new();
    t.transport.set_value("bob", "profile", json!({ "fullname": "Bob" })).await;

    let value = t.session.get_profile_resource("bob", "fullname", None).await;
    assert_eq!(value, Some(json!("Bob")));
    assert_eq!(t.session.get_profile_resource("bob", "bio", None).await, None);
    assert_eq!(t.transport.dhtget_count("bob", "profile").await, 1);
}

#[tokio::test]
async fn parallel_widgets_share_one_profile_fetch() {
    let t = TestSession::new();
    t.transport.set_value("carol", "profile", json!({ "fullname": "Carol" })).await;
    t.transport.set_latency(Duration::from_millis(20)).await;

    let targets: Vec<TextTarget> = (0..10).map(|_| TextTarget::new()).collect();
    join_all(targets.iter().map(|target| t.session.get_fullname("carol", target))).await;

    assert_eq!(t.transport.dhtget_count("carol", "profile").await, 1);
    assert!(targets.iter().all(|target| target.text() == "Carol"));
}

#[tokio::test]
async fn failed_profile_fetch_leaves_target_untouched() {
    let t = TestSession::new();
    t.transport.set_failure(Some(Failure::Unreachable)).await;

    let name = TextTarget::with_text("loading");
    assert_eq!(t.session.get_fullname("dave", &name).await, None);
    assert_eq!(name.text(), "loading");
    assert_eq!(name.writes(), 0);

    // Failures are not cached: the next call goes upstream again.
    t.transport.set_failure(None).await;
    t.transport.set_value("dave", "profile", json!({ "fullname": "Dave" })).await;
    assert_eq!(t.session.get_fullname("dave", &name).await, Some(json!("Dave")));
    assert_eq!(t.transport.dhtget_count("dave", "profile").await, 2);
}

#[tokio::test]
async fn missing_profile_is_not_cached() {
    let t = TestSession::new();
    let name = TextTarget::new();
    assert_eq!(t.session.get_fullname("erin", &name).await, None);
    assert_eq!(t.session.get_fullname("erin", &name).await, None);
    assert_eq!(t.transport.dhtget_count("erin", "profile").await, 2);
    assert_eq!(name.writes(), 0);
}

#[tokio::test]
async fn webpage_gets_a_scheme_when_missing() {
    let t = TestSession::new();
    t.transport.set_value("frank", "profile", json!({ "url": "example.com" })).await;
    t.transport
        .set_value("gina", "profile", json!({ "url": "https://example.com" }))
        .await;

    let link = TextTarget::new();
    assert_eq!(
        t.session.get_webpage("frank", &link).await.as_deref(),
        Some("http://example.com")
    );
    assert_eq!(link.attr("href").as_deref(), Some("http://example.com"));
    assert_eq!(link.text(), "example.com");

    let link = TextTarget::new();
    t.session.get_webpage("gina", &link).await;
    assert_eq!(link.attr("href").as_deref(), Some("https://example.com"));
}

#[tokio::test]
async fn webpage_absent_leaves_link_alone() {
    let t = TestSession::new();
    t.transport.set_value("hank", "profile", json!({ "fullname": "Hank" })).await;

    let link = TextTarget::new();
    assert_eq!(t.session.get_webpage("hank", &link).await, None);
    assert_eq!(link.attr("href"), None);
}

#[tokio::test]
async fn publishing_a_profile_invalidates_the_cache() {
    let t = TestSession::new();
    t.transport.set_value("ivy", "profile", json!({ "bio": "old" })).await;

    let bio = TextTarget::new();
    t.session.get_bio("ivy", &bio).await;
    assert_eq!(bio.text(), "old");

    let mut profile = Profile::new();
    profile.insert("bio".into(), json!("new"));
    assert!(t.session.publish_profile("ivy", profile, 2).await);

    t.session.get_bio("ivy", &bio).await;
    assert_eq!(bio.text(), "new");
    assert_eq!(t.transport.dhtget_count("ivy", "profile").await, 2);
}

#[tokio::test]
async fn reset_forgets_cached_profiles() {
    let t = TestSession::new();
    t.transport.set_value("jack", "profile", json!({ "fullname": "Jack" })).await;

    t.session.get_profile_resource("jack", "fullname", None).await;
    t.session.reset().await;
    t.session.get_profile_resource("jack", "fullname", None).await;
    assert_eq!(t.transport.dhtget_count("jack", "profile").await, 2);
}
