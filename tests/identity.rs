#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use common::{Failure, TestSession};
use sdht_client::{HttpTransport, IdentityError, MemoryStore, RpcError, Session, SessionOptions};
use url::Url;

#[tokio::test]
async fn registered_user_has_a_pubkey() {
    let t = TestSession::new();
    t.transport.set_pubkey("alice", "02a1b2c3").await;

    let identity = t.session.identity();
    assert_eq!(identity.dump_pubkey("alice").await.unwrap(), "02a1b2c3");
    assert!(identity.check_pubkey_exists("alice").await.unwrap());
    assert!(!identity.check_pubkey_exists("bob").await.unwrap());
    assert_eq!(identity.dump_pubkey("bob").await.unwrap(), "");
}

#[tokio::test]
async fn identity_lookups_are_not_cached_or_coalesced() {
    let t = TestSession::new();
    t.transport.set_pubkey("carol", "03ff").await;

    let identity = t.session.identity();
    let (a, b) = tokio::join!(
        identity.check_pubkey_exists("carol"),
        identity.check_pubkey_exists("carol"),
    );
    assert!(a.unwrap() && b.unwrap());
    assert_eq!(t.transport.call_count("dumppubkey").await, 2);
    assert_eq!(t.session.dht().pending_count().await, 0);
}

#[tokio::test]
async fn unreachable_daemon_is_reported_to_the_caller() {
    let t = TestSession::new();
    t.transport.set_failure(Some(Failure::Unreachable)).await;

    let err = t.session.identity().check_pubkey_exists("dave").await.unwrap_err();
    assert!(matches!(err, IdentityError::DaemonUnreachable(_)));
    assert_eq!(err.to_string(), "Error connecting to local twister daemon.");
}

#[tokio::test]
async fn daemon_error_is_not_a_connection_failure() {
    let t = TestSession::new();
    t.transport.set_failure(Some(Failure::Daemon)).await;

    let err = t.session.identity().dump_pubkey("erin").await.unwrap_err();
    assert!(matches!(err, IdentityError::Rpc(RpcError::Daemon { .. })));
}

#[tokio::test]
async fn closed_port_counts_as_unreachable() {
    let url = Url::parse("http://127.0.0.1:1/").unwrap();
    let session = Session::new(
        HttpTransport::new(url, "user", "pwd"),
        Arc::new(MemoryStore::new()),
        SessionOptions::default(),
    );
    let err = session.identity().dump_pubkey("frank").await.unwrap_err();
    assert!(matches!(err, IdentityError::DaemonUnreachable(RpcError::Transport(_))));
}

#[tokio::test]
async fn privkey_is_returned_from_the_wallet() {
    let t = TestSession::new();
    t.transport.set_privkey("gina", "L1secret").await;
    assert_eq!(t.session.identity().dump_privkey("gina").await, "L1secret");
}

#[tokio::test]
async fn privkey_failures_are_masked_as_empty() {
    let t = TestSession::new();
    assert_eq!(t.session.identity().dump_privkey("hank").await, "");

    t.transport.set_privkey("ivy", "L2secret").await;
    t.transport.set_failure(Some(Failure::Unreachable)).await;
    assert_eq!(t.session.identity().dump_privkey("ivy").await, "");

    t.transport.set_failure(Some(Failure::Empty)).await;
    assert_eq!(t.session.identity().dump_privkey("ivy").await, "");
}

#[tokio::test]
async fn silent_pubkey_reply_is_not_reportable() {
    let t = TestSession::new();
    t.transport.set_failure(Some(Failure::Empty)).await;

    let err = t.session.identity().check_pubkey_exists("jack").await.unwrap_err();
    assert!(matches!(err, IdentityError::NoAnswer));
    assert!(!err.is_reportable());
}
