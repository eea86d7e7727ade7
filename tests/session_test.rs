//! Session lifecycle against a local tag server: open, push, heartbeat,
//! reconnect, retry exhaustion and URL switching.

mod common;

use std::time::Duration;

use common::{fast_config, init_logging, wait_until, Mode, TestServer};
use serde_json::json;
use tagengine::{SessionConfig, SessionState, TagEngine, TagKey, TagValue};

const WAIT: Duration = Duration::from_secs(5);

async fn open_engine(server: &TestServer, config: SessionConfig) -> TagEngine {
    let engine = TagEngine::new(config);
    engine.ensure_connected(server.url());
    assert!(engine.wait_until_open(WAIT).await, "session opens");
    engine
}

#[tokio::test]
async fn test_pushed_values_land_in_cache() {
    init_logging();
    let server = TestServer::spawn(Mode::Normal).await;
    let engine = open_engine(&server, fast_config()).await;

    server.push_tag("plant1", "temp", json!(72));
    assert!(wait_until(WAIT, || !engine.cache().is_empty()).await);

    assert_eq!(
        engine.cache().get(&TagKey::new("plant1", "temp")),
        Some(TagValue::Number(72.0))
    );
    let entries = engine.cache().get_many(&["plant1/temp"]);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "plant1/temp");
    assert_eq!(entries[0].value, TagValue::Number(72.0));
}

#[tokio::test]
async fn test_later_push_overwrites_earlier() {
    init_logging();
    let server = TestServer::spawn(Mode::Normal).await;
    let engine = open_engine(&server, fast_config()).await;
    let key = TagKey::new("plant1", "state");

    server.push_tag("plant1", "state", json!("idle"));
    server.push_tag("plant1", "state", json!("running"));

    assert!(
        wait_until(WAIT, || {
            engine.cache().get(&key) == Some(TagValue::String("running".to_string()))
        })
        .await
    );
    assert_eq!(engine.cache().len(), 1);
}

#[tokio::test]
async fn test_malformed_frames_are_ignored() {
    init_logging();
    let server = TestServer::spawn(Mode::Normal).await;
    let engine = open_engine(&server, fast_config()).await;

    server.push("not json at all");
    server.push(r#"{"event":"tag-values","data":"oops"}"#);
    server.push(r#"{"event":"something-else","data":[]}"#);
    server.push_tag("plant1", "flow", json!(3.5));

    assert!(wait_until(WAIT, || !engine.cache().is_empty()).await);
    assert_eq!(engine.cache().len(), 1);
    assert_eq!(engine.state(), Some(SessionState::Open));
    assert_eq!(server.accepts(), 1);
}

#[tokio::test]
async fn test_subscribe_and_set_send_frames() {
    init_logging();
    let mut server = TestServer::spawn(Mode::Normal).await;
    let engine = open_engine(&server, fast_config()).await;

    assert!(engine
        .subscribe(vec!["plant1/temp".to_string(), "plant1/flow".to_string()])
        .unwrap());
    assert_eq!(
        server.next_frame().await,
        json!({"event": "sub", "tagIds": ["plant1/temp", "plant1/flow"]})
    );

    engine
        .set_value("plant1/setpoint", TagValue::Number(42.0))
        .unwrap();
    assert_eq!(
        server.next_frame().await,
        json!({"event": "set", "tags": [{"key": "plant1/setpoint", "value": 42}]})
    );

    // Writes are not reflected locally until the server pushes them back.
    assert!(engine.cache().is_empty());
}

#[tokio::test]
async fn test_live_peer_keeps_session_open() {
    init_logging();
    let server = TestServer::spawn(Mode::Normal).await;
    let engine = open_engine(&server, fast_config()).await;

    // Several heartbeat periods and pong windows.
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(engine.state(), Some(SessionState::Open));
    assert_eq!(server.accepts(), 1);
}

#[tokio::test]
async fn test_silent_peer_is_terminated_and_replaced() {
    init_logging();
    let server = TestServer::spawn(Mode::Silent).await;
    let config = SessionConfig {
        pong_timeout: Duration::from_millis(100),
        max_retries: 10,
        ..fast_config()
    };
    let engine = open_engine(&server, config).await;

    assert!(
        wait_until(WAIT, || server.accepts() >= 2).await,
        "missing pong forces a reconnect"
    );
    assert_eq!(engine.generation(), Some(1));
}

#[tokio::test]
async fn test_server_ping_is_answered_once() {
    init_logging();
    let server = TestServer::spawn(Mode::Normal).await;
    let engine = open_engine(&server, fast_config()).await;

    server.ping();
    assert!(wait_until(WAIT, || server.pongs() >= 1).await);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.pongs(), 1);
    assert_eq!(engine.state(), Some(SessionState::Open));
}

#[tokio::test]
async fn test_stalled_write_forces_reconnect() {
    init_logging();
    let server = TestServer::spawn(Mode::Silent).await;
    // No heartbeat within the test, so only the write bound can end the session.
    let config = SessionConfig {
        heartbeat_interval: Duration::from_secs(60),
        pong_timeout: Duration::from_millis(100),
        max_retries: 10,
        ..fast_config()
    };
    let engine = open_engine(&server, config).await;

    // Far more than loopback socket buffers hold for a peer that never reads.
    let blob = TagValue::String("x".repeat(1 << 20));
    for _ in 0..48 {
        let _ = engine.set_value("bulk/blob", blob.clone());
    }

    assert!(
        wait_until(Duration::from_secs(10), || server.accepts() >= 2).await,
        "stalled write ends the connection"
    );
    assert_eq!(engine.generation(), Some(1));
}

#[tokio::test]
async fn test_server_close_triggers_reconnect() {
    init_logging();
    let server = TestServer::spawn(Mode::Normal).await;
    let engine = open_engine(&server, fast_config()).await;

    server.close_all();

    assert!(wait_until(WAIT, || server.accepts() == 2).await);
    assert!(wait_until(WAIT, || server.closed() == 1).await);
    assert!(engine.wait_until_open(WAIT).await);
    assert_eq!(engine.generation(), Some(1));
}

#[tokio::test]
async fn test_retry_budget_exhausts_then_rearms() {
    init_logging();
    let server = TestServer::spawn(Mode::DropTcp).await;
    let engine = TagEngine::new(fast_config());
    engine.ensure_connected(server.url());

    // One initial attempt plus three retries.
    assert!(wait_until(WAIT, || engine.state() == Some(SessionState::Disconnected)).await);
    assert_eq!(server.accepts(), 4);

    // Parked: no further attempts on its own.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.accepts(), 4);
    assert_eq!(engine.state(), Some(SessionState::Disconnected));

    // A new request for the same URL re-arms the budget on the same session.
    engine.ensure_connected(server.url());
    assert!(wait_until(WAIT, || server.accepts() == 8).await);
    assert!(wait_until(WAIT, || engine.state() == Some(SessionState::Disconnected)).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.accepts(), 8);
    assert_eq!(engine.generation(), Some(1));
}

#[tokio::test]
async fn test_switching_url_closes_old_transport_and_keeps_cache() {
    init_logging();
    let first = TestServer::spawn(Mode::Normal).await;
    let second = TestServer::spawn(Mode::Normal).await;
    let engine = open_engine(&first, fast_config()).await;

    first.push_tag("site-a", "level", json!(10));
    assert!(wait_until(WAIT, || !engine.cache().is_empty()).await);

    engine.ensure_connected(second.url());
    assert_eq!(engine.url().as_deref(), Some(second.url()));
    assert_eq!(engine.generation(), Some(2));
    assert!(engine.wait_until_open(WAIT).await);

    assert!(
        wait_until(WAIT, || first.closed() == 1).await,
        "old transport is closed"
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(first.accepts(), 1, "old URL is not retried");

    assert_eq!(
        engine.cache().get(&TagKey::new("site-a", "level")),
        Some(TagValue::Number(10.0))
    );

    second.push_tag("site-b", "level", json!(20));
    assert!(wait_until(WAIT, || engine.cache().len() == 2).await);
}

#[tokio::test]
async fn test_shutdown_closes_transport() {
    init_logging();
    let server = TestServer::spawn(Mode::Normal).await;
    let engine = open_engine(&server, fast_config()).await;

    engine.shutdown();

    assert!(wait_until(WAIT, || server.closed() == 1).await);
    assert_eq!(engine.state(), None);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.accepts(), 1);
}
