//! Full bring-up, traffic and teardown through the test environment.

mod common;

use std::time::Duration;

use common::{local_config, port_is_free, rpc_call, MockConnector, RecordingStorage};
use storage_gateway::harness::TestEnvironment;
use storage_gateway::lifecycle::audit::BufferStats;
use storage_gateway::lifecycle::{ShutdownReason, ShutdownTrigger};
use storage_gateway::net::ListenerKind;
use storage_gateway::provisioning::SchemaFixture;
use storage_gateway::version::API_VERSION;

#[tokio::test]
async fn serves_both_listeners_and_tears_down_clean() {
    let storage = RecordingStorage::new();
    let connector = MockConnector::new();
    let fixtures = [
        SchemaFixture::new("db001", "CREATE DATABASE db001;"),
        SchemaFixture::new("db002", "CREATE DATABASE db002;"),
    ];

    let env = TestEnvironment::start(local_config(), storage.clone(), connector.clone(), &fixtures)
        .await
        .unwrap();
    assert_eq!(env.databases(), ["db001", "db002"]);

    let ping = reqwest::get(format!("http://{}/{API_VERSION}/ping", env.http_addr()))
        .await
        .unwrap();
    assert_eq!(ping.status(), 200);

    let missing = reqwest::get(format!("http://{}/nope", env.http_addr()))
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
    assert_eq!(missing.json::<String>().await.unwrap(), "route not found: /nope");

    let pong = rpc_call(env.rpc_addr(), r#"{"id":9,"method":"ping"}"#).await;
    assert_eq!(pong.id, 9);
    assert_eq!(pong.result, Some(serde_json::json!("pong")));

    env.auth_cache()
        .insert("api-key", vec!["db001".into()], Duration::from_secs(60));
    let buffers = env.buffers().clone();
    let auth_cache = env.auth_cache().clone();
    let (rpc_port, http_port) = (env.rpc_addr().port(), env.http_addr().port());

    let report = env.teardown().await;
    assert!(report.failed.is_empty(), "failed steps: {:?}", report.failed);
    assert_eq!(report.completed, vec!["servers", "buffer pool", "schema fixtures"]);

    assert!(buffers.is_released());
    let stats = buffers.stats();
    assert_eq!(stats.allocated, stats.free);
    assert!(auth_cache.is_empty());
    assert_eq!(storage.disconnects(), 1);
    assert!(port_is_free(rpc_port));
    assert!(port_is_free(http_port));

    assert_eq!(
        connector.statements(),
        vec![
            "CREATE DATABASE db001",
            "CREATE DATABASE db002",
            "DROP DATABASE `db001`",
            "DROP DATABASE `db002`",
        ]
    );
}

#[tokio::test]
async fn listener_failure_reaches_the_shutdown_consumer() {
    let mut env = TestEnvironment::start(
        local_config(),
        RecordingStorage::new(),
        MockConnector::new(),
        &[],
    )
    .await
    .unwrap();
    let listener = env.take_shutdown_listener().unwrap();

    env.trigger().post(ShutdownReason::ListenerFailure {
        source: ListenerKind::Rpc,
        error: "accept failed".into(),
    });
    env.trigger().post(ShutdownReason::Requested);

    let reason = tokio::time::timeout(Duration::from_secs(1), listener.wait())
        .await
        .unwrap();
    assert_eq!(reason.to_string(), "RPC listener failed: accept failed");

    let report = env.teardown().await;
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn shutdown_with_open_rpc_connection_completes() {
    let env = TestEnvironment::start(
        local_config(),
        RecordingStorage::new(),
        MockConnector::new(),
        &[],
    )
    .await
    .unwrap();

    // Idle connection that never sends anything.
    let _idle = tokio::net::TcpStream::connect(env.rpc_addr()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let report = tokio::time::timeout(Duration::from_secs(5), env.teardown())
        .await
        .unwrap();
    assert!(report.failed.is_empty(), "failed steps: {:?}", report.failed);
}

#[tokio::test]
async fn abandoned_trigger_still_releases_the_consumer() {
    let (trigger, listener) = ShutdownTrigger::new();
    drop(trigger);
    assert_eq!(listener.wait().await, ShutdownReason::Abandoned);
}
