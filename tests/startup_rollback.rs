//! Startup ordering and rollback.

mod common;

use std::sync::Arc;

use common::{free_port, local_config, occupied_port, port_is_free, RecordingStorage};
use storage_gateway::buffers::BufferPool;
use storage_gateway::config::ServiceConfig;
use storage_gateway::lifecycle::{
    start_default_servers, ShutdownTrigger, StartupContext, StartupError, StartupStep,
};
use storage_gateway::security::ApiKeyCache;

struct Fixture {
    storage: Arc<RecordingStorage>,
    buffers: Arc<BufferPool>,
    auth_cache: ApiKeyCache,
    trigger: ShutdownTrigger,
}

impl Fixture {
    fn new(storage: Arc<RecordingStorage>) -> Self {
        let (trigger, _listener) = ShutdownTrigger::new();
        Self {
            storage,
            buffers: BufferPool::open(&local_config().internal).unwrap(),
            auth_cache: ApiKeyCache::new(),
            trigger,
        }
    }

    fn context(&self, config: ServiceConfig) -> StartupContext<RecordingStorage> {
        StartupContext {
            config: Arc::new(config),
            storage: Arc::clone(&self.storage),
            buffers: Arc::clone(&self.buffers),
            auth_cache: self.auth_cache.clone(),
            trigger: self.trigger.clone(),
        }
    }
}

#[tokio::test]
async fn storage_failure_binds_nothing() {
    let rpc_port = free_port();
    let http_port = free_port();
    let mut config = local_config();
    config.rpc.server_port = rpc_port;
    config.rest.server_port = http_port;

    let fixture = Fixture::new(RecordingStorage::failing_connect());
    let err = start_default_servers(fixture.context(config))
        .await
        .err()
        .unwrap();

    assert_eq!(err.step(), StartupStep::StorageConnection);
    assert!(err.to_string().starts_with("failed creating storage connection; error: "));
    assert_eq!(fixture.storage.connects(), 1);
    assert_eq!(fixture.storage.disconnects(), 0);
    assert!(port_is_free(rpc_port));
    assert!(port_is_free(http_port));
}

#[tokio::test]
async fn tls_failure_closes_storage() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = local_config();
    config.security.enable_tls = true;
    config.security.certificate_file = dir.path().join("missing.pem").display().to_string();
    config.security.private_key_file = dir.path().join("missing.key").display().to_string();

    let fixture = Fixture::new(RecordingStorage::new());
    let err = start_default_servers(fixture.context(config))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, StartupError::Tls(_)));
    assert_eq!(fixture.storage.disconnects(), 1);
    assert!(!storage_gateway::StorageEngine::is_connected(&*fixture.storage));
}

#[tokio::test]
async fn rpc_bind_failure_closes_storage() {
    let (_held, port) = occupied_port();
    let mut config = local_config();
    config.rpc.server_port = port;

    let fixture = Fixture::new(RecordingStorage::new());
    let err = start_default_servers(fixture.context(config))
        .await
        .err()
        .unwrap();

    assert_eq!(err.step(), StartupStep::RpcListener);
    assert_eq!(fixture.storage.disconnects(), 1);
}

#[tokio::test]
async fn http_bind_failure_stops_rpc_and_closes_storage() {
    let (_held, http_port) = occupied_port();
    let rpc_port = free_port();
    let mut config = local_config();
    config.rpc.server_port = rpc_port;
    config.rest.server_port = http_port;

    let fixture = Fixture::new(RecordingStorage::new());
    let err = start_default_servers(fixture.context(config))
        .await
        .err()
        .unwrap();

    assert_eq!(err.step(), StartupStep::HttpListener);
    assert!(err.to_string().starts_with("failed starting HTTP server; error: "));
    assert_eq!(fixture.storage.disconnects(), 1);
    assert!(port_is_free(rpc_port), "RPC listener was not stopped");
    assert!(!fixture.trigger.is_triggered());
}

#[tokio::test]
async fn teardown_runs_in_reverse_with_auth_reset_last() {
    let fixture = Fixture::new(RecordingStorage::new());
    let servers = start_default_servers(fixture.context(local_config()))
        .await
        .unwrap();

    assert_eq!(
        servers.teardown_plan(),
        vec!["HTTP listener", "RPC listener", "storage connection", "auth cache reset"]
    );

    let report = servers.teardown().await;
    assert_eq!(report.invoked(), 4);
    assert!(report.failed.is_empty());
    assert_eq!(fixture.storage.disconnects(), 1);
}

#[tokio::test]
async fn failing_disconnect_does_not_stop_the_teardown() {
    let fixture = Fixture::new(RecordingStorage::failing_disconnect());
    fixture
        .auth_cache
        .insert("key", vec!["db".into()], std::time::Duration::from_secs(60));

    let servers = start_default_servers(fixture.context(local_config()))
        .await
        .unwrap();
    let report = servers.teardown().await;

    assert_eq!(report.failed, vec!["storage connection".to_string()]);
    assert_eq!(report.completed.last().map(String::as_str), Some("auth cache reset"));
    assert!(fixture.auth_cache.is_empty());
}
