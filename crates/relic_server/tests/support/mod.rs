//! Shared integration-test server bootstrap helpers.

use async_trait::async_trait;
use axum_test::TestServer;
use chrono::{DateTime, Utc};
use relic_core::backup::{
    backup_key, BackupKind, BackupProducer, DumpSource, ObjectStoreSnapshots, RetryPolicy,
    SnapshotStore,
};
use relic_core::{BackupConfig, BackupError, Config, JobRegistry};
use relic_server::{create_app, AppState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Dump source returning a fixed payload, optionally failing every call.
#[derive(Default)]
pub(crate) struct FakeDump {
    pub(crate) fail: AtomicBool,
}

#[async_trait]
impl DumpSource for FakeDump {
    async fn dump(&self) -> Result<Vec<u8>, BackupError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackupError::Dump("pg_dump exited with status 1".to_string()));
        }
        Ok(b"-- relic dump\nCREATE TABLE relic (id text);\n".repeat(32))
    }
}

pub(crate) struct TestContext {
    pub(crate) server: TestServer,
    pub(crate) store: Arc<ObjectStoreSnapshots>,
    pub(crate) dump: Arc<FakeDump>,
    pub(crate) jobs: JobRegistry,
}

pub(crate) fn test_config() -> Config {
    Config {
        port: 0,
        storage_dsn: "memory://".to_string(),
        database_url: "postgresql://relic:hunter2@db:5432/relic".to_string(),
        backup: BackupConfig {
            enabled: true,
            ..BackupConfig::default()
        },
    }
}

pub(crate) fn setup_test_server() -> TestContext {
    let store = Arc::new(ObjectStoreSnapshots::in_memory());
    let dump = Arc::new(FakeDump::default());
    let jobs = JobRegistry::new();
    let producer = BackupProducer::new(store.clone(), dump.clone(), "db/")
        .with_retry(RetryPolicy::none());
    let state = AppState::with_producer(test_config(), store.clone(), producer, jobs.clone());
    let server = TestServer::new(create_app(state, false)).expect("server");
    TestContext {
        server,
        store,
        dump,
        jobs,
    }
}

/// Upload a scheduled backup taken at `timestamp` with `size` bytes of payload.
pub(crate) async fn seed_backup(
    store: &ObjectStoreSnapshots,
    timestamp: DateTime<Utc>,
    size: usize,
) -> String {
    let key = backup_key("db/", BackupKind::Scheduled, timestamp);
    store
        .upload(&key, vec![0x1f; size])
        .await
        .expect("seed backup");
    key
}
