#![allow(dead_code)]

use async_trait::async_trait;
use scim_bridge::backend::{Predicate, RecordCursor, RecordStore, SelectQuery, SqliteRecordStore};
use scim_bridge::clock::FixedClock;
use scim_bridge::config::AppConfig;
use scim_bridge::models::{Context, RecordData};
use scim_bridge::resource::ResourceDomain;
use scim_bridge::{AppResult, Application};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Fixed "now" of every test application.
pub const NOW: i64 = 1_700_000_000;

/// SQLite store that counts writes so tests can assert that nothing was
/// written.
pub struct CountingStore {
    inner: SqliteRecordStore,
    inserts: AtomicUsize,
    updates: AtomicUsize,
}

impl CountingStore {
    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Update statements that touched at least one row.
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.inserts.store(0, Ordering::SeqCst);
        self.updates.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn health_check(&self) -> AppResult<()> {
        self.inner.health_check().await
    }

    async fn init_table(&self, table: &str, columns: &[String]) -> AppResult<()> {
        self.inner.init_table(table, columns).await
    }

    async fn count(&self, table: &str, predicate: &Predicate) -> AppResult<i64> {
        self.inner.count(table, predicate).await
    }

    async fn select(&self, table: &str, query: &SelectQuery) -> AppResult<RecordCursor> {
        self.inner.select(table, query).await
    }

    async fn insert(&self, table: &str, data: &RecordData) -> AppResult<i64> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(table, data).await
    }

    async fn update(&self, table: &str, predicate: &Predicate, changes: &RecordData) -> AppResult<u64> {
        let affected = self.inner.update(table, predicate, changes).await?;
        if affected > 0 {
            self.updates.fetch_add(1, Ordering::SeqCst);
        }
        Ok(affected)
    }
}

pub struct TestApp {
    pub app: Application,
    pub store: Arc<CountingStore>,
    pub clock: Arc<FixedClock>,
}

impl TestApp {
    pub fn domain(&self) -> &ResourceDomain {
        self.app
            .domains()
            .get(&Context::new("default"))
            .expect("default context")
    }

    /// Inserts a raw row, bypassing the repository's identity stamping.
    pub async fn insert_row(&self, table: &str, row: Value) -> i64 {
        let data = row.as_object().cloned().expect("row must be an object");
        self.store.insert(table, &data).await.expect("insert row")
    }

    pub async fn row(&self, table: &str, scim_id: &str) -> RecordData {
        self.store
            .select(table, &SelectQuery::new(Predicate::eq("scim_id", scim_id)))
            .await
            .expect("select row")
            .next()
            .expect("row exists")
            .into_fields()
    }
}

/// Default configuration on a fresh in-memory database.
pub async fn setup_test_app() -> TestApp {
    setup_test_app_with_config(AppConfig::default_config()).await
}

pub async fn setup_test_app_with_config(config: AppConfig) -> TestApp {
    let inner = SqliteRecordStore::connect("sqlite::memory:", 1)
        .await
        .expect("connect in-memory sqlite");
    let store = Arc::new(CountingStore {
        inner,
        inserts: AtomicUsize::new(0),
        updates: AtomicUsize::new(0),
    });
    let clock = Arc::new(FixedClock::at_epoch(NOW));

    let app = Application::with_store(config, store.clone(), clock.clone())
        .await
        .expect("build application");
    store.reset();

    TestApp { app, store, clock }
}
