use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::AppResult;
use crate::models::{RecordData, ResourceRecord};

pub mod predicate;
pub mod sqlite;

pub use predicate::{CompareOp, Predicate, SelectQuery};
pub use sqlite::SqliteRecordStore;

/// Rows returned by `RecordStore::select`, in query order.
#[derive(Debug, Default, Clone)]
pub struct RecordCursor {
    rows: VecDeque<ResourceRecord>,
}

impl RecordCursor {
    pub fn new(rows: impl IntoIterator<Item = ResourceRecord>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Iterator for RecordCursor {
    type Item = ResourceRecord;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.rows.len(), Some(self.rows.len()))
    }
}

/// Flat table storage collaborator
///
/// One table per resource kind, carrying the identity columns
/// (`uid`, `scim_id`, `pid`, `crdate`, `tstamp`, `deleted`) plus the columns
/// the mappings write. Implementations bind values, never interpolate them.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Check if the storage backend is healthy and accessible
    async fn health_check(&self) -> AppResult<()>;

    /// Create the table if needed and add any missing columns
    async fn init_table(&self, table: &str, columns: &[String]) -> AppResult<()>;

    async fn count(&self, table: &str, predicate: &Predicate) -> AppResult<i64>;

    async fn select(&self, table: &str, query: &SelectQuery) -> AppResult<RecordCursor>;

    /// Insert a row and return its `uid`
    async fn insert(&self, table: &str, data: &RecordData) -> AppResult<i64>;

    /// Update matching rows and return how many were touched
    async fn update(&self, table: &str, predicate: &Predicate, changes: &RecordData) -> AppResult<u64>;
}

/// Factory for creating store instances
pub struct StoreFactory;

impl StoreFactory {
    /// Create a store based on configuration
    pub async fn create(config: &DatabaseConfig) -> AppResult<Arc<dyn RecordStore>> {
        let store = SqliteRecordStore::connect(&config.url, config.max_connections).await?;
        Ok(Arc::new(store))
    }
}
