use async_trait::async_trait;
use serde_json::{Number, Value};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqlitePool, TypeInfo, ValueRef};
use std::str::FromStr;
use tracing::{debug, info};

use super::schema;
use super::sql::{count_sql, insert_sql, select_sql, update_sql, SqlStatement, SqlValue};
use crate::backend::{Predicate, RecordCursor, RecordStore, SelectQuery};
use crate::error::{AppError, AppResult};
use crate::models::{RecordData, ResourceRecord};

/// `RecordStore` on a sqlx SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Connects to `url`, creating the database file when missing.
    ///
    /// In-memory databases keep one connection open for the lifetime of the
    /// pool, otherwise SQLite would discard them.
    pub async fn connect(url: &str, max_connections: u32) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::Configuration(format!("Invalid database url {url}: {e}")))?
            .create_if_missing(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections.max(1));
        if in_memory {
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to {url}: {e}")))?;
        info!(url = %url, in_memory, "Connected to SQLite");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    bindings: &[SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in bindings {
        query = match value {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Integer(i) => query.bind(*i),
            SqlValue::Real(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

/// Reads every column of a row into JSON using the value's storage class.
fn decode_row(row: &SqliteRow) -> AppResult<RecordData> {
    let mut data = RecordData::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_ascii_uppercase();
            match type_name.as_str() {
                "INTEGER" | "INT" | "BIGINT" | "BOOLEAN" => {
                    Value::from(row.try_get_unchecked::<i64, _>(idx)?)
                }
                "REAL" | "FLOAT" | "DOUBLE" => Number::from_f64(row.try_get_unchecked::<f64, _>(idx)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "BLOB" => {
                    let bytes = row.try_get_unchecked::<Vec<u8>, _>(idx)?;
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::String(row.try_get_unchecked::<String, _>(idx)?),
            }
        };
        data.insert(column.name().to_string(), value);
    }
    Ok(data)
}

fn map_write_error(table: &str, err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(format!("Unique constraint violated on {table}: {db_err}"))
        }
        _ => AppError::Database(format!("Write to {table} failed: {err}")),
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn init_table(&self, table: &str, columns: &[String]) -> AppResult<()> {
        schema::init_table(&self.pool, table, columns).await
    }

    async fn count(&self, table: &str, predicate: &Predicate) -> AppResult<i64> {
        let SqlStatement { sql, bindings } = count_sql(table, predicate)?;
        let row = bind_all(sqlx::query(&sql), &bindings)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    async fn select(&self, table: &str, query: &SelectQuery) -> AppResult<RecordCursor> {
        let SqlStatement { sql, bindings } = select_sql(table, query)?;
        debug!(sql = %sql, "select");
        let rows = bind_all(sqlx::query(&sql), &bindings)
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(ResourceRecord::new(decode_row(row)?));
        }
        Ok(RecordCursor::new(records))
    }

    async fn insert(&self, table: &str, data: &RecordData) -> AppResult<i64> {
        let SqlStatement { sql, bindings } = insert_sql(table, data)?;
        let result = bind_all(sqlx::query(&sql), &bindings)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(table, e))?;
        Ok(result.last_insert_rowid())
    }

    async fn update(&self, table: &str, predicate: &Predicate, changes: &RecordData) -> AppResult<u64> {
        let SqlStatement { sql, bindings } = update_sql(table, predicate, changes)?;
        let result = bind_all(sqlx::query(&sql), &bindings)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(table, e))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn create_test_store() -> SqliteRecordStore {
        let store = SqliteRecordStore::connect("sqlite::memory:", 1).await.unwrap();
        store
            .init_table("fe_users", &["username".to_string(), "usergroup".to_string()])
            .await
            .unwrap();
        store
    }

    fn row(value: serde_json::Value) -> RecordData {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_select_round_trip() {
        let store = create_test_store().await;
        let uid = store
            .insert(
                "fe_users",
                &row(json!({"scim_id": "a", "pid": 1, "username": "ann", "usergroup": "7,9"})),
            )
            .await
            .unwrap();
        assert_eq!(uid, 1);

        let mut cursor = store
            .select("fe_users", &SelectQuery::new(Predicate::eq("scim_id", "a")))
            .await
            .unwrap();
        let record = cursor.next().unwrap();
        assert_eq!(record.uid(), Some(1));
        assert_eq!(record.get("username"), Some(&json!("ann")));
        assert_eq!(record.get("deleted"), Some(&json!(0)));
        assert!(cursor.next().is_none());
    }

    #[tokio::test]
    async fn test_unique_scim_id_conflict() {
        let store = create_test_store().await;
        store.insert("fe_users", &row(json!({"scim_id": "a"}))).await.unwrap();
        let err = store
            .insert("fe_users", &row(json!({"scim_id": "a"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_in_set_matches_whole_items() {
        let store = create_test_store().await;
        for (id, groups) in [("a", "7,9"), ("b", "17"), ("c", "9, 7"), ("d", "")] {
            store
                .insert("fe_users", &row(json!({"scim_id": id, "usergroup": groups})))
                .await
                .unwrap();
        }

        let count = store
            .count("fe_users", &Predicate::in_set("usergroup", "7", ","))
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_init_table_adds_missing_columns() {
        let store = create_test_store().await;
        store
            .init_table("fe_users", &["username".to_string(), "email".to_string()])
            .await
            .unwrap();
        store
            .insert("fe_users", &row(json!({"scim_id": "a", "email": "ann@example.com"})))
            .await
            .unwrap();
        assert_eq!(
            store.count("fe_users", &Predicate::Present("email".to_string())).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_update_reports_rows_affected() {
        let store = create_test_store().await;
        store.insert("fe_users", &row(json!({"scim_id": "a"}))).await.unwrap();

        let changed = store
            .update("fe_users", &Predicate::eq("scim_id", "a"), &row(json!({"username": "bob"})))
            .await
            .unwrap();
        assert_eq!(changed, 1);
        let missing = store
            .update("fe_users", &Predicate::eq("scim_id", "zz"), &row(json!({"username": "x"})))
            .await
            .unwrap();
        assert_eq!(missing, 0);
    }
}
