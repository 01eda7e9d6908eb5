use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use super::sql::quote_identifier;
use crate::error::{AppError, AppResult};
use crate::models::{CRDATE, DELETED, PID, SCIM_ID, TSTAMP, UID};

/// Initialize a resource table for SQLite
///
/// Creates the table with its identity columns when missing, then adds every
/// requested column that does not exist yet. Resource columns are declared
/// without a type so they keep whatever the mapping writes.
pub async fn init_table(pool: &SqlitePool, table: &str, columns: &[String]) -> AppResult<()> {
    let quoted = quote_identifier(table)?;

    let create_sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {quoted} (
            "{UID}" INTEGER PRIMARY KEY AUTOINCREMENT,
            "{SCIM_ID}" TEXT NOT NULL UNIQUE,
            "{PID}" INTEGER NOT NULL DEFAULT 0,
            "{CRDATE}" INTEGER NOT NULL DEFAULT 0,
            "{TSTAMP}" INTEGER NOT NULL DEFAULT 0,
            "{DELETED}" INTEGER NOT NULL DEFAULT 0
        )
        "#
    );

    sqlx::query(&create_sql)
        .execute(pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to create table {table}: {e}")))?;

    let existing = existing_columns(pool, &quoted).await?;
    for column in columns {
        if existing.iter().any(|c| c == column) {
            continue;
        }
        let alter_sql = format!(
            "ALTER TABLE {quoted} ADD COLUMN {}",
            quote_identifier(column)?
        );
        sqlx::query(&alter_sql).execute(pool).await.map_err(|e| {
            AppError::Database(format!("Failed to add column {column} to {table}: {e}"))
        })?;
        debug!(table = %table, column = %column, "Added column");
    }

    create_indexes(pool, table).await?;
    info!(table = %table, "Table ready");
    Ok(())
}

async fn existing_columns(pool: &SqlitePool, quoted_table: &str) -> AppResult<Vec<String>> {
    let rows = sqlx::query(&format!("PRAGMA table_info({quoted_table})"))
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("name").map_err(AppError::from))
        .collect()
}

/// Create indexes for tenant scoped, soft-delete aware listing
async fn create_indexes(pool: &SqlitePool, table: &str) -> AppResult<()> {
    let index = quote_identifier(&format!("idx_{table}_{PID}_{DELETED}"))?;
    let sql = format!(
        r#"CREATE INDEX IF NOT EXISTS {index} ON {} ("{PID}", "{DELETED}")"#,
        quote_identifier(table)?
    );
    sqlx::query(&sql)
        .execute(pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to create index on {table}: {e}")))?;
    Ok(())
}
