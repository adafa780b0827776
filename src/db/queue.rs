//! Namespaced key/value hash backing the durable action queue.

use crate::error::DatabaseError;
use crate::queue::QueueStore;
use crate::{Error, Result};
use async_trait::async_trait;

use super::Database;

impl Database {
    /// Write or overwrite `key` in `holder`
    pub async fn hash_set(&self, holder: &str, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_entries (holder, key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(holder, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(holder)
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to set {}/{}: {}",
                holder, key, e
            )))
        })?;

        Ok(())
    }

    /// Read every entry of `holder`, oldest write first
    pub async fn hash_get_all(&self, holder: &str) -> Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT key, value FROM queue_entries WHERE holder = ? ORDER BY updated_at ASC, key ASC",
        )
        .bind(holder)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to read {}: {}",
                holder, e
            )))
        })?;

        Ok(rows)
    }

    /// Delete `key`; true if this call removed it
    pub async fn hash_delete(&self, holder: &str, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM queue_entries WHERE holder = ? AND key = ?")
            .bind(holder)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete {}/{}: {}",
                    holder, key, e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete `key` only while it still holds `value`
    pub async fn hash_delete_if_value(&self, holder: &str, key: &str, value: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM queue_entries WHERE holder = ? AND key = ? AND value = ?")
                .bind(holder)
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to delete {}/{}: {}",
                        holder, key, e
                    )))
                })?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl QueueStore for Database {
    async fn set(&self, holder: &str, key: &str, value: &str) -> Result<()> {
        self.hash_set(holder, key, value).await
    }

    async fn get_all(&self, holder: &str) -> Result<Vec<(String, String)>> {
        self.hash_get_all(holder).await
    }

    async fn delete(&self, holder: &str, key: &str) -> Result<bool> {
        self.hash_delete(holder, key).await
    }

    async fn delete_if_value(&self, holder: &str, key: &str, value: &str) -> Result<bool> {
        self.hash_delete_if_value(holder, key, value).await
    }
}
